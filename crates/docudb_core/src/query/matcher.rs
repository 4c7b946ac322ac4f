//! Evaluation of parsed predicates against documents.

use crate::fieldpath;
use crate::index::{numeric, value_tokens};
use crate::query::ast::{Cond, ElemPredicate, Node};
use docudb_codec::{Document, Value};
use std::cmp::Ordering;

/// Whether `doc` satisfies `node`.
pub(crate) fn matches(node: &Node, doc: &Document) -> bool {
    match node {
        Node::And(children) => children.iter().all(|c| matches(c, doc)),
        Node::Or(children) => children.iter().any(|c| matches(c, doc)),
        Node::Field { path, cond } => eval(cond, &fieldpath::resolve(doc, path), false),
    }
}

fn eval(cond: &Cond, values: &[&Value], fold: bool) -> bool {
    match cond {
        Cond::Eq(Value::Null) => values.is_empty() || values.iter().any(|v| v.is_null()),
        Cond::Not(inner) => !eval(inner, values, fold),
        Cond::Nin(items) => !values
            .iter()
            .any(|v| each_scalar(v, |s| items.iter().any(|i| equals(s, i, fold)))),
        Cond::Exists(present) => values.is_empty() != *present,
        Cond::All(conds) => conds.iter().all(|c| eval(c, values, fold)),
        Cond::ICase(inner) => eval(inner, values, true),
        Cond::ElemMatch(pred) => values.iter().any(|v| match v {
            Value::Array(items) => items.iter().any(|item| elem_matches(pred, item, fold)),
            _ => false,
        }),
        Cond::StrAnd(tokens) | Cond::StrOr(tokens) => values.iter().any(|v| {
            let Ok(mut have) = value_tokens(v) else {
                return false;
            };
            let mut want: Vec<String> = tokens.clone();
            if fold {
                have.iter_mut().for_each(|t| *t = t.to_lowercase());
                want.iter_mut().for_each(|t| *t = t.to_lowercase());
            }
            if matches!(cond, Cond::StrAnd(_)) {
                !want.is_empty() && want.iter().all(|t| have.contains(t))
            } else {
                want.iter().any(|t| have.contains(t))
            }
        }),
        scalar => values
            .iter()
            .any(|v| each_scalar(v, |s| test_scalar(scalar, s, fold))),
    }
}

/// Applies `test` to a value and, for arrays, to each element.
fn each_scalar(value: &Value, mut test: impl FnMut(&Value) -> bool) -> bool {
    if test(value) {
        return true;
    }
    match value {
        Value::Array(items) => items.iter().any(test),
        _ => false,
    }
}

fn elem_matches(pred: &ElemPredicate, item: &Value, fold: bool) -> bool {
    match pred {
        ElemPredicate::Document(nodes) => match item {
            Value::Document(doc) => nodes.iter().all(|n| matches(n, doc)),
            _ => false,
        },
        ElemPredicate::Value(cond) => eval(cond, &[item], fold),
    }
}

fn test_scalar(cond: &Cond, value: &Value, fold: bool) -> bool {
    match cond {
        Cond::Eq(expected) => equals(value, expected, fold),
        Cond::In(items) => items.iter().any(|i| equals(value, i, fold)),
        Cond::Begin(prefixes) => match value {
            Value::String(s) if fold => {
                let s = s.to_lowercase();
                prefixes.iter().any(|p| s.starts_with(&p.to_lowercase()))
            }
            Value::String(s) => prefixes.iter().any(|p| s.starts_with(p.as_str())),
            _ => false,
        },
        Cond::Gt(bound) => order(value, bound, fold) == Some(Ordering::Greater),
        Cond::Gte(bound) => matches!(
            order(value, bound, fold),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Cond::Lt(bound) => order(value, bound, fold) == Some(Ordering::Less),
        Cond::Lte(bound) => matches!(
            order(value, bound, fold),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Cond::Between(low, high) => {
            matches!(
                order(value, low, fold),
                Some(Ordering::Greater | Ordering::Equal)
            ) && matches!(
                order(value, high, fold),
                Some(Ordering::Less | Ordering::Equal)
            )
        }
        Cond::Regex(re) => value.as_str().is_some_and(|s| re.is_match(s)),
        _ => false,
    }
}

/// Equality with numbers compared by value and booleans as `0`/`1`.
pub(crate) fn equals(actual: &Value, expected: &Value, fold: bool) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) if fold => a.to_lowercase() == b.to_lowercase(),
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => match order_numeric(actual, expected) {
            Some(ord) => ord == Ordering::Equal,
            None => actual.loosely_equals(expected),
        },
    }
}

/// Orders two values for range operators: numbers against numbers, strings
/// against strings. Other pairings are incomparable.
fn order(actual: &Value, bound: &Value, fold: bool) -> Option<Ordering> {
    match (actual, bound) {
        (Value::String(a), Value::String(b)) if fold => {
            Some(a.to_lowercase().cmp(&b.to_lowercase()))
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => order_numeric(actual, bound),
    }
}

fn order_numeric(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        _ => numeric(a)?.partial_cmp(&numeric(b)?),
    }
}
