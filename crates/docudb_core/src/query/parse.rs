//! Parser from query documents to the operator tree.
//!
//! Every `$`-prefixed key is recognized here; anything else is rejected at
//! construction time so evaluation never meets an unknown operator.

use crate::error::{CoreError, CoreResult};
use crate::index::render_scalar;
use crate::query::ast::{Cond, DoAction, ElemPredicate, Hints, Node, Projection, UpdateSpec};
use docudb_codec::{Document, ObjectId, Value, ID_FIELD};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;

/// The parsed form of a primary query document.
#[derive(Debug, Clone)]
pub(crate) struct ParsedQuery {
    pub root: Node,
    pub update: UpdateSpec,
    pub actions: Vec<(String, DoAction)>,
}

const UPDATE_OPERATORS: [&str; 13] = [
    "$set",
    "$upsert",
    "$inc",
    "$dropall",
    "$addToSet",
    "$addToSetAll",
    "$push",
    "$pushAll",
    "$pull",
    "$pullAll",
    "$unset",
    "$rename",
    "$do",
];

/// Parses a primary query, which may carry update operators.
pub(crate) fn parse_query(doc: &Document) -> CoreResult<ParsedQuery> {
    let mut parser = Parser::default();
    let mut update = UpdateSpec::default();
    let mut actions = Vec::new();
    let mut nodes = Vec::new();

    for (key, value) in doc.iter() {
        if UPDATE_OPERATORS.contains(&key) {
            parse_update_operator(key, value, &mut update, &mut actions)?;
        } else {
            parser.parse_entry(key, value, "", &mut nodes)?;
        }
    }
    Ok(ParsedQuery {
        root: Node::And(nodes),
        update,
        actions,
    })
}

/// Parses an alternative (`or`) query, which may only hold conditions.
pub(crate) fn parse_condition(doc: &Document) -> CoreResult<Node> {
    let mut parser = Parser::default();
    let nodes = parser.parse_document(doc, "")?;
    Ok(Node::And(nodes))
}

#[derive(Default)]
struct Parser {
    elem_match_paths: HashSet<String>,
}

impl Parser {
    fn parse_document(&mut self, doc: &Document, prefix: &str) -> CoreResult<Vec<Node>> {
        let mut nodes = Vec::with_capacity(doc.len());
        for (key, value) in doc.iter() {
            self.parse_entry(key, value, prefix, &mut nodes)?;
        }
        Ok(nodes)
    }

    fn parse_entry(
        &mut self,
        key: &str,
        value: &Value,
        prefix: &str,
        nodes: &mut Vec<Node>,
    ) -> CoreResult<()> {
        match key {
            "$and" | "$or" => {
                let items = value
                    .as_array()
                    .ok_or_else(|| CoreError::operand_not_array(key))?;
                let mut branches = Vec::with_capacity(items.len());
                for item in items {
                    let doc = item.as_document().ok_or_else(|| {
                        CoreError::invalid_query(format!("{key} elements must be documents"))
                    })?;
                    branches.push(Node::And(self.parse_document(doc, prefix)?));
                }
                nodes.push(if key == "$and" {
                    Node::And(branches)
                } else {
                    Node::Or(branches)
                });
                Ok(())
            }
            k if k.starts_with('$') => Err(CoreError::invalid_control(k)),
            field => {
                let path = join(prefix, field);
                match value {
                    Value::Document(sub) if has_operators(sub)? => {
                        let cond = self.parse_operators(&path, sub)?;
                        nodes.push(Node::Field { path, cond });
                    }
                    Value::Document(sub) if !sub.is_empty() => {
                        nodes.extend(self.parse_document(sub, &path)?);
                    }
                    other => nodes.push(Node::Field {
                        cond: Cond::Eq(id_operand(&path, other)),
                        path,
                    }),
                }
                Ok(())
            }
        }
    }

    fn parse_operators(&mut self, path: &str, ops: &Document) -> CoreResult<Cond> {
        let mut conds = Vec::with_capacity(ops.len());
        for (op, operand) in ops.iter() {
            if op == "$options" {
                if !ops.contains_key("$regex") {
                    return Err(CoreError::invalid_query("$options requires $regex"));
                }
                continue;
            }
            conds.push(self.parse_operator(path, op, operand, ops)?);
        }
        Ok(if conds.len() == 1 {
            conds.remove(0)
        } else {
            Cond::All(conds)
        })
    }

    fn parse_operator(
        &mut self,
        path: &str,
        op: &str,
        operand: &Value,
        siblings: &Document,
    ) -> CoreResult<Cond> {
        let cond = match op {
            "$not" => Cond::Not(Box::new(self.parse_nested(path, operand)?)),
            "$ne" => Cond::Not(Box::new(Cond::Eq(id_operand(path, operand)))),
            "$begin" => Cond::Begin(match operand {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| CoreError::invalid_query("$begin expects strings"))
                    })
                    .collect::<CoreResult<_>>()?,
                _ => return Err(CoreError::invalid_query("$begin expects a string")),
            }),
            "$gt" => Cond::Gt(ordered_operand(op, operand)?),
            "$gte" => Cond::Gte(ordered_operand(op, operand)?),
            "$lt" => Cond::Lt(ordered_operand(op, operand)?),
            "$lte" => Cond::Lte(ordered_operand(op, operand)?),
            "$bt" => {
                let items = operand
                    .as_array()
                    .ok_or_else(|| CoreError::operand_not_array(op))?;
                let [a, b] = items else {
                    return Err(CoreError::invalid_query("$bt expects exactly two bounds"));
                };
                let (a, b) = (ordered_operand(op, a)?, ordered_operand(op, b)?);
                if a.compare(&b) == Ordering::Greater {
                    Cond::Between(b, a)
                } else {
                    Cond::Between(a, b)
                }
            }
            "$in" | "$nin" => {
                let items = operand
                    .as_array()
                    .ok_or_else(|| CoreError::operand_not_array(op))?;
                let values = items.iter().map(|v| id_operand(path, v)).collect();
                if op == "$in" {
                    Cond::In(values)
                } else {
                    Cond::Nin(values)
                }
            }
            "$strand" | "$stror" => {
                let items = operand
                    .as_array()
                    .ok_or_else(|| CoreError::operand_not_array(op))?;
                let tokens = items.iter().filter_map(render_scalar).collect();
                if op == "$strand" {
                    Cond::StrAnd(tokens)
                } else {
                    Cond::StrOr(tokens)
                }
            }
            "$exists" => Cond::Exists(match operand {
                Value::Bool(b) => *b,
                other => other
                    .as_f64()
                    .map(|n| n != 0.0)
                    .ok_or_else(|| CoreError::invalid_query("$exists expects a boolean"))?,
            }),
            "$icase" => Cond::ICase(Box::new(match operand {
                Value::Document(ops) if has_operators(ops)? => self.parse_operators(path, ops)?,
                Value::String(s) => Cond::Eq(Value::String(s.clone())),
                _ => return Err(CoreError::invalid_query("$icase expects a string or operators")),
            })),
            "$elemMatch" => {
                let sub = operand
                    .as_document()
                    .ok_or_else(|| CoreError::invalid_query("$elemMatch expects a document"))?;
                if !self.elem_match_paths.insert(path.to_string()) {
                    return Err(CoreError::TooManyElemMatch {
                        field: path.to_string(),
                    });
                }
                if has_operators(sub)? {
                    Cond::ElemMatch(ElemPredicate::Value(Box::new(
                        self.parse_operators(path, sub)?,
                    )))
                } else {
                    let mut inner = Parser::default();
                    Cond::ElemMatch(ElemPredicate::Document(inner.parse_document(sub, "")?))
                }
            }
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| CoreError::invalid_query("$regex expects a pattern string"))?;
                let flags = siblings
                    .get("$options")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let pattern = if flags.contains('i') {
                    format!("(?i){pattern}")
                } else {
                    pattern.to_string()
                };
                Cond::Regex(
                    Regex::new(&pattern)
                        .map_err(|e| CoreError::invalid_query(format!("invalid $regex: {e}")))?,
                )
            }
            other => return Err(CoreError::invalid_control(other)),
        };
        Ok(cond)
    }

    fn parse_nested(&mut self, path: &str, operand: &Value) -> CoreResult<Cond> {
        match operand {
            Value::Document(ops) if has_operators(ops)? => self.parse_operators(path, ops),
            other => Ok(Cond::Eq(id_operand(path, other))),
        }
    }
}

fn parse_update_operator(
    op: &str,
    operand: &Value,
    update: &mut UpdateSpec,
    actions: &mut Vec<(String, DoAction)>,
) -> CoreResult<()> {
    if op == "$dropall" {
        update.dropall = true;
        return Ok(());
    }
    let doc = operand
        .as_document()
        .ok_or_else(|| CoreError::invalid_query(format!("{op} expects a document")))?;
    match op {
        "$set" => update.set = Some(doc.clone()),
        "$upsert" => update.upsert = Some(doc.clone()),
        "$inc" => {
            for (path, value) in doc.iter() {
                if !value.is_number() {
                    return Err(CoreError::type_mismatch(format!(
                        "$inc operand for '{path}' is not a number"
                    )));
                }
                update.inc.push((path.to_string(), value.clone()));
            }
        }
        "$addToSet" | "$push" | "$pull" => {
            let target = match op {
                "$addToSet" => &mut update.add_to_set,
                "$push" => &mut update.push,
                _ => &mut update.pull,
            };
            for (path, value) in doc.iter() {
                target.push((path.to_string(), vec![value.clone()]));
            }
        }
        "$addToSetAll" | "$pushAll" | "$pullAll" => {
            let target = match op {
                "$addToSetAll" => &mut update.add_to_set,
                "$pushAll" => &mut update.push,
                _ => &mut update.pull,
            };
            for (path, value) in doc.iter() {
                let items = value
                    .as_array()
                    .ok_or_else(|| CoreError::operand_not_array(op))?;
                target.push((path.to_string(), items.to_vec()));
            }
        }
        "$unset" => update.unset.extend(doc.keys().map(str::to_string)),
        "$rename" => {
            for (from, to) in doc.iter() {
                let to = to
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| CoreError::invalid_query("$rename expects field names"))?;
                update.rename.push((from.to_string(), to.to_string()));
            }
        }
        "$do" => {
            for (path, spec) in doc.iter() {
                let spec = spec
                    .as_document()
                    .ok_or_else(|| CoreError::invalid_query("$do expects action documents"))?;
                if spec.is_empty() {
                    return Err(CoreError::invalid_control(format!("$do.{path}")));
                }
                for (action, arg) in spec.iter() {
                    actions.push((path.to_string(), parse_action(action, arg)?));
                }
            }
        }
        _ => return Err(CoreError::invalid_control(op)),
    }
    Ok(())
}

fn parse_action(action: &str, arg: &Value) -> CoreResult<DoAction> {
    match action {
        "$join" => arg
            .as_str()
            .map(|name| DoAction::Join(name.to_string()))
            .ok_or_else(|| CoreError::invalid_query("$join expects a collection name")),
        "$slice" => match arg {
            Value::Array(bounds) => match bounds.as_slice() {
                [skip, limit] => match (skip.as_f64(), limit.as_f64()) {
                    (Some(skip), Some(limit)) => Ok(DoAction::Slice {
                        skip: skip as i64,
                        limit: (limit as i64).unsigned_abs() as usize,
                    }),
                    _ => Err(CoreError::invalid_query("$slice bounds must be numbers")),
                },
                _ => Err(CoreError::invalid_query("$slice expects [skip, limit]")),
            },
            other => other
                .as_f64()
                .map(|n| DoAction::Slice {
                    skip: 0,
                    limit: (n as i64).unsigned_abs() as usize,
                })
                .ok_or_else(|| CoreError::invalid_query("$slice expects a number")),
        },
        other => Err(CoreError::invalid_control(other)),
    }
}

/// Parses a hints document.
pub(crate) fn parse_hints(doc: &Document) -> CoreResult<Hints> {
    let mut hints = Hints::default();
    for (key, value) in doc.iter() {
        match key {
            "$orderby" => {
                let spec = value
                    .as_document()
                    .ok_or_else(|| CoreError::invalid_query("$orderby expects a document"))?;
                for (path, dir) in spec.iter() {
                    match dir.as_f64() {
                        Some(d) if d > 0.0 => hints.order_by.push((path.to_string(), true)),
                        Some(d) if d < 0.0 => hints.order_by.push((path.to_string(), false)),
                        _ => {}
                    }
                }
            }
            "$skip" => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| CoreError::invalid_query("$skip expects a number"))?;
                hints.skip = if n > 0.0 { n as usize } else { 0 };
            }
            "$max" => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| CoreError::invalid_query("$max expects a number"))?;
                hints.max = (n >= 1.0).then_some(n as usize);
            }
            "$fields" => {
                let spec = value
                    .as_document()
                    .ok_or_else(|| CoreError::invalid_query("$fields expects a document"))?;
                hints.projection = Some(parse_projection(spec)?);
            }
            k if k.starts_with('$') => return Err(CoreError::invalid_control(k)),
            k => {
                return Err(CoreError::invalid_query(format!(
                    "unexpected key '{k}' in hints"
                )))
            }
        }
    }
    Ok(hints)
}

fn parse_projection(spec: &Document) -> CoreResult<Projection> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for (path, flag) in spec.iter() {
        let on = match flag {
            Value::Bool(b) => *b,
            other => match other.as_f64() {
                Some(n) => n > 0.0,
                None => continue,
            },
        };
        if on {
            include.push(path.to_string());
        } else {
            exclude.push(path.to_string());
        }
    }
    match (include.is_empty(), exclude.is_empty()) {
        (false, false) => Err(CoreError::MixedProjection),
        (true, false) => Ok(Projection::Exclude(exclude)),
        (false, true) => Ok(Projection::Include(include)),
        (true, true) => Ok(Projection::Include(vec![ID_FIELD.to_string()])),
    }
}

/// Whether a sub-document is an operator block rather than nested fields.
fn has_operators(doc: &Document) -> CoreResult<bool> {
    let ops = doc.keys().filter(|k| k.starts_with('$')).count();
    if ops > 0 && ops != doc.len() {
        return Err(CoreError::invalid_query(
            "operators cannot be mixed with field names",
        ));
    }
    Ok(ops > 0)
}

fn ordered_operand(op: &str, value: &Value) -> CoreResult<Value> {
    match value {
        Value::Int(_) | Value::Double(_) | Value::String(_) | Value::Bool(_) => Ok(value.clone()),
        _ => Err(CoreError::invalid_query(format!(
            "{op} expects a number or string"
        ))),
    }
}

/// String operands compared against `_id` are read as object ids.
fn id_operand(path: &str, value: &Value) -> Value {
    match value {
        Value::String(s) if path == ID_FIELD => ObjectId::parse_str(s)
            .map(Value::ObjectId)
            .unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Builds the document `$upsert` inserts: the primary query's equality
/// fields overlaid with the payload.
pub(crate) fn upsert_document(root: &Node, payload: &Document) -> CoreResult<Document> {
    let mut base = Document::new();
    collect_equalities(root, &mut base)?;
    for (path, value) in payload.iter() {
        base.set_path(path, value.clone())?;
    }
    Ok(base)
}

fn collect_equalities(node: &Node, out: &mut Document) -> CoreResult<()> {
    match node {
        Node::And(children) => {
            for child in children {
                collect_equalities(child, out)?;
            }
        }
        Node::Field {
            path,
            cond: Cond::Eq(value),
        } if !value.is_null() => {
            out.set_path(path, value.clone())?;
        }
        _ => {}
    }
    Ok(())
}
