//! Index selection.
//!
//! At most one index drives a query. Candidates it yields are always
//! re-checked by the matcher, so a lookup only has to return a superset of
//! the true matches.

use crate::index::{numeric, IndexKey, IndexKind, IndexSet};
use crate::query::ast::{Cond, Node};
use docudb_codec::{ObjectId, Value, ID_FIELD};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Bound;

/// How the candidate documents of a query are produced.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Plan {
    /// Direct fetch by primary key.
    ById(Vec<ObjectId>),
    /// One secondary index lookup.
    Index {
        path: String,
        kind: IndexKind,
        lookup: Lookup,
    },
    FullScan,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lookup {
    /// Union of the postings of every key.
    AnyKey(Vec<IndexKey>),
    /// Intersection of the postings of every key.
    AllKeys(Vec<IndexKey>),
    Range(Bound<IndexKey>, Bound<IndexKey>),
    Prefix(Vec<String>),
}

// Lower is better.
const RANK_EQ: u8 = 0;
const RANK_RANGE: u8 = 1;
const RANK_PREFIX: u8 = 2;

impl Plan {
    /// Picks the plan for `root`. Queries with alternatives always scan.
    pub(crate) fn choose(root: &Node, has_alternatives: bool, indexes: &IndexSet) -> Self {
        if has_alternatives {
            return Self::FullScan;
        }
        let mut conjuncts = Vec::new();
        flatten(root, &mut conjuncts);

        let mut best: Option<(u8, Plan)> = None;
        for (path, cond) in conjuncts {
            if path == ID_FIELD {
                if let Some(ids) = id_lookup(cond) {
                    return Self::ById(ids);
                }
            }
            if let Some((rank, plan)) = index_lookup(path, cond, indexes) {
                if best.as_ref().map_or(true, |(r, _)| rank < *r) {
                    best = Some((rank, plan));
                }
            }
        }
        best.map_or(Self::FullScan, |(_, plan)| plan)
    }

    /// Candidate ids, or `None` when every document must be scanned.
    pub(crate) fn candidates(&self, indexes: &IndexSet) -> Option<BTreeSet<ObjectId>> {
        match self {
            Self::FullScan => None,
            Self::ById(ids) => Some(ids.iter().copied().collect()),
            Self::Index { path, kind, lookup } => {
                let index = indexes.get(path, *kind)?;
                Some(match lookup {
                    Lookup::AnyKey(keys) => keys.iter().flat_map(|k| index.lookup_eq(k)).collect(),
                    Lookup::AllKeys(keys) => {
                        let mut sets = keys.iter().map(|k| index.lookup_eq(k));
                        match sets.next() {
                            Some(first) => {
                                sets.fold(first, |acc, s| acc.intersection(&s).copied().collect())
                            }
                            None => BTreeSet::new(),
                        }
                    }
                    Lookup::Range(low, high) => index.lookup_range(low.as_ref(), high.as_ref()),
                    Lookup::Prefix(prefixes) => prefixes
                        .iter()
                        .flat_map(|p| index.lookup_prefix(p))
                        .collect(),
                })
            }
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index { path, kind, .. } => write!(f, "'{}{}'", kind.prefix(), path),
            Self::ById(_) | Self::FullScan => f.write_str("NONE"),
        }
    }
}

fn flatten<'a>(node: &'a Node, out: &mut Vec<(&'a str, &'a Cond)>) {
    match node {
        Node::And(children) => children.iter().for_each(|c| flatten(c, out)),
        Node::Field { path, cond: Cond::All(conds) } => {
            out.extend(conds.iter().map(|c| (path.as_str(), c)));
        }
        Node::Field { path, cond } => out.push((path.as_str(), cond)),
        Node::Or(_) => {}
    }
}

fn id_lookup(cond: &Cond) -> Option<Vec<ObjectId>> {
    match cond {
        Cond::Eq(Value::ObjectId(oid)) => Some(vec![*oid]),
        Cond::In(items) => items.iter().map(Value::as_object_id).collect(),
        _ => None,
    }
}

fn index_lookup(path: &str, cond: &Cond, indexes: &IndexSet) -> Option<(u8, Plan)> {
    let (rank, kind, lookup) = match cond {
        Cond::Eq(value) => {
            let (kind, key) = typed_key(value)?;
            (RANK_EQ, kind, Lookup::AnyKey(vec![key]))
        }
        Cond::In(items) => {
            let (kind, keys) = typed_keys(items)?;
            (RANK_EQ, kind, Lookup::AnyKey(keys))
        }
        Cond::StrAnd(tokens) => (RANK_EQ, IndexKind::Array, Lookup::AllKeys(text_keys(tokens))),
        Cond::StrOr(tokens) => (RANK_EQ, IndexKind::Array, Lookup::AnyKey(text_keys(tokens))),
        Cond::ICase(inner) => match inner.as_ref() {
            Cond::Eq(Value::String(s)) => (
                RANK_EQ,
                IndexKind::IString,
                Lookup::AnyKey(vec![IndexKey::Text(s.to_lowercase())]),
            ),
            Cond::In(items) => {
                let keys = items
                    .iter()
                    .map(|v| v.as_str().map(|s| IndexKey::Text(s.to_lowercase())))
                    .collect::<Option<Vec<_>>>()?;
                (RANK_EQ, IndexKind::IString, Lookup::AnyKey(keys))
            }
            Cond::Begin(prefixes) => (
                RANK_PREFIX,
                IndexKind::IString,
                Lookup::Prefix(prefixes.iter().map(|p| p.to_lowercase()).collect()),
            ),
            _ => return None,
        },
        Cond::Gt(v) | Cond::Gte(v) => {
            let (kind, key) = typed_key(v)?;
            (RANK_RANGE, kind, Lookup::Range(Bound::Included(key), Bound::Unbounded))
        }
        Cond::Lt(v) | Cond::Lte(v) => {
            let (kind, key) = typed_key(v)?;
            (RANK_RANGE, kind, Lookup::Range(Bound::Unbounded, Bound::Included(key)))
        }
        Cond::Between(low, high) => {
            let (low_kind, low) = typed_key(low)?;
            let (high_kind, high) = typed_key(high)?;
            if low_kind != high_kind {
                return None;
            }
            (
                RANK_RANGE,
                low_kind,
                Lookup::Range(Bound::Included(low), Bound::Included(high)),
            )
        }
        Cond::Begin(prefixes) => (RANK_PREFIX, IndexKind::String, Lookup::Prefix(prefixes.clone())),
        _ => return None,
    };
    indexes.get(path, kind)?;
    Some((
        rank,
        Plan::Index {
            path: path.to_string(),
            kind,
            lookup,
        },
    ))
}

/// The index kind able to answer a comparison with `value`, and its key.
fn typed_key(value: &Value) -> Option<(IndexKind, IndexKey)> {
    match value {
        Value::String(s) => Some((IndexKind::String, IndexKey::Text(s.clone()))),
        other => Some((IndexKind::Number, IndexKey::number(numeric(other)?)?)),
    }
}

fn typed_keys(items: &[Value]) -> Option<(IndexKind, Vec<IndexKey>)> {
    let mut kind = None;
    let mut keys = Vec::with_capacity(items.len());
    for item in items {
        let (k, key) = typed_key(item)?;
        if kind.is_some_and(|seen| seen != k) {
            return None;
        }
        kind = Some(k);
        keys.push(key);
    }
    Some((kind?, keys))
}

fn text_keys(tokens: &[String]) -> Vec<IndexKey> {
    tokens.iter().cloned().map(IndexKey::Text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{FieldIndex, IndexKind};
    use crate::query::parse::parse_query;
    use docudb_codec::Document;

    fn root(json: &str) -> Node {
        parse_query(&Document::from_json_str(json).unwrap())
            .unwrap()
            .root
    }

    fn indexes(defs: &[(&str, IndexKind)]) -> IndexSet {
        let mut set = IndexSet::new();
        for (path, kind) in defs {
            set.install(FieldIndex::new(*path, *kind));
        }
        set
    }

    fn index_name(plan: &Plan) -> String {
        plan.to_string()
    }

    #[test]
    fn no_index_means_full_scan() {
        let plan = Plan::choose(&root(r#"{"age": 5}"#), false, &IndexSet::new());
        assert_eq!(plan, Plan::FullScan);
        assert_eq!(plan.to_string(), "NONE");
    }

    #[test]
    fn equality_beats_range_and_prefix() {
        let set = indexes(&[
            ("age", IndexKind::Number),
            ("name", IndexKind::String),
            ("city", IndexKind::String),
        ]);
        let q = root(r#"{"name": {"$begin": "B"}, "age": {"$gt": 3}, "city": "Oslo"}"#);
        assert_eq!(index_name(&Plan::choose(&q, false, &set)), "'scity'");

        let q = root(r#"{"name": {"$begin": "B"}, "age": {"$gt": 3}}"#);
        assert_eq!(index_name(&Plan::choose(&q, false, &set)), "'nage'");
    }

    #[test]
    fn operand_type_selects_index_kind() {
        let set = indexes(&[("f", IndexKind::String)]);
        assert_eq!(Plan::choose(&root(r#"{"f": 1}"#), false, &set), Plan::FullScan);
        let set = indexes(&[("f", IndexKind::Number)]);
        assert!(matches!(
            Plan::choose(&root(r#"{"f": 1}"#), false, &set),
            Plan::Index { kind: IndexKind::Number, .. }
        ));
        assert_eq!(
            Plan::choose(&root(r#"{"f": {"$in": [1, "x"]}}"#), false, &set),
            Plan::FullScan
        );
    }

    #[test]
    fn case_folding_uses_istring_index() {
        let set = indexes(&[("name", IndexKind::String), ("name", IndexKind::IString)]);
        let plan = Plan::choose(&root(r#"{"name": {"$icase": "BRUCE"}}"#), false, &set);
        assert_eq!(
            plan,
            Plan::Index {
                path: "name".into(),
                kind: IndexKind::IString,
                lookup: Lookup::AnyKey(vec![IndexKey::Text("bruce".into())]),
            }
        );
    }

    #[test]
    fn negations_and_alternatives_are_not_planned() {
        let set = indexes(&[("age", IndexKind::Number)]);
        assert_eq!(
            Plan::choose(&root(r#"{"age": {"$not": 3}}"#), false, &set),
            Plan::FullScan
        );
        assert_eq!(
            Plan::choose(&root(r#"{"age": {"$nin": [3]}}"#), false, &set),
            Plan::FullScan
        );
        assert_eq!(
            Plan::choose(&root(r#"{"$or": [{"age": 3}]}"#), false, &set),
            Plan::FullScan
        );
        assert_eq!(Plan::choose(&root(r#"{"age": 3}"#), true, &set), Plan::FullScan);
    }

    #[test]
    fn primary_key_equality_fetches_directly() {
        let oid = ObjectId::new();
        let q = root(&format!(r#"{{"name": "x", "_id": "{oid}"}}"#));
        assert_eq!(Plan::choose(&q, false, &IndexSet::new()), Plan::ById(vec![oid]));
    }

    #[test]
    fn lookups_return_postings() {
        let mut set = IndexSet::new();
        let mut tags = FieldIndex::new("tags", IndexKind::Array);
        let (a, b) = (ObjectId::new(), ObjectId::new());
        tags.insert_doc(a, &Document::from_json_str(r#"{"tags": ["red", "blue"]}"#).unwrap());
        tags.insert_doc(b, &Document::from_json_str(r#"{"tags": "red green"}"#).unwrap());
        set.install(tags);

        let and = Plan::choose(&root(r#"{"tags": {"$strand": ["red", "blue"]}}"#), false, &set);
        assert_eq!(and.candidates(&set).unwrap(), BTreeSet::from([a]));
        let or = Plan::choose(&root(r#"{"tags": {"$stror": ["blue", "green"]}}"#), false, &set);
        assert_eq!(or.candidates(&set).unwrap(), BTreeSet::from([a, b]));
        assert!(Plan::FullScan.candidates(&set).is_none());
    }

    #[test]
    fn range_bounds_follow_operator() {
        let set = indexes(&[("age", IndexKind::Number)]);
        let plan = Plan::choose(&root(r#"{"age": {"$bt": [10, 2]}}"#), false, &set);
        assert_eq!(
            plan,
            Plan::Index {
                path: "age".into(),
                kind: IndexKind::Number,
                lookup: Lookup::Range(
                    Bound::Included(IndexKey::number(2.0).unwrap()),
                    Bound::Included(IndexKey::number(10.0).unwrap()),
                ),
            }
        );
    }
}
