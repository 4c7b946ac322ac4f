//! Closed tree of parsed query operators.

use docudb_codec::{Document, Value};
use regex::Regex;

/// A predicate over a whole document.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    /// `path` satisfies `cond`.
    Field { path: String, cond: Cond },
    /// Every child matches.
    And(Vec<Node>),
    /// At least one child matches.
    Or(Vec<Node>),
}

/// A condition applied to the value(s) found at one field path.
#[derive(Debug, Clone)]
pub(crate) enum Cond {
    /// Bare value. `Null` also matches an absent field.
    Eq(Value),
    Not(Box<Cond>),
    Begin(Vec<String>),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// Closed range with `low <= high`.
    Between(Value, Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    StrAnd(Vec<String>),
    StrOr(Vec<String>),
    Exists(bool),
    /// Nested condition evaluated with case folding.
    ICase(Box<Cond>),
    ElemMatch(ElemPredicate),
    Regex(Regex),
    /// Several operators on the same field, all of which must hold.
    All(Vec<Cond>),
}

/// What each array element is tested against under `$elemMatch`.
#[derive(Debug, Clone)]
pub(crate) enum ElemPredicate {
    /// Element is a document satisfying every node.
    Document(Vec<Node>),
    /// Element value satisfies the condition.
    Value(Box<Cond>),
}

/// Post-match shaping instructions.
#[derive(Debug, Clone, Default)]
pub(crate) struct Hints {
    /// Sort keys: path and ascending flag, most significant first.
    pub order_by: Vec<(String, bool)>,
    pub skip: usize,
    /// `None` means unlimited.
    pub max: Option<usize>,
    pub projection: Option<Projection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

/// Result-shaping action attached to a field by `$do`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DoAction {
    /// Replace OID references with documents from the named collection.
    Join(String),
    /// Keep `limit` elements starting at `skip` (negative counts from the end).
    Slice { skip: i64, limit: usize },
}

/// Mutation operators of an update-bearing query.
#[derive(Debug, Clone, Default)]
pub(crate) struct UpdateSpec {
    pub set: Option<Document>,
    pub upsert: Option<Document>,
    pub inc: Vec<(String, Value)>,
    pub dropall: bool,
    pub add_to_set: Vec<(String, Vec<Value>)>,
    pub push: Vec<(String, Vec<Value>)>,
    pub pull: Vec<(String, Vec<Value>)>,
    pub unset: Vec<String>,
    pub rename: Vec<(String, String)>,
}

impl UpdateSpec {
    /// Whether any operator modifies stored documents.
    pub(crate) fn mutates(&self) -> bool {
        self.set.is_some()
            || self.upsert.is_some()
            || !self.inc.is_empty()
            || self.dropall
            || !self.add_to_set.is_empty()
            || !self.push.is_empty()
            || !self.pull.is_empty()
            || !self.unset.is_empty()
            || !self.rename.is_empty()
    }
}
