//! Query engine.
//!
//! A [`Query`] is built from an operator document, optional alternative
//! ("or") documents and an optional hints document. Everything is parsed up
//! front into a closed operator tree, so a query that constructs
//! successfully never fails on an unknown operator during execution.
//!
//! Execution picks at most one index (see `plan`), re-checks every
//! candidate with the matcher, then applies update operators, sorting,
//! `$skip`/`$max`, `$do` actions and `$fields` projection, in that order.

mod ast;
pub(crate) mod exec;
mod matcher;
mod parse;
mod plan;
mod update;

use crate::error::CoreResult;
use ast::{DoAction, Hints, Node, Projection};
use docudb_codec::{Document, ObjectId, ID_FIELD};
use parse::ParsedQuery;
use std::fmt;
use tracing::debug;

/// A parsed query, ready to run against any collection.
#[derive(Clone)]
pub struct Query {
    source: Document,
    parsed: ParsedQuery,
    alternatives: Vec<Node>,
    hints: Hints,
}

impl Query {
    /// Parses a query document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery`, `InvalidQueryControl`, `OperandNotArray`,
    /// `TooManyElemMatch` or `TypeMismatch` for a malformed query.
    pub fn new(source: Document) -> CoreResult<Self> {
        let parsed = parse::parse_query(&source)?;
        Ok(Self {
            source,
            parsed,
            alternatives: Vec::new(),
            hints: Hints::default(),
        })
    }

    /// Parses a query from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDocument` for invalid JSON, or any error of
    /// [`Query::new`].
    pub fn parse_json(json: &str) -> CoreResult<Self> {
        Self::new(Document::from_json_str(json)?)
    }

    /// Adds an alternative. A document matches when it satisfies the primary
    /// query or any alternative; an empty primary query defers entirely to
    /// the alternatives.
    ///
    /// # Errors
    ///
    /// Returns a parse error for a malformed alternative. Alternatives may
    /// not carry update operators.
    pub fn with_or(mut self, alternative: Document) -> CoreResult<Self> {
        self.alternatives.push(parse::parse_condition(&alternative)?);
        Ok(self)
    }

    /// Sets the hints document (`$orderby`, `$skip`, `$max`, `$fields`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidQueryControl` for an unknown hint and
    /// `MixedProjection` for a `$fields` that mixes inclusion and exclusion.
    pub fn with_hints(mut self, hints: Document) -> CoreResult<Self> {
        self.hints = parse::parse_hints(&hints)?;
        Ok(self)
    }

    /// Whether running this query modifies documents.
    #[must_use]
    pub fn is_update(&self) -> bool {
        self.parsed.update.mutates()
    }

    /// The primary query document.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.source
    }

    /// Names of the collections `$join` actions read from.
    #[must_use]
    pub fn joined_collections(&self) -> Vec<&str> {
        self.parsed
            .actions
            .iter()
            .filter_map(|(_, action)| match action {
                DoAction::Join(name) => Some(name.as_str()),
                DoAction::Slice { .. } => None,
            })
            .collect()
    }

    pub(crate) fn matches(&self, doc: &Document) -> bool {
        let alternative = || self.alternatives.iter().any(|n| matcher::matches(n, doc));
        if self.alternatives.is_empty() {
            return matcher::matches(&self.parsed.root, doc);
        }
        match &self.parsed.root {
            Node::And(children) if children.is_empty() => alternative(),
            root => matcher::matches(root, doc) || alternative(),
        }
    }

    /// Effective `$max` for `mode`.
    pub(crate) fn limit(&self, mode: QueryMode) -> Option<usize> {
        match mode {
            QueryMode::FindOne => Some(1),
            _ => self.hints.max,
        }
    }

    /// Applies `$do` actions and projection to documents about to be
    /// returned. `join` looks up an id in another collection.
    pub(crate) fn finish<F>(&self, docs: Vec<Document>, join: F) -> CoreResult<Vec<Document>>
    where
        F: Fn(&str, &ObjectId) -> Option<Document>,
    {
        let mut out = Vec::with_capacity(docs.len());
        for mut doc in docs {
            if !self.parsed.actions.is_empty() {
                update::apply_actions(&mut doc, &self.parsed.actions, &join);
            }
            out.push(match &self.hints.projection {
                Some(projection) => project(&doc, projection)?,
                None => doc,
            });
        }
        Ok(out)
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("source", &self.source)
            .field("alternatives", &self.alternatives.len())
            .finish_non_exhaustive()
    }
}

fn project(doc: &Document, projection: &Projection) -> CoreResult<Document> {
    match projection {
        Projection::Include(paths) => {
            let mut out = Document::new();
            if let Some(id) = doc.get(ID_FIELD) {
                out.insert(ID_FIELD, id.clone());
            }
            for path in paths.iter().filter(|p| p.as_str() != ID_FIELD) {
                if let Some(value) = doc.get_path(path) {
                    out.set_path(path, value.clone())?;
                }
            }
            Ok(out)
        }
        Projection::Exclude(paths) => {
            let mut out = doc.clone();
            for path in paths {
                out.remove_path(path);
            }
            Ok(out)
        }
    }
}

/// What a query execution produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// Return every match.
    #[default]
    Find,
    /// Stop after the first match.
    FindOne,
    /// Return only the number of matches.
    Count,
}

/// Per-execution options.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    log: bool,
}

impl QueryOptions {
    /// Creates default options.
    #[must_use]
    pub const fn new() -> Self {
        Self { log: false }
    }

    /// Collects a human-readable execution log in [`QueryResult::log`].
    #[must_use]
    pub const fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    /// Whether the execution log is collected.
    #[must_use]
    pub const fn log_enabled(&self) -> bool {
        self.log
    }
}

/// Result of a query execution.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Matched documents. Empty in `Count` mode.
    pub documents: Vec<Document>,
    /// Number of documents matched (and processed, for updates).
    pub count: u64,
    /// Execution log, when requested.
    pub log: Option<String>,
}

/// Collects execution log lines. Every line is also emitted at debug level.
#[derive(Debug, Default)]
pub(crate) struct QueryLog {
    buffer: Option<String>,
}

impl QueryLog {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            buffer: enabled.then(String::new),
        }
    }

    pub(crate) fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        debug!(target: "docudb::query", "{text}");
        if let Some(buffer) = &mut self.buffer {
            buffer.push_str(text);
            buffer.push('\n');
        }
    }

    pub(crate) fn into_text(self) -> Option<String> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    fn doc(json: &str) -> Document {
        Document::from_json_str(json).unwrap()
    }

    #[test]
    fn alternatives_widen_the_match() {
        let query = Query::parse_json(r#"{"a": 1}"#)
            .unwrap()
            .with_or(doc(r#"{"b": 2}"#))
            .unwrap();
        assert!(query.matches(&doc(r#"{"a": 1}"#)));
        assert!(query.matches(&doc(r#"{"b": 2}"#)));
        assert!(!query.matches(&doc(r#"{"c": 3}"#)));

        let only_or = Query::parse_json("{}")
            .unwrap()
            .with_or(doc(r#"{"b": 2}"#))
            .unwrap();
        assert!(!only_or.matches(&doc(r#"{"a": 1}"#)));
        assert!(only_or.matches(&doc(r#"{"b": 2}"#)));
    }

    #[test]
    fn alternatives_reject_update_operators() {
        let result = Query::parse_json("{}")
            .unwrap()
            .with_or(doc(r#"{"$set": {"a": 1}}"#));
        assert!(matches!(result, Err(CoreError::InvalidQueryControl { .. })));
    }

    #[test]
    fn update_detection() {
        assert!(Query::parse_json(r#"{"$set": {"a": 1}}"#).unwrap().is_update());
        assert!(Query::parse_json(r#"{"$dropall": true}"#).unwrap().is_update());
        assert!(!Query::parse_json(r#"{"a": 1, "$do": {"a": {"$slice": 1}}}"#)
            .unwrap()
            .is_update());
    }

    #[test]
    fn projection_keeps_id() {
        let oid = ObjectId::new();
        let mut source = doc(r#"{"name": "x", "age": 3, "addr": {"city": "c", "zip": 1}}"#);
        source.set_id(oid);

        let query = Query::parse_json("{}")
            .unwrap()
            .with_hints(doc(r#"{"$fields": {"name": 1, "addr.city": 1}}"#))
            .unwrap();
        let out = query.finish(vec![source.clone()], |_, _| None).unwrap();
        let mut expected = doc(r#"{"name": "x", "addr": {"city": "c"}}"#);
        expected.set_id(oid);
        assert_eq!(out, vec![expected]);

        let query = Query::parse_json("{}")
            .unwrap()
            .with_hints(doc(r#"{"$fields": {"age": 0, "addr": 0}}"#))
            .unwrap();
        let out = query.finish(vec![source], |_, _| None).unwrap();
        assert_eq!(out[0].keys().collect::<Vec<_>>(), vec!["_id", "name"]);
    }

    #[test]
    fn mixed_projection_is_rejected() {
        let result = Query::parse_json("{}")
            .unwrap()
            .with_hints(doc(r#"{"$fields": {"a": 1, "b": 0}}"#));
        assert!(matches!(result, Err(CoreError::MixedProjection)));
    }

    #[test]
    fn find_one_limits_to_one() {
        let query = Query::parse_json("{}")
            .unwrap()
            .with_hints(doc(r#"{"$max": 10}"#))
            .unwrap();
        assert_eq!(query.limit(QueryMode::Find), Some(10));
        assert_eq!(query.limit(QueryMode::FindOne), Some(1));
    }

    #[test]
    fn log_collects_lines_only_when_enabled() {
        let mut log = QueryLog::new(true);
        log.line("RUN FULLSCAN");
        assert_eq!(log.into_text().as_deref(), Some("RUN FULLSCAN\n"));
        let mut quiet = QueryLog::new(false);
        quiet.line("RUN FULLSCAN");
        assert!(quiet.into_text().is_none());
    }
}
