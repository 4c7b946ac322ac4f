//! Structured index declarations.

use crate::error::{CoreError, CoreResult};
use crate::fieldpath;
use crate::index::key::IndexKind;

/// What to do with the indexes named by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexAction {
    /// Create missing indexes of the requested kinds.
    Create,
    /// Drop the indexes of exactly the requested kinds.
    Drop,
    /// Drop every index on the field path.
    DropAll,
    /// Recompute the requested indexes from current documents.
    Rebuild,
    /// Compact the requested indexes without changing membership.
    Optimize,
}

impl IndexAction {
    /// Parses an action from its command-line spelling.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "create" => Some(Self::Create),
            "drop" => Some(Self::Drop),
            "drop-all" | "dropall" => Some(Self::DropAll),
            "rebuild" => Some(Self::Rebuild),
            "optimize" => Some(Self::Optimize),
            _ => None,
        }
    }
}

/// An index declaration: one action applied to a set of kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRequest {
    /// The action.
    pub action: IndexAction,
    /// Kinds the action applies to. Ignored by [`IndexAction::DropAll`].
    pub kinds: Vec<IndexKind>,
}

impl IndexRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(action: IndexAction, kinds: impl IntoIterator<Item = IndexKind>) -> Self {
        Self {
            action,
            kinds: kinds.into_iter().collect(),
        }
    }

    /// Shorthand for creating one index kind.
    #[must_use]
    pub fn create(kind: IndexKind) -> Self {
        Self::new(IndexAction::Create, [kind])
    }

    /// Shorthand for dropping one index kind.
    #[must_use]
    pub fn drop_kind(kind: IndexKind) -> Self {
        Self::new(IndexAction::Drop, [kind])
    }

    /// Shorthand for dropping every index on a path.
    #[must_use]
    pub fn drop_all() -> Self {
        Self::new(IndexAction::DropAll, [])
    }

    /// Shorthand for rebuilding one index kind.
    #[must_use]
    pub fn rebuild(kind: IndexKind) -> Self {
        Self::new(IndexAction::Rebuild, [kind])
    }

    /// Shorthand for optimizing one index kind.
    #[must_use]
    pub fn optimize(kind: IndexKind) -> Self {
        Self::new(IndexAction::Optimize, [kind])
    }

    /// Checks the request against `path` before anything is executed.
    pub fn validate(&self, path: &str) -> CoreResult<()> {
        if path.is_empty() {
            return Err(CoreError::index_error(path, "field path is empty"));
        }
        if !fieldpath::is_valid(path) {
            return Err(CoreError::index_error(path, "field path is malformed"));
        }
        if self.kinds.is_empty() && self.action != IndexAction::DropAll {
            return Err(CoreError::index_error(path, "no index kind requested"));
        }
        Ok(())
    }

    /// Requested kinds without duplicates, in a stable order.
    pub(crate) fn distinct_kinds(&self) -> Vec<IndexKind> {
        let mut kinds = self.kinds.clone();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

/// Description of one live index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    /// Indexed field path.
    pub field: String,
    /// Index kind.
    pub kind: IndexKind,
    /// Number of (key, document) entries.
    pub records: usize,
}

impl IndexInfo {
    /// Internal name: kind prefix followed by the field path.
    #[must_use]
    pub fn internal_name(&self) -> String {
        format!("{}{}", self.kind.prefix(), self.field)
    }
}
