//! Secondary indexes.
//!
//! Every collection owns an [`IndexSet`](set::IndexSet) with at most one
//! index per (field path, kind). Indexes are kept in step with the data log
//! by the collection's mutation path and consulted by the query planner.

mod field;
mod key;
pub(crate) mod persistence;
mod request;
mod set;

pub(crate) use field::FieldIndex;
pub(crate) use key::{numeric, render_scalar, value_tokens, IndexKey};
pub use key::IndexKind;
pub use request::{IndexAction, IndexInfo, IndexRequest};
pub(crate) use set::{IndexChange, IndexSet};
