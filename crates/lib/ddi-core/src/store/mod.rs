//! Store interfaces and `SurrealDB` implementation.
//!
//! The store layer persists knowledge documents by build generation so a
//! rebuild never exposes a half-written index.

pub mod surreal;

pub use surreal::{StoreError, StoreResult, SurrealKnowledgeStore};
