//! `db` crate — pure persistence layer.
//!
//! Stores pipeline definitions and execution records as self-contained JSON
//! documents on disk, one file per document. No business logic lives here;
//! the document types themselves are owned by the `engine` crate.

pub mod error;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use store::DocumentStore;
