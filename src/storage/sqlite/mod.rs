//! SQLite implementations of storage interfaces.

mod canonical_store;

pub use canonical_store::SqliteCanonicalStore;
