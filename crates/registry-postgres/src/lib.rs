//! Relational persistence and query layer.
//!
//! Owns the schema for the consolidated documents, renders every SQL
//! statement from embedded templates (table, schema and field names are
//! parameters, never hard-coded), bulk-loads batches, serves point
//! lookups and keyset-paginated search, and manages secondary
//! expression indexes on JSON paths.

pub mod store;
pub mod templates;

pub use store::{PostgresStore, SearchQuery};
pub use templates::{ExtraIndex, SqlParams};
