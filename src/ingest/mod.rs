//! Source ingestion: feed-to-catalog synchronization for a single source.

pub mod source;

pub use source::{built_in_override, ingest_source};
