//! Feed reader: fetches and parses a feed document, yielding feed metadata
//! and entries filtered by a publish-time window.

pub mod reader;

pub use reader::{FeedEntry, FeedInfo, FeedReader};
