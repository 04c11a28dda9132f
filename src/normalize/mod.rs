//! Raw adapter records and their normalization into timeline events
//!
//! Adapters are external: each one pages through its source system and emits
//! a JSONL stream of [`RawRecord`]s. This module validates that boundary
//! (non-conforming records become `MalformedRecord` exceptions, never silent
//! drops) and expands each record into zero or more typed
//! [`TimelineEvent`](crate::model::TimelineEvent)s.

pub mod reader;
pub mod record;

pub use reader::JsonlFileSource;
pub use record::{normalize_record, NormalizeError, RawRecord};
