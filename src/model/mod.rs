//! Core data model shared by every pipeline stage
//!
//! Types here are created once (by the resolver and normalizer) and consumed
//! read-only downstream. Nothing in this module touches storage or clocks;
//! all timestamps are data-time (Unix seconds, UTC) carried in from the
//! source records, which is what makes re-runs reproducible.

pub mod event;
pub mod exception;
pub mod month;

pub use event::{
    EntityId, EventKind, FunnelStage, Segment, SourceSystem, TimelineEvent,
};
pub use exception::{ExceptionKind, ExceptionRecord};
pub use month::MonthKey;
