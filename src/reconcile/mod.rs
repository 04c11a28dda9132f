//! Cross-source reconciliation
//!
//! Runs after normalization and before any metric computation. Collapses
//! duplicate reports of the same economic event, detects orphans and amount
//! conflicts, and freezes the result into one immutable
//! [`TimelineSnapshot`] that all three metric engines read.
//!
//! Duplicates are resolved automatically (order-of-record source wins);
//! orphans and conflicts are never resolved automatically: they land in
//! the exception ledger and the affected entity's published metrics carry
//! `has_unresolved_exception = true` instead of a silently confident number.

pub mod quality;
pub mod snapshot;
pub mod validator;

pub use quality::QualityReport;
pub use snapshot::{EntityTimeline, TimelineSnapshot};
pub use validator::ReconciliationValidator;
