//! Metric engines over the reconciled timeline
//!
//! All three engines are pure functions of one immutable
//! [`TimelineSnapshot`](crate::reconcile::TimelineSnapshot): no clocks, no
//! I/O, no shared mutable state. Running them twice on the same snapshot
//! produces identical rows, which is what lets the pipeline fan them out in
//! parallel and still publish consistent cross-metric totals.

pub mod cohort;
pub mod funnel;
pub mod ltv;

pub use cohort::{CohortEngine, RetentionPoint};
pub use funnel::{FunnelEngine, FunnelRow, FunnelStageRecord};
pub use ltv::{CogsRateTable, LtvEngine, LtvOutput, LtvRecord};
