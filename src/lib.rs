//! revflow - reconciliation and metrics engine for multi-source customer
//! revenue timelines
//!
//! Combines transactional records from storefront, payment-processor, CRM,
//! and product-catalog systems into one reconciled customer timeline, then
//! derives cohort retention, net LTV, and funnel metrics from it. Every run
//! publishes an immutable, versioned snapshot; data-quality findings go to
//! an exception ledger instead of silently shaping the numbers.
//!
//! # Architecture
//!
//! ```text
//! Adapter JSONL streams → IdentityResolver → normalize
//!     ↓
//! ReconciliationValidator (duplicates, orphans, conflicts)
//!     ↓                         ↘ exception ledger
//! TimelineSnapshot (immutable)
//!     ↓
//! CohortEngine | LtvEngine | FunnelEngine   (pure, parallel)
//!     ↓
//! SnapshotWriter (SQLite / JSONL, all-or-nothing per run)
//! ```

pub mod config;
pub mod dictionary;
pub mod identity;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod store;

pub use config::{BackendType, ConfigError, RunConfig};
pub use model::{
    EntityId, EventKind, ExceptionKind, ExceptionRecord, FunnelStage, MonthKey, Segment,
    SourceSystem, TimelineEvent,
};
pub use pipeline::{PipelineRun, RunError, RunSummary};
pub use reconcile::TimelineSnapshot;
