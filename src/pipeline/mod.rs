//! Batch run orchestration
//!
//! One run: drain the adapter streams through identity resolution and
//! normalization (single ingestion task, the one place writers must
//! serialize), reconcile into an immutable snapshot, fan the three metric
//! engines out over it, and publish everything atomically.
//!
//! ```text
//! JSONL adapter files
//!     ↓  (bounded mpsc channel, one consumer)
//! ingest_stream: resolve identity → normalize → canonical re-attribution
//!     ↓
//! ReconciliationValidator → TimelineSnapshot (+ exception ledger)
//!     ↓
//! Cohort / LTV / Funnel engines (spawn_blocking, shared Arc snapshot)
//!     ↓
//! SnapshotWriter::publish (all-or-nothing, new run id)
//! ```

pub mod ingestion;
pub mod run;

pub use ingestion::{ingest_stream, AdapterLine, IngestOutcome};
pub use run::{PipelineRun, RunError, RunSummary};
