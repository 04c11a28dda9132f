//! Versioned metrics store
//!
//! The core's output boundary: immutable snapshot tables, one set per run,
//! stamped with a run id. A run either publishes every table atomically or
//! publishes nothing, so consumers always see the last good snapshot.
//!
//! Two backends sit behind one trait: SQLite for the dashboard layer and
//! JSONL for flat-file consumers. Table shapes are declared once in
//! [`schema`] and drive both the DDL and the data dictionary.

pub mod backend;
pub mod jsonl;
pub mod schema;
pub mod sqlite;

pub use backend::{SnapshotTables, SnapshotWriter, SnapshotWriterBackend, StoreError};
pub use jsonl::JsonlSnapshotWriter;
pub use schema::{FieldDef, TableDef};
pub use sqlite::SqliteSnapshotStore;
