//! Batch JSONL reader for adapter output files

use crate::model::SourceSystem;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Reads one adapter's extracted JSONL file to end-of-file
///
/// Batch counterpart of a live tail: each refresh cycle consumes whatever
/// the adapter wrote since extraction, line by line. Blank lines are
/// skipped; parse failures are the caller's to classify (the line itself is
/// returned so malformed input can be ledgered verbatim).
pub struct JsonlFileSource {
    source: SourceSystem,
    path: PathBuf,
}

impl JsonlFileSource {
    pub fn new(source: SourceSystem, path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            path: path.into(),
        }
    }

    pub fn source(&self) -> SourceSystem {
        self.source
    }

    /// Read every non-empty line from the file
    ///
    /// A missing file means the adapter produced nothing this run; per the
    /// failure policy that is "no new events from this source", not an
    /// error that aborts the run for unrelated entities.
    pub async fn read_lines(&self) -> std::io::Result<Vec<String>> {
        let file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "no extract for {} at {} this run",
                    self.source.as_str(),
                    self.path.display()
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut lines = Vec::new();
        let mut reader = BufReader::new(file).lines();
        while let Some(line) = reader.next_line().await? {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }

        log::info!(
            "read {} records from {} ({})",
            lines.len(),
            self.source.as_str(),
            self.path.display()
        );
        Ok(lines)
    }
}
