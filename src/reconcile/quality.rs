//! Data-quality report over the exception ledger

use crate::model::{ExceptionKind, ExceptionRecord, SourceSystem};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Summary of a run's exception ledger, by kind and by source
///
/// The numbers that go to auditors; shares are against total records seen,
/// so "0.02% missing COGS" reads the same way across runs of any size.
#[derive(Debug)]
pub struct QualityReport {
    by_kind: BTreeMap<&'static str, u64>,
    by_source: BTreeMap<&'static str, u64>,
    total_exceptions: u64,
    total_records: u64,
}

impl QualityReport {
    pub fn new(exceptions: &[ExceptionRecord], total_records: u64) -> Self {
        let mut by_kind: BTreeMap<&'static str, u64> = BTreeMap::new();
        let mut by_source: BTreeMap<&'static str, u64> = BTreeMap::new();
        let mut total_exceptions = 0;

        for exc in exceptions {
            // Merge audits are bookkeeping, not data-quality findings
            if exc.kind == ExceptionKind::IdentityMerge {
                continue;
            }
            total_exceptions += 1;
            *by_kind.entry(exc.kind.as_str()).or_insert(0) += 1;
            *by_source.entry(exc.source_system.as_str()).or_insert(0) += 1;
        }

        Self {
            by_kind,
            by_source,
            total_exceptions,
            total_records,
        }
    }

    pub fn count_for_kind(&self, kind: ExceptionKind) -> u64 {
        self.by_kind.get(kind.as_str()).copied().unwrap_or(0)
    }

    pub fn count_for_source(&self, source: SourceSystem) -> u64 {
        self.by_source.get(source.as_str()).copied().unwrap_or(0)
    }

    pub fn total_exceptions(&self) -> u64 {
        self.total_exceptions
    }

    /// Multi-line report for logs and run output
    pub fn render(&self) -> String {
        let mut out = String::new();
        let pct = |count: u64| {
            if self.total_records == 0 {
                0.0
            } else {
                count as f64 * 100.0 / self.total_records as f64
            }
        };

        writeln!(out, "data quality report").unwrap();
        writeln!(
            out,
            "  {} exceptions over {} records ({:.2}%)",
            self.total_exceptions,
            self.total_records,
            pct(self.total_exceptions)
        )
        .unwrap();
        for (kind, count) in &self.by_kind {
            writeln!(out, "  by kind   {:<26} {:>8} ({:.2}%)", kind, count, pct(*count)).unwrap();
        }
        for (source, count) in &self.by_source {
            writeln!(out, "  by source {:<26} {:>8} ({:.2}%)", source, count, pct(*count)).unwrap();
        }
        out
    }
}
