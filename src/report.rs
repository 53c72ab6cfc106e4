//! Batch reports.
//!
//! The core emits no logs or metrics; each batch returns one
//! serializable [`BatchReport`] and the caller decides what to do with
//! it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::batch::MergeCounts;
use crate::tenant::TenantCode;
use crate::upsert::BundleStats;

/// Overall status of one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Every record was processed without record-level errors.
    Ok,
    /// Some records were persisted, some failed.
    Partial,
    /// Errors occurred and nothing was persisted.
    Error,
    /// The batch had no records to process.
    Skipped,
}

impl SyncStatus {
    /// Derives the status from the run's outcome.
    #[must_use]
    pub fn derive(records: usize, persisted: usize, error_count: usize) -> Self {
        if records == 0 {
            Self::Skipped
        } else if error_count == 0 {
            Self::Ok
        } else if persisted == 0 {
            Self::Error
        } else {
            Self::Partial
        }
    }
}

/// Serializable summary of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Tenant the batch wrote into.
    pub tenant_code: TenantCode,
    /// Overall status.
    pub status: SyncStatus,
    /// Records handed to the batch.
    pub records: usize,
    /// Records whose bundle was persisted.
    pub persisted: usize,
    /// Pre-persistence merge counts.
    pub merge: MergeCounts,
    /// Write counters accumulated over all flushed bundles.
    pub persist: BundleStats,
    /// Cross-reference records skipped because no recipient resolved.
    pub skipped_no_candidate: usize,
    /// Records skipped for a missing or empty external id.
    pub skipped_invalid: usize,
    /// Bundles skipped because their target event does not exist.
    pub skipped_missing_event: usize,
    /// Bundles skipped on an ambiguous natural key.
    pub skipped_ambiguous: usize,
    /// Normalized person names that resolved to nothing.
    pub unmatched_persons: Vec<String>,
    /// Normalized organisation names that resolved to nothing.
    pub unmatched_organisations: Vec<String>,
    /// Record-level and batch-level error messages.
    pub errors: Vec<String>,
    /// When the batch started.
    pub started_at: DateTime<Utc>,
    /// When the batch finished.
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    /// Wall-clock duration of the run in seconds.
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        let millis = (self.finished_at - self.started_at).num_milliseconds();
        #[allow(clippy::cast_precision_loss)]
        {
            millis as f64 / 1000.0
        }
    }

    /// First few unmatched person names, for log-sized summaries.
    #[must_use]
    pub fn unmatched_persons_sample(&self) -> &[String] {
        let n = self.unmatched_persons.len().min(10);
        &self.unmatched_persons[..n]
    }

    /// First few unmatched organisation names.
    #[must_use]
    pub fn unmatched_organisations_sample(&self) -> &[String] {
        let n = self.unmatched_organisations.len().min(10);
        &self.unmatched_organisations[..n]
    }
}
