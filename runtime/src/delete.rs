//! Chunked deletion against the registry.

use std::sync::Arc;

use image_reaper_core::error::{ReaperError, Result};
use serde::Serialize;

use crate::registry::{ImageRegistry, MAX_DELETE_BATCH};

/// Aggregate outcome of a deletion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    /// Digests handed to the deleter
    pub requested: usize,
    /// Digests the registry actually removed
    pub removed: usize,
    /// Digests that were already gone
    pub already_absent: usize,
    /// Delete calls issued
    pub batches: usize,
}

/// Deletes digests in consecutive chunks of at most [`MAX_DELETE_BATCH`].
///
/// Chunks are sent one after another and stop at the first failure. Chunks
/// already applied stay applied.
pub struct BatchDeleter {
    registry: Arc<dyn ImageRegistry>,
    batch_size: usize,
}

impl BatchDeleter {
    pub fn new(registry: Arc<dyn ImageRegistry>) -> Self {
        Self {
            registry,
            batch_size: MAX_DELETE_BATCH,
        }
    }

    /// Delete every digest, returning how many were removed.
    pub async fn delete_all(&self, repository: &str, digests: &[String]) -> Result<DeletionReport> {
        let mut report = DeletionReport {
            requested: digests.len(),
            ..Default::default()
        };

        for chunk in digests.chunks(self.batch_size) {
            report.batches += 1;

            let outcome = match self.registry.batch_delete(repository, chunk).await {
                Ok(outcome) => outcome,
                Err(e) => return Err(incomplete(repository, &report, e.to_string())),
            };

            report.removed += outcome.deleted.len();

            let (absent, failed): (Vec<_>, Vec<_>) =
                outcome.failures.into_iter().partition(|f| f.is_not_found());
            report.already_absent += absent.len();

            if let Some(first) = failed.first() {
                let message = format!(
                    "{} image(s) not deleted, first {}: {} {}",
                    failed.len(),
                    first.digest,
                    first.code,
                    first.reason
                );
                return Err(incomplete(repository, &report, message));
            }

            tracing::info!(
                repository,
                batch = report.batches,
                size = chunk.len(),
                removed = report.removed,
                "Deleted image batch"
            );
        }

        Ok(report)
    }
}

/// Error for a deletion that stopped early, carrying the count already removed.
fn incomplete(repository: &str, report: &DeletionReport, message: String) -> ReaperError {
    tracing::error!(
        repository,
        removed = report.removed,
        requested = report.requested,
        error = %message,
        "Deletion stopped"
    );

    if report.removed == 0 {
        ReaperError::RegistryError {
            repository: repository.to_string(),
            message,
        }
    } else {
        ReaperError::PartialDeletion {
            repository: repository.to_string(),
            removed: report.removed,
            requested: report.requested,
            message,
        }
    }
}
