//! Batch uploads with bounded concurrency

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::UploadError;

use super::engine::{UploadToken, Uploader};
use super::item::UploadItem;

/// Result for one item of a batch
#[derive(Debug)]
pub struct BatchOutcome {
    /// Position of the item in the input slice
    pub index: usize,
    pub name: String,
    pub result: Result<UploadToken, UploadError>,
}

/// Aggregate counts of a finished batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub uploaded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub quota_exhausted: bool,
}

impl BatchStats {
    pub fn from_outcomes(outcomes: &[BatchOutcome]) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            match &outcome.result {
                Ok(_) => stats.uploaded += 1,
                Err(e) if e.is_cancelled() => stats.cancelled += 1,
                Err(e) => {
                    stats.failed += 1;
                    if e.is_quota_exhausted() {
                        stats.quota_exhausted = true;
                    }
                }
            }
        }
        stats
    }
}

impl Uploader {
    /// Upload `items` with at most `concurrency` uploads in flight.
    ///
    /// Outcomes come back in input order. The first quota-exhausted failure
    /// cancels every upload still pending or in flight; the caller's token is
    /// left untouched.
    pub async fn upload_batch<I: UploadItem>(
        &self,
        items: &[I],
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Vec<BatchOutcome> {
        let stop = cancel.child_token();
        let stop_ref = &stop;
        let concurrency = concurrency.max(1);
        let total = items.len();

        info!(
            "Uploading {} item(s) (concurrency: {})",
            total, concurrency
        );

        let mut outcomes: Vec<BatchOutcome> = stream::iter(items.iter().enumerate().map(
            move |(index, item)| {
                let stop = stop_ref;
                async move {
                    info!("Uploading {}/{}: {}", index + 1, total, item.name());
                    let result = self.upload(item, stop).await;
                    match &result {
                        Err(e) if e.is_quota_exhausted() => {
                            warn!("Quota exhausted, cancelling remaining uploads: {}", e);
                            stop.cancel();
                        }
                        Err(e) if !e.is_cancelled() => {
                            error!("Upload of {} failed: {}", item.name(), e);
                        }
                        _ => {}
                    }
                    BatchOutcome {
                        index,
                        name: item.name().to_string(),
                        result,
                    }
                }
            },
        ))
        .buffer_unordered(concurrency)
        .collect()
        .await;

        outcomes.sort_by_key(|o| o.index);

        let stats = BatchStats::from_outcomes(&outcomes);
        info!(
            "Batch complete: {} uploaded, {} failed, {} cancelled",
            stats.uploaded, stats.failed, stats.cancelled
        );

        outcomes
    }
}
