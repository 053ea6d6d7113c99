//! Retention sweep over article collections.

use chrono::{DateTime, Duration, Utc};
use fw_core::{ArticleStorage, CollectionRef};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Nothing older than the cutoff.
    Clean,
    /// Dry run: this many documents match.
    WouldDelete(u64),
    Deleted { expected: u64, deleted: u64 },
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CollectionSweep {
    pub collection: CollectionRef,
    pub outcome: SweepOutcome,
}

#[derive(Debug, Clone)]
pub struct SweepReport {
    pub dry_run: bool,
    pub cutoff: DateTime<Utc>,
    pub collections: Vec<CollectionSweep>,
}

impl SweepReport {
    /// Documents that matched the cutoff across all collections.
    pub fn total_matched(&self) -> u64 {
        self.collections
            .iter()
            .map(|c| match c.outcome {
                SweepOutcome::WouldDelete(n) => n,
                SweepOutcome::Deleted { expected, .. } => expected,
                _ => 0,
            })
            .sum()
    }

    pub fn total_deleted(&self) -> u64 {
        self.collections
            .iter()
            .map(|c| match c.outcome {
                SweepOutcome::Deleted { deleted, .. } => deleted,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> usize {
        self.collections
            .iter()
            .filter(|c| matches!(c.outcome, SweepOutcome::Failed(_)))
            .count()
    }
}

/// Remove documents fetched more than `retention_days` before `now`.
///
/// A failure on one collection is recorded and the sweep moves on.
pub async fn purge(
    storage: &dyn ArticleStorage,
    targets: &[CollectionRef],
    retention_days: u32,
    dry_run: bool,
    now: DateTime<Utc>,
) -> SweepReport {
    let cutoff = now - Duration::days(i64::from(retention_days));
    info!(%cutoff, retention_days, dry_run, "Starting retention sweep over {} collections", targets.len());

    let mut collections = Vec::with_capacity(targets.len());
    for target in targets {
        let outcome = sweep_one(storage, target, cutoff, dry_run).await;
        collections.push(CollectionSweep {
            collection: target.clone(),
            outcome,
        });
    }

    let report = SweepReport {
        dry_run,
        cutoff,
        collections,
    };
    info!(
        matched = report.total_matched(),
        deleted = report.total_deleted(),
        failures = report.failures(),
        "Retention sweep finished"
    );
    report
}

async fn sweep_one(
    storage: &dyn ArticleStorage,
    target: &CollectionRef,
    cutoff: DateTime<Utc>,
    dry_run: bool,
) -> SweepOutcome {
    let expected = match storage.count_older_than(target, cutoff).await {
        Ok(n) => n,
        Err(e) => {
            error!(collection = %target, "Failed to count old documents: {}", e);
            return SweepOutcome::Failed(e.to_string());
        }
    };

    if expected == 0 {
        info!(collection = %target, "No documents older than cutoff");
        return SweepOutcome::Clean;
    }

    if dry_run {
        info!(collection = %target, "[dry run] would delete {} documents", expected);
        return SweepOutcome::WouldDelete(expected);
    }

    match storage.delete_older_than(target, cutoff).await {
        Ok(deleted) => {
            if deleted != expected {
                warn!(collection = %target, expected, deleted, "Deleted count differs from counted");
            } else {
                info!(collection = %target, "Deleted {} documents", deleted);
            }
            SweepOutcome::Deleted { expected, deleted }
        }
        Err(e) => {
            error!(collection = %target, "Failed to delete old documents: {}", e);
            SweepOutcome::Failed(e.to_string())
        }
    }
}
