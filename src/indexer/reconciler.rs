use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::indexer::ChainReader;
use crate::indexer::block_processor::{BlockOutcome, BlockProcessor};
use crate::metrics::Metrics;
use crate::models::common::{FetchFailurePolicy, HeadNotification, ReconcilerConfig};
use crate::storage::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    /// Waiting for a head notification
    Idle,
    /// Draining a contiguous range of missing blocks
    Backfilling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The notified head block could not be fetched
    HeadUnresolved { reason: String },
    /// The highest stored block number could not be read
    CursorUnavailable { reason: String },
    /// Nothing missing, `head <= persisted`
    UpToDate { head: u64, persisted: u64 },
    /// Every number in `from..=to` was visited
    Backfilled { from: u64, to: u64 },
    /// Stopped at an unfetchable block under the abort-cycle policy
    Aborted { at: u64 },
    /// Shutdown requested before `next` was started
    Cancelled { next: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    /// One entry per visited block number, ascending
    pub blocks: Vec<BlockOutcome>,
}

impl CycleReport {
    fn without_blocks(outcome: CycleOutcome) -> Self {
        Self {
            outcome,
            blocks: Vec::new(),
        }
    }

    /// Numbers whose Block record was written in this cycle
    pub fn written_blocks(&self) -> Vec<u64> {
        self.blocks
            .iter()
            .filter_map(|outcome| match outcome {
                BlockOutcome::Written(report) if report.block_written => Some(report.block_number),
                _ => None,
            })
            .collect()
    }
}

/// Brings the store up to the chain head, one notification at a time.
///
/// The cursor is derived from the store on every cycle, never cached, so a
/// skipped or aborted range is picked up again only if nothing above it was
/// written.
pub struct CatchUpReconciler {
    processor: BlockProcessor,
    chain: Arc<dyn ChainReader>,
    store: Arc<dyn Store>,
    shutdown: CancellationToken,
    metrics: Option<Arc<Metrics>>,
    state: ReconcilerState,
}

impl CatchUpReconciler {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        store: Arc<dyn Store>,
        config: ReconcilerConfig,
        shutdown: CancellationToken,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let processor =
            BlockProcessor::new(chain.clone(), store.clone(), config, metrics.clone());
        Self {
            processor,
            chain,
            store,
            shutdown,
            metrics,
            state: ReconcilerState::Idle,
        }
    }

    pub fn state(&self) -> ReconcilerState {
        self.state
    }

    pub async fn run_cycle(&mut self, notification: &HeadNotification) -> CycleReport {
        let start = Instant::now();
        let report = self.reconcile(notification).await;
        self.state = ReconcilerState::Idle;

        if let Some(metrics) = &self.metrics {
            let labels = [metrics.chain_label()];
            metrics.cycles.add(1, &labels);
            metrics
                .cycle_duration
                .record(start.elapsed().as_secs_f64(), &labels);
            if let Some(latest) = report.written_blocks().last() {
                metrics.latest_persisted_block.record(*latest, &labels);
            }
        }

        report
    }

    async fn reconcile(&mut self, notification: &HeadNotification) -> CycleReport {
        // Resolve the head through the node rather than trusting the notification.
        // This pulls the full block with sender recovery only for its number, and
        // the backfill below fetches the head block again.
        let head = match self.chain.block_by_hash(notification.hash).await {
            Ok(block) => block.header.block_number,
            Err(e) => {
                warn!(
                    "Could not resolve head {} (#{}), waiting for the next notification: {}",
                    notification.hash, notification.number, e
                );
                return CycleReport::without_blocks(CycleOutcome::HeadUnresolved {
                    reason: e.to_string(),
                });
            }
        };

        let persisted = match self.store.highest_block_number().await {
            Ok(persisted) => persisted,
            Err(e) => {
                error!("Could not read the highest stored block: {}", e);
                return CycleReport::without_blocks(CycleOutcome::CursorUnavailable {
                    reason: e.to_string(),
                });
            }
        };

        if let Some(metrics) = &self.metrics {
            let labels = [metrics.chain_label()];
            metrics.chain_tip_block.record(head, &labels);
            metrics
                .chain_tip_lag
                .record(head.saturating_sub(persisted), &labels);
        }

        if head <= persisted {
            info!("Up to date at block {} (head {})", persisted, head);
            return CycleReport::without_blocks(CycleOutcome::UpToDate { head, persisted });
        }

        let from = persisted + 1;
        info!(
            "Backfilling blocks {} to {} ({} missing)",
            from,
            head,
            head - persisted
        );
        self.state = ReconcilerState::Backfilling;

        let abort_on_failure =
            self.processor.config().fetch_failure == FetchFailurePolicy::AbortCycle;
        let mut blocks = Vec::new();

        for block_number in from..=head {
            if self.shutdown.is_cancelled() {
                info!("Shutdown requested, stopping before block {}", block_number);
                return CycleReport {
                    outcome: CycleOutcome::Cancelled { next: block_number },
                    blocks,
                };
            }

            let outcome = self.processor.process_block(block_number).await;
            let unavailable = matches!(outcome, BlockOutcome::Unavailable { .. });
            blocks.push(outcome);

            if unavailable {
                if let Some(metrics) = &self.metrics {
                    metrics.blocks_skipped.add(1, &[metrics.chain_label()]);
                }
                if abort_on_failure {
                    warn!(
                        "Aborting cycle at block {}, the next notification resumes from the stored height",
                        block_number
                    );
                    return CycleReport {
                        outcome: CycleOutcome::Aborted { at: block_number },
                        blocks,
                    };
                }
                warn!("Skipped block {}, it stays missing", block_number);
            }
        }

        info!("Backfilled blocks {} to {}", from, head);
        CycleReport {
            outcome: CycleOutcome::Backfilled { from, to: head },
            blocks,
        }
    }
}
