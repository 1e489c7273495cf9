use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::indexer::reconciler::CatchUpReconciler;
use crate::indexer::{ChainReader, HeadStream};
use crate::metrics::Metrics;
use crate::models::common::SubscriptionConfig;
use crate::models::errors::ChainError;
use crate::utils::retry::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Disconnected,
    Subscribing,
    Active,
}

/// Owns the single head subscription and feeds every notification to the
/// reconciler, one cycle at a time.
pub struct SubscriptionSupervisor {
    chain: Arc<dyn ChainReader>,
    reconciler: CatchUpReconciler,
    config: SubscriptionConfig,
    shutdown: CancellationToken,
    metrics: Option<Arc<Metrics>>,
    state: watch::Sender<SubscriptionState>,
}

impl SubscriptionSupervisor {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        reconciler: CatchUpReconciler,
        config: SubscriptionConfig,
        shutdown: CancellationToken,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            chain,
            reconciler,
            config,
            shutdown,
            metrics,
            state: watch::Sender::new(SubscriptionState::Disconnected),
        }
    }

    /// Follow state transitions while `run` owns the supervisor
    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SubscriptionState) {
        self.state.send_replace(state);
    }

    /// Run until shutdown (`Ok`) or until the subscription is given up (`Err`)
    pub async fn run(mut self) -> Result<(), ChainError> {
        let backoff = RetryConfig {
            base_delay_ms: self.config.base_delay_ms,
            max_delay_ms: self.config.max_delay_ms,
            ..Default::default()
        };
        let mut delay_ms = backoff.base_delay_ms;
        let mut failed_attempts: u32 = 0;

        loop {
            self.set_state(SubscriptionState::Subscribing);

            let subscribed = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(()),
                subscribed = self.chain.subscribe_heads() => subscribed,
            };

            match subscribed {
                Ok(stream) => {
                    info!("Subscribed to new heads");
                    self.set_state(SubscriptionState::Active);
                    failed_attempts = 0;
                    delay_ms = backoff.base_delay_ms;

                    let Some(e) = self.drain(stream).await else {
                        return Ok(());
                    };
                    self.set_state(SubscriptionState::Disconnected);

                    if !self.config.resubscribe {
                        error!("Head subscription ended, not resubscribing: {}", e);
                        return Err(e);
                    }
                    warn!("Head subscription ended: {}", e);
                    if let Some(metrics) = &self.metrics {
                        metrics.subscription_restarts.add(1, &[metrics.chain_label()]);
                    }
                }
                Err(e) => {
                    self.set_state(SubscriptionState::Disconnected);
                    failed_attempts += 1;

                    let exhausted = self
                        .config
                        .max_attempts
                        .is_some_and(|max| failed_attempts >= max);
                    if !self.config.resubscribe || exhausted {
                        error!(
                            "Giving up on head subscription after {} attempts: {}",
                            failed_attempts, e
                        );
                        return Err(e);
                    }
                    warn!(
                        "Subscribe attempt {} failed: {}. Retrying in {}ms...",
                        failed_attempts, e, delay_ms
                    );
                }
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }
            delay_ms = backoff.next_delay(delay_ms);
        }
    }

    /// Hand notifications to the reconciler until the stream fails.
    /// Returns `None` on shutdown.
    async fn drain(&mut self, mut stream: HeadStream) -> Option<ChainError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(head)) => {
                    // Runs to completion, cancellation is checked between blocks
                    let report = self.reconciler.run_cycle(&head).await;
                    info!("Cycle for head #{} finished: {:?}", head.number, report.outcome);
                }
                Some(Err(e)) => return Some(e),
                None => {
                    return Some(ChainError::Subscription(
                        "head stream ended".to_string(),
                    ));
                }
            }
        }
    }
}
