use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::indexer::ChainReader;
use crate::indexer::transformations::{
    blocks::BlockTransformer, transactions::TransactionTransformer,
};
use crate::metrics::Metrics;
use crate::models::common::{BlockWritePolicy, FetchFailurePolicy, ReconcilerConfig};
use crate::models::datasets::blocks::{Block, Header, RpcBlockData, RpcHeaderData};
use crate::models::datasets::transactions::RpcTransactionData;
use crate::models::errors::{ChainError, ErrorKind, MapError, TransactionError};
use crate::storage::{Store, WriteOutcome};
use crate::utils::retry::{RetryConfig, retry_when};
use crate::utils::with_timeout;

/// What happened to one block number of a backfill range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Header and Block writes were attempted. Either may have failed.
    Written(BlockReport),
    /// Fetched but left unwritten because no transaction was upserted
    Withheld(BlockReport),
    /// The block could not be fetched or its records derived
    Unavailable {
        block_number: u64,
        kind: ErrorKind,
        reason: String,
    },
}

impl BlockOutcome {
    pub fn block_number(&self) -> u64 {
        match self {
            Self::Written(report) | Self::Withheld(report) => report.block_number,
            Self::Unavailable { block_number, .. } => *block_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReport {
    pub block_number: u64,
    /// Hashes upserted for this block, in block order
    pub transactions: Vec<String>,
    pub skipped_transactions: usize,
    pub header_written: bool,
    pub block_written: bool,
}

/// Fetches, derives and persists a single block number
pub struct BlockProcessor {
    chain: Arc<dyn ChainReader>,
    store: Arc<dyn Store>,
    config: ReconcilerConfig,
    metrics: Option<Arc<Metrics>>,
}

impl BlockProcessor {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        store: Arc<dyn Store>,
        config: ReconcilerConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            chain,
            store,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub async fn process_block(&self, block_number: u64) -> BlockOutcome {
        let block = match self.fetch_block(block_number).await {
            Ok(block) => block,
            Err(e) => {
                warn!("Failed to fetch block {} ({:?}): {}", block_number, e.kind(), e);
                return BlockOutcome::Unavailable {
                    block_number,
                    kind: e.kind(),
                    reason: e.to_string(),
                };
            }
        };

        let derive_timeout = Duration::from_millis(self.config.derive_timeout_ms);
        let (header, mut record) = match derive_records(&block.header, derive_timeout).await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to derive records of block {}: {}", block_number, e);
                return BlockOutcome::Unavailable {
                    block_number,
                    kind: e.kind(),
                    reason: e.to_string(),
                };
            }
        };

        // Sequential so the hash list keeps block order
        let mut skipped_transactions = 0;
        for transaction in &block.transactions {
            match self.persist_transaction(transaction, &block.header).await {
                Ok(outcome) => {
                    debug!(
                        "Transaction {} of block {}: {:?}",
                        transaction.tx_hash, block_number, outcome
                    );
                    record.transactions.push(transaction.tx_hash.to_string());
                }
                Err(e) => {
                    match e.kind() {
                        ErrorKind::NotFound | ErrorKind::Decode => warn!(
                            "Skipping transaction {} of block {}: {}",
                            transaction.tx_hash, block_number, e
                        ),
                        ErrorKind::Connectivity | ErrorKind::Persistence => error!(
                            "Skipping transaction {} of block {} ({:?}): {}",
                            transaction.tx_hash,
                            block_number,
                            e.kind(),
                            e
                        ),
                    }
                    skipped_transactions += 1;
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            let labels = [metrics.chain_label()];
            metrics
                .transactions_upserted
                .add(record.transactions.len() as u64, &labels);
            metrics
                .transactions_skipped
                .add(skipped_transactions as u64, &labels);
        }

        let mut report = BlockReport {
            block_number,
            transactions: record.transactions.clone(),
            skipped_transactions,
            header_written: false,
            block_written: false,
        };

        if self.config.block_write == BlockWritePolicy::RequireTransaction
            && record.transactions.is_empty()
        {
            info!(
                "Block {} has no upserted transaction, leaving header and block unwritten",
                block_number
            );
            return BlockOutcome::Withheld(report);
        }

        // A failed header write does not stop the block write
        report.header_written = self.write_header(&header).await;
        report.block_written = self.write_block(&record).await;

        if report.block_written {
            if let Some(metrics) = &self.metrics {
                metrics.blocks_persisted.add(1, &[metrics.chain_label()]);
            }
        }

        BlockOutcome::Written(report)
    }

    async fn fetch_block(&self, block_number: u64) -> Result<RpcBlockData, ChainError> {
        match self.config.fetch_failure {
            FetchFailurePolicy::Retry { max_attempts } => {
                let retry_config = RetryConfig {
                    max_attempts: max_attempts.max(1),
                    base_delay_ms: self.config.retry_base_delay_ms,
                    max_delay_ms: self.config.retry_max_delay_ms,
                    ..Default::default()
                };
                // A malformed block decodes the same way on every attempt
                retry_when(
                    || self.chain.block_by_number(block_number),
                    &retry_config,
                    "block_by_number",
                    |e: &ChainError| e.kind() != ErrorKind::Decode,
                )
                .await
            }
            FetchFailurePolicy::Skip | FetchFailurePolicy::AbortCycle => {
                self.chain.block_by_number(block_number).await
            }
        }
    }

    async fn persist_transaction(
        &self,
        transaction: &RpcTransactionData,
        header: &RpcHeaderData,
    ) -> Result<WriteOutcome, TransactionError> {
        let receipt = self
            .chain
            .transaction_receipt(transaction.tx_hash)
            .await
            .map_err(|source| MapError::Receipt {
                tx_hash: transaction.tx_hash.to_string(),
                source,
            })?;

        let record = transaction.derive_transaction(&receipt, header)?;
        Ok(self.store.upsert_transaction(&record).await?)
    }

    async fn write_header(&self, header: &Header) -> bool {
        match self.store.upsert_header(header).await {
            Ok(outcome) => {
                debug!("Header {}: {:?}", header.block_number, outcome);
                true
            }
            Err(e) => {
                error!("Failed to write header {}: {}", header.block_number, e);
                false
            }
        }
    }

    async fn write_block(&self, block: &Block) -> bool {
        match self.store.upsert_block(block).await {
            Ok(outcome) => {
                debug!(
                    "Block {} with {} transactions: {:?}",
                    block.block_number,
                    block.transactions.len(),
                    outcome
                );
                true
            }
            Err(e) => {
                error!("Failed to write block {}: {}", block.block_number, e);
                false
            }
        }
    }
}

/// Derive the Header and Block records on two tasks joined under `timeout`
pub async fn derive_records(
    raw: &RpcHeaderData,
    timeout: Duration,
) -> Result<(Header, Block), MapError> {
    let block_number = raw.block_number;

    let header_input = raw.clone();
    let header_task = tokio::spawn(async move { header_input.derive_header() });
    let block_input = raw.clone();
    let block_task = tokio::spawn(async move { block_input.derive_block() });

    let joined = async { tokio::try_join!(header_task, block_task) };

    match with_timeout(timeout, joined).await {
        Some(Ok(records)) => Ok(records),
        Some(Err(e)) => Err(MapError::DerivationJoin {
            block_number,
            reason: e.to_string(),
        }),
        None => Err(MapError::DerivationTimeout {
            block_number,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256, Bloom, Bytes};

    #[tokio::test]
    async fn test_derive_records_joins_both_tasks() {
        let raw = RpcHeaderData {
            block_number: 9,
            block_hash: B256::repeat_byte(0x09),
            parent_hash: B256::repeat_byte(0x08),
            logs_bloom: Bloom::default(),
            timestamp: 0,
            nonce: None,
            beneficiary: Address::ZERO,
            size: 0,
            gas_used: 10,
            gas_limit: 100,
            base_fee_per_gas: Some(3),
            extra_data: Bytes::new(),
            state_root: B256::ZERO,
        };

        let (header, block) = derive_records(&raw, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(header.block_number, 9);
        assert_eq!(block.block_number, 9);
        assert_eq!(block.burnt_fees, alloy_primitives::U256::from(30u64));
    }
}
