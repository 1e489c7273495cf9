pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::metrics::Metrics;
use crate::models::common::{DatabaseConfig, StorageBackend};
use crate::models::datasets::blocks::{Block, Header};
use crate::models::datasets::transactions::Transaction;
use crate::models::errors::StoreError;
use crate::storage::memory::MemoryStore;
use crate::storage::mongo::MongoStore;

/// Whether an upsert created a new document or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Replaced,
}

/// Persistence gateway over the `header`, `block` and `transaction` collections.
///
/// Header and Block are keyed by block number, Transaction by hash. Every
/// write is an upsert, so replaying a range never creates duplicates.
#[async_trait]
pub trait Store: Send + Sync {
    /// Highest stored `Block.blockNumber`, or 0 when no block exists.
    /// Served from the block-number index, never a scan.
    async fn highest_block_number(&self) -> Result<u64, StoreError>;

    async fn upsert_header(&self, header: &Header) -> Result<WriteOutcome, StoreError>;

    async fn upsert_block(&self, block: &Block) -> Result<WriteOutcome, StoreError>;

    async fn upsert_transaction(&self, transaction: &Transaction)
    -> Result<WriteOutcome, StoreError>;

    /// Manual cleanup only. Returns the number of removed documents.
    async fn delete_transactions_for_block(&self, block_number: u64) -> Result<u64, StoreError>;

    async fn all_blocks(&self) -> Result<Vec<Block>, StoreError>;

    async fn all_transactions(&self) -> Result<Vec<Transaction>, StoreError>;

    async fn block_by_number(&self, block_number: u64) -> Result<Option<Block>, StoreError>;

    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<Transaction>, StoreError>;
}

/// Collections exposed by name on the read side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Blocks,
    Txs,
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "blocks" => Ok(Self::Blocks),
            "txs" => Ok(Self::Txs),
            other => Err(format!("collection '{other}' not found")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CollectionRecords {
    Blocks(Vec<Block>),
    Txs(Vec<Transaction>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllRecords {
    pub blocks: Vec<Block>,
    pub transactions: Vec<Transaction>,
}

pub async fn all_records(store: &dyn Store) -> Result<AllRecords, StoreError> {
    Ok(AllRecords {
        blocks: store.all_blocks().await?,
        transactions: store.all_transactions().await?,
    })
}

/// Records of one collection by name. Unknown names yield `Ok(None)`.
pub async fn records_by_collection(
    store: &dyn Store,
    name: &str,
) -> Result<Option<CollectionRecords>, StoreError> {
    match name.parse::<Collection>() {
        Ok(Collection::Blocks) => Ok(Some(CollectionRecords::Blocks(store.all_blocks().await?))),
        Ok(Collection::Txs) => Ok(Some(CollectionRecords::Txs(
            store.all_transactions().await?,
        ))),
        Err(_) => Ok(None),
    }
}

pub async fn connect_store(
    config: &DatabaseConfig,
    metrics: Option<Arc<Metrics>>,
) -> Result<Arc<dyn Store>, StoreError> {
    match config.backend {
        StorageBackend::Mongo => {
            let store = MongoStore::connect(config, metrics).await?;
            info!("Connected to MongoDB database '{}'", config.name);
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            info!("Using in-memory store, records are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_names() {
        assert_eq!("blocks".parse::<Collection>(), Ok(Collection::Blocks));
        assert_eq!("txs".parse::<Collection>(), Ok(Collection::Txs));
        assert!("transactions".parse::<Collection>().is_err());
        assert!("".parse::<Collection>().is_err());
    }

    #[tokio::test]
    async fn test_unknown_collection_is_not_found() {
        let store = MemoryStore::new();
        assert_eq!(records_by_collection(&store, "headers").await.unwrap(), None);
        assert_eq!(
            records_by_collection(&store, "blocks").await.unwrap(),
            Some(CollectionRecords::Blocks(vec![]))
        );
    }
}
