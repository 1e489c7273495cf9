pub mod schema;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::error::{Error as MongoError, ErrorKind as MongoErrorKind};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::metrics::Metrics;
use crate::models::common::DatabaseConfig;
use crate::models::datasets::blocks::{Block, Header};
use crate::models::datasets::transactions::Transaction;
use crate::models::errors::StoreError;
use crate::storage::mongo::schema::{
    BLOCK_COLLECTION, HEADER_COLLECTION, TRANSACTION_COLLECTION, block_indexes, header_indexes,
    transaction_indexes,
};
use crate::storage::{Store, WriteOutcome};
use crate::utils::with_timeout;

/// Which side of the store an operation touches, for error classification
#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
}

pub struct MongoStore {
    headers: Collection<Header>,
    blocks: Collection<Block>,
    transactions: Collection<Transaction>,
    timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl MongoStore {
    /// Connect, verify the server answers, and make sure the key indexes exist
    pub async fn connect(
        config: &DatabaseConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self, StoreError> {
        let timeout = Duration::from_millis(config.timeout_ms);

        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        options.app_name = Some("block-scanner".to_string());
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);

        let client =
            Client::with_options(options).map_err(|e| StoreError::Connection(e.to_string()))?;
        let db = client.database(&config.name);

        let store = Self {
            headers: db.collection(HEADER_COLLECTION),
            blocks: db.collection(BLOCK_COLLECTION),
            transactions: db.collection(TRANSACTION_COLLECTION),
            timeout,
            metrics,
        };

        store.ping(&db).await?;
        store
            .ensure_indexes(&store.headers, HEADER_COLLECTION, header_indexes())
            .await?;
        store
            .ensure_indexes(&store.blocks, BLOCK_COLLECTION, block_indexes())
            .await?;
        store
            .ensure_indexes(
                &store.transactions,
                TRANSACTION_COLLECTION,
                transaction_indexes(),
            )
            .await?;

        Ok(store)
    }

    async fn ping(&self, db: &Database) -> Result<(), StoreError> {
        self.run("ping", "admin", Access::Read, db.run_command(doc! { "ping": 1 }))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn ensure_indexes<T: Send + Sync>(
        &self,
        collection: &Collection<T>,
        name: &str,
        indexes: Vec<IndexModel>,
    ) -> Result<(), StoreError> {
        let result = self
            .run(
                "create_indexes",
                name,
                Access::Write,
                collection.create_indexes(indexes),
            )
            .await?;
        info!(
            "Ensured indexes {:?} on collection '{}'",
            result.index_names, name
        );
        Ok(())
    }

    /// Apply the store deadline, record metrics, and classify driver errors
    async fn run<T, F>(
        &self,
        operation: &'static str,
        collection: &str,
        access: Access,
        future: F,
    ) -> Result<T, StoreError>
    where
        F: IntoFuture<Output = Result<T, MongoError>>,
    {
        let start = Instant::now();
        let result = match with_timeout(self.timeout, future.into_future()).await {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => Err(classify(collection, access, e)),
            None => Err(StoreError::Timeout {
                operation: format!("{operation} on '{collection}'"),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_store(operation, start.elapsed().as_secs_f64(), result.is_err());
        }

        result
    }

    async fn replace_by_key<T>(
        &self,
        collection: &Collection<T>,
        name: &str,
        filter: Document,
        record: &T,
    ) -> Result<WriteOutcome, StoreError>
    where
        T: serde::Serialize + Send + Sync,
    {
        let result = self
            .run(
                "replace_one",
                name,
                Access::Write,
                collection.replace_one(filter, record).upsert(true),
            )
            .await?;

        Ok(match result.upserted_id {
            Some(_) => WriteOutcome::Inserted,
            None => WriteOutcome::Replaced,
        })
    }
}

fn classify(collection: &str, access: Access, error: MongoError) -> StoreError {
    match *error.kind {
        MongoErrorKind::BsonDeserialization(_) => StoreError::Decode {
            collection: collection.to_string(),
            reason: error.to_string(),
        },
        MongoErrorKind::Io(_) | MongoErrorKind::ServerSelection { .. } => {
            StoreError::Connection(error.to_string())
        }
        _ => match access {
            Access::Read => StoreError::Query {
                collection: collection.to_string(),
                reason: error.to_string(),
            },
            Access::Write => StoreError::Write {
                collection: collection.to_string(),
                reason: error.to_string(),
            },
        },
    }
}

/// BSON has no unsigned 64-bit integer
fn bson_number(collection: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Write {
        collection: collection.to_string(),
        reason: format!("block number {value} exceeds the BSON integer range"),
    })
}

#[async_trait]
impl Store for MongoStore {
    async fn highest_block_number(&self) -> Result<u64, StoreError> {
        let latest = self
            .run(
                "find_one",
                BLOCK_COLLECTION,
                Access::Read,
                self.blocks
                    .find_one(doc! {})
                    .sort(doc! { "blockNumber": -1 }),
            )
            .await?;

        Ok(latest.map(|block| block.block_number).unwrap_or(0))
    }

    async fn upsert_header(&self, header: &Header) -> Result<WriteOutcome, StoreError> {
        let key = bson_number(HEADER_COLLECTION, header.block_number)?;
        self.replace_by_key(
            &self.headers,
            HEADER_COLLECTION,
            doc! { "blockNumber": key },
            header,
        )
        .await
    }

    async fn upsert_block(&self, block: &Block) -> Result<WriteOutcome, StoreError> {
        let key = bson_number(BLOCK_COLLECTION, block.block_number)?;
        self.replace_by_key(
            &self.blocks,
            BLOCK_COLLECTION,
            doc! { "blockNumber": key },
            block,
        )
        .await
    }

    async fn upsert_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<WriteOutcome, StoreError> {
        self.replace_by_key(
            &self.transactions,
            TRANSACTION_COLLECTION,
            doc! { "hash": transaction.hash.as_str() },
            transaction,
        )
        .await
    }

    async fn delete_transactions_for_block(&self, block_number: u64) -> Result<u64, StoreError> {
        let key = bson_number(TRANSACTION_COLLECTION, block_number)?;
        let result = self
            .run(
                "delete_many",
                TRANSACTION_COLLECTION,
                Access::Write,
                self.transactions.delete_many(doc! { "blockNumber": key }),
            )
            .await?;
        debug!(
            "Deleted {} transactions of block {}",
            result.deleted_count, block_number
        );
        Ok(result.deleted_count)
    }

    async fn all_blocks(&self) -> Result<Vec<Block>, StoreError> {
        self.run("find", BLOCK_COLLECTION, Access::Read, async {
            self.blocks
                .find(doc! {})
                .sort(doc! { "blockNumber": 1 })
                .await?
                .try_collect()
                .await
        })
        .await
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        self.run("find", TRANSACTION_COLLECTION, Access::Read, async {
            self.transactions
                .find(doc! {})
                .sort(doc! { "blockNumber": 1, "hash": 1 })
                .await?
                .try_collect()
                .await
        })
        .await
    }

    async fn block_by_number(&self, block_number: u64) -> Result<Option<Block>, StoreError> {
        // Numbers past the BSON range cannot have been stored
        let Ok(key) = i64::try_from(block_number) else {
            return Ok(None);
        };
        self.run(
            "find_one",
            BLOCK_COLLECTION,
            Access::Read,
            self.blocks.find_one(doc! { "blockNumber": key }),
        )
        .await
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<Transaction>, StoreError> {
        self.run(
            "find_one",
            TRANSACTION_COLLECTION,
            Access::Read,
            self.transactions.find_one(doc! { "hash": hash }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::datasets::transactions::TxStatus;
    use alloy_primitives::{Bloom, U256};
    use mongodb::bson::{Bson, from_slice, to_raw_document_buf};
    use serde::Serialize;
    use serde::de::DeserializeOwned;

    /// Encode the way the driver does, decode it back, and return the document
    fn round_trip<T>(record: &T) -> Document
    where
        T: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let raw = to_raw_document_buf(record).unwrap();
        let back: T = from_slice(raw.as_bytes()).unwrap();
        assert_eq!(&back, record);
        raw.to_document().unwrap()
    }

    fn burnt_fees() -> U256 {
        U256::from(553_402_322_211_286_548_450_000_000u128)
    }

    #[test]
    fn test_header_document() {
        let header = Header {
            block_number: 101,
            parent_hash: format!("{:#x}", alloy_primitives::B256::repeat_byte(0x11)),
            bloom: Bloom::repeat_byte(0x01),
            time: "2023-11-14 22:13:20 PM UTC".to_string(),
            nonce: "0x0000000000000042".to_string(),
        };
        let document = round_trip(&header);

        let key = bson_number(HEADER_COLLECTION, 101).unwrap();
        assert_eq!(document.get("blockNumber"), Some(&Bson::Int64(key)));
        assert!(matches!(document.get("bloom"), Some(Bson::Binary(_))));
        assert_eq!(
            document.get_str("timestamp").unwrap(),
            "2023-11-14 22:13:20 PM UTC"
        );
    }

    #[test]
    fn test_block_document() {
        let block = Block {
            block_number: 101,
            fee_recipient: "0xfefefefefefefefefefefefefefefefefefefefe".to_string(),
            block_size: 1_101,
            gas_used: 30_000_000,
            gas_limit: 30_000_000,
            base_fee_per_gas: U256::from(18_446_742_740_709_551_615u128),
            burnt_fees: burnt_fees(),
            extra_data: "7363616e6e6572".to_string(),
            block_hash: "0xb0".to_string(),
            state_root: "0x5e".to_string(),
            transactions: vec!["0x70".to_string()],
        };
        let document = round_trip(&block);

        // Same type as the `{blockNumber: key}` filters and the descending sort
        let key = bson_number(BLOCK_COLLECTION, 101).unwrap();
        assert_eq!(document.get("blockNumber"), Some(&Bson::Int64(key)));
        assert_eq!(
            document.get_str("burntFees").unwrap(),
            "553402322211286548450000000"
        );
        assert_eq!(
            document.get_str("baseFeePerGas").unwrap(),
            "18446742740709551615"
        );
        assert_eq!(document.get_array("transactions").unwrap().len(), 1);
    }

    #[test]
    fn test_transaction_document() {
        let transaction = Transaction {
            hash: "0x70".to_string(),
            status: TxStatus::Success,
            time: "2023-11-14 22:13:20 PM UTC".to_string(),
            from: "0x0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a".to_string(),
            to: String::new(),
            value: U256::from(10u64).pow(U256::from(20u64)),
            transaction_fee: burnt_fees(),
            gas_price: U256::from(10u64),
            gas_used: 21_000,
            gas_limit: 21_000,
            block_hash: "0xb0".to_string(),
            block_number: 101,
        };
        let document = round_trip(&transaction);

        let key = bson_number(TRANSACTION_COLLECTION, 101).unwrap();
        assert_eq!(document.get("blockNumber"), Some(&Bson::Int64(key)));
        assert_eq!(document.get_str("hash").unwrap(), "0x70");
        assert_eq!(document.get_str("status").unwrap(), "Success");
        assert_eq!(
            document.get_str("amount").unwrap(),
            "100000000000000000000"
        );
        assert_eq!(
            document.get_str("transactionFee").unwrap(),
            "553402322211286548450000000"
        );
        assert_eq!(document.get_str("to").unwrap(), "");
    }

    #[test]
    fn test_bson_number_range() {
        assert_eq!(bson_number(BLOCK_COLLECTION, 42).unwrap(), 42);
        assert!(matches!(
            bson_number(BLOCK_COLLECTION, u64::MAX),
            Err(StoreError::Write { .. })
        ));
    }
}
