use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::models::datasets::blocks::{Block, Header};
use crate::models::datasets::transactions::Transaction;
use crate::models::errors::StoreError;
use crate::storage::{Store, WriteOutcome};

/// Process-local store with the same keying rules as the MongoDB backend
#[derive(Default)]
pub struct MemoryStore {
    headers: RwLock<BTreeMap<u64, Header>>,
    blocks: RwLock<BTreeMap<u64, Block>>,
    transactions: RwLock<HashMap<String, Transaction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn header(&self, block_number: u64) -> Option<Header> {
        self.headers.read().await.get(&block_number).cloned()
    }

    pub async fn header_count(&self) -> usize {
        self.headers.read().await.len()
    }
}

fn outcome<T>(previous: Option<T>) -> WriteOutcome {
    match previous {
        Some(_) => WriteOutcome::Replaced,
        None => WriteOutcome::Inserted,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn highest_block_number(&self) -> Result<u64, StoreError> {
        Ok(self
            .blocks
            .read()
            .await
            .last_key_value()
            .map(|(number, _)| *number)
            .unwrap_or(0))
    }

    async fn upsert_header(&self, header: &Header) -> Result<WriteOutcome, StoreError> {
        let mut headers = self.headers.write().await;
        Ok(outcome(headers.insert(header.block_number, header.clone())))
    }

    async fn upsert_block(&self, block: &Block) -> Result<WriteOutcome, StoreError> {
        let mut blocks = self.blocks.write().await;
        Ok(outcome(blocks.insert(block.block_number, block.clone())))
    }

    async fn upsert_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<WriteOutcome, StoreError> {
        let mut transactions = self.transactions.write().await;
        Ok(outcome(
            transactions.insert(transaction.hash.clone(), transaction.clone()),
        ))
    }

    async fn delete_transactions_for_block(&self, block_number: u64) -> Result<u64, StoreError> {
        let mut transactions = self.transactions.write().await;
        let before = transactions.len();
        transactions.retain(|_, tx| tx.block_number != block_number);
        Ok((before - transactions.len()) as u64)
    }

    async fn all_blocks(&self) -> Result<Vec<Block>, StoreError> {
        Ok(self.blocks.read().await.values().cloned().collect())
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        let mut transactions: Vec<Transaction> =
            self.transactions.read().await.values().cloned().collect();
        transactions.sort_by(|a, b| {
            a.block_number
                .cmp(&b.block_number)
                .then_with(|| a.hash.cmp(&b.hash))
        });
        Ok(transactions)
    }

    async fn block_by_number(&self, block_number: u64) -> Result<Option<Block>, StoreError> {
        Ok(self.blocks.read().await.get(&block_number).cloned())
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<Transaction>, StoreError> {
        Ok(self.transactions.read().await.get(hash).cloned())
    }
}
