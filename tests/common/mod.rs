#![allow(dead_code)]

use alloy_primitives::{Address, B64, B256, Bloom, Bytes, U256};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio_util::sync::CancellationToken;

use block_scanner::indexer::reconciler::CatchUpReconciler;
use block_scanner::indexer::transformations::blocks::BlockTransformer;
use block_scanner::indexer::{ChainReader, HeadStream};
use block_scanner::models::common::{
    BlockWritePolicy, FetchFailurePolicy, HeadNotification, ReconcilerConfig,
};
use block_scanner::models::datasets::blocks::{Block, Header, RpcBlockData, RpcHeaderData};
use block_scanner::models::datasets::transactions::{
    RpcReceiptData, RpcTransactionData, Transaction,
};
use block_scanner::models::errors::{ChainError, StoreError};
use block_scanner::storage::memory::MemoryStore;
use block_scanner::storage::{Store, WriteOutcome};

//////// Fixtures ////////

pub fn block_hash(number: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[0] = 0xb0;
    bytes[24..].copy_from_slice(&number.to_be_bytes());
    B256::from(bytes)
}

pub fn tx_hash(block_number: u64, index: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[0] = 0x70;
    bytes[16..24].copy_from_slice(&block_number.to_be_bytes());
    bytes[24..].copy_from_slice(&index.to_be_bytes());
    B256::from(bytes)
}

pub fn head(number: u64) -> HeadNotification {
    HeadNotification {
        number,
        hash: block_hash(number),
    }
}

pub fn header(number: u64) -> RpcHeaderData {
    RpcHeaderData {
        block_number: number,
        block_hash: block_hash(number),
        parent_hash: block_hash(number.saturating_sub(1)),
        logs_bloom: Bloom::default(),
        timestamp: 1_700_000_000 + number * 12,
        nonce: Some(B64::from(number.to_be_bytes())),
        beneficiary: Address::repeat_byte(0xfe),
        size: 1_000 + number,
        gas_used: 21_000,
        gas_limit: 30_000_000,
        base_fee_per_gas: Some(7),
        extra_data: Bytes::from_static(b"scanner"),
        state_root: B256::repeat_byte(0x5e),
    }
}

pub fn transaction(block_number: u64, index: u64) -> RpcTransactionData {
    RpcTransactionData {
        tx_hash: tx_hash(block_number, index),
        chain_id: Some(5),
        sender: Some(Address::repeat_byte(0x0a)),
        to: Some(Address::repeat_byte(0x0b)),
        value: U256::from(index + 1),
        gas_price: 10,
        gas_limit: 21_000,
    }
}

pub fn block(number: u64, tx_count: u64) -> RpcBlockData {
    RpcBlockData {
        header: header(number),
        transactions: (0..tx_count).map(|i| transaction(number, i)).collect(),
    }
}

pub fn hashes(block_number: u64, indexes: &[u64]) -> Vec<String> {
    indexes
        .iter()
        .map(|i| tx_hash(block_number, *i).to_string())
        .collect()
}

pub fn reconciler_config(fetch_failure: FetchFailurePolicy) -> ReconcilerConfig {
    ReconcilerConfig {
        fetch_failure,
        block_write: BlockWritePolicy::Always,
        derive_timeout_ms: 1_000,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 2,
    }
}

pub fn reconciler(
    chain: &Arc<ScriptedChain>,
    store: &Arc<RecordingStore>,
    config: ReconcilerConfig,
) -> CatchUpReconciler {
    CatchUpReconciler::new(
        chain.clone(),
        store.clone(),
        config,
        CancellationToken::new(),
        None,
    )
}

//////// Scripted chain ////////

pub enum ScriptedSubscription {
    /// `subscribe_heads` itself fails
    Reject(String),
    /// Yields `heads`, then errors if `then_fail`, else stays open
    Heads {
        heads: Vec<HeadNotification>,
        then_fail: bool,
    },
}

/// Chain reader serving canned blocks, receipts and subscriptions
#[derive(Default)]
pub struct ScriptedChain {
    blocks: Mutex<BTreeMap<u64, RpcBlockData>>,
    receipts: Mutex<HashMap<B256, RpcReceiptData>>,
    missing_receipts: Mutex<HashSet<B256>>,
    /// Remaining failures per block number, and the error each one returns
    failing_blocks: Mutex<HashMap<u64, (u32, ChainError)>>,
    /// Cancelled as soon as the keyed block number is fetched
    cancel_on_fetch: Mutex<HashMap<u64, CancellationToken>>,
    fetches: Mutex<HashMap<u64, u32>>,
    subscriptions: Mutex<VecDeque<ScriptedSubscription>>,
    pub subscribe_calls: AtomicU32,
}

impl ScriptedChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_block(&self, block: RpcBlockData) {
        let mut receipts = self.receipts.lock().unwrap();
        for tx in &block.transactions {
            receipts.insert(
                tx.tx_hash,
                RpcReceiptData {
                    tx_hash: tx.tx_hash,
                    status: Some(1),
                    gas_used: 21_000,
                },
            );
        }
        self.blocks
            .lock()
            .unwrap()
            .insert(block.header.block_number, block);
    }

    pub fn set_receipt(&self, receipt: RpcReceiptData) {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.tx_hash, receipt);
    }

    pub fn drop_receipt(&self, hash: B256) {
        self.missing_receipts.lock().unwrap().insert(hash);
    }

    pub fn fail_block(&self, number: u64, times: u32) {
        let error = ChainError::Rpc {
            method: "eth_getBlockByNumber".to_string(),
            reason: "upstream unavailable".to_string(),
        };
        self.failing_blocks
            .lock()
            .unwrap()
            .insert(number, (times, error));
    }

    /// Serve a block body that cannot be decoded
    pub fn corrupt_block(&self, number: u64, times: u32) {
        let error = ChainError::Decode {
            what: "eth_getBlockByNumber".to_string(),
            reason: "block size does not fit in 64 bits".to_string(),
        };
        self.failing_blocks
            .lock()
            .unwrap()
            .insert(number, (times, error));
    }

    pub fn cancel_when_fetched(&self, number: u64, token: CancellationToken) {
        self.cancel_on_fetch.lock().unwrap().insert(number, token);
    }

    pub fn fetches(&self, number: u64) -> u32 {
        self.fetches
            .lock()
            .unwrap()
            .get(&number)
            .copied()
            .unwrap_or(0)
    }

    pub fn script_subscription(&self, subscription: ScriptedSubscription) {
        self.subscriptions.lock().unwrap().push_back(subscription);
    }
}

#[async_trait]
impl ChainReader for ScriptedChain {
    async fn subscribe_heads(&self) -> Result<HeadStream, ChainError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

        let next = self.subscriptions.lock().unwrap().pop_front();
        match next {
            None => Err(ChainError::Subscription(
                "no subscription scripted".to_string(),
            )),
            Some(ScriptedSubscription::Reject(reason)) => Err(ChainError::Subscription(reason)),
            Some(ScriptedSubscription::Heads { heads, then_fail }) => {
                let heads = stream::iter(heads.into_iter().map(Ok));
                if then_fail {
                    let failure = stream::once(async {
                        Err(ChainError::Subscription("connection reset".to_string()))
                    });
                    Ok(heads.chain(failure).boxed())
                } else {
                    Ok(heads.chain(stream::pending()).boxed())
                }
            }
        }
    }

    async fn block_by_hash(&self, hash: B256) -> Result<RpcBlockData, ChainError> {
        self.blocks
            .lock()
            .unwrap()
            .values()
            .find(|block| block.header.block_hash == hash)
            .cloned()
            .ok_or(ChainError::NotFound {
                what: format!("block {hash}"),
            })
    }

    async fn block_by_number(&self, number: u64) -> Result<RpcBlockData, ChainError> {
        *self.fetches.lock().unwrap().entry(number).or_default() += 1;

        if let Some(token) = self.cancel_on_fetch.lock().unwrap().get(&number) {
            token.cancel();
        }

        {
            let mut failing = self.failing_blocks.lock().unwrap();
            if let Some((remaining, error)) = failing.get_mut(&number) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(error.clone());
                }
            }
        }

        self.blocks
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or(ChainError::NotFound {
                what: format!("block {number}"),
            })
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<RpcReceiptData, ChainError> {
        if self.missing_receipts.lock().unwrap().contains(&tx_hash) {
            return Err(ChainError::NotFound {
                what: format!("receipt of transaction {tx_hash}"),
            });
        }
        self.receipts
            .lock()
            .unwrap()
            .get(&tx_hash)
            .cloned()
            .ok_or(ChainError::NotFound {
                what: format!("receipt of transaction {tx_hash}"),
            })
    }
}

//////// Recording store ////////

/// `MemoryStore` that counts writes and fails on demand
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    pub writes: AtomicU32,
    pub fail_cursor: AtomicBool,
    pub fail_headers: AtomicBool,
    pub fail_blocks: AtomicBool,
    failing_transactions: Mutex<HashSet<String>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store with a persisted Block (and Header) at `number`
    pub async fn at_height(number: u64) -> Arc<Self> {
        let store = Self::new();
        let raw = header(number);
        store.inner.upsert_header(&raw.derive_header()).await.unwrap();
        store.inner.upsert_block(&raw.derive_block()).await.unwrap();
        store
    }

    pub fn fail_transaction(&self, hash: B256) {
        self.failing_transactions
            .lock()
            .unwrap()
            .insert(hash.to_string());
    }

    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    fn refuse(collection: &str) -> StoreError {
        StoreError::Write {
            collection: collection.to_string(),
            reason: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn highest_block_number(&self) -> Result<u64, StoreError> {
        if self.fail_cursor.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout {
                operation: "find_one on 'block'".to_string(),
                timeout_ms: 5_000,
            });
        }
        self.inner.highest_block_number().await
    }

    async fn upsert_header(&self, header: &Header) -> Result<WriteOutcome, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_headers.load(Ordering::SeqCst) {
            return Err(Self::refuse("header"));
        }
        self.inner.upsert_header(header).await
    }

    async fn upsert_block(&self, block: &Block) -> Result<WriteOutcome, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_blocks.load(Ordering::SeqCst) {
            return Err(Self::refuse("block"));
        }
        self.inner.upsert_block(block).await
    }

    async fn upsert_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<WriteOutcome, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_transactions
            .lock()
            .unwrap()
            .contains(&transaction.hash)
        {
            return Err(Self::refuse("transaction"));
        }
        self.inner.upsert_transaction(transaction).await
    }

    async fn delete_transactions_for_block(&self, block_number: u64) -> Result<u64, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_transactions_for_block(block_number).await
    }

    async fn all_blocks(&self) -> Result<Vec<Block>, StoreError> {
        self.inner.all_blocks().await
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        self.inner.all_transactions().await
    }

    async fn block_by_number(&self, block_number: u64) -> Result<Option<Block>, StoreError> {
        self.inner.block_by_number(block_number).await
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<Transaction>, StoreError> {
        self.inner.transaction_by_hash(hash).await
    }
}
