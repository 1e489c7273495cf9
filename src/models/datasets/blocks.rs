use alloy_primitives::{Address, B64, B256, Bloom, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::models::datasets::transactions::RpcTransactionData;
use crate::utils::decimal::u256_decimal;

////////////////////////////////////// RPC Data ////////////////////////////////////////
/////////////////////// eth_getBlockByHash / eth_getBlockByNumber //////////////////////
#[derive(Debug, Clone, PartialEq)]
pub struct RpcHeaderData {
    pub block_number: u64,
    pub block_hash: B256,
    pub parent_hash: B256,
    pub logs_bloom: Bloom,
    pub timestamp: u64,
    pub nonce: Option<B64>,
    pub beneficiary: Address,
    pub size: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub base_fee_per_gas: Option<u64>,
    pub extra_data: Bytes,
    pub state_root: B256,
}

/// A block fetched with full transaction objects, in block order
#[derive(Debug, Clone, PartialEq)]
pub struct RpcBlockData {
    pub header: RpcHeaderData,
    pub transactions: Vec<RpcTransactionData>,
}

/////////////////////////////////// Persisted Records ///////////////////////////////////

/// One document per block number in the `header` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub block_number: u64,
    pub parent_hash: String,
    pub bloom: Bloom,
    #[serde(rename = "timestamp")]
    pub time: String,
    pub nonce: String,
}

/// One document per block number in the `block` collection.
///
/// `transactions` lists the hashes that were durably upserted before this
/// record was written, in block order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub block_number: u64,
    pub fee_recipient: String,
    pub block_size: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    #[serde(with = "u256_decimal")]
    pub base_fee_per_gas: U256,
    #[serde(with = "u256_decimal")]
    pub burnt_fees: U256,
    pub extra_data: String,
    pub block_hash: String,
    pub state_root: String,
    pub transactions: Vec<String>,
}
