use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::utils::decimal::u256_decimal;

////////////////////////////////////// RPC Data ////////////////////////////////////////
///////////////////////////////// eth_getBlockByNumber /////////////////////////////////
#[derive(Debug, Clone, PartialEq)]
pub struct RpcTransactionData {
    pub tx_hash: B256,
    pub chain_id: Option<u64>,
    /// Signer recovered from the signature, `None` when recovery failed
    pub sender: Option<Address>,
    /// `None` for contract creation
    pub to: Option<Address>,
    pub value: U256,
    pub gas_price: u128,
    pub gas_limit: u64,
}

/////////////////////////////// eth_getTransactionReceipt //////////////////////////////
#[derive(Debug, Clone, PartialEq)]
pub struct RpcReceiptData {
    pub tx_hash: B256,
    /// EIP-658 status code. Pre-Byzantium receipts carry none.
    pub status: Option<u64>,
    pub gas_used: u64,
}

/////////////////////////////////// Persisted Records ///////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Success,
    Fail,
    Unknown,
}

impl TxStatus {
    pub fn from_code(code: Option<u64>) -> Self {
        match code {
            Some(1) => Self::Success,
            Some(0) => Self::Fail,
            _ => Self::Unknown,
        }
    }
}

/// One document per transaction hash in the `transaction` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: String,
    pub status: TxStatus,
    #[serde(rename = "timestamp")]
    pub time: String,
    pub from: String,
    /// Empty for contract creation
    pub to: String,
    #[serde(rename = "amount", with = "u256_decimal")]
    pub value: U256,
    #[serde(with = "u256_decimal")]
    pub transaction_fee: U256,
    #[serde(with = "u256_decimal")]
    pub gas_price: U256,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub block_hash: String,
    pub block_number: u64,
}
