use alloy_primitives::{U256, hex};
use chrono::DateTime;

use crate::models::datasets::blocks::{Block, Header, RpcHeaderData};

const BLOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %p UTC";

/// UTC rendering of a block timestamp. Timestamps chrono cannot represent
/// fall back to the raw epoch seconds.
pub fn format_block_time(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|time| time.format(BLOCK_TIME_FORMAT).to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

pub trait BlockTransformer {
    fn derive_header(&self) -> Header;
    fn derive_block(&self) -> Block;
}

impl BlockTransformer for RpcHeaderData {
    fn derive_header(&self) -> Header {
        let nonce = self
            .nonce
            .map(|nonce| u64::from_be_bytes(nonce.0))
            .unwrap_or_default();

        Header {
            block_number: self.block_number,
            parent_hash: self.parent_hash.to_string(),
            bloom: self.logs_bloom,
            time: format_block_time(self.timestamp),
            nonce: format!("0x{nonce:016x}"),
        }
    }

    fn derive_block(&self) -> Block {
        // Pre-London blocks report no base fee
        let base_fee_per_gas = U256::from(self.base_fee_per_gas.unwrap_or_default());

        Block {
            block_number: self.block_number,
            fee_recipient: self.beneficiary.to_string(),
            block_size: self.size,
            gas_used: self.gas_used,
            gas_limit: self.gas_limit,
            base_fee_per_gas,
            burnt_fees: base_fee_per_gas * U256::from(self.gas_used),
            extra_data: hex::encode(&self.extra_data),
            block_hash: self.block_hash.to_string(),
            state_root: self.state_root.to_string(),
            transactions: Vec::new(),
        }
    }
}
