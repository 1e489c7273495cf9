use alloy_primitives::U256;

use crate::indexer::transformations::blocks::format_block_time;
use crate::models::datasets::blocks::RpcHeaderData;
use crate::models::datasets::transactions::{
    RpcReceiptData, RpcTransactionData, Transaction, TxStatus,
};
use crate::models::errors::MapError;

pub trait TransactionTransformer {
    fn derive_transaction(
        &self,
        receipt: &RpcReceiptData,
        header: &RpcHeaderData,
    ) -> Result<Transaction, MapError>;
}

impl TransactionTransformer for RpcTransactionData {
    fn derive_transaction(
        &self,
        receipt: &RpcReceiptData,
        header: &RpcHeaderData,
    ) -> Result<Transaction, MapError> {
        if receipt.tx_hash != self.tx_hash {
            return Err(MapError::ReceiptMismatch {
                expected: self.tx_hash.to_string(),
                got: receipt.tx_hash.to_string(),
            });
        }

        let sender = self.sender.ok_or_else(|| MapError::SenderRecovery {
            tx_hash: self.tx_hash.to_string(),
            chain_id: self.chain_id,
        })?;

        let gas_price = U256::from(self.gas_price);

        Ok(Transaction {
            hash: self.tx_hash.to_string(),
            status: TxStatus::from_code(receipt.status),
            time: format_block_time(header.timestamp),
            from: sender.to_string(),
            // Contract creation has no recipient
            to: self.to.map(|to| to.to_string()).unwrap_or_default(),
            value: self.value,
            transaction_fee: U256::from(receipt.gas_used) * gas_price,
            gas_price,
            gas_used: receipt.gas_used,
            gas_limit: self.gas_limit,
            block_hash: header.block_hash.to_string(),
            block_number: header.block_number,
        })
    }
}
