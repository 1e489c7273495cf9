use alloy_consensus::Transaction as _;
use alloy_consensus::transaction::SignerRecoverable;
use alloy_network::{AnyRpcBlock, AnyRpcTransaction, AnyTxEnvelope, primitives::BlockTransactions};

use crate::models::datasets::blocks::{RpcBlockData, RpcHeaderData};
use crate::models::datasets::transactions::RpcTransactionData;
use crate::models::errors::ChainError;

pub trait BlockParser {
    fn parse_header(&self) -> Result<RpcHeaderData, ChainError>;
    fn parse_transactions(&self) -> Result<Vec<RpcTransactionData>, ChainError>;

    fn parse_block(&self) -> Result<RpcBlockData, ChainError> {
        Ok(RpcBlockData {
            header: self.parse_header()?,
            transactions: self.parse_transactions()?,
        })
    }
}

impl BlockParser for AnyRpcBlock {
    fn parse_header(&self) -> Result<RpcHeaderData, ChainError> {
        let inner = &self.header.inner;

        let size = match self.header.size {
            Some(size) => u64::try_from(size).map_err(|e| ChainError::Decode {
                what: format!("size of block {}", inner.number),
                reason: e.to_string(),
            })?,
            None => 0,
        };

        Ok(RpcHeaderData {
            block_number: inner.number,
            block_hash: self.header.hash,
            parent_hash: inner.parent_hash,
            logs_bloom: inner.logs_bloom,
            timestamp: inner.timestamp,
            nonce: inner.nonce,
            beneficiary: inner.beneficiary,
            size,
            gas_used: inner.gas_used,
            gas_limit: inner.gas_limit,
            base_fee_per_gas: inner.base_fee_per_gas,
            extra_data: inner.extra_data.clone(),
            state_root: inner.state_root,
        })
    }

    fn parse_transactions(&self) -> Result<Vec<RpcTransactionData>, ChainError> {
        match &self.transactions {
            BlockTransactions::Full(transactions) => {
                Ok(transactions.iter().map(parse_transaction).collect())
            }
            // Nodes may report an empty body as hashes even when full objects were requested
            BlockTransactions::Hashes(hashes) if hashes.is_empty() => Ok(Vec::new()),
            BlockTransactions::Hashes(_) => Err(ChainError::Decode {
                what: format!("transactions of block {}", self.header.inner.number),
                reason: "node returned hashes instead of full transactions".to_string(),
            }),
            BlockTransactions::Uncle => Err(ChainError::Decode {
                what: format!("transactions of block {}", self.header.inner.number),
                reason: "node returned an uncle block".to_string(),
            }),
        }
    }
}

fn parse_transaction(transaction: &AnyRpcTransaction) -> RpcTransactionData {
    let envelope = transaction.inner.inner.inner();

    let (tx_hash, sender) = match envelope {
        AnyTxEnvelope::Ethereum(signed) => (*signed.tx_hash(), signed.recover_signer().ok()),
        // Signer scheme of foreign transaction types is unknown
        AnyTxEnvelope::Unknown(unknown) => (unknown.hash, None),
    };

    RpcTransactionData {
        tx_hash,
        chain_id: envelope.chain_id(),
        sender,
        to: envelope.to(),
        value: envelope.value(),
        // Price actually paid, which for EIP-1559 transactions sits below the
        // fee cap that geth-style scanners report as gasPrice
        gas_price: transaction
            .effective_gas_price
            .unwrap_or_else(|| envelope.max_fee_per_gas()),
        gas_limit: envelope.gas_limit(),
    }
}
