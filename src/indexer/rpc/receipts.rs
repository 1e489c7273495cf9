use alloy_consensus::Eip658Value;
use alloy_network::AnyTransactionReceipt;

use crate::models::datasets::transactions::RpcReceiptData;

pub trait ReceiptParser {
    fn parse_receipt(&self) -> RpcReceiptData;
}

impl ReceiptParser for AnyTransactionReceipt {
    fn parse_receipt(&self) -> RpcReceiptData {
        // Access the inner ReceiptWithBloom through the AnyReceiptEnvelope
        let receipt_with_bloom = &self.inner.inner.inner;

        let status = match receipt_with_bloom.receipt.status {
            Eip658Value::Eip658(true) => Some(1),
            Eip658Value::Eip658(false) => Some(0),
            Eip658Value::PostState(_) => None,
        };

        RpcReceiptData {
            tx_hash: self.inner.transaction_hash,
            status,
            gas_used: self.inner.gas_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;

    fn receipt_json(status_field: &str) -> String {
        format!(
            r#"{{
                "transactionHash": "0x0b7f4a5ac6b5fcc0f1a9b0d1c2e3f4a5b6c7d8e9fa0b1c2d3e4f5a6b7c8d9e0f",
                "transactionIndex": "0x0",
                "blockHash": "0x56a9bb0302da44b8c0b3df540781424684c3af04d0b7a38d72842b762076a664",
                "blockNumber": "0x65",
                "from": "0x1111111111111111111111111111111111111111",
                "to": "0x2222222222222222222222222222222222222222",
                "cumulativeGasUsed": "0x5208",
                "gasUsed": "0x5208",
                "effectiveGasPrice": "0x3b9aca00",
                "contractAddress": null,
                "logs": [],
                "logsBloom": "0x{bloom}",
                "type": "0x0",
                {status_field}
            }}"#,
            bloom = "0".repeat(512),
        )
    }

    #[test]
    fn test_parse_eip658_status() {
        let success: AnyTransactionReceipt =
            serde_json::from_str(&receipt_json(r#""status": "0x1""#)).unwrap();
        let parsed = success.parse_receipt();
        assert_eq!(parsed.status, Some(1));
        assert_eq!(parsed.gas_used, 21_000);
        assert_eq!(
            parsed.tx_hash,
            b256!("0x0b7f4a5ac6b5fcc0f1a9b0d1c2e3f4a5b6c7d8e9fa0b1c2d3e4f5a6b7c8d9e0f")
        );

        let failed: AnyTransactionReceipt =
            serde_json::from_str(&receipt_json(r#""status": "0x0""#)).unwrap();
        assert_eq!(failed.parse_receipt().status, Some(0));
    }

    #[test]
    fn test_parse_pre_byzantium_receipt_has_no_status() {
        let receipt: AnyTransactionReceipt = serde_json::from_str(&receipt_json(
            r#""root": "0x40c07091e16263270f3579385090fea02dd5f061ba6750228fcc082ff762fda7""#,
        ))
        .unwrap();
        assert_eq!(receipt.parse_receipt().status, None);
    }
}
