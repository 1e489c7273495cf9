pub mod block_processor;
pub mod reconciler;
pub mod rpc;
pub mod supervisor;
pub mod transformations;

use alloy_eips::BlockNumberOrTag;
use alloy_network::AnyNetwork;
use alloy_primitives::B256;
use alloy_provider::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy_transport::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::indexer::rpc::{blocks::BlockParser, receipts::ReceiptParser};
use crate::metrics::Metrics;
use crate::models::common::HeadNotification;
use crate::models::datasets::blocks::RpcBlockData;
use crate::models::datasets::transactions::RpcReceiptData;
use crate::models::errors::ChainError;
use crate::utils::{strip_html, with_timeout};

/// Head notifications in arrival order. An `Err` item ends the subscription.
pub type HeadStream = BoxStream<'static, Result<HeadNotification, ChainError>>;

/// Read access to a chain node
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn subscribe_heads(&self) -> Result<HeadStream, ChainError>;

    /// Full block, transactions included
    async fn block_by_hash(&self, hash: B256) -> Result<RpcBlockData, ChainError>;

    /// Full block, transactions included
    async fn block_by_number(&self, number: u64) -> Result<RpcBlockData, ChainError>;

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<RpcReceiptData, ChainError>;
}

/// Chain reader over a WebSocket connection
pub struct AlloyChainReader {
    provider: DynProvider<AnyNetwork>,
    request_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl AlloyChainReader {
    pub async fn dial(
        endpoint: &str,
        request_timeout: Duration,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self, ChainError> {
        let connect = ProviderBuilder::new()
            .disable_recommended_fillers()
            .network::<AnyNetwork>()
            .connect_ws(WsConnect::new(endpoint));

        let provider = match with_timeout(request_timeout, connect).await {
            Some(Ok(provider)) => provider.erased(),
            Some(Err(e)) => {
                return Err(ChainError::Connection {
                    endpoint: endpoint.to_string(),
                    reason: strip_html(&e.to_string()),
                });
            }
            None => {
                return Err(ChainError::Connection {
                    endpoint: endpoint.to_string(),
                    reason: format!("no answer within {}ms", request_timeout.as_millis()),
                });
            }
        };

        info!("Connected to node at {}", endpoint);

        Ok(Self {
            provider,
            request_timeout,
            metrics,
        })
    }

    /// Run one RPC call under the request timeout and record its metrics
    async fn call<T, F>(&self, method: &'static str, future: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let start = Instant::now();

        let result = match with_timeout(self.request_timeout, future).await {
            Some(result) => result.map_err(|e| rpc_error(method, e)),
            None => Err(ChainError::Timeout {
                method: method.to_string(),
                timeout_ms: self.request_timeout.as_millis() as u64,
            }),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_rpc(method, start.elapsed().as_secs_f64(), result.is_err());
        }

        if let Err(e) = &result {
            warn!("RPC call {} failed: {}", method, e);
        }

        result
    }
}

fn rpc_error(method: &str, error: RpcError<TransportErrorKind>) -> ChainError {
    match error {
        RpcError::DeserError { err, .. } => ChainError::Decode {
            what: method.to_string(),
            reason: err.to_string(),
        },
        other => ChainError::Rpc {
            method: method.to_string(),
            reason: strip_html(&other.to_string()),
        },
    }
}

#[async_trait]
impl ChainReader for AlloyChainReader {
    async fn subscribe_heads(&self) -> Result<HeadStream, ChainError> {
        let subscription = self
            .call(
                "eth_subscribe",
                self.provider.subscribe_blocks().into_future(),
            )
            .await
            .map_err(|e| ChainError::Subscription(e.to_string()))?;

        let heads = subscription.into_stream().map(|header| {
            Ok(HeadNotification {
                number: header.inner.number,
                hash: header.hash,
            })
        });

        // The node closing the subscription surfaces as a terminal error
        let closed = stream::once(async {
            Err(ChainError::Subscription(
                "node closed the head subscription".to_string(),
            ))
        });

        Ok(heads.chain(closed).boxed())
    }

    async fn block_by_hash(&self, hash: B256) -> Result<RpcBlockData, ChainError> {
        self.call(
            "eth_getBlockByHash",
            self.provider.get_block_by_hash(hash).full().into_future(),
        )
        .await?
        .ok_or_else(|| ChainError::NotFound {
            what: format!("block {hash}"),
        })?
        .parse_block()
    }

    async fn block_by_number(&self, number: u64) -> Result<RpcBlockData, ChainError> {
        self.call(
            "eth_getBlockByNumber",
            self.provider
                .get_block_by_number(BlockNumberOrTag::Number(number))
                .full()
                .into_future(),
        )
        .await?
        .ok_or_else(|| ChainError::NotFound {
            what: format!("block {number}"),
        })?
        .parse_block()
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<RpcReceiptData, ChainError> {
        let receipt = self
            .call(
                "eth_getTransactionReceipt",
                self.provider.get_transaction_receipt(tx_hash).into_future(),
            )
            .await?
            .ok_or_else(|| ChainError::NotFound {
                what: format!("receipt of transaction {tx_hash}"),
            })?;

        Ok(receipt.parse_receipt())
    }
}
