use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use axum::{Router, http::StatusCode, routing::get};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, MeterProvider};
use opentelemetry_sdk::metrics::{MetricError, SdkMeterProvider};
use prometheus::{Encoder, TextEncoder};
use tokio_util::sync::CancellationToken;

pub struct Metrics {
    registry: Arc<prometheus::Registry>,
    _provider: SdkMeterProvider,
    pub chain_name: String,

    // Reconciliation metrics
    pub cycles: Counter<u64>,
    pub cycle_duration: Histogram<f64>,
    pub blocks_persisted: Counter<u64>,
    pub blocks_skipped: Counter<u64>,
    pub transactions_upserted: Counter<u64>,
    pub transactions_skipped: Counter<u64>,
    pub latest_persisted_block: Gauge<u64>,

    // Chain metrics
    pub chain_tip_block: Gauge<u64>,
    pub chain_tip_lag: Gauge<u64>,
    pub subscription_restarts: Counter<u64>,

    // RPC metrics
    pub rpc_requests: Counter<u64>,
    pub rpc_errors: Counter<u64>,
    pub rpc_latency: Histogram<f64>,

    // Store metrics
    pub store_requests: Counter<u64>,
    pub store_errors: Counter<u64>,
    pub store_latency: Histogram<f64>,
}

impl Metrics {
    pub fn new(chain_name: String) -> Result<Self, MetricError> {
        // Create a new prometheus registry
        let registry = prometheus::Registry::new();

        // Configure OpenTelemetry to use this registry
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        // Set up a meter to create instruments
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("scanner_metrics");

        let cycles = meter
            .u64_counter("scanner_reconcile_cycles")
            .with_description("Head notifications handled by the reconciler")
            .build();

        let cycle_duration = meter
            .f64_histogram("scanner_reconcile_cycle_duration")
            .with_description("Time spent draining one missing range")
            .with_boundaries(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])
            .with_unit("s")
            .build();

        let blocks_persisted = meter
            .u64_counter("scanner_blocks_persisted")
            .with_description("Blocks whose header and block records were written")
            .build();

        let blocks_skipped = meter
            .u64_counter("scanner_blocks_skipped")
            .with_description("Block numbers left behind in a cycle")
            .build();

        let transactions_upserted = meter
            .u64_counter("scanner_transactions_upserted")
            .with_description("Transactions upserted by hash")
            .build();

        let transactions_skipped = meter
            .u64_counter("scanner_transactions_skipped")
            .with_description("Transactions dropped after a receipt, mapping or write failure")
            .build();

        let latest_persisted_block = meter
            .u64_gauge("scanner_latest_persisted_block_number")
            .with_description("Highest block number written in the last cycle")
            .build();

        let chain_tip_block = meter
            .u64_gauge("scanner_chain_tip_block_number")
            .with_description("Latest block number on chain")
            .build();

        let chain_tip_lag = meter
            .u64_gauge("scanner_chain_tip_lag")
            .with_description("Number of blocks behind chain tip at cycle start")
            .build();

        let subscription_restarts = meter
            .u64_counter("scanner_subscription_restarts")
            .with_description("Head subscriptions re-established after an error")
            .build();

        let rpc_requests = meter
            .u64_counter("scanner_rpc_requests")
            .with_description("Number of RPC requests made")
            .build();

        let rpc_errors = meter
            .u64_counter("scanner_rpc_errors")
            .with_description("Number of RPC errors encountered")
            .build();

        let rpc_latency = meter
            .f64_histogram("scanner_rpc_latency")
            .with_description("RPC request latency")
            .with_boundaries(vec![
                0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0, 5.0, 10.0,
            ])
            .with_unit("s")
            .build();

        let store_requests = meter
            .u64_counter("scanner_store_requests")
            .with_description("Number of document store operations")
            .build();

        let store_errors = meter
            .u64_counter("scanner_store_errors")
            .with_description("Number of failed document store operations")
            .build();

        let store_latency = meter
            .f64_histogram("scanner_store_latency")
            .with_description("Document store operation latency")
            .with_boundaries(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0, 5.0])
            .with_unit("s")
            .build();

        Ok(Self {
            registry: Arc::new(registry),
            _provider: provider,
            chain_name,
            cycles,
            cycle_duration,
            blocks_persisted,
            blocks_skipped,
            transactions_upserted,
            transactions_skipped,
            latest_persisted_block,
            chain_tip_block,
            chain_tip_lag,
            subscription_restarts,
            rpc_requests,
            rpc_errors,
            rpc_latency,
            store_requests,
            store_errors,
            store_latency,
        })
    }

    pub fn chain_label(&self) -> KeyValue {
        KeyValue::new("chain", self.chain_name.clone())
    }

    pub fn record_rpc(&self, method: &'static str, elapsed_secs: f64, failed: bool) {
        let labels = [self.chain_label(), KeyValue::new("method", method)];
        self.rpc_requests.add(1, &labels);
        self.rpc_latency.record(elapsed_secs, &labels);
        if failed {
            self.rpc_errors.add(1, &labels);
        }
    }

    pub fn record_store(&self, operation: &'static str, elapsed_secs: f64, failed: bool) {
        let labels = [self.chain_label(), KeyValue::new("operation", operation)];
        self.store_requests.add(1, &labels);
        self.store_latency.record(elapsed_secs, &labels);
        if failed {
            self.store_errors.add(1, &labels);
        }
    }

    /// Serve `/metrics` until `shutdown` is cancelled
    pub async fn start_metrics_server(
        &self,
        addr: &str,
        port: u16,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let addr = format!("{addr}:{port}").parse::<SocketAddr>()?;
        let registry = self.registry.clone();

        let app = Router::new().route("/metrics", get(move || metrics_handler(registry.clone())));

        // Determine the access URL based on the binding address. Only used for logging.
        let access_url = if addr.ip().is_unspecified() {
            format!("http://localhost:{port}/metrics")
        } else {
            format!("http://{}:{port}/metrics", addr.ip())
        };

        info!(
            "Starting metrics server - binding to {} (accessible at {})",
            addr, access_url
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;

        // Spawn the server in a separate task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!("Metrics server error: {}", e);
            }
        });

        Ok(())
    }
}

async fn metrics_handler(registry: Arc<prometheus::Registry>) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
