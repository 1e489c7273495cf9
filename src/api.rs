use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::models::errors::StoreError;
use crate::storage::{Store, all_records, records_by_collection};

type SharedStore = Arc<dyn Store>;

/// Every response is wrapped as `{"res": "ok"|"fail", "body": ...}`
#[derive(Debug, Serialize)]
struct Envelope<T> {
    res: &'static str,
    body: T,
}

fn ok<T: Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(Envelope { res: "ok", body })).into_response()
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(Envelope {
            res: "fail",
            body: message.into(),
        }),
    )
        .into_response()
}

fn store_failure(e: StoreError) -> Response {
    error!("Read API store error: {}", e);
    fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/all", get(get_all))
        .route("/api/v1/more/{collection}", get(get_more))
        .route("/api/v1/block/{height}", get(get_block))
        .route("/api/v1/tx/{hash}", get(get_transaction))
        .with_state(store)
}

async fn health() -> Response {
    ok(0)
}

async fn get_all(State(store): State<SharedStore>) -> Response {
    match all_records(store.as_ref()).await {
        Ok(records) => ok(records),
        Err(e) => store_failure(e),
    }
}

async fn get_more(
    State(store): State<SharedStore>,
    Path(collection): Path<String>,
) -> Response {
    match records_by_collection(store.as_ref(), &collection).await {
        Ok(Some(records)) => ok(records),
        Ok(None) => fail(
            StatusCode::NOT_FOUND,
            format!("collection '{collection}' not found"),
        ),
        Err(e) => store_failure(e),
    }
}

async fn get_block(State(store): State<SharedStore>, Path(height): Path<String>) -> Response {
    let Ok(block_number) = height.parse::<u64>() else {
        return fail(
            StatusCode::BAD_REQUEST,
            format!("'{height}' is not a block number"),
        );
    };

    match store.block_by_number(block_number).await {
        Ok(Some(block)) => ok(block),
        Ok(None) => fail(
            StatusCode::NOT_FOUND,
            format!("block {block_number} not found"),
        ),
        Err(e) => store_failure(e),
    }
}

async fn get_transaction(
    State(store): State<SharedStore>,
    Path(hash): Path<String>,
) -> Response {
    // Hashes are stored as lowercase hex
    let hash = hash.to_lowercase();
    match store.transaction_by_hash(&hash).await {
        Ok(Some(transaction)) => ok(transaction),
        Ok(None) => fail(
            StatusCode::NOT_FOUND,
            format!("transaction {hash} not found"),
        ),
        Err(e) => store_failure(e),
    }
}

/// Serve the read API until `shutdown` is cancelled
pub async fn start_api_server(
    store: SharedStore,
    addr: &str,
    port: u16,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("{addr}:{port}").parse::<SocketAddr>()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting read API server on {}", addr);

    let app = router(store);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            error!("Read API server error: {}", e);
        }
    });

    Ok(())
}
