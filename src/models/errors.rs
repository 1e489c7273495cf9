use thiserror::Error;

/// Coarse failure classes used to decide how far an error reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Node or store unreachable. Retried on the next head notification.
    Connectivity,
    /// Block or receipt absent. Skips that unit of work.
    NotFound,
    /// Malformed data from node or store. Skips that unit of work.
    Decode,
    /// Write failure. Skips, no rollback of sibling writes.
    Persistence,
}

#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("Failed to connect to node at {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },
    #[error("Head subscription failed: {0}")]
    Subscription(String),
    #[error("Not found: {what}")]
    NotFound { what: String },
    #[error("Malformed node response for {what}: {reason}")]
    Decode { what: String, reason: String },
    #[error("RPC error during {method}: {reason}")]
    Rpc { method: String, reason: String },
    #[error("Timed out after {timeout_ms}ms waiting for {method}")]
    Timeout { method: String, timeout_ms: u64 },
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Connection { .. }
            | Self::Subscription(_)
            | Self::Rpc { .. }
            | Self::Timeout { .. } => ErrorKind::Connectivity,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Failed to connect to store: {0}")]
    Connection(String),
    #[error("Failed to decode document from '{collection}': {reason}")]
    Decode { collection: String, reason: String },
    #[error("Failed to query '{collection}': {reason}")]
    Query { collection: String, reason: String },
    #[error("Failed to write to '{collection}': {reason}")]
    Write { collection: String, reason: String },
    #[error("Store operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) | Self::Timeout { .. } | Self::Query { .. } => {
                ErrorKind::Connectivity
            }
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Write { .. } => ErrorKind::Persistence,
        }
    }
}

/// Per-transaction or per-block derivation failures. Never fatal to a cycle.
#[derive(Error, Debug, Clone)]
pub enum MapError {
    #[error("Could not recover sender of transaction {tx_hash} (chain id {chain_id:?})")]
    SenderRecovery {
        tx_hash: String,
        chain_id: Option<u64>,
    },
    #[error("Receipt for transaction {tx_hash} unavailable: {source}")]
    Receipt {
        tx_hash: String,
        #[source]
        source: ChainError,
    },
    #[error("Receipt belongs to {got}, expected transaction {expected}")]
    ReceiptMismatch { expected: String, got: String },
    #[error("Derivation task for block {block_number} failed: {reason}")]
    DerivationJoin { block_number: u64, reason: String },
    #[error("Derivation tasks for block {block_number} did not finish within {timeout_ms}ms")]
    DerivationTimeout { block_number: u64, timeout_ms: u64 },
}

impl MapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Receipt { source, .. } => source.kind(),
            Self::SenderRecovery { .. }
            | Self::ReceiptMismatch { .. }
            | Self::DerivationJoin { .. }
            | Self::DerivationTimeout { .. } => ErrorKind::Decode,
        }
    }
}

/// Why a single transaction was left out of its block
#[derive(Error, Debug, Clone)]
pub enum TransactionError {
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransactionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Map(e) => e.kind(),
            Self::Store(e) => e.kind(),
        }
    }
}
