//! Error types for the gateway core.

/// Core error type for gateway infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// A private key could not be loaded or decoded.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The pool has been closed and hands out no more connections.
    #[error("connection pool is closed")]
    PoolClosed,

    /// No configured storage node answered the last health probe.
    #[error("no healthy storage node available")]
    NoHealthyPeers,
}

/// Convenience result type for gateway core operations.
pub type GateResult<T> = Result<T, GateError>;
