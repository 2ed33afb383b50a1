//! Error types for Sonarch

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SonarchError {
    #[error("Audio memory pool '{pool}' exhausted: requested {requested} bytes, {available} available")]
    PoolExhausted {
        pool: String,
        requested: usize,
        available: usize,
    },

    #[error("Pool block from generation {block_generation} used after cleanup (pool is at generation {pool_generation})")]
    StalePoolBlock {
        block_generation: u64,
        pool_generation: u64,
    },

    #[error("Request queue full: {0}")]
    QueueFull(String),

    #[error("Request channel disconnected: {0}")]
    Disconnected(String),

    #[error("Unknown audio object: {0}")]
    UnknownObject(String),

    #[error("Unknown audio listener: {0}")]
    UnknownListener(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Controls data error: {0}")]
    ControlsData(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SonarchError>;
