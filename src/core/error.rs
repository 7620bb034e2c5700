use std::num::ParseIntError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShardError {
    #[error("Empty identifying string")]
    EmptyInput,

    #[error("Parse error: {0}")]
    Parse(#[from] ParseIntError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shard {shard} unreachable: {reason}")]
    Connectivity { shard: u32, reason: String },

    #[error("{addr} unreachable: {reason}")]
    Unreachable { addr: String, reason: String },

    #[error("Shard router is not open")]
    NotOpen,

    #[error("No shards configured")]
    NoShards,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Clock moved backwards by {0}ms")]
    ClockMovedBackwards(i64),
}

pub type Result<T> = std::result::Result<T, ShardError>;

impl From<sqlx::Error> for ShardError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<serde_json::Error> for ShardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ShardError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Store(err.to_string())
    }
}
