use thiserror::Error;

use crate::utils::twitter::TwitterError;

pub type Result<T> = std::result::Result<T, TrendsError>;

/// Anything that aborts a pagination run or a period roll.
#[derive(Debug, Error)]
pub enum TrendsError {
    #[error("upstream error: {0}")]
    Upstream(#[from] TwitterError),

    #[error("store error: {0}")]
    Store(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("snapshot sink error: {0}")]
    Sink(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid entity kind in store: {0}")]
    InvalidKind(#[from] strum::ParseError),

    #[error("unknown feed: {0}")]
    UnknownFeed(String),
}
