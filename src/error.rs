//! Crate-level error types shared across module boundaries.
//!
//! Most modules define their own focused error enums (`SubmitError`,
//! `HandlerError`, `StoreError`, `LockError`); this module provides the
//! umbrella [`CoreError`] used where those boundaries meet, plus the crate
//! [`Result`] alias.

use crate::cache::lock::LockError;
use crate::cache::store::StoreError;
use crate::pool::{PoolError, SubmitError};
use crate::providers::ProviderError;

/// Umbrella error for the async execution and caching core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
