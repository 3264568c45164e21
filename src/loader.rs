//! SDK readiness gate.
//!
//! The identity and store SDKs historically initialized through
//! callback-style loaders; this seam wraps that handshake behind a single
//! future-returning call so the session and sync layers never see callback
//! shapes. Implementations perform whatever warmup their transport needs
//! (discovery fetches, client construction) and resolve once both SDK
//! surfaces are usable.

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while preparing the external SDK surfaces.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to load identity services: {0}")]
    Identity(String),

    #[error("failed to load store client: {0}")]
    Store(String),
}

/// Readiness gate for the two external SDK surfaces.
#[async_trait]
pub trait SdkLoader: Send + Sync {
    /// Resolve once both the identity and store surfaces are ready.
    async fn load(&self) -> Result<(), LoadError>;
}

/// Loader for embedded clients that need no warmup.
pub struct StaticLoader;

#[async_trait]
impl SdkLoader for StaticLoader {
    async fn load(&self) -> Result<(), LoadError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "loader_test.rs"]
mod tests;
