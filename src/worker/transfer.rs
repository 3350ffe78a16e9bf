//! Timed, retried storage and catalog operations

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::TransferConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("{operation} timed out after {attempts} attempt(s)")]
    Timeout { operation: String, attempts: u32 },

    #[error("{operation} failed after {attempts} attempt(s): {message}")]
    Failed {
        operation: String,
        attempts: u32,
        message: String,
    },
}

/// Per-operation timeout and a fixed attempt budget with exponential backoff
#[derive(Debug, Clone)]
pub struct TransferPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

impl TransferPolicy {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff(),
        }
    }

    /// Delay before attempt `attempt + 1`: backoff, 2x backoff, 4x backoff...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Run `op` until it succeeds or the attempt budget is spent
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, TransferError>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let error = match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(value)) => {
                    if attempts > 1 {
                        debug!(operation, attempts, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(e)) => TransferError::Failed {
                    operation: operation.to_string(),
                    attempts,
                    message: e.to_string(),
                },
                Err(_) => TransferError::Timeout {
                    operation: operation.to_string(),
                    attempts,
                },
            };

            if attempts >= self.max_attempts {
                warn!(operation, attempts, error = %error, "Operation failed after retries");
                return Err(error);
            }

            warn!(operation, attempts, error = %error, "Operation failed, retrying");
            tokio::time::sleep(self.delay_after(attempts)).await;
        }
    }
}
