//! Operator credential checks.
//!
//! Tokens are issued elsewhere; this module only decides whether a presented
//! bearer token belongs to an operator. Configured tokens are kept as SHA-256
//! digests so plaintext never has to live in config files.

use crate::config::AuthConfig;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Operator credential required")]
    Missing,

    #[error("Operator credential rejected")]
    Rejected,
}

/// Credential presented with a coordinator call
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer(String),
    Anonymous,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Credential::Bearer(token.into())
    }

    /// Parse an `Authorization` header value. The scheme is case-insensitive.
    pub fn from_authorization(value: Option<&str>) -> Self {
        value
            .and_then(|v| {
                if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                    Some(v[7..].trim())
                } else {
                    None
                }
            })
            .filter(|token| !token.is_empty())
            .map(Credential::bearer)
            .unwrap_or(Credential::Anonymous)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Bearer(_) => f.write_str("Credential::Bearer(***)"),
            Credential::Anonymous => f.write_str("Credential::Anonymous"),
        }
    }
}

/// Hex SHA-256 of a token
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Accepted operator token digests
#[derive(Debug, Clone, Default)]
pub struct OperatorAuth {
    digests: HashSet<String>,
}

impl OperatorAuth {
    pub fn from_config(config: &AuthConfig) -> Self {
        let mut digests: HashSet<String> = config
            .operator_token_sha256
            .iter()
            .map(|d| d.to_ascii_lowercase())
            .collect();
        if let Some(token) = &config.operator_token {
            digests.insert(hash_token(token));
        }

        if digests.is_empty() {
            tracing::warn!("No operator tokens configured; every upload call will be rejected");
        }

        Self { digests }
    }

    /// Accept exactly these plaintext tokens
    pub fn with_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            digests: tokens.into_iter().map(|t| hash_token(t.as_ref())).collect(),
        }
    }

    pub fn authorize(&self, credential: &Credential) -> Result<(), AuthError> {
        match credential {
            Credential::Anonymous => Err(AuthError::Missing),
            Credential::Bearer(token) => {
                if self.digests.contains(&hash_token(token)) {
                    Ok(())
                } else {
                    tracing::debug!("Rejected operator token");
                    Err(AuthError::Rejected)
                }
            }
        }
    }
}
