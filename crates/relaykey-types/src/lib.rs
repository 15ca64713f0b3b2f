//! Shared error taxonomy for the relaykey gateway client.
//!
//! - `RelaykeyError` — unified error type for provider selection, credential
//!   lookup and the delegated gateway call
//! - `Result<T>` — convenience alias

/// Unified error type for all relaykey crates.
#[derive(Debug, thiserror::Error)]
pub enum RelaykeyError {
    // === Selection / credential errors (raised before any network call) ===
    #[error("Unsupported provider: {name}")]
    UnsupportedProvider { name: String },

    #[error(
        "No virtual key found for provider: {provider}. Please set {env_var} in your .env.local file."
    )]
    MissingVirtualKey { provider: String, env_var: String },

    #[error("No gateway API key found. Please set {env_var} in your .env.local file.")]
    MissingApiKey { env_var: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // === Gateway errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout { provider: String, timeout_ms: u64 },

    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RelaykeyError {
    /// Returns `true` if the error is transient and the call may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelaykeyError::RateLimited { .. }
                | RelaykeyError::RequestTimeout { .. }
                | RelaykeyError::ProviderError { retryable: true, .. }
        )
    }

    /// Returns `true` if the error is permanent and repeating the call will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RelaykeyError::UnsupportedProvider { .. }
                | RelaykeyError::MissingVirtualKey { .. }
                | RelaykeyError::MissingApiKey { .. }
                | RelaykeyError::AuthError { .. }
                | RelaykeyError::ConfigError(_)
        )
    }
}

/// A convenience alias for `Result<T, RelaykeyError>`.
pub type Result<T> = std::result::Result<T, RelaykeyError>;
