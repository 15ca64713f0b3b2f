//! Gateway credentials and endpoint settings sourced from the environment.
//!
//! # Environment Variables
//!
//! - `PORTKEY_API_KEY`: gateway account key (required)
//! - `PORTKEY_VIRTUAL_KEY_GOOGLE`, `PORTKEY_VIRTUAL_KEY_OPENAI`,
//!   `PORTKEY_VIRTUAL_KEY_ANTHROPIC`, `PORTKEY_VIRTUAL_KEY_GROQ`: per-provider
//!   virtual keys
//! - `PORTKEY_BASE_URL`: optional endpoint override
//!
//! Values are usually kept in `.env.local`; see [`load_env_file`].

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use relaykey_types::{RelaykeyError, Result};

use crate::Provider;

pub const DEFAULT_BASE_URL: &str = "https://api.portkey.ai/v1";
pub const DEFAULT_ENV_FILE: &str = ".env.local";
pub const API_KEY_ENV: &str = "PORTKEY_API_KEY";
pub const BASE_URL_ENV: &str = "PORTKEY_BASE_URL";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Loads `path` into the process environment. Variables that are already set
/// keep their value. Returns `false` when the file does not exist.
pub fn load_env_file(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    match dotenvy::from_path(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Loaded env file");
            Ok(true)
        }
        Err(e) if e.not_found() => {
            tracing::debug!(path = %path.display(), "Env file not found, using process environment");
            Ok(false)
        }
        Err(e) => Err(RelaykeyError::ConfigError(format!(
            "failed to load {}: {e}",
            path.display()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// The pair of keys sent to the gateway for one provider.
#[derive(Clone)]
pub struct Credentials {
    pub provider: Provider,
    pub api_key: String,
    pub virtual_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("virtual_key", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// GatewayConfig
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct GatewayConfig {
    api_key: Option<String>,
    base_url: String,
    virtual_keys: HashMap<Provider, String>,
    timeout: Duration,
}

impl GatewayConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: non_empty(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            virtual_keys: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Reads every gateway variable from the process environment. Missing keys
    /// are not an error here; they surface when a provider is used.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self {
            api_key: lookup(API_KEY_ENV).and_then(non_empty),
            base_url: lookup(BASE_URL_ENV)
                .and_then(non_empty)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            virtual_keys: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        };
        for provider in Provider::ALL {
            if let Some(key) = lookup(provider.virtual_key_env()).and_then(non_empty) {
                config.virtual_keys.insert(provider, key);
            }
        }
        config
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_virtual_key(mut self, provider: Provider, key: impl Into<String>) -> Self {
        match non_empty(key.into()) {
            Some(key) => {
                self.virtual_keys.insert(provider, key);
            }
            None => {
                self.virtual_keys.remove(&provider);
            }
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_virtual_key(&self, provider: Provider) -> bool {
        self.virtual_keys.contains_key(&provider)
    }

    pub fn virtual_key(&self, provider: Provider) -> Result<&str> {
        self.virtual_keys
            .get(&provider)
            .map(String::as_str)
            .ok_or_else(|| RelaykeyError::MissingVirtualKey {
                provider: provider.to_string(),
                env_var: provider.virtual_key_env().to_string(),
            })
    }

    /// Resolves the keys for `provider`. Every request goes through here, so a
    /// provider without a virtual key never reaches the network.
    pub fn credentials(&self, provider: Provider) -> Result<Credentials> {
        let virtual_key = self.virtual_key(provider)?.to_string();
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| RelaykeyError::MissingApiKey {
                env_var: API_KEY_ENV.to_string(),
            })?;
        Ok(Credentials {
            provider,
            api_key,
            virtual_key,
        })
    }

    /// Providers that currently have a virtual key, in canonical order.
    pub fn configured_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.has_virtual_key(*p))
            .collect()
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("providers", &self.configured_providers())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
