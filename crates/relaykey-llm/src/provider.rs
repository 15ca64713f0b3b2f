use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use relaykey_types::RelaykeyError;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Upstream model providers reachable through the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Groq,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Google,
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Groq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Groq => "groq",
        }
    }

    /// Model used when the caller does not name one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Google => "gemini-1.5-pro",
            Provider::OpenAi => "gpt-4o",
            Provider::Anthropic => "claude-3-opus-20240229",
            Provider::Groq => "llama3-70b-8192",
        }
    }

    /// Smaller or faster sibling of the default model.
    pub fn alternate_model(&self) -> &'static str {
        match self {
            Provider::Google => "gemini-1.5-flash",
            Provider::OpenAi => "gpt-4-turbo",
            Provider::Anthropic => "claude-3-sonnet-20240229",
            Provider::Groq => "llama3-8b-8192",
        }
    }

    /// Environment variable holding this provider's gateway virtual key.
    pub fn virtual_key_env(&self) -> &'static str {
        match self {
            Provider::Google => "PORTKEY_VIRTUAL_KEY_GOOGLE",
            Provider::OpenAi => "PORTKEY_VIRTUAL_KEY_OPENAI",
            Provider::Anthropic => "PORTKEY_VIRTUAL_KEY_ANTHROPIC",
            Provider::Groq => "PORTKEY_VIRTUAL_KEY_GROQ",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = RelaykeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google" | "gemini" => Ok(Provider::Google),
            "openai" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "groq" => Ok(Provider::Groq),
            _ => Err(RelaykeyError::UnsupportedProvider { name: s.to_string() }),
        }
    }
}

// ---------------------------------------------------------------------------
// ModelInfo / ModelCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub id: String,
    pub provider: Provider,
    pub context_window: usize,
    pub supports_tools: bool,
    pub supports_vision: bool,
}

/// Known model ids, used to infer a provider from a bare model name.
pub struct ModelCatalog {
    models: HashMap<String, ModelInfo>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        let mut models = HashMap::new();

        let entries: [(&str, Provider, usize, bool, bool); 10] = [
            ("gemini-1.5-pro", Provider::Google, 2_000_000, true, true),
            ("gemini-1.5-flash", Provider::Google, 1_000_000, true, true),
            ("gpt-4o", Provider::OpenAi, 128_000, true, true),
            ("gpt-4-turbo", Provider::OpenAi, 128_000, true, true),
            ("gpt-4o-mini", Provider::OpenAi, 128_000, true, true),
            ("claude-3-opus-20240229", Provider::Anthropic, 200_000, true, true),
            ("claude-3-sonnet-20240229", Provider::Anthropic, 200_000, true, true),
            ("claude-3-haiku-20240307", Provider::Anthropic, 200_000, true, true),
            ("llama3-70b-8192", Provider::Groq, 8_192, true, false),
            ("llama3-8b-8192", Provider::Groq, 8_192, true, false),
        ];

        for (id, provider, context_window, supports_tools, supports_vision) in entries {
            models.insert(
                id.to_string(),
                ModelInfo {
                    id: id.to_string(),
                    provider,
                    context_window,
                    supports_tools,
                    supports_vision,
                },
            );
        }

        Self { models }
    }

    pub fn lookup(&self, model: &str) -> Option<&ModelInfo> {
        self.models.get(model)
    }

    pub fn provider_for_model(&self, model: &str) -> Option<Provider> {
        self.models.get(model).map(|m| m.provider)
    }

    /// All catalogued models for one provider, sorted by id.
    pub fn models_for(&self, provider: Provider) -> Vec<&ModelInfo> {
        let mut found: Vec<&ModelInfo> = self
            .models
            .values()
            .filter(|m| m.provider == provider)
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_providers() {
        assert_eq!("google".parse::<Provider>().unwrap(), Provider::Google);
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!("anthropic".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert_eq!(" groq ".parse::<Provider>().unwrap(), Provider::Groq);
        assert_eq!("gemini".parse::<Provider>().unwrap(), Provider::Google);
        assert_eq!("claude".parse::<Provider>().unwrap(), Provider::Anthropic);
    }

    #[test]
    fn parse_unknown_provider_is_rejected() {
        let err = "mistral".parse::<Provider>().unwrap_err();
        assert!(
            matches!(err, RelaykeyError::UnsupportedProvider { ref name } if name == "mistral")
        );
        assert_eq!(err.to_string(), "Unsupported provider: mistral");
        assert!("".parse::<Provider>().is_err());
    }

    #[test]
    fn default_models() {
        assert_eq!(Provider::Google.default_model(), "gemini-1.5-pro");
        assert_eq!(Provider::OpenAi.default_model(), "gpt-4o");
        assert_eq!(
            Provider::Anthropic.default_model(),
            "claude-3-opus-20240229"
        );
        assert_eq!(Provider::Groq.default_model(), "llama3-70b-8192");
    }

    #[test]
    fn alternate_models() {
        assert_eq!(Provider::Google.alternate_model(), "gemini-1.5-flash");
        assert_eq!(Provider::OpenAi.alternate_model(), "gpt-4-turbo");
        assert_eq!(
            Provider::Anthropic.alternate_model(),
            "claude-3-sonnet-20240229"
        );
        assert_eq!(Provider::Groq.alternate_model(), "llama3-8b-8192");
    }

    #[test]
    fn virtual_key_env_matches_upper_name() {
        for provider in Provider::ALL {
            assert_eq!(
                provider.virtual_key_env(),
                format!("PORTKEY_VIRTUAL_KEY_{}", provider.as_str().to_uppercase())
            );
        }
    }

    #[test]
    fn default_provider_is_openai() {
        assert_eq!(Provider::default(), Provider::OpenAi);
    }

    #[test]
    fn display_and_serde_use_canonical_id() {
        assert_eq!(Provider::OpenAi.to_string(), "openai");
        assert_eq!(
            serde_json::to_string(&Provider::OpenAi).unwrap(),
            "\"openai\""
        );
        let back: Provider = serde_json::from_str("\"groq\"").unwrap();
        assert_eq!(back, Provider::Groq);
    }

    #[test]
    fn catalog_covers_every_default_and_alternate_model() {
        let catalog = ModelCatalog::new();
        for provider in Provider::ALL {
            assert_eq!(
                catalog.provider_for_model(provider.default_model()),
                Some(provider)
            );
            assert_eq!(
                catalog.provider_for_model(provider.alternate_model()),
                Some(provider)
            );
        }
        assert!(catalog.lookup("nonexistent-model").is_none());
    }

    #[test]
    fn catalog_models_for_provider_sorted() {
        let catalog = ModelCatalog::new();
        let groq: Vec<&str> = catalog
            .models_for(Provider::Groq)
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(groq, vec!["llama3-70b-8192", "llama3-8b-8192"]);
        assert!(!catalog.lookup("llama3-8b-8192").unwrap().supports_vision);
    }
}
