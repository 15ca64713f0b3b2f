use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use relaykey_types::{RelaykeyError, Result};

use crate::{
    CompletionBackend, GatewayConfig, HttpGateway, Message, ModelCatalog, Provider, Request,
    Response, ToolChoice, ToolDefinition,
};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const IMAGE_MAX_TOKENS: u32 = 500;
pub const FUNCTION_DEFAULT_MODEL: &str = "gpt-4o";

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

pub trait Middleware: Send + Sync {
    fn before(&self, _provider: Provider, _request: &mut Request) {}
    fn after(&self, _provider: Provider, _request: &Request, _response: &mut Response) {}
}

// ---------------------------------------------------------------------------
// Built-in middleware: LoggingMiddleware
// ---------------------------------------------------------------------------

pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before(&self, provider: Provider, request: &mut Request) {
        tracing::info!(
            provider = %provider,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "LLM request"
        );
    }

    fn after(&self, provider: Provider, _request: &Request, response: &mut Response) {
        tracing::info!(
            provider = %provider,
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            finish = ?response.finish_reason,
            "LLM response"
        );
    }
}

// ---------------------------------------------------------------------------
// Built-in middleware: UsageTrackingMiddleware
// ---------------------------------------------------------------------------

/// Accumulates token counts across calls. Clones share the same counters.
#[derive(Clone)]
pub struct UsageTrackingMiddleware {
    total_input: Arc<AtomicU64>,
    total_output: Arc<AtomicU64>,
    calls: Arc<AtomicU64>,
}

impl UsageTrackingMiddleware {
    pub fn new() -> Self {
        Self {
            total_input: Arc::new(AtomicU64::new(0)),
            total_output: Arc::new(AtomicU64::new(0)),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.total_input.load(Ordering::Relaxed)
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.total_output.load(Ordering::Relaxed)
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for UsageTrackingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for UsageTrackingMiddleware {
    fn after(&self, _provider: Provider, _request: &Request, response: &mut Response) {
        self.total_input
            .fetch_add(response.usage.input_tokens, Ordering::Relaxed);
        self.total_output
            .fetch_add(response.usage.output_tokens, Ordering::Relaxed);
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// GatewayClient
// ---------------------------------------------------------------------------

pub struct GatewayClient {
    config: GatewayConfig,
    backend: Box<dyn CompletionBackend>,
    model_catalog: ModelCatalog,
    middleware: Vec<Box<dyn Middleware>>,
}

impl GatewayClient {
    /// Client that talks to the gateway over HTTP.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let backend = HttpGateway::from_config(&config)?;
        Ok(Self::with_backend(config, backend))
    }

    pub fn with_backend(config: GatewayConfig, backend: impl CompletionBackend + 'static) -> Self {
        Self {
            config,
            backend: Box::new(backend),
            model_catalog: ModelCatalog::new(),
            middleware: Vec::new(),
        }
    }

    /// Reads credentials from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::new(GatewayConfig::from_env())
    }

    pub fn with_middleware(mut self, m: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(m));
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn model_catalog(&self) -> &ModelCatalog {
        &self.model_catalog
    }

    /// Sends `request` to `provider` through the gateway. Credentials are
    /// resolved first; a provider without a virtual key never reaches the backend.
    /// Every failure is logged here once, then returned.
    pub async fn complete(&self, provider: Provider, request: &Request) -> Result<Response> {
        match self.dispatch(provider, request).await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                tracing::error!(
                    provider = %provider,
                    model = %request.model,
                    backend = self.backend.name(),
                    error = %e,
                    "Error generating completion"
                );
                Err(e)
            }
        }
    }

    async fn dispatch(&self, provider: Provider, request: &Request) -> Result<Response> {
        let credentials = self.config.credentials(provider)?;
        let mut req = request.clone();

        for m in &self.middleware {
            m.before(provider, &mut req);
        }

        let mut resp = self.backend.complete(&credentials, &req).await?;

        for m in &self.middleware {
            m.after(provider, &req, &mut resp);
        }

        Ok(resp)
    }

    /// Infers the provider from a catalogued model name.
    pub fn provider_for_model(&self, model: &str) -> Result<Provider> {
        self.model_catalog
            .provider_for_model(model)
            .ok_or_else(|| RelaykeyError::Other(format!("No provider known for model '{model}'")))
    }

    /// Picks the provider for a call: an explicit provider wins, then the
    /// catalogue entry for `model`, then `fallback`.
    pub fn resolve_provider(
        &self,
        explicit: Option<Provider>,
        model: Option<&str>,
        fallback: Provider,
    ) -> Provider {
        if let Some(provider) = explicit {
            return provider;
        }
        match model {
            Some(model) => match self.provider_for_model(model) {
                Ok(provider) => provider,
                Err(_) => {
                    tracing::debug!(model, fallback = %fallback, "Model not in catalog");
                    fallback
                }
            },
            None => fallback,
        }
    }

    /// Single-turn completion with the standard system prompt. `model` falls
    /// back to the provider's default and `max_tokens` to 1024.
    pub async fn generate_completion(
        &self,
        prompt: &str,
        provider: Provider,
        model: Option<&str>,
        max_tokens: Option<u32>,
    ) -> Result<Response> {
        let model = model.unwrap_or_else(|| provider.default_model());
        let request = Request::new(
            model,
            vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
        )
        .with_max_tokens(max_tokens.unwrap_or(DEFAULT_MAX_TOKENS));

        self.complete(provider, &request).await
    }

    /// Completion with function calling enabled. Always routed to OpenAI.
    pub async fn generate_function_completion(
        &self,
        prompt: &str,
        functions: Vec<ToolDefinition>,
        model: Option<&str>,
    ) -> Result<Response> {
        let model = model.unwrap_or(FUNCTION_DEFAULT_MODEL);
        if let Some(info) = self.model_catalog.lookup(model) {
            if !info.supports_tools {
                tracing::warn!(model, "Model is not known to support function calling");
            }
        }

        let request = Request::new(
            model,
            vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
        )
        .with_max_tokens(DEFAULT_MAX_TOKENS)
        .with_tools(functions, ToolChoice::Auto);

        self.complete(Provider::OpenAi, &request).await
    }

    /// Completion over an image URL plus a text prompt.
    pub async fn generate_image_completion(
        &self,
        image_url: &str,
        prompt: &str,
        provider: Provider,
        model: Option<&str>,
    ) -> Result<Response> {
        let model = model.unwrap_or_else(|| provider.default_model());
        if let Some(info) = self.model_catalog.lookup(model) {
            if !info.supports_vision {
                tracing::warn!(model, "Model is not known to accept image input");
            }
        }

        let request = Request::new(
            model,
            vec![
                Message::system(SYSTEM_PROMPT),
                Message::user_with_image(image_url, prompt),
            ],
        )
        .with_max_tokens(IMAGE_MAX_TOKENS);

        self.complete(provider, &request).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContentPart, Credentials, FinishReason, Usage};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingBackend {
        calls: Arc<AtomicUsize>,
        last: Arc<Mutex<Option<(Credentials, Request)>>>,
        fail: bool,
    }

    #[async_trait]
    impl CompletionBackend for RecordingBackend {
        async fn complete(
            &self,
            credentials: &Credentials,
            request: &Request,
        ) -> std::result::Result<Response, RelaykeyError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            *self.last.lock().unwrap() = Some((credentials.clone(), request.clone()));
            if self.fail {
                return Err(RelaykeyError::ProviderError {
                    provider: credentials.provider.to_string(),
                    status: 503,
                    message: "unavailable".into(),
                    retryable: true,
                });
            }
            Ok(Response {
                id: "mock-resp".into(),
                text: Some("Hello from mock".into()),
                tool_calls: vec![],
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 20,
                    total_tokens: 30,
                },
                model: request.model.clone(),
                finish_reason: FinishReason::EndTurn,
            })
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    impl RecordingBackend {
        fn last_request(&self) -> Request {
            self.last.lock().unwrap().as_ref().unwrap().1.clone()
        }

        fn last_credentials(&self) -> Credentials {
            self.last.lock().unwrap().as_ref().unwrap().0.clone()
        }
    }

    fn full_config() -> GatewayConfig {
        Provider::ALL
            .into_iter()
            .fold(GatewayConfig::new("pk-test"), |config, p| {
                config.with_virtual_key(p, format!("vk-{p}"))
            })
    }

    #[tokio::test]
    async fn generate_completion_applies_defaults() {
        let backend = RecordingBackend::default();
        let client = GatewayClient::with_backend(full_config(), backend.clone());

        let resp = client
            .generate_completion("Explain quantum computing", Provider::Google, None, None)
            .await
            .unwrap();
        assert_eq!(resp.text.as_deref(), Some("Hello from mock"));

        let req = backend.last_request();
        assert_eq!(req.model, "gemini-1.5-pro");
        assert_eq!(req.max_tokens, Some(1024));
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].text_content(), SYSTEM_PROMPT);
        assert_eq!(req.messages[1].text_content(), "Explain quantum computing");
        assert!(req.tools.is_empty());

        let creds = backend.last_credentials();
        assert_eq!(creds.provider, Provider::Google);
        assert_eq!(creds.api_key, "pk-test");
        assert_eq!(creds.virtual_key, "vk-google");
    }

    #[tokio::test]
    async fn generate_completion_honours_explicit_model_and_tokens() {
        let backend = RecordingBackend::default();
        let client = GatewayClient::with_backend(full_config(), backend.clone());

        client
            .generate_completion("poem", Provider::Google, Some("gemini-1.5-flash"), Some(300))
            .await
            .unwrap();

        let req = backend.last_request();
        assert_eq!(req.model, "gemini-1.5-flash");
        assert_eq!(req.max_tokens, Some(300));
    }

    #[tokio::test]
    async fn missing_virtual_key_never_reaches_backend() {
        let backend = RecordingBackend::default();
        let config = GatewayConfig::new("pk-test").with_virtual_key(Provider::OpenAi, "vk");
        let client = GatewayClient::with_backend(config, backend.clone());

        let err = client
            .generate_completion("hi", Provider::Groq, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelaykeyError::MissingVirtualKey { .. }));
        assert_eq!(backend.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn function_completion_routes_to_openai_with_tools() {
        let backend = RecordingBackend::default();
        let client = GatewayClient::with_backend(full_config(), backend.clone());

        let tool = ToolDefinition {
            name: "get_weather".into(),
            description: "Get the current weather".into(),
            parameters: serde_json::json!({"type": "object"}),
        };
        client
            .generate_function_completion("Weather in Boston?", vec![tool], None)
            .await
            .unwrap();

        let req = backend.last_request();
        assert_eq!(req.model, "gpt-4o");
        assert_eq!(req.max_tokens, Some(1024));
        assert_eq!(req.tools.len(), 1);
        assert_eq!(req.tool_choice, Some(ToolChoice::Auto));
        assert_eq!(backend.last_credentials().provider, Provider::OpenAi);
    }

    #[tokio::test]
    async fn image_completion_builds_multimodal_message() {
        let backend = RecordingBackend::default();
        let client = GatewayClient::with_backend(full_config(), backend.clone());

        client
            .generate_image_completion(
                "https://example.com/cat.png",
                "What is in this image?",
                Provider::Google,
                None,
            )
            .await
            .unwrap();

        let req = backend.last_request();
        assert_eq!(req.model, "gemini-1.5-pro");
        assert_eq!(req.max_tokens, Some(500));
        let user = &req.messages[1];
        assert!(matches!(user.content[0], ContentPart::ImageUrl { .. }));
        assert_eq!(user.text_content(), "What is in this image?");
    }

    #[tokio::test]
    async fn backend_errors_propagate_unchanged() {
        let backend = RecordingBackend {
            fail: true,
            ..Default::default()
        };
        let client = GatewayClient::with_backend(full_config(), backend.clone());

        let err = client
            .generate_completion("hi", Provider::Anthropic, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelaykeyError::ProviderError { status: 503, .. }));
        assert!(err.is_retryable());
        assert_eq!(backend.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn middleware_before_after_called() {
        let before_count = Arc::new(AtomicUsize::new(0));
        let after_count = Arc::new(AtomicUsize::new(0));

        struct CountingMiddleware {
            before_count: Arc<AtomicUsize>,
            after_count: Arc<AtomicUsize>,
        }

        impl Middleware for CountingMiddleware {
            fn before(&self, _provider: Provider, request: &mut Request) {
                self.before_count.fetch_add(1, Ordering::Relaxed);
                request.temperature = Some(0.0);
            }
            fn after(&self, _provider: Provider, _request: &Request, _response: &mut Response) {
                self.after_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        let backend = RecordingBackend::default();
        let client = GatewayClient::with_backend(full_config(), backend.clone()).with_middleware(
            CountingMiddleware {
                before_count: before_count.clone(),
                after_count: after_count.clone(),
            },
        );

        client
            .generate_completion("hi", Provider::OpenAi, None, None)
            .await
            .unwrap();

        assert_eq!(before_count.load(Ordering::Relaxed), 1);
        assert_eq!(after_count.load(Ordering::Relaxed), 1);
        assert_eq!(backend.last_request().temperature, Some(0.0));
    }

    #[tokio::test]
    async fn usage_tracking_accumulates() {
        let usage = UsageTrackingMiddleware::new();
        let client = GatewayClient::with_backend(full_config(), RecordingBackend::default())
            .with_middleware(usage.clone())
            .with_middleware(LoggingMiddleware);

        client
            .generate_completion("hi", Provider::Groq, None, None)
            .await
            .unwrap();
        assert_eq!(usage.total_input_tokens(), 10);
        assert_eq!(usage.total_output_tokens(), 20);

        client
            .generate_completion("again", Provider::Groq, None, None)
            .await
            .unwrap();
        assert_eq!(usage.total_input_tokens(), 20);
        assert_eq!(usage.total_output_tokens(), 40);
        assert_eq!(usage.calls(), 2);
    }

    #[tokio::test]
    async fn credential_failures_surface_through_complete() {
        let backend = RecordingBackend::default();
        let client = GatewayClient::with_backend(GatewayConfig::new("pk"), backend.clone());
        let req = Request::new("gpt-4o", vec![Message::user("hi")]);

        let err = client.complete(Provider::OpenAi, &req).await.unwrap_err();
        assert!(matches!(err, RelaykeyError::MissingVirtualKey { .. }));
        assert_eq!(backend.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn resolve_provider_prefers_explicit_then_catalog_then_fallback() {
        let client = GatewayClient::with_backend(full_config(), RecordingBackend::default());

        assert_eq!(
            client.resolve_provider(
                Some(Provider::Groq),
                Some("claude-3-opus-20240229"),
                Provider::OpenAi
            ),
            Provider::Groq
        );
        assert_eq!(
            client.resolve_provider(None, Some("claude-3-opus-20240229"), Provider::OpenAi),
            Provider::Anthropic
        );
        assert_eq!(
            client.resolve_provider(None, Some("gemini-1.5-flash"), Provider::OpenAi),
            Provider::Google
        );
        assert_eq!(
            client.resolve_provider(None, Some("my-fine-tune"), Provider::OpenAi),
            Provider::OpenAi
        );
        assert_eq!(
            client.resolve_provider(None, None, Provider::Google),
            Provider::Google
        );
    }

    #[tokio::test]
    async fn inferred_provider_selects_matching_virtual_key() {
        let backend = RecordingBackend::default();
        let client = GatewayClient::with_backend(full_config(), backend.clone());

        let model = "claude-3-opus-20240229";
        let provider = client.resolve_provider(None, Some(model), Provider::OpenAi);
        client
            .generate_completion("hi", provider, Some(model), None)
            .await
            .unwrap();

        let creds = backend.last_credentials();
        assert_eq!(creds.provider, Provider::Anthropic);
        assert_eq!(creds.virtual_key, "vk-anthropic");
        assert_eq!(backend.last_request().model, model);
    }

    #[test]
    fn provider_for_model_uses_catalog() {
        let client = GatewayClient::with_backend(full_config(), RecordingBackend::default());
        assert_eq!(
            client.provider_for_model("claude-3-opus-20240229").unwrap(),
            Provider::Anthropic
        );
        assert!(client.provider_for_model("mystery-model").is_err());
    }
}
