//! # IdeaForge Models
//!
//! Centralized LLM configuration types and the language-model client seam.
//!
//! Stage agents never talk to a provider directly: they hold an
//! `Arc<dyn LanguageModelClient>` and only ever ask it to turn a system
//! prompt and a user prompt into text, optionally letting the model call
//! tools first. `ProviderLanguageModel` is the production implementation
//! on top of radkit's provider clients; tests inject scripted doubles.

use async_trait::async_trait;
use radkit::agent::{LlmFunction, LlmWorker};
use radkit::macros::LLMOutput;
use radkit::models::providers::{
    AnthropicLlm, DeepSeekLlm, GeminiLlm, GrokLlm, OpenAILlm, OpenRouterLlm,
};
use radkit::models::BaseLlm;
use radkit::tools::FunctionTool;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Supported LLM providers
///
/// Each provider reads its API key from an environment variable:
/// - Anthropic (Claude) - `ANTHROPIC_API_KEY`
/// - OpenAI (GPT) - `OPENAI_API_KEY`
/// - Gemini (Google) - `GEMINI_API_KEY`
/// - OpenRouter (Gateway) - `OPENROUTER_API_KEY`
/// - Grok (xAI) - `XAI_API_KEY`
/// - DeepSeek - `DEEPSEEK_API_KEY`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
    Gemini,
    OpenRouter,
    Grok,
    DeepSeek,
}

impl LlmProvider {
    /// Get all available providers
    pub fn all() -> Vec<LlmProvider> {
        vec![
            LlmProvider::Anthropic,
            LlmProvider::OpenAI,
            LlmProvider::Gemini,
            LlmProvider::OpenRouter,
            LlmProvider::Grok,
            LlmProvider::DeepSeek,
        ]
    }

    /// Display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::OpenAI => "OpenAI",
            LlmProvider::Gemini => "Gemini",
            LlmProvider::OpenRouter => "OpenRouter",
            LlmProvider::Grok => "Grok",
            LlmProvider::DeepSeek => "DeepSeek",
        }
    }

    /// Whether this provider supports custom base URL
    pub fn supports_base_url(&self) -> bool {
        matches!(self, LlmProvider::OpenAI)
    }

    /// Environment variable holding the provider's API key
    pub fn env_var(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::OpenAI => "OPENAI_API_KEY",
            LlmProvider::Gemini => "GEMINI_API_KEY",
            LlmProvider::OpenRouter => "OPENROUTER_API_KEY",
            LlmProvider::Grok => "XAI_API_KEY",
            LlmProvider::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }

    /// Default model for the provider
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "claude-sonnet-4-20250514",
            LlmProvider::OpenAI => "gpt-4o",
            LlmProvider::Gemini => "gemini-2.0-flash",
            LlmProvider::OpenRouter => "anthropic/claude-3.5-sonnet",
            LlmProvider::Grok => "grok-2",
            LlmProvider::DeepSeek => "deepseek-chat",
        }
    }

    /// Parse a provider from its lowercase identifier
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Some(Self::Anthropic),
            "openai" => Some(Self::OpenAI),
            "gemini" => Some(Self::Gemini),
            "openrouter" => Some(Self::OpenRouter),
            "grok" => Some(Self::Grok),
            "deepseek" => Some(Self::DeepSeek),
            _ => None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

/// Configuration for LLM model selection
///
/// ## Example
/// ```rust,ignore
/// use ideaforge_core::models::{LlmProvider, ModelConfig, ProviderLanguageModel};
///
/// let config = ModelConfig::with_provider(LlmProvider::OpenAI, "gpt-4o");
/// if config.is_configured() {
///     let llm = ProviderLanguageModel::new(config)?;
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// LLM provider to use
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name (e.g., "claude-sonnet-4-20250514", "gpt-4o")
    pub model: String,
    /// Optional base URL override for OpenAI-compatible APIs
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-call timeout; a timed-out call is an ordinary failure
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::with_provider(LlmProvider::Anthropic, LlmProvider::Anthropic.default_model())
    }
}

impl ModelConfig {
    /// Create a new model config with default provider (Anthropic)
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_provider(LlmProvider::Anthropic, model)
    }

    /// Create config for a specific provider
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Set base URL (for OpenAI-compatible endpoints)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// API key from the provider's environment variable, if set and non-blank
    pub fn api_key(&self) -> Option<String> {
        std::env::var(self.provider.env_var())
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    /// Whether a model backend is reachable at all.
    ///
    /// This is the single capability check that decides between a real
    /// analysis and the mock analysis.
    pub fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }
}

/// Errors raised by the provider-backed model client
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{0} is not set")]
    MissingApiKey(&'static str),
    #[error("{provider} request failed: {message}")]
    Request {
        provider: &'static str,
        message: String,
    },
    #[error("{provider} did not answer within {secs}s")]
    Timeout { provider: &'static str, secs: u64 },
    #[error("{0} returned an empty completion")]
    EmptyCompletion(&'static str),
    #[error("this model client cannot call tools")]
    ToolsUnsupported,
}

/// The only capability stage agents need from a model backend.
///
/// Implementations must treat a timeout like any other failure and return
/// an error rather than hang.
#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    /// Given a system prompt and a user prompt, return the model's text.
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String>;

    /// Like `chat`, but the model may call `tools` before it answers.
    async fn chat_with_tools(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        tools: Vec<FunctionTool>,
    ) -> anyhow::Result<String> {
        let _ = (system_prompt, user_prompt, tools);
        Err(LlmError::ToolsUnsupported.into())
    }
}

/// Structured reply every stage asks the model for.
///
/// Stage prompts describe the JSON document they expect; the decoders in
/// `skills::llm_helpers` validate it field by field afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct ModelReply {
    /// The complete answer the instructions ask for, as a JSON document
    pub answer: Value,
}

impl ModelReply {
    /// Reply as text for the JSON decoders
    pub fn into_text(self) -> String {
        match self.answer {
            Value::String(text) => text,
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Build the concrete radkit client for `$config` and evaluate `$body`
/// with it bound to `$llm`. Each provider is a distinct type, so the
/// runners below are generic rather than boxed.
macro_rules! with_provider_llm {
    ($config:expr, |$llm:ident| $body:expr) => {{
        let config: &ModelConfig = $config;
        match config.provider {
            LlmProvider::Anthropic => {
                let $llm = AnthropicLlm::from_env(&config.model)?;
                $body
            }
            LlmProvider::OpenAI => {
                let mut $llm = OpenAILlm::from_env(&config.model)?;
                if let Some(base_url) = &config.base_url {
                    $llm = $llm.with_base_url(base_url);
                }
                $body
            }
            LlmProvider::Gemini => {
                let $llm = GeminiLlm::from_env(&config.model)?;
                $body
            }
            LlmProvider::OpenRouter => {
                let $llm = OpenRouterLlm::from_env(&config.model)?;
                $body
            }
            LlmProvider::Grok => {
                let $llm = GrokLlm::from_env(&config.model)?;
                $body
            }
            LlmProvider::DeepSeek => {
                let $llm = DeepSeekLlm::from_env(&config.model)?;
                $body
            }
        }
    }};
}

async fn call_provider(
    config: &ModelConfig,
    system_prompt: &str,
    user_prompt: &str,
) -> anyhow::Result<ModelReply> {
    with_provider_llm!(config, |llm| {
        run_function(llm, system_prompt, user_prompt).await
    })
}

async fn call_provider_with_tools(
    config: &ModelConfig,
    system_prompt: &str,
    user_prompt: &str,
    tools: Vec<FunctionTool>,
) -> anyhow::Result<ModelReply> {
    with_provider_llm!(config, |llm| {
        run_with_tools(llm, system_prompt, user_prompt, tools).await
    })
}

/// One structured call with no tools
async fn run_function<L: BaseLlm + 'static>(
    llm: L,
    system_prompt: &str,
    user_prompt: &str,
) -> anyhow::Result<ModelReply> {
    let function = LlmFunction::<ModelReply>::new_with_system_instructions(llm, system_prompt);
    function.run(user_prompt.to_string()).await.map_err(Into::into)
}

/// Run the LlmWorker with tools for any concrete LLM type
async fn run_with_tools<L: BaseLlm + 'static>(
    llm: L,
    system_prompt: &str,
    user_prompt: &str,
    tools: Vec<FunctionTool>,
) -> anyhow::Result<ModelReply> {
    let mut builder = LlmWorker::<ModelReply>::builder(llm).with_system_instructions(system_prompt);
    for tool in tools {
        builder = builder.with_tool(tool);
    }
    let worker = builder.build();
    let reply = worker.run(user_prompt).await?;
    Ok(reply)
}

/// Replace every occurrence of `secret` in `message`
fn redact(message: &str, secret: &str) -> String {
    if secret.is_empty() {
        return message.to_string();
    }
    message.replace(secret, "[redacted]")
}

/// radkit-backed client for every supported provider
pub struct ProviderLanguageModel {
    config: ModelConfig,
}

impl ProviderLanguageModel {
    /// Build a client; fails when the provider's API key is not set
    pub fn new(config: ModelConfig) -> anyhow::Result<Self> {
        if !config.is_configured() {
            return Err(LlmError::MissingApiKey(config.provider.env_var()).into());
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Apply the call timeout and turn the reply into text.
    ///
    /// Provider errors are flattened into `LlmError::Request` with the API
    /// key scrubbed, since they end up in logs and stored error messages.
    async fn settle(
        &self,
        call: impl Future<Output = anyhow::Result<ModelReply>>,
    ) -> anyhow::Result<String> {
        let provider = self.config.provider.display_name();
        let secs = self.config.timeout_secs.max(1);

        let reply = match tokio::time::timeout(Duration::from_secs(secs), call).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                let message = format!("{:#}", e);
                let message = match self.config.api_key() {
                    Some(key) => redact(&message, &key),
                    None => message,
                };
                return Err(LlmError::Request { provider, message }.into());
            }
            Err(_) => return Err(LlmError::Timeout { provider, secs }.into()),
        };

        let text = reply.into_text();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyCompletion(provider).into());
        }
        Ok(text)
    }
}

#[async_trait]
impl LanguageModelClient for ProviderLanguageModel {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        let call = call_provider(&self.config, system_prompt, user_prompt);
        self.settle(call).await
    }

    async fn chat_with_tools(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        tools: Vec<FunctionTool>,
    ) -> anyhow::Result<String> {
        let call = call_provider_with_tools(&self.config, system_prompt, user_prompt, tools);
        self.settle(call).await
    }
}
