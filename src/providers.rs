use anyhow::{anyhow, Result};
use async_trait::async_trait;
use colored::*;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error_handling::{display_status, AllProvidersFailed, ProviderError, SessionExit};
use crate::i18n::I18n;
use crate::logging::{LogCategory, LogContext};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A chat-completion backend for one provider/model pair
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// `"<provider>/<model>"`
    fn key(&self) -> &str;

    /// Whether the endpoint accepts a `system` role message
    fn supports_system_prompt(&self) -> bool {
        true
    }

    async fn chat(&self, system_prompt: Option<&str>, user_content: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Any endpoint speaking the OpenAI `/chat/completions` protocol
pub struct OpenAICompatibleProvider {
    client: Client,
    key: String,
    endpoint: String,
    api_key: String,
    model: String,
    system_prompt: bool,
}

impl OpenAICompatibleProvider {
    pub fn new(
        provider: &str,
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
        http_proxy: Option<&str>,
    ) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT);
        if let Some(proxy) = http_proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let client = builder.build()?;

        Ok(Self::with_client(client, provider, base_url, api_key, model))
    }

    pub fn with_client(client: Client, provider: &str, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client,
            key: format!("{}/{}", provider, model),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
            system_prompt: true,
        }
    }

    pub fn with_system_prompt(mut self, supported: bool) -> Self {
        self.system_prompt = supported;
        self
    }
}

#[async_trait]
impl ChatProvider for OpenAICompatibleProvider {
    fn key(&self) -> &str {
        &self.key
    }

    fn supports_system_prompt(&self) -> bool {
        self.system_prompt
    }

    async fn chat(&self, system_prompt: Option<&str>, user_content: &str) -> Result<String, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
            messages.push(ChatMessage { role: "system", content: system });
        }
        messages.push(ChatMessage { role: "user", content: user_content });

        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }

        let body = response.text().await.map_err(map_transport_error)?;
        let parsed: ChatCompletionResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(ProviderError::Status {
                    code: status.as_u16(),
                    body: body.chars().take(200).collect(),
                })
            }
            Err(e) => return Err(ProviderError::Parse(e.to_string())),
        };

        if let Some(error) = parsed.error {
            return Err(ProviderError::Api(error.message));
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                code: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or(ProviderError::EmptyResponse)
    }
}

fn map_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(error.to_string())
    }
}

/// A successful fallback call
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    /// Key of the provider that answered
    pub key: String,
    /// Providers that failed before the answer, with their errors
    pub failures: Vec<(String, String)>,
}

/// Row of the status listing
#[derive(Debug, Clone, PartialEq)]
pub struct ModelStatus {
    pub key: String,
    pub enabled: bool,
    pub available: bool,
}

#[derive(Debug, Clone, Copy)]
struct ModelState {
    enabled: bool,
    /// Cleared by a 429; never set again in this process
    available: bool,
}

/// Ordered set of chat providers tried one after another
pub struct ProviderManager {
    providers: Vec<Box<dyn ChatProvider>>,
    states: Mutex<HashMap<String, ModelState>>,
}

impl ProviderManager {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Register every configured provider/model pair in file order
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut manager = Self::new();
        let timeout = Duration::from_secs(config.request_timeout_secs);

        for entry in config.model_entries() {
            let provider = OpenAICompatibleProvider::new(
                &entry.provider.name,
                &entry.provider.base_url,
                &entry.provider.api_key,
                entry.model,
                timeout,
                config.http_proxy.as_deref(),
            )?
            .with_system_prompt(entry.provider.system_prompt);
            manager.register(Box::new(provider), entry.enabled);
        }

        Ok(manager)
    }

    /// Add a provider at the end of the fallback order
    pub fn register(&mut self, provider: Box<dyn ChatProvider>, enabled: bool) {
        let key = provider.key().to_string();
        if let Ok(mut states) = self.states.lock() {
            states.insert(key, ModelState { enabled, available: true });
        }
        self.providers.push(provider);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.key().to_string()).collect()
    }

    pub fn has_enabled(&self) -> bool {
        self.status().iter().any(|s| s.enabled)
    }

    /// False once the provider has answered 429
    pub fn is_available(&self, key: &str) -> bool {
        self.state(key).map(|s| s.available).unwrap_or(false)
    }

    pub fn set_enabled(&self, key: &str, enabled: bool) -> Result<()> {
        let mut states = self
            .states
            .lock()
            .map_err(|_| anyhow!("Failed to acquire provider state lock"))?;
        let state = states
            .get_mut(key)
            .ok_or_else(|| anyhow!("Unknown model '{}'", key))?;
        state.enabled = enabled;
        Ok(())
    }

    pub fn status(&self) -> Vec<ModelStatus> {
        self.providers
            .iter()
            .filter_map(|p| {
                self.state(p.key()).map(|s| ModelStatus {
                    key: p.key().to_string(),
                    enabled: s.enabled,
                    available: s.available,
                })
            })
            .collect()
    }

    fn state(&self, key: &str) -> Option<ModelState> {
        self.states.lock().ok()?.get(key).copied()
    }

    fn mark_unavailable(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            if let Some(state) = states.get_mut(key) {
                state.available = false;
            }
        }
    }

    /// Ask each enabled, available provider in order until one answers.
    ///
    /// A 429 takes the provider out of rotation for the rest of the process. Every other failure
    /// only skips it for this call. Cancellation is checked before each attempt and also aborts
    /// an in-flight request, surfacing as `SessionExit::Abort`.
    pub async fn call_with_fallback(
        &self,
        cancel: &CancellationToken,
        system_prompt: &str,
        context: &str,
    ) -> Result<Reply> {
        let mut failures = Vec::new();

        for provider in &self.providers {
            let key = provider.key();
            match self.state(key) {
                Some(state) if state.enabled && state.available => {}
                _ => continue,
            }

            if cancel.is_cancelled() {
                return Err(SessionExit::Abort.into());
            }

            let (system, user_content): (Option<&str>, Cow<'_, str>) = if provider.supports_system_prompt() {
                (Some(system_prompt), Cow::Borrowed(context))
            } else {
                (None, Cow::Owned(fold_system_prompt(system_prompt, context)))
            };

            let started = Instant::now();
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(SessionExit::Abort.into()),
                result = provider.chat(system, &user_content) => result,
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(text) => {
                    crate::logging::with_logger(|l| l.log_provider_attempt(key, elapsed_ms, "success", true));
                    return Ok(Reply {
                        text,
                        key: key.to_string(),
                        failures,
                    });
                }
                Err(error) => {
                    let outcome = if error.is_rate_limited() {
                        self.mark_unavailable(key);
                        "rate limited, disabled for this run".to_string()
                    } else {
                        error.to_string()
                    };
                    crate::logging::with_logger(|l| l.log_provider_attempt(key, elapsed_ms, &outcome, false));
                    failures.push((key.to_string(), error.to_string()));
                }
            }
        }

        let failed = AllProvidersFailed {
            attempted: failures.len(),
            last_error: failures.last().map(|(_, e)| e.clone()),
        };
        crate::log_error!(
            LogCategory::Provider,
            failed.to_string(),
            LogContext::new("provider_manager").with_operation("call_with_fallback")
        );
        Err(failed.into())
    }

    /// Print the models in fallback order with their state
    pub fn display_status(&self, i18n: &I18n, default_model: Option<&str>) {
        println!("{}", i18n.t("llm.status_title").bold());
        for status in self.status() {
            let (label, healthy) = if !status.enabled {
                (i18n.t("llm.disabled"), false)
            } else if !status.available {
                (i18n.t("llm.unavailable"), false)
            } else {
                (i18n.t("llm.available"), true)
            };

            let name = if default_model == Some(status.key.as_str()) {
                format!("{} {}", status.key, i18n.t("llm.status_default"))
            } else {
                status.key.clone()
            };
            display_status(&name, &label, healthy);
        }
    }
}

impl Default for ProviderManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Single user message for endpoints without a `system` role
fn fold_system_prompt(system_prompt: &str, context: &str) -> String {
    if system_prompt.is_empty() {
        context.to_string()
    } else {
        format!("{}\n\n{}", system_prompt, context)
    }
}
