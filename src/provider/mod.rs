//! Provider Clients
//!
//! One completion attempt against one provider with one credential and one
//! model. The variant set is closed: [`CloudProvider`] and [`LocalProvider`],
//! chosen by [`ProviderKind`].

pub mod cloud;
pub mod local;

pub use cloud::CloudProvider;
pub use local::LocalProvider;

use crate::api::{CompletionParams, CompletionRequest, CompletionResponse, Message, Usage};
use crate::client::{header_map, HttpClient};
use crate::config::{ProviderConfig, ProviderKind};
use crate::context::CallContext;
use crate::error::ClassifiedError;
use crate::router::Credential;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::Duration;

/// Everything one attempt needs besides the caller context
#[derive(Debug, Clone, Copy)]
pub struct AttemptRequest<'a> {
    pub credential: Option<&'a Credential>,
    pub model: &'a str,
    pub messages: &'a [Message],
    pub params: &'a CompletionParams,
}

/// Text and token usage of a successful attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

impl Completion {
    pub fn new(text: impl Into<String>, usage: Usage) -> Self {
        Self {
            text: text.into(),
            usage,
        }
    }
}

/// Uniform completion contract over every provider
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Run exactly one attempt and classify its failure
    async fn complete(
        &self,
        ctx: &CallContext,
        attempt: AttemptRequest<'_>,
    ) -> Result<Completion, ClassifiedError>;
}

/// Build the client variant for a configured provider
pub fn build_client(name: &str, config: &ProviderConfig, http: HttpClient) -> Arc<dyn ProviderClient> {
    let endpoint = ChatEndpoint::new(name, config, http);
    match config.kind {
        ProviderKind::Cloud => Arc::new(CloudProvider::new(endpoint)),
        ProviderKind::Local => Arc::new(LocalProvider::new(endpoint)),
    }
}

/// OpenAI-compatible `/chat/completions` endpoint shared by both variants
#[derive(Debug, Clone)]
pub struct ChatEndpoint {
    name: String,
    url: String,
    headers: HeaderMap,
    timeout: Option<Duration>,
    config: ProviderConfig,
    http: HttpClient,
}

impl ChatEndpoint {
    pub fn new(name: &str, config: &ProviderConfig, http: HttpClient) -> Self {
        let base_url = config.get_base_url();
        Self {
            name: name.to_string(),
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            headers: header_map(&config.headers),
            timeout: config.timeout(),
            config: config.clone(),
            http,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request timeout, clipped to what is left of the caller's deadline
    fn effective_timeout(&self, ctx: &CallContext) -> Option<Duration> {
        match (self.timeout, ctx.remaining()) {
            (Some(configured), Some(left)) => Some(configured.min(left)),
            (configured, left) => configured.or(left),
        }
    }

    /// POST one attempt, with or without a bearer credential
    pub async fn send(
        &self,
        ctx: &CallContext,
        attempt: &AttemptRequest<'_>,
        api_key: Option<&str>,
    ) -> Result<Completion, ClassifiedError> {
        let request = CompletionRequest::build(attempt.model, attempt.messages, attempt.params);
        let mut body = serde_json::to_value(&request)
            .map_err(|e| ClassifiedError::Fatal(format!("failed to encode request: {}", e)))?;
        self.config.apply_param_mappings(&mut body);

        let response = self
            .http
            .post_completion(&self.url, &body, api_key, &self.headers, self.effective_timeout(ctx))
            .await?;

        into_completion(response)
    }
}

fn into_completion(response: CompletionResponse) -> Result<Completion, ClassifiedError> {
    let text = response
        .content()
        .ok_or_else(|| ClassifiedError::Unavailable("response contained no choices".to_string()))?;
    Ok(Completion::new(text, response.usage.unwrap_or_default()))
}
