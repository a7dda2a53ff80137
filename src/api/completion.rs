//! Chat Completion API
//!
//! Caller-facing message types and the OpenAI-compatible wire format spoken by
//! both cloud and local providers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::GatewayError;

/// Routing hint describing what a call is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
    /// High-volume, latency sensitive work (scoring, classification)
    FastScoring,

    /// Strategic analysis that warrants the largest model
    DeepReasoning,

    /// Cheapest acceptable model
    LiteFallback,
}

impl Purpose {
    /// Configuration key for this purpose
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::FastScoring => "fast-scoring",
            Purpose::DeepReasoning => "deep-reasoning",
            Purpose::LiteFallback => "lite-fallback",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast-scoring" | "fast" => Ok(Purpose::FastScoring),
            "deep-reasoning" | "smart" => Ok(Purpose::DeepReasoning),
            "lite-fallback" | "lite" => Ok(Purpose::LiteFallback),
            other => Err(GatewayError::Config(format!(
                "Unknown purpose '{}'. Expected fast-scoring, deep-reasoning or lite-fallback",
                other
            ))),
        }
    }
}

/// A message in a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role: "system", "user" or "assistant"
    pub role: String,

    /// Message content (string or array of content parts)
    pub content: MessageContent,

    /// Optional name for the message author
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: MessageContent::Text(content.into()),
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }
}

/// Message content - a plain string or text parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Flatten to a single string, dropping non-text parts
    pub fn to_string_content(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Other => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// A content part; only text is interpreted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Other,
}

/// Sampling parameters shared by every attempt of one call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Prepended as a system message when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionParams {
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Chat completion request body (OpenAI-compatible)
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,

    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Provider-specific parameters
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CompletionRequest {
    /// Build the wire request for one attempt
    pub fn build(model: &str, messages: &[Message], params: &CompletionParams) -> Self {
        let mut all = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = &params.system_prompt {
            all.push(Message::system(system.clone()));
        }
        all.extend_from_slice(messages);

        Self {
            model: model.to_string(),
            messages: all,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            extra: HashMap::new(),
        }
    }
}

/// Appended to a message cut down by [`truncate_context`]
pub const TRUNCATION_MARKER: &str = "\n[CONTEXT TRUNCATED]";

/// Characters of system prompt plus message text
pub fn context_chars(messages: &[Message], params: &CompletionParams) -> usize {
    let system = params
        .system_prompt
        .as_deref()
        .map_or(0, |s| s.chars().count());
    messages
        .iter()
        .map(|m| m.content.to_string_content().chars().count())
        .fold(system, usize::saturating_add)
}

/// Cut the last message to `keep` characters when the context exceeds `limit`.
///
/// Returns the original context size when a cut was made. A `limit` of zero
/// disables the guard.
pub fn truncate_context(
    messages: &mut [Message],
    params: &CompletionParams,
    limit: usize,
    keep: usize,
) -> Option<usize> {
    if limit == 0 {
        return None;
    }
    let total = context_chars(messages, params);
    if total <= limit {
        return None;
    }

    let last = messages.last_mut()?;
    let text = last.content.to_string_content();
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str(TRUNCATION_MARKER);
    last.content = MessageContent::Text(cut);
    Some(total)
}

/// Chat completion response
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub model: String,

    pub choices: Vec<Choice>,

    #[serde(default)]
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// Text of the first choice
    pub fn content(&self) -> Option<String> {
        self.choices
            .first()
            .map(|c| c.message.content.to_string_content())
    }
}

/// A choice in the completion response
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,

    pub message: Message,

    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,

    #[serde(default)]
    pub completion_tokens: u32,
}

/// Successful outcome of a gateway call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallResult {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub provider_used: String,
    pub model_used: String,
    /// Attempts made, including the successful one
    pub attempts: usize,
}
