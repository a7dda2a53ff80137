//! Hosted provider that authenticates every request with a pooled credential.

use super::{AttemptRequest, ChatEndpoint, Completion, ProviderClient};
use crate::config::ProviderKind;
use crate::context::CallContext;
use crate::error::ClassifiedError;
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CloudProvider {
    endpoint: ChatEndpoint,
}

impl CloudProvider {
    pub fn new(endpoint: ChatEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl ProviderClient for CloudProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    async fn complete(
        &self,
        ctx: &CallContext,
        attempt: AttemptRequest<'_>,
    ) -> Result<Completion, ClassifiedError> {
        let credential = attempt.credential.ok_or_else(|| {
            ClassifiedError::Auth(format!("no credential for '{}'", self.endpoint.name()))
        })?;

        debug!(
            provider = self.endpoint.name(),
            model = attempt.model,
            key = %credential,
            "sending completion"
        );
        self.endpoint
            .send(ctx, &attempt, Some(credential.expose()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CompletionParams, Message};
    use crate::client::HttpClient;
    use crate::config::{ProviderConfig, Tier};
    use crate::router::Credential;

    fn provider(base_url: &str) -> CloudProvider {
        let mut config = ProviderConfig::new(ProviderKind::Cloud, base_url, "gpt-4o");
        config
            .param_mappings
            .insert("max_tokens".to_string(), "max_completion_tokens".to_string());
        CloudProvider::new(ChatEndpoint::new("openai", &config, HttpClient::new().unwrap()))
    }

    #[tokio::test]
    async fn test_sends_bearer_and_mapped_params() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-live-1234")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o",
                "max_completion_tokens": 64,
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "ping"}
                ]
            })))
            .with_status(200)
            .with_body(
                r#"{"id": "1", "model": "gpt-4o",
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "pong"}}],
                    "usage": {"prompt_tokens": 9, "completion_tokens": 1}}"#,
            )
            .create_async()
            .await;

        let provider = provider(&server.url());
        let credential = Credential::new("openai", "sk-live-1234");
        let messages = vec![Message::user("ping")];
        let params = CompletionParams::default()
            .with_system_prompt("be brief")
            .with_max_tokens(64);

        let completion = provider
            .complete(
                &CallContext::new(Tier::Pro),
                AttemptRequest {
                    credential: Some(&credential),
                    model: "gpt-4o",
                    messages: &messages,
                    params: &params,
                },
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(completion.text, "pong");
        assert_eq!(completion.usage.prompt_tokens, 9);
        assert_eq!(completion.usage.completion_tokens, 1);
    }

    #[tokio::test]
    async fn test_missing_credential_is_auth_error() {
        let provider = provider("http://127.0.0.1:1");
        let messages = vec![Message::user("ping")];
        let err = provider
            .complete(
                &CallContext::new(Tier::Pro),
                AttemptRequest {
                    credential: None,
                    model: "gpt-4o",
                    messages: &messages,
                    params: &CompletionParams::default(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ClassifiedError::Auth(_)));
    }

    #[tokio::test]
    async fn test_revoked_key_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error": {"message": "Invalid API Key"}}"#)
            .create_async()
            .await;

        let provider = provider(&server.url());
        let credential = Credential::new("openai", "sk-revoked");
        let messages = vec![Message::user("ping")];
        let err = provider
            .complete(
                &CallContext::new(Tier::Pro),
                AttemptRequest {
                    credential: Some(&credential),
                    model: "gpt-4o",
                    messages: &messages,
                    params: &CompletionParams::default(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ClassifiedError::Auth(_)));
    }
}
