//! Offline-capable provider on the local machine (Ollama and friends).
//! Sends no credential; any pooled credential handed in is ignored.

use super::{AttemptRequest, ChatEndpoint, Completion, ProviderClient};
use crate::config::ProviderKind;
use crate::context::CallContext;
use crate::error::ClassifiedError;
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LocalProvider {
    endpoint: ChatEndpoint,
}

impl LocalProvider {
    pub fn new(endpoint: ChatEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl ProviderClient for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn complete(
        &self,
        ctx: &CallContext,
        attempt: AttemptRequest<'_>,
    ) -> Result<Completion, ClassifiedError> {
        debug!(provider = self.endpoint.name(), model = attempt.model, "sending local completion");
        self.endpoint.send(ctx, &attempt, None).await
    }
}
