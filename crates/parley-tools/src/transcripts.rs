//! HTTP-backed transcript store.

use async_trait::async_trait;
use serde_json::{json, Value};

use parley_types::{ConversationTurn, StoreError, TranscriptStore};

use crate::error::ToolError;
use crate::handler::ServiceClient;

/// [`TranscriptStore`] over the conversation-record service.
#[derive(Debug, Clone)]
pub struct HttpTranscriptStore {
    client: ServiceClient,
}

impl HttpTranscriptStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: ServiceClient::new(base_url),
        }
    }
}

fn store_error(e: ToolError) -> StoreError {
    StoreError::Service(e.to_string())
}

#[async_trait]
impl TranscriptStore for HttpTranscriptStore {
    async fn create_record(&self) -> Result<String, StoreError> {
        let response = self
            .client
            .post_json("/conversations", &json!({}))
            .await
            .map_err(store_error)?;
        response
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Service("create response carried no id".to_string()))
    }

    async fn append_turn(&self, record_id: &str, turn: ConversationTurn) -> Result<(), StoreError> {
        self.client
            .post_json(
                &format!("/conversations/{record_id}/turns"),
                &json!({
                    "role": turn.role,
                    "text": turn.text,
                    "at": turn.at.to_rfc3339(),
                }),
            )
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
