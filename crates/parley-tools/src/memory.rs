//! Long-term memory read/write handlers.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::handler::{optional_str, required_str, ServiceClient, ToolHandler};

pub struct MemoryRead {
    client: ServiceClient,
}

impl MemoryRead {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for MemoryRead {
    async fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let mut query = Vec::new();
        if let Some(topic) = optional_str(arguments, "topic") {
            query.push(("topic", topic.to_string()));
        }
        let response = self.client.get_json("/memory", &query).await?;

        let entries: Vec<&str> = response
            .get("entries")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|e| e.get("content").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        if entries.is_empty() {
            Ok("No stored memories matched.".to_string())
        } else {
            Ok(entries.join("\n"))
        }
    }
}

pub struct MemoryWrite {
    client: ServiceClient,
}

impl MemoryWrite {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for MemoryWrite {
    async fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let content = required_str(arguments, "content")?;
        self.client
            .post_json("/memory", &json!({ "content": content }))
            .await?;
        Ok(format!("Remembered: {content}"))
    }
}
