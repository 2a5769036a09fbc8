//! Mail list/read handlers.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;
use crate::handler::{required_str, ServiceClient, ToolHandler};

/// Default number of messages listed when the model does not ask for a
/// specific count.
const DEFAULT_LIST_LIMIT: u64 = 10;

pub struct MailList {
    client: ServiceClient,
}

impl MailList {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for MailList {
    async fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let limit = arguments
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_LIST_LIMIT);
        let response = self
            .client
            .get_json("/messages", &[("limit", limit.to_string())])
            .await?;

        let lines: Vec<String> = response
            .get("messages")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| {
                        let from = m.get("from").and_then(Value::as_str)?;
                        let subject = m.get("subject").and_then(Value::as_str).unwrap_or("(no subject)");
                        let id = m.get("id").and_then(Value::as_str).unwrap_or("?");
                        Some(format!("[{id}] {from}: {subject}"))
                    })
                    .collect()
            })
            .unwrap_or_default();

        if lines.is_empty() {
            Ok("The mailbox is empty.".to_string())
        } else {
            Ok(lines.join("\n"))
        }
    }
}

pub struct MailRead {
    client: ServiceClient,
}

impl MailRead {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for MailRead {
    async fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let message_id = required_str(arguments, "message_id")?;
        let response = self
            .client
            .get_json(&format!("/messages/{message_id}"), &[])
            .await?;

        let from = response.get("from").and_then(Value::as_str).unwrap_or("?");
        let subject = response
            .get("subject")
            .and_then(Value::as_str)
            .unwrap_or("(no subject)");
        let body = response.get("body").and_then(Value::as_str).unwrap_or("");
        Ok(format!("From {from}\nSubject: {subject}\n\n{body}"))
    }
}
