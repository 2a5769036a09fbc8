//! Canned protocol/macro text lookup.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;
use crate::handler::{required_str, ServiceClient, ToolHandler};

pub struct MacroLookup {
    client: ServiceClient,
}

impl MacroLookup {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for MacroLookup {
    async fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let name = required_str(arguments, "name")?;
        let response = self
            .client
            .get_json("/macros", &[("name", name.to_string())])
            .await?;

        match response.get("text").and_then(Value::as_str) {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            _ => Ok(format!("No macro named '{name}' was found.")),
        }
    }
}
