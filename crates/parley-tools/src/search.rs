//! Search handlers: web, past conversations, source repository.
//!
//! Web search is the session's slow operation; the dispatcher records an
//! in-flight placeholder for it the moment its arguments finalize. Nothing
//! here is aware of that; the handler just takes as long as it takes.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::ToolError;
use crate::handler::{required_str, ServiceClient, ToolHandler};

/// Web searches routinely run for several seconds.
const WEB_SEARCH_TIMEOUT: Duration = Duration::from_secs(60);

fn render_results(response: &Value, empty_message: &str) -> String {
    let results: Vec<String> = response
        .get("results")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|r| {
                    let title = r.get("title").and_then(Value::as_str)?;
                    let snippet = r.get("snippet").and_then(Value::as_str).unwrap_or("");
                    Some(if snippet.is_empty() {
                        title.to_string()
                    } else {
                        format!("{title}: {snippet}")
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if results.is_empty() {
        empty_message.to_string()
    } else {
        results.join("\n")
    }
}

pub struct WebSearch {
    client: ServiceClient,
}

impl WebSearch {
    pub fn new(client: ServiceClient) -> Self {
        Self {
            client: client.with_timeout(WEB_SEARCH_TIMEOUT),
        }
    }
}

#[async_trait]
impl ToolHandler for WebSearch {
    async fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let query = required_str(arguments, "query")?;
        let response = self
            .client
            .get_json("/search", &[("q", query.to_string())])
            .await?;
        Ok(render_results(&response, "The search returned no results."))
    }
}

pub struct ConversationSearch {
    client: ServiceClient,
}

impl ConversationSearch {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for ConversationSearch {
    async fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let query = required_str(arguments, "query")?;
        let response = self
            .client
            .get_json("/conversations/search", &[("q", query.to_string())])
            .await?;
        Ok(render_results(
            &response,
            "No past conversations matched.",
        ))
    }
}

pub struct CodeSearch {
    client: ServiceClient,
}

impl CodeSearch {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for CodeSearch {
    async fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let query = required_str(arguments, "query")?;
        let response = self
            .client
            .get_json("/code/search", &[("q", query.to_string())])
            .await?;

        let matches: Vec<String> = response
            .get("matches")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| {
                        let path = m.get("path").and_then(Value::as_str)?;
                        let line = m.get("line").and_then(Value::as_u64).unwrap_or(0);
                        Some(format!("{path}:{line}"))
                    })
                    .collect()
            })
            .unwrap_or_default();

        if matches.is_empty() {
            Ok("No code matches.".to_string())
        } else {
            Ok(matches.join("\n"))
        }
    }
}
