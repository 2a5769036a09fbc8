//! The handler contract and the shared HTTP service client.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::ToolError;

/// Default timeout for service calls.
const SERVICE_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum length of an error body excerpt carried into an error message.
const ERROR_BODY_EXCERPT: usize = 200;

/// One callable function. Implementations parse the argument object, call
/// their service, and render a human-readable text result. They never talk
/// to the event channel; delivery is the dispatcher's job.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: &Value) -> Result<String, ToolError>;
}

/// Shared JSON-over-HTTP client for the external services.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
}

impl ServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            timeout: SERVICE_TIMEOUT,
        }
    }

    /// Overrides the request timeout (the web-search service takes longer
    /// than the rest).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, ToolError> {
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .timeout(self.timeout)
            .send()
            .await?;
        Self::read_json(response).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ToolError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .timeout(self.timeout)
            .send()
            .await?;
        Self::read_json(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ToolError> {
        let response = self
            .http
            .delete(self.url(path))
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
            return Err(ToolError::Service(format!("{status}: {excerpt}")));
        }
        Ok(())
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, ToolError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
            return Err(ToolError::Service(format!("{status}: {excerpt}")));
        }
        response
            .json()
            .await
            .map_err(|e| ToolError::Service(format!("malformed response: {e}")))
    }
}

/// Reads a required string argument.
pub(crate) fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::BadArguments(format!("missing required field '{key}'")))
}

/// Reads an optional string argument.
pub(crate) fn optional_str<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_str_rejects_missing_and_blank() {
        let args = json!({"query": "tides", "blank": "  "});
        assert_eq!(required_str(&args, "query").unwrap(), "tides");
        assert!(required_str(&args, "absent").is_err());
        assert!(required_str(&args, "blank").is_err());
    }

    #[test]
    fn url_join_handles_trailing_slash() {
        let client = ServiceClient::new("http://svc.local/");
        assert_eq!(client.url("/memory"), "http://svc.local/memory");
    }
}
