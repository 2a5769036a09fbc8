//! Ephemeral credential fetch from the trusted backend.
//!
//! The backend mints a short-lived client secret scoped to one realtime
//! session. The response also names the model the server actually
//! provisioned; it may differ from the requested one (server-side
//! fallback) and the SDP exchange must use the returned value.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::error::TransportError;

/// Timeout for the credential fetch.
const CREDENTIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum length of an error body excerpt carried into an error message.
const ERROR_BODY_EXCERPT: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct CredentialRequest {
    pub model: String,
    pub voice: String,
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub value: String,
}

/// The minted credential plus the provisioned model.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialGrant {
    pub client_secret: ClientSecret,
    #[serde(default)]
    pub model: Option<String>,
}

impl CredentialGrant {
    /// The model to use for the SDP exchange: the server's choice when
    /// present, otherwise the one we asked for.
    pub fn effective_model(&self, requested: &str) -> String {
        self.model.clone().unwrap_or_else(|| requested.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CredentialClient {
    endpoint: String,
    http: reqwest::Client,
}

impl CredentialClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn fetch(&self, request: &CredentialRequest) -> Result<CredentialGrant, TransportError> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(CREDENTIAL_TIMEOUT)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
            return Err(TransportError::Credential(format!("{status}: {excerpt}")));
        }

        let grant: CredentialGrant = response
            .json()
            .await
            .map_err(|e| TransportError::Credential(format!("malformed grant: {e}")))?;

        if let Some(ref granted) = grant.model {
            if *granted != request.model {
                info!(
                    requested = %request.model,
                    granted = %granted,
                    "credential endpoint substituted model"
                );
            }
        }

        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_model_prefers_server_choice() {
        let grant = CredentialGrant {
            client_secret: ClientSecret {
                value: "ek_test".to_string(),
            },
            model: Some("fallback-model".to_string()),
        };
        assert_eq!(grant.effective_model("requested-model"), "fallback-model");
    }

    #[test]
    fn effective_model_falls_back_to_requested() {
        let grant = CredentialGrant {
            client_secret: ClientSecret {
                value: "ek_test".to_string(),
            },
            model: None,
        };
        assert_eq!(grant.effective_model("requested-model"), "requested-model");
    }

    #[test]
    fn grant_deserializes_without_model() {
        let grant: CredentialGrant =
            serde_json::from_str(r#"{"client_secret":{"value":"ek_1"}}"#).unwrap();
        assert_eq!(grant.client_secret.value, "ek_1");
        assert!(grant.model.is_none());
    }
}
