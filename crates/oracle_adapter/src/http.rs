//! HTTP dispatcher: executes a ledger request against the configured origin.
//!
//! The dispatcher is the IO boundary of the relay. Whatever happens on the
//! wire, [`Dispatcher::dispatch`] hands back a string the ledger can store:
//! - success: the origin's body, re-serialized as compact JSON
//! - unsupported method: `{"error":"Unsupported method: <M>"}`
//! - anything else: `{"error":"API request failed"}`
//!
//! No retries here; the only bound is the client timeout.

use crate::error::{DispatchError, Result};
use crate::types::{Dispatched, HttpMethod, OriginConfig};
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;
use tracing::{debug, warn};

/// Make sure `endpoint` starts with a path separator.
pub fn normalize_endpoint(endpoint: &str) -> Cow<'_, str> {
    if endpoint.starts_with('/') {
        Cow::Borrowed(endpoint)
    } else {
        Cow::Owned(format!("/{endpoint}"))
    }
}

/// Serialize an origin body for storage: JSON is compacted, anything else
/// becomes a JSON string.
pub fn normalize_body(body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(v) => v.to_string(),
        Err(_) => Value::String(String::from_utf8_lossy(body).into_owned()).to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl Dispatcher {
    pub fn new(origin: &OriginConfig) -> Result<Self> {
        if origin.accept_invalid_certs {
            warn!(origin = %origin.base_url, "TLS certificate verification disabled for origin");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(origin.timeout_ms))
            .danger_accept_invalid_certs(origin.accept_invalid_certs)
            .build()
            .map_err(|e| DispatchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: origin.base_url.trim_end_matches('/').to_string(),
            username: origin.username.clone(),
            password: origin.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, normalize_endpoint(endpoint))
    }

    /// Execute the call and classify failures.
    pub async fn execute(&self, method: &str, endpoint: &str, parameters: &str) -> Result<String> {
        let url = self.url(endpoint);
        let req = match HttpMethod::parse(method) {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => {
                let body: Value = serde_json::from_str(parameters)?;
                self.client.post(&url).json(&body)
            }
            HttpMethod::Unsupported(other) => return Err(DispatchError::UnsupportedMethod(other)),
        };

        let resp = req
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DispatchError::Status(status.as_u16()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        debug!(%url, status = status.as_u16(), bytes = body.len(), "origin responded");
        Ok(normalize_body(&body))
    }

    /// Execute the call; never fails. Failures become error payloads.
    pub async fn dispatch(&self, method: &str, endpoint: &str, parameters: &str) -> Dispatched {
        match self.execute(method, endpoint, parameters).await {
            Ok(payload) => Dispatched {
                payload,
                failure: None,
            },
            Err(e) => Dispatched {
                payload: e.payload(),
                failure: Some(e),
            },
        }
    }
}
