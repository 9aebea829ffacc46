use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP verbs the dispatcher knows how to execute.
///
/// Anything else lands in `Unsupported`, trimmed and uppercased, so it can
/// still be answered with a terminal error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Unsupported(String),
}

impl HttpMethod {
    pub fn parse(method: &str) -> Self {
        let method = method.trim().to_uppercase();
        match method.as_str() {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            _ => HttpMethod::Unsupported(method),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Unsupported(m) => m,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed origin every request is executed against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Base URL, e.g. `https://localhost:4433`
    pub base_url: String,
    /// Basic-auth user
    pub username: String,
    /// Basic-auth password
    pub password: String,
    /// Accept self-signed / invalid TLS certificates. Dev origins only.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Whole-request timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_timeout() -> u64 {
    30_000
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost:4433".into(),
            username: "admin".into(),
            password: "admin".into(),
            accept_invalid_certs: false,
            timeout_ms: default_timeout(),
        }
    }
}

/// Outcome of one dispatch: always a ledger-storable payload, plus the
/// classified failure when the call did not succeed.
#[derive(Debug)]
pub struct Dispatched {
    pub payload: String,
    pub failure: Option<crate::DispatchError>,
}

impl Dispatched {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!(HttpMethod::parse("GET"), HttpMethod::Get);
        assert_eq!(HttpMethod::parse("post"), HttpMethod::Post);
        assert_eq!(HttpMethod::parse(" Get "), HttpMethod::Get);
    }

    #[test]
    fn unknown_methods_are_normalized() {
        assert_eq!(
            HttpMethod::parse("DELETE"),
            HttpMethod::Unsupported("DELETE".into())
        );
        assert_eq!(
            HttpMethod::parse(" delete "),
            HttpMethod::Unsupported("DELETE".into())
        );
        assert_eq!(HttpMethod::parse("").as_str(), "");
        assert_eq!(HttpMethod::parse("PUT").to_string(), "PUT");
    }

    #[test]
    fn origin_config_defaults_from_partial_json() {
        let cfg: OriginConfig = serde_json::from_value(serde_json::json!({
            "base_url": "http://127.0.0.1:9000",
            "username": "u",
            "password": "p"
        }))
        .unwrap();
        assert_eq!(cfg.timeout_ms, 30_000);
        assert!(!cfg.accept_invalid_certs);
    }
}
