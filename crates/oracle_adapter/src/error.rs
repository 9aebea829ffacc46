use serde_json::json;
use thiserror::Error;

/// Error payload stored on the ledger for any failed outbound call.
pub const API_FAILURE: &str = "API request failed";

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(#[from] serde_json::Error),

    #[error("http: {0}")]
    Transport(String),

    #[error("origin returned status {0}")]
    Status(u16),

    #[error("client: {0}")]
    Client(String),
}

impl DispatchError {
    /// Ledger-storable JSON describing this failure.
    pub fn payload(&self) -> String {
        match self {
            DispatchError::UnsupportedMethod(m) => {
                json!({ "error": format!("Unsupported method: {m}") }).to_string()
            }
            _ => json!({ "error": API_FAILURE }).to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::UnsupportedMethod(_) => "unsupported_method",
            _ => "dispatch_failure",
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_share_the_generic_payload() {
        for err in [
            DispatchError::Transport("connection refused".into()),
            DispatchError::Status(500),
            DispatchError::Client("tls".into()),
        ] {
            assert_eq!(err.payload(), r#"{"error":"API request failed"}"#);
            assert_eq!(err.kind(), "dispatch_failure");
        }
    }

    #[test]
    fn unsupported_method_names_the_method() {
        let err = DispatchError::UnsupportedMethod("DELETE".into());
        assert_eq!(err.payload(), r#"{"error":"Unsupported method: DELETE"}"#);
        assert_eq!(err.kind(), "unsupported_method");
    }
}
