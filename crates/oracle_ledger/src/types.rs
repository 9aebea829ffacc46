use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger-assigned request identifier. Dense, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identity of the account that signs a transaction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Pending,
    Fulfilled,
}

/// One API call request and its (eventual) fulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_id: RequestId,
    pub requester: AccountId,
    pub method: String,
    pub api_endpoint: String,
    pub parameters: String,
    pub fulfilled: bool,
    pub response: String,
}

impl Request {
    pub fn state(&self) -> RequestState {
        if self.fulfilled {
            RequestState::Fulfilled
        } else {
            RequestState::Pending
        }
    }

    /// The stored response, only once the request is fulfilled.
    pub fn response(&self) -> Option<&str> {
        self.fulfilled.then_some(self.response.as_str())
    }
}

/// Notifications emitted by the ledger, in inclusion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LedgerEvent {
    #[serde(rename_all = "camelCase")]
    RequestCreated {
        request_id: RequestId,
        method: String,
        api_endpoint: String,
        parameters: String,
    },
    #[serde(rename_all = "camelCase")]
    ResponseFulfilled {
        request_id: RequestId,
        response: String,
    },
}

impl LedgerEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            LedgerEvent::RequestCreated { request_id, .. }
            | LedgerEvent::ResponseFulfilled { request_id, .. } => *request_id,
        }
    }
}

/// State-changing operations a transaction can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum Call {
    #[serde(rename_all = "camelCase")]
    CreateRequest {
        method: String,
        api_endpoint: String,
        parameters: String,
    },
    #[serde(rename_all = "camelCase")]
    FulfillRequest {
        request_id: RequestId,
        response: String,
    },
}

/// A signed-by-convention unit of work: `origin` must present its next nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub origin: AccountId,
    pub nonce: u64,
    pub call: Call,
}

impl Transaction {
    pub fn new(origin: AccountId, nonce: u64, call: Call) -> Self {
        Self {
            origin,
            nonce,
            call,
        }
    }

    /// BLAKE3 hash of this transaction chained onto `prev`.
    pub fn chained_hash(&self, prev: &str) -> String {
        let body = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = blake3::Hasher::new();
        hasher.update(prev.as_bytes());
        hasher.update(&[0u8]);
        hasher.update(&body);
        format!("b3:{}", hex::encode(hasher.finalize().as_bytes()))
    }
}

/// Inclusion acknowledgment handed back to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub sequence: u64,
    pub tx_hash: String,
    pub events: Vec<LedgerEvent>,
}

impl Receipt {
    /// Id allocated by a `CreateRequest` transaction, if any.
    pub fn created_request_id(&self) -> Option<RequestId> {
        self.events.iter().find_map(|e| match e {
            LedgerEvent::RequestCreated { request_id, .. } => Some(*request_id),
            _ => None,
        })
    }
}
