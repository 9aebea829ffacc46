//! Oracle adapter: the relay's outbound IO boundary.
//!
//! ```text
//! Ledger request (method, apiEndpoint, parameters)
//!   │
//!   ▼  (network: runs in the relay, never in the ledger)
//! Dispatcher::dispatch()
//!   │
//!   ▼
//! Dispatched { payload, failure }   // payload is always ledger-storable
//! ```

pub mod error;
pub mod http;
pub mod types;

pub use error::{DispatchError, API_FAILURE};
pub use http::{normalize_endpoint, Dispatcher};
pub use types::{Dispatched, HttpMethod, OriginConfig};
