//! Oracle ledger: the authoritative record of API call requests and their
//! fulfillment.
//!
//! ```text
//! createRequest ──▶ Pending ──fulfillRequest──▶ Fulfilled
//!                     │                            │
//!                     └─ getResponse: NotYetFulfilled   └─ getResponse: response
//! ```
//!
//! The ledger never talks to the network. It allocates ids, enforces the
//! one-shot fulfillment rule, orders transactions per account by nonce, and
//! broadcasts `RequestCreated` / `ResponseFulfilled` notifications in
//! inclusion order.

pub mod error;
pub mod journal;
pub mod ledger;
pub mod state;
pub mod types;

pub use error::{LedgerError, Result};
pub use ledger::Ledger;
pub use state::RequestBook;
pub use types::{AccountId, Call, LedgerEvent, Receipt, Request, RequestId, RequestState, Transaction};
