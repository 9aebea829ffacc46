//! Request book: the pure Pending → Fulfilled state machine.
//!
//! No IO and no notifications here. The [`Ledger`](crate::Ledger) wraps this
//! with nonces, hashing, the journal and the broadcast channel.

use crate::error::{LedgerError, Result};
use crate::types::{AccountId, Call, LedgerEvent, Request, RequestId};
use std::collections::BTreeMap;

/// First id handed out by a fresh book.
pub const FIRST_REQUEST_ID: u64 = 1;

#[derive(Debug, Clone)]
pub struct RequestBook {
    next_id: u64,
    requests: BTreeMap<RequestId, Request>,
}

impl Default for RequestBook {
    fn default() -> Self {
        Self {
            next_id: FIRST_REQUEST_ID,
            requests: BTreeMap::new(),
        }
    }
}

impl RequestBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and store a pending record. Never fails.
    pub fn create(
        &mut self,
        requester: &AccountId,
        method: &str,
        api_endpoint: &str,
        parameters: &str,
    ) -> LedgerEvent {
        let request_id = RequestId(self.next_id);
        self.next_id += 1;
        self.requests.insert(
            request_id,
            Request {
                request_id,
                requester: requester.clone(),
                method: method.to_string(),
                api_endpoint: api_endpoint.to_string(),
                parameters: parameters.to_string(),
                fulfilled: false,
                response: String::new(),
            },
        );
        LedgerEvent::RequestCreated {
            request_id,
            method: method.to_string(),
            api_endpoint: api_endpoint.to_string(),
            parameters: parameters.to_string(),
        }
    }

    /// Check that `fulfill(request_id, ..)` would succeed, without mutating.
    pub fn check_fulfill(&self, request_id: RequestId) -> Result<()> {
        match self.requests.get(&request_id) {
            None => Err(LedgerError::UnknownRequest(request_id)),
            Some(r) if r.fulfilled => Err(LedgerError::AlreadyFulfilled(request_id)),
            Some(_) => Ok(()),
        }
    }

    pub fn fulfill(&mut self, request_id: RequestId, response: &str) -> Result<LedgerEvent> {
        self.check_fulfill(request_id)?;
        let record = self
            .requests
            .get_mut(&request_id)
            .ok_or(LedgerError::UnknownRequest(request_id))?;
        record.response = response.to_string();
        record.fulfilled = true;
        Ok(LedgerEvent::ResponseFulfilled {
            request_id,
            response: response.to_string(),
        })
    }

    pub fn response(&self, request_id: RequestId) -> Result<&str> {
        let record = self
            .requests
            .get(&request_id)
            .ok_or(LedgerError::UnknownRequest(request_id))?;
        record
            .response()
            .ok_or(LedgerError::NotYetFulfilled(request_id))
    }

    pub fn get(&self, request_id: RequestId) -> Option<&Request> {
        self.requests.get(&request_id)
    }

    /// Pending requests in id order.
    pub fn pending(&self) -> impl Iterator<Item = &Request> {
        self.requests.values().filter(|r| !r.fulfilled)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Validate `call` against current state; `apply` cannot fail afterwards.
    pub fn check(&self, call: &Call) -> Result<()> {
        match call {
            Call::CreateRequest { .. } => Ok(()),
            Call::FulfillRequest { request_id, .. } => self.check_fulfill(*request_id),
        }
    }

    pub fn apply(&mut self, origin: &AccountId, call: &Call) -> Result<Vec<LedgerEvent>> {
        match call {
            Call::CreateRequest {
                method,
                api_endpoint,
                parameters,
            } => Ok(vec![self.create(origin, method, api_endpoint, parameters)]),
            Call::FulfillRequest {
                request_id,
                response,
            } => Ok(vec![self.fulfill(*request_id, response)?]),
        }
    }
}
