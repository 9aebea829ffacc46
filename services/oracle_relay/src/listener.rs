//! Event listener: one long-lived ledger subscription feeding the worker
//! queue.
//!
//! Delivery is at-least-once. On start, and whenever the subscription lags,
//! every pending request is re-queued; duplicates are harmless because the
//! ledger rejects a second fulfillment.

use crate::client::LedgerClient;
use crate::error::Result;
use oracle_ledger::{LedgerEvent, Request, RequestId};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A created request waiting for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCall {
    pub request_id: RequestId,
    pub method: String,
    pub api_endpoint: String,
    pub parameters: String,
}

impl From<Request> for PendingCall {
    fn from(r: Request) -> Self {
        Self {
            request_id: r.request_id,
            method: r.method,
            api_endpoint: r.api_endpoint,
            parameters: r.parameters,
        }
    }
}

pub struct EventListener {
    ledger: Arc<dyn LedgerClient>,
    calls: mpsc::Sender<PendingCall>,
}

impl EventListener {
    pub fn new(ledger: Arc<dyn LedgerClient>, calls: mpsc::Sender<PendingCall>) -> Self {
        Self { ledger, calls }
    }

    /// Run until the ledger closes its stream or the worker queue goes away.
    pub async fn run(self) -> Result<()> {
        // Subscribe first so nothing created during backfill is missed.
        let mut events = self.ledger.subscribe();
        if !self.backfill().await? {
            return Ok(());
        }
        info!("listening for ledger events");

        loop {
            match events.recv().await {
                Ok(LedgerEvent::RequestCreated {
                    request_id,
                    method,
                    api_endpoint,
                    parameters,
                }) => {
                    info!(%request_id, %method, endpoint = %api_endpoint, "API request received");
                    let call = PendingCall {
                        request_id,
                        method,
                        api_endpoint,
                        parameters,
                    };
                    if self.calls.send(call).await.is_err() {
                        info!("worker queue closed, listener stopping");
                        return Ok(());
                    }
                }
                Ok(LedgerEvent::ResponseFulfilled {
                    request_id,
                    response,
                }) => {
                    info!(%request_id, %response, "API response received");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "ledger subscription lagged, re-queueing pending requests");
                    if !self.backfill().await? {
                        return Ok(());
                    }
                }
                Err(RecvError::Closed) => {
                    info!("ledger event stream closed");
                    return Ok(());
                }
            }
        }
    }

    /// Queue every pending request. Returns false once the queue is closed.
    async fn backfill(&self) -> Result<bool> {
        let pending = self.ledger.pending_requests().await?;
        if !pending.is_empty() {
            info!(count = pending.len(), "re-queueing pending requests");
        }
        for request in pending {
            if self.calls.send(request.into()).await.is_err() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
