//! Fulfillment writer: turns a dispatcher payload into an included
//! `FulfillRequest` transaction.
//!
//! All fulfillments share one signing identity, so submissions go through the
//! signer's nonce lock one at a time. A submission that fails or is not
//! acknowledged in time is retried up to `attempts` times with linear
//! backoff, resyncing the nonce from the ledger first. `AlreadyFulfilled` is
//! never retried: it means a previous attempt already landed.

use crate::client::LedgerClient;
use crate::error::{RelayError, Result};
use oracle_ledger::{AccountId, Call, LedgerError, Receipt, RequestId, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// The relay's signing identity and its locally tracked next nonce.
pub struct Signer {
    account: AccountId,
    next_nonce: Mutex<Option<u64>>,
}

impl Signer {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            next_nonce: Mutex::new(None),
        }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }
}

enum Attempt {
    AlreadyFulfilled,
    Retry(String),
}

pub struct FulfillmentWriter {
    ledger: Arc<dyn LedgerClient>,
    signer: Signer,
    timeout: Duration,
    attempts: u32,
    backoff: Duration,
}

impl FulfillmentWriter {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        signer: Signer,
        timeout: Duration,
        attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            ledger,
            signer,
            timeout,
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn account(&self) -> &AccountId {
        self.signer.account()
    }

    /// Write `response` as the fulfillment of `request_id`.
    pub async fn write(&self, request_id: RequestId, response: &str) -> Result<Receipt> {
        let mut reason = String::new();
        for attempt in 1..=self.attempts {
            match self.submit_once(request_id, response).await {
                Ok(receipt) => {
                    info!(
                        %request_id,
                        sequence = receipt.sequence,
                        tx_hash = %receipt.tx_hash,
                        "response written to ledger"
                    );
                    metrics::counter!("oracle_fulfillments_total", "result" => "included")
                        .increment(1);
                    return Ok(receipt);
                }
                Err(Attempt::AlreadyFulfilled) => {
                    // Benign; logged once by the caller.
                    metrics::counter!("oracle_fulfillments_total", "result" => "already_fulfilled")
                        .increment(1);
                    return Err(RelayError::AlreadyFulfilled(request_id));
                }
                Err(Attempt::Retry(r)) => {
                    warn!(%request_id, attempt, max = self.attempts, reason = %r, "fulfillment not included");
                    reason = r;
                    if attempt < self.attempts {
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                }
            }
        }
        metrics::counter!("oracle_fulfillments_total", "result" => "failed").increment(1);
        Err(RelayError::LedgerWrite {
            request_id,
            attempts: self.attempts,
            reason,
        })
    }

    async fn submit_once(
        &self,
        request_id: RequestId,
        response: &str,
    ) -> std::result::Result<Receipt, Attempt> {
        let mut slot = self.signer.next_nonce.lock().await;
        let nonce = match *slot {
            Some(n) => n,
            None => self
                .ledger
                .nonce(&self.signer.account)
                .await
                .map_err(|e| Attempt::Retry(format!("nonce lookup: {e}")))?,
        };
        let tx = Transaction::new(
            self.signer.account.clone(),
            nonce,
            Call::FulfillRequest {
                request_id,
                response: response.to_string(),
            },
        );

        match tokio::time::timeout(self.timeout, self.ledger.submit(tx)).await {
            Ok(Ok(receipt)) => {
                *slot = Some(nonce + 1);
                Ok(receipt)
            }
            // Rejected transactions are not included and do not consume the nonce.
            Ok(Err(LedgerError::AlreadyFulfilled(_))) => {
                *slot = Some(nonce);
                Err(Attempt::AlreadyFulfilled)
            }
            Ok(Err(e)) => {
                *slot = None;
                Err(Attempt::Retry(e.to_string()))
            }
            Err(_) => {
                *slot = None;
                Err(Attempt::Retry(format!(
                    "inclusion not acknowledged within {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use oracle_ledger::{Ledger, LedgerEvent, Request};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::broadcast;

    fn relay() -> AccountId {
        "relay".into()
    }

    fn writer(ledger: Arc<dyn LedgerClient>, attempts: u32) -> FulfillmentWriter {
        FulfillmentWriter::new(
            ledger,
            Signer::new(relay()),
            Duration::from_millis(200),
            attempts,
            Duration::from_millis(1),
        )
    }

    /// Fails the first `failures` submissions, then forwards to a real ledger.
    struct Flaky {
        inner: Ledger,
        failures: u32,
        seen: AtomicU32,
        hang: bool,
    }

    #[async_trait]
    impl LedgerClient for Flaky {
        fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
            self.inner.subscribe()
        }
        async fn pending_requests(&self) -> std::result::Result<Vec<Request>, LedgerError> {
            Ok(self.inner.pending_requests().await)
        }
        async fn nonce(&self, account: &AccountId) -> std::result::Result<u64, LedgerError> {
            Ok(self.inner.nonce(account).await)
        }
        async fn submit(&self, tx: Transaction) -> std::result::Result<Receipt, LedgerError> {
            let n = self.seen.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                if self.hang {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                return Err(LedgerError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "ledger unreachable",
                )));
            }
            self.inner.submit(tx).await
        }
    }

    async fn flaky(failures: u32, hang: bool) -> Arc<Flaky> {
        let inner = Ledger::in_memory();
        inner
            .create_request(&"user".into(), "GET", "/x", "")
            .await
            .unwrap();
        Arc::new(Flaky {
            inner,
            failures,
            seen: AtomicU32::new(0),
            hang,
        })
    }

    #[tokio::test]
    async fn writes_fulfillment_with_relay_identity() {
        let ledger = Arc::new(Ledger::in_memory());
        ledger
            .create_request(&"user".into(), "GET", "/x", "")
            .await
            .unwrap();
        let w = writer(ledger.clone(), 1);
        let receipt = w.write(RequestId(1), "ok").await.unwrap();
        assert_eq!(receipt.sequence, 2);
        assert_eq!(ledger.get_response(RequestId(1)).await.unwrap(), "ok");
        assert_eq!(ledger.nonce(&relay()).await, 1);
        assert_eq!(w.account(), &relay());
    }

    #[tokio::test]
    async fn already_fulfilled_is_surfaced_without_retry() {
        let ledger = flaky(0, false).await;
        ledger
            .inner
            .fulfill_request(&"someone".into(), RequestId(1), "first")
            .await
            .unwrap();
        let w = writer(ledger.clone(), 3);
        let err = w.write(RequestId(1), "second").await.unwrap_err();
        assert!(matches!(err, RelayError::AlreadyFulfilled(RequestId(1))));
        assert_eq!(ledger.seen.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.inner.get_response(RequestId(1)).await.unwrap(), "first");
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let ledger = flaky(2, false).await;
        let w = writer(ledger.clone(), 3);
        w.write(RequestId(1), "ok").await.unwrap();
        assert_eq!(ledger.seen.load(Ordering::SeqCst), 3);
        assert_eq!(ledger.inner.get_response(RequestId(1)).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let ledger = flaky(10, false).await;
        let w = writer(ledger.clone(), 2);
        let err = w.write(RequestId(1), "ok").await.unwrap_err();
        match err {
            RelayError::LedgerWrite {
                request_id,
                attempts,
                reason,
            } => {
                assert_eq!(request_id, RequestId(1));
                assert_eq!(attempts, 2);
                assert!(reason.contains("ledger unreachable"), "{reason}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(ledger.inner.get_response(RequestId(1)).await.is_err());
    }

    #[tokio::test]
    async fn unacknowledged_inclusion_times_out() {
        let ledger = flaky(1, true).await;
        let w = writer(ledger.clone(), 1);
        let err = w.write(RequestId(1), "ok").await.unwrap_err();
        assert!(err.to_string().contains("not acknowledged"), "{err}");
    }

    #[tokio::test]
    async fn concurrent_writes_get_consecutive_nonces() {
        let ledger = Arc::new(Ledger::in_memory());
        for _ in 0..16 {
            ledger
                .create_request(&"user".into(), "GET", "/x", "")
                .await
                .unwrap();
        }
        let w = Arc::new(writer(ledger.clone(), 1));
        let mut handles = Vec::new();
        for id in 1..=16u64 {
            let w = w.clone();
            handles.push(tokio::spawn(async move {
                w.write(RequestId(id), &format!("r{id}")).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(ledger.nonce(&relay()).await, 16);
        for id in 1..=16u64 {
            assert_eq!(
                ledger.get_response(RequestId(id)).await.unwrap(),
                format!("r{id}")
            );
        }
    }

    #[tokio::test]
    async fn stale_local_nonce_resyncs() {
        let ledger = Arc::new(Ledger::in_memory());
        for _ in 0..2 {
            ledger
                .create_request(&"user".into(), "GET", "/x", "")
                .await
                .unwrap();
        }
        let w = writer(ledger.clone(), 2);
        w.write(RequestId(1), "a").await.unwrap();
        // Someone else spends the relay's next nonce.
        ledger
            .submit(Transaction::new(
                relay(),
                1,
                Call::CreateRequest {
                    method: "GET".into(),
                    api_endpoint: "/y".into(),
                    parameters: String::new(),
                },
            ))
            .await
            .unwrap();
        w.write(RequestId(2), "b").await.unwrap();
        assert_eq!(ledger.get_response(RequestId(2)).await.unwrap(), "b");
        assert_eq!(ledger.nonce(&relay()).await, 3);
    }
}
