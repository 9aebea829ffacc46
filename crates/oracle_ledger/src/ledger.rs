//! The ledger: request book + per-account nonces + hash-chained inclusion.
//!
//! Every state change goes through [`Ledger::submit`], which holds the write
//! lock for validation, journal append, apply and broadcast. That makes the
//! ledger the single ordering authority: notifications leave in exactly the
//! order transactions were included.

use crate::error::{LedgerError, Result};
use crate::journal::{Journal, JournalEntry, GENESIS};
use crate::state::RequestBook;
use crate::types::{AccountId, Call, LedgerEvent, Receipt, Request, RequestId, Transaction};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// Default notification buffer per subscriber.
pub const EVENT_BUFFER: usize = 1024;

/// API prefix used by the read-only-mode control requests.
const CONTROL_PREFIX: &str = "/api/v2/configurations";

struct Inner {
    book: RequestBook,
    nonces: HashMap<AccountId, u64>,
    sequence: u64,
    tip: String,
    journal: Option<Journal>,
}

impl Inner {
    fn empty(journal: Option<Journal>) -> Self {
        Self {
            book: RequestBook::new(),
            nonces: HashMap::new(),
            sequence: 0,
            tip: GENESIS.to_string(),
            journal,
        }
    }

    fn next_nonce(&self, account: &AccountId) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }

    /// Validate, persist, apply. Nothing is mutated unless every step succeeds.
    async fn include(&mut self, tx: Transaction) -> Result<Receipt> {
        let expected = self.next_nonce(&tx.origin);
        if tx.nonce != expected {
            return Err(LedgerError::BadNonce {
                account: tx.origin,
                expected,
                got: tx.nonce,
            });
        }
        self.book.check(&tx.call)?;

        let sequence = self.sequence + 1;
        let tx_hash = tx.chained_hash(&self.tip);
        let entry = JournalEntry {
            sequence,
            prev: self.tip.clone(),
            tx_hash: tx_hash.clone(),
            tx,
        };
        if let Some(journal) = self.journal.as_mut() {
            journal.append(&entry).await?;
        }

        let events = self.apply_entry(entry)?;
        Ok(Receipt {
            sequence,
            tx_hash,
            events,
        })
    }

    fn apply_entry(&mut self, entry: JournalEntry) -> Result<Vec<LedgerEvent>> {
        let events = self.book.apply(&entry.tx.origin, &entry.tx.call)?;
        self.nonces.insert(entry.tx.origin, entry.tx.nonce + 1);
        self.sequence = entry.sequence;
        self.tip = entry.tx_hash;
        Ok(events)
    }
}

pub struct Ledger {
    inner: Arc<RwLock<Inner>>,
    events: broadcast::Sender<LedgerEvent>,
}

impl Ledger {
    /// A fresh ledger with no persistence.
    pub fn in_memory() -> Self {
        Self::with_inner(Inner::empty(None), EVENT_BUFFER)
    }

    /// Open a journal-backed ledger, replaying whatever the journal holds.
    ///
    /// Replay rebuilds state silently: no notifications are emitted for
    /// transactions that were included before this process started.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let (journal, entries) = Journal::open(path).await?;
        let path = journal.path().display().to_string();
        let mut inner = Inner::empty(Some(journal));
        let replayed = entries.len();
        for entry in entries {
            let sequence = entry.sequence;
            let expected = inner.next_nonce(&entry.tx.origin);
            if entry.tx.nonce != expected {
                return Err(LedgerError::Corrupt {
                    sequence,
                    reason: format!("nonce {} but expected {expected}", entry.tx.nonce),
                });
            }
            inner.apply_entry(entry).map_err(|e| LedgerError::Corrupt {
                sequence,
                reason: e.to_string(),
            })?;
        }
        info!(journal = %path, replayed, pending = inner.book.pending().count(), "ledger opened");
        Ok(Self::with_inner(inner, EVENT_BUFFER))
    }

    /// Replace the notification buffer size. Call before anyone subscribes.
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        self.events = events;
        self
    }

    fn with_inner(inner: Inner, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(RwLock::new(inner)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Include a transaction whose nonce the caller manages.
    pub async fn submit(&self, tx: Transaction) -> Result<Receipt> {
        let Transaction { origin, nonce, call } = tx;
        self.commit(origin, Some(nonce), call).await
    }

    /// Include `call` from `origin` using its current nonce.
    pub async fn execute(&self, origin: &AccountId, call: Call) -> Result<Receipt> {
        self.commit(origin.clone(), None, call).await
    }

    /// Validate, journal, apply and broadcast on a detached task.
    ///
    /// Once started, inclusion runs to completion even if the caller stops
    /// waiting, so the journal and the in-memory state never diverge.
    async fn commit(&self, origin: AccountId, nonce: Option<u64>, call: Call) -> Result<Receipt> {
        let inner = self.inner.clone();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let mut inner = inner.write().await;
            let nonce = nonce.unwrap_or_else(|| inner.next_nonce(&origin));
            let receipt = inner.include(Transaction::new(origin, nonce, call)).await?;
            debug!(sequence = receipt.sequence, tx_hash = %receipt.tx_hash, "transaction included");
            for event in &receipt.events {
                // No subscribers is fine; the record is already on the ledger.
                let _ = events.send(event.clone());
            }
            Ok::<_, LedgerError>(receipt)
        });
        task.await.map_err(|e| LedgerError::Aborted(e.to_string()))?
    }

    pub async fn create_request(
        &self,
        origin: &AccountId,
        method: &str,
        api_endpoint: &str,
        parameters: &str,
    ) -> Result<(RequestId, Receipt)> {
        let receipt = self
            .execute(
                origin,
                Call::CreateRequest {
                    method: method.to_string(),
                    api_endpoint: api_endpoint.to_string(),
                    parameters: parameters.to_string(),
                },
            )
            .await?;
        let id = receipt.created_request_id().ok_or_else(|| LedgerError::Corrupt {
            sequence: receipt.sequence,
            reason: "create transaction emitted no RequestCreated".into(),
        })?;
        Ok((id, receipt))
    }

    pub async fn fulfill_request(
        &self,
        origin: &AccountId,
        request_id: RequestId,
        response: &str,
    ) -> Result<Receipt> {
        self.execute(
            origin,
            Call::FulfillRequest {
                request_id,
                response: response.to_string(),
            },
        )
        .await
    }

    /// Ask the relay to put configuration `configuration_id` into read-only mode.
    pub async fn trigger_start_read_only_mode(
        &self,
        origin: &AccountId,
        configuration_id: &str,
    ) -> Result<(RequestId, Receipt)> {
        let endpoint = format!("{CONTROL_PREFIX}/{configuration_id}/start-read-only-mode");
        self.create_request(origin, "POST", &endpoint, "{}").await
    }

    pub async fn trigger_exit_read_only_mode(
        &self,
        origin: &AccountId,
        configuration_id: &str,
    ) -> Result<(RequestId, Receipt)> {
        let endpoint = format!("{CONTROL_PREFIX}/{configuration_id}/exit-read-only-mode");
        self.create_request(origin, "POST", &endpoint, "{}").await
    }

    pub async fn get_response(&self, request_id: RequestId) -> Result<String> {
        let inner = self.inner.read().await;
        inner.book.response(request_id).map(str::to_string)
    }

    pub async fn request(&self, request_id: RequestId) -> Option<Request> {
        self.inner.read().await.book.get(request_id).cloned()
    }

    pub async fn pending_requests(&self) -> Vec<Request> {
        self.inner.read().await.book.pending().cloned().collect()
    }

    /// Next nonce `account` must present.
    pub async fn nonce(&self, account: &AccountId) -> u64 {
        self.inner.read().await.next_nonce(account)
    }

    /// Current (sequence, tip hash).
    pub async fn tip(&self) -> (u64, String) {
        let inner = self.inner.read().await;
        (inner.sequence, inner.tip.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> AccountId {
        "user".into()
    }

    fn owner() -> AccountId {
        "owner".into()
    }

    #[tokio::test]
    async fn create_emits_request_created_with_args() {
        let ledger = Ledger::in_memory();
        let mut rx = ledger.subscribe();
        let (id, receipt) = ledger
            .create_request(&user(), "POST", "http://example.com", "{}")
            .await
            .unwrap();
        assert_eq!(id, RequestId(1));
        assert_eq!(receipt.sequence, 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            LedgerEvent::RequestCreated {
                request_id: RequestId(1),
                method: "POST".into(),
                api_endpoint: "http://example.com".into(),
                parameters: "{}".into(),
            }
        );
        let stored = ledger.request(id).await.unwrap();
        assert_eq!(stored.requester, user());
    }

    #[tokio::test]
    async fn get_response_before_fulfillment_fails() {
        let ledger = Ledger::in_memory();
        let (id, _) = ledger
            .create_request(&user(), "GET", "http://example.com", "{}")
            .await
            .unwrap();
        assert!(matches!(
            ledger.get_response(id).await,
            Err(LedgerError::NotYetFulfilled(RequestId(1)))
        ));
    }

    #[tokio::test]
    async fn fulfill_once_then_reject() {
        let ledger = Ledger::in_memory();
        let mut rx = ledger.subscribe();
        ledger
            .create_request(&user(), "POST", "http://example.com", "{}")
            .await
            .unwrap();
        ledger
            .fulfill_request(&owner(), RequestId(1), "Success")
            .await
            .unwrap();
        let _created = rx.recv().await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            LedgerEvent::ResponseFulfilled {
                request_id: RequestId(1),
                response: "Success".into()
            }
        );
        assert_eq!(ledger.get_response(RequestId(1)).await.unwrap(), "Success");

        let err = ledger
            .fulfill_request(&owner(), RequestId(1), "Another response")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyFulfilled(RequestId(1))));
        assert_eq!(ledger.get_response(RequestId(1)).await.unwrap(), "Success");
        assert!(rx.try_recv().is_err(), "rejected fulfillment must not notify");
    }

    #[tokio::test]
    async fn nonce_must_match_and_rejections_do_not_consume_it() {
        let ledger = Ledger::in_memory();
        let relay: AccountId = "relay".into();
        ledger.create_request(&user(), "GET", "/a", "").await.unwrap();

        let stale = Transaction::new(
            relay.clone(),
            5,
            Call::FulfillRequest {
                request_id: RequestId(1),
                response: "x".into(),
            },
        );
        assert!(matches!(
            ledger.submit(stale).await,
            Err(LedgerError::BadNonce { expected: 0, got: 5, .. })
        ));

        let bad_target = Transaction::new(
            relay.clone(),
            0,
            Call::FulfillRequest {
                request_id: RequestId(42),
                response: "x".into(),
            },
        );
        assert!(ledger.submit(bad_target).await.is_err());
        assert_eq!(ledger.nonce(&relay).await, 0);

        let ok = Transaction::new(
            relay.clone(),
            0,
            Call::FulfillRequest {
                request_id: RequestId(1),
                response: "x".into(),
            },
        );
        ledger.submit(ok).await.unwrap();
        assert_eq!(ledger.nonce(&relay).await, 1);
    }

    #[tokio::test]
    async fn receipts_form_a_hash_chain() {
        let ledger = Ledger::in_memory();
        let (_, r1) = ledger.create_request(&user(), "GET", "/a", "").await.unwrap();
        let (_, r2) = ledger.create_request(&user(), "GET", "/b", "").await.unwrap();
        assert_eq!((r1.sequence, r2.sequence), (1, 2));
        assert_ne!(r1.tx_hash, r2.tx_hash);
        assert_eq!(ledger.tip().await, (2, r2.tx_hash));
    }

    #[tokio::test]
    async fn read_only_mode_requests_are_ordinary_requests() {
        let ledger = Ledger::in_memory();
        let (start, _) = ledger
            .trigger_start_read_only_mode(&user(), "cfg-7")
            .await
            .unwrap();
        let (exit, _) = ledger
            .trigger_exit_read_only_mode(&user(), "cfg-7")
            .await
            .unwrap();
        let start = ledger.request(start).await.unwrap();
        let exit = ledger.request(exit).await.unwrap();
        assert_eq!(start.method, "POST");
        assert_eq!(
            start.api_endpoint,
            "/api/v2/configurations/cfg-7/start-read-only-mode"
        );
        assert_eq!(
            exit.api_endpoint,
            "/api/v2/configurations/cfg-7/exit-read-only-mode"
        );
        assert_eq!(ledger.pending_requests().await.len(), 2);
    }

    #[tokio::test]
    async fn abandoned_fulfillment_still_lands_in_journal_and_memory() {
        let dir = std::env::temp_dir().join(format!("oracle-ledger-{}", std::process::id()));
        let path = dir.join("abandoned.jsonl");
        let _ = tokio::fs::remove_file(&path).await;
        let relay: AccountId = "relay".into();

        let ledger = Ledger::open(&path).await.unwrap();
        ledger.create_request(&user(), "GET", "/a", "").await.unwrap();

        // Poll once, then drop the future while inclusion is in flight.
        let abandoned = tokio::time::timeout(
            std::time::Duration::ZERO,
            ledger.fulfill_request(&relay, RequestId(1), "first"),
        )
        .await;
        assert!(abandoned.is_err(), "zero timeout should cut the caller off");

        let mut landed = false;
        for _ in 0..200 {
            if ledger.get_response(RequestId(1)).await.is_ok() {
                landed = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(landed, "inclusion must finish without its caller");
        assert_eq!(ledger.get_response(RequestId(1)).await.unwrap(), "first");
        assert_eq!(ledger.nonce(&relay).await, 1);

        let retry = ledger.fulfill_request(&relay, RequestId(1), "second").await;
        assert!(matches!(retry, Err(LedgerError::AlreadyFulfilled(RequestId(1)))));

        let tip = ledger.tip().await;
        drop(ledger);
        let reopened = Ledger::open(&path).await.unwrap();
        assert_eq!(reopened.tip().await, tip);
        assert_eq!(reopened.get_response(RequestId(1)).await.unwrap(), "first");
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn journal_replay_restores_state_without_notifications() {
        let dir = std::env::temp_dir().join(format!("oracle-ledger-{}", std::process::id()));
        let path = dir.join("replay.jsonl");
        let _ = tokio::fs::remove_file(&path).await;

        let tip = {
            let ledger = Ledger::open(&path).await.unwrap();
            ledger.create_request(&user(), "GET", "/a", "").await.unwrap();
            ledger.create_request(&user(), "POST", "/b", "{}").await.unwrap();
            ledger
                .fulfill_request(&owner(), RequestId(1), "done")
                .await
                .unwrap();
            ledger.tip().await
        };

        let reopened = Ledger::open(&path).await.unwrap();
        let mut rx = reopened.subscribe();
        assert_eq!(reopened.tip().await, tip);
        assert_eq!(reopened.get_response(RequestId(1)).await.unwrap(), "done");
        assert!(reopened.get_response(RequestId(2)).await.is_err());
        assert_eq!(reopened.nonce(&user()).await, 2);
        assert!(rx.try_recv().is_err());

        let (id, _) = reopened.create_request(&user(), "GET", "/c", "").await.unwrap();
        assert_eq!(id, RequestId(3));
        let _ = tokio::fs::remove_file(&path).await;
    }
}
