//! The relay's view of the ledger.
//!
//! The relay only needs four things from a ledger: a notification stream,
//! the pending set (for backfill), the signer's next nonce, and transaction
//! submission with an inclusion receipt.

use async_trait::async_trait;
use oracle_ledger::{AccountId, Ledger, LedgerError, LedgerEvent, Receipt, Request, Transaction};
use tokio::sync::broadcast;

#[async_trait]
pub trait LedgerClient: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<LedgerEvent>;

    async fn pending_requests(&self) -> Result<Vec<Request>, LedgerError>;

    async fn nonce(&self, account: &AccountId) -> Result<u64, LedgerError>;

    /// Submit and wait until the ledger acknowledges inclusion.
    async fn submit(&self, tx: Transaction) -> Result<Receipt, LedgerError>;
}

#[async_trait]
impl LedgerClient for Ledger {
    fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        Ledger::subscribe(self)
    }

    async fn pending_requests(&self) -> Result<Vec<Request>, LedgerError> {
        Ok(Ledger::pending_requests(self).await)
    }

    async fn nonce(&self, account: &AccountId) -> Result<u64, LedgerError> {
        Ok(Ledger::nonce(self, account).await)
    }

    async fn submit(&self, tx: Transaction) -> Result<Receipt, LedgerError> {
        Ledger::submit(self, tx).await
    }
}
