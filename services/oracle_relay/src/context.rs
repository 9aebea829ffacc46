use crate::client::LedgerClient;
use crate::config::RelayConfig;
use crate::error::Result;
use crate::writer::{FulfillmentWriter, Signer};
use oracle_adapter::Dispatcher;
use std::sync::Arc;

/// Everything a relay worker needs, built once at start-up and shared by
/// reference: ledger connection, HTTP client, signing identity.
pub struct RelayContext {
    pub ledger: Arc<dyn LedgerClient>,
    pub dispatcher: Dispatcher,
    pub writer: FulfillmentWriter,
    pub workers: usize,
    pub queue_depth: usize,
}

impl RelayContext {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: &RelayConfig) -> Result<Self> {
        let dispatcher = Dispatcher::new(&config.origin())?;
        let writer = FulfillmentWriter::new(
            ledger.clone(),
            Signer::new(config.relay_account.clone()),
            config.write_timeout,
            config.write_attempts,
            config.write_backoff,
        );
        Ok(Self {
            ledger,
            dispatcher,
            writer,
            workers: config.workers.max(1),
            queue_depth: config.queue_depth.max(1),
        })
    }
}
