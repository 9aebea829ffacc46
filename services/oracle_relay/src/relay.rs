//! Relay loop: listener → bounded queue → at most `workers` concurrent
//! handlers, each doing dispatch-then-write for one request.

use crate::context::RelayContext;
use crate::error::{RelayError, Result};
use crate::listener::{EventListener, PendingCall};
use oracle_ledger::Receipt;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Run the relay until the ledger stream ends.
pub async fn run(ctx: Arc<RelayContext>) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<PendingCall>(ctx.queue_depth);
    let listener = tokio::spawn(EventListener::new(ctx.ledger.clone(), tx).run());
    let permits = Arc::new(Semaphore::new(ctx.workers));
    let mut tasks = JoinSet::new();
    info!(
        workers = ctx.workers,
        queue_depth = ctx.queue_depth,
        account = %ctx.writer.account(),
        origin = %ctx.dispatcher.base_url(),
        "relay started"
    );

    loop {
        tokio::select! {
            next = rx.recv() => {
                let Some(call) = next else { break };
                let Ok(permit) = permits.clone().acquire_owned().await else { break };
                let ctx = ctx.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    // Errors are logged inside; the relay keeps going.
                    let _ = handle(&ctx, call).await;
                });
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "request handler panicked");
                }
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "request handler panicked");
        }
    }
    match listener.await {
        Ok(res) => res,
        Err(e) => {
            error!(error = %e, "listener task failed");
            Ok(())
        }
    }
}

/// Dispatch one request and write its terminal outcome to the ledger.
pub async fn handle(ctx: &RelayContext, call: PendingCall) -> Result<Receipt> {
    let request_id = call.request_id;
    let dispatched = ctx
        .dispatcher
        .dispatch(&call.method, &call.api_endpoint, &call.parameters)
        .await;

    match &dispatched.failure {
        None => {
            metrics::counter!("oracle_requests_dispatched_total", "outcome" => "success").increment(1);
        }
        Some(failure) => {
            warn!(%request_id, kind = failure.kind(), error = %failure, "API call failed, writing error response");
            metrics::counter!("oracle_requests_dispatched_total", "outcome" => failure.kind())
                .increment(1);
        }
    }

    match ctx.writer.write(request_id, &dispatched.payload).await {
        Ok(receipt) => Ok(receipt),
        Err(e @ RelayError::AlreadyFulfilled(_)) => {
            info!(%request_id, "duplicate delivery absorbed by ledger");
            Err(e)
        }
        Err(e) => {
            error!(%request_id, error = %e, "failed to write response to ledger");
            Err(e)
        }
    }
}
