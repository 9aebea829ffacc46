use metrics_exporter_prometheus::PrometheusBuilder;
use oracle_ledger::Ledger;
use oracle_relay::{config::RelayConfig, context::RelayContext, relay, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .with_target(false)
        .compact()
        .init();

    let config = RelayConfig::from_env();

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!(%addr, "metrics exporter listening");
    }

    let ledger = Arc::new(match &config.journal_path {
        Some(path) => Ledger::open(path).await?,
        None => Ledger::in_memory(),
    });

    let ctx = Arc::new(RelayContext::new(ledger.clone(), &config)?);
    let relay_task = tokio::spawn(async move {
        if let Err(e) = relay::run(ctx).await {
            error!(error = %e, "relay stopped");
        }
    });

    let app = oracle_relay::app(AppState::new(ledger));
    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("oracle node listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    relay_task.abort();
    Ok(())
}
