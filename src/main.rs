//! feed-relay binary entrypoint.
//! Loads config, restores state, wires the spool source to the configured
//! destination and runs until Ctrl-C.

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feed_relay::config::{DestinationKind, RelayConfig};
use feed_relay::ingest::providers::SpoolSource;
use feed_relay::ingest::Source;
use feed_relay::publish::{Destination, LogDestination, TelegramDestination};
use feed_relay::{Relay, Shutdown, StateStore};

/// Compact logs by default; `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feed_relay=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

fn build_destination(cfg: &RelayConfig) -> anyhow::Result<Arc<dyn Destination>> {
    Ok(match cfg.destination.kind {
        DestinationKind::Telegram => Arc::new(
            TelegramDestination::from_config(&cfg.destination)
                .context("telegram destination")?,
        ),
        DestinationKind::Log => Arc::new(LogDestination::new()),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = RelayConfig::load_default().context("loading relay config")?;
    cfg.validate().context("invalid relay config")?;

    if let Some(addr) = cfg.metrics_addr.as_deref() {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("metrics_addr `{addr}`"))?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing prometheus exporter")?;
        tracing::info!(%addr, "metrics listener up");
    }

    let destination = build_destination(&cfg)?;
    let store = StateStore::new(&cfg.state_path);
    let spool = SpoolSource::new(&cfg.spool_dir);
    let relay = Arc::new(
        Relay::new(cfg, destination, store)
            .await
            .context("starting relay")?,
    );

    let (trigger, shutdown) = Shutdown::new();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested");
                trigger.trigger();
            }
            Err(e) => tracing::warn!(error = %e, "no Ctrl-C handler, running until killed"),
        }
    });

    relay
        .run(vec![Source::Pull(Box::new(spool))], shutdown)
        .await
        .context("relay run")?;
    Ok(())
}
