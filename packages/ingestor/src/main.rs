//! txnprose: mempool text monitor

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use txnprose_ingestor::config::Config;
use txnprose_ingestor::notifier::{Notifier, Pager, PagerConfig};
use txnprose_ingestor::stream::BloxrouteFeed;
use txnprose_ingestor::supervisor::Supervisor;
use txnprose_ingestor::twilio::TwilioSink;
use txnprose_ingestor::MonitorContext;

const DEFAULT_LOG_FILTER: &str = "info,txnprose_ingestor=debug";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may already be populated
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::parse();
    config.validate()?;

    let context = MonitorContext::load(&config.dictionary, config.spam_markers.clone())
        .context("cannot start without a dictionary")?;
    info!(
        "Loaded {} dictionary words, {} spam markers",
        context.lexicon.len(),
        context.spam_markers.len()
    );

    let notifier = match config.twilio_credentials()? {
        Some(credentials) => {
            info!("Text alerts enabled");
            let sink = Arc::new(TwilioSink::new(credentials));
            Notifier::with_pager(Pager::spawn(sink, PagerConfig::default()))
        }
        None => Notifier::log_only(),
    };

    let feed = BloxrouteFeed::new(config.feed_config());
    let supervisor = Supervisor::new(feed, Arc::new(context), notifier, config.supervisor_config());

    tokio::select! {
        never = supervisor.run() => match never {},
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("Shutting down");
        }
    }

    Ok(())
}
