//! # doclink-watch
//!
//! Connects to the document event stream and prints every received event as
//! one JSON line on stdout. Diagnostics go to stderr through `tracing`.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use doclink_channel::{ChannelConfig, EventChannel, Subscription, WebSocketTransport};
use doclink_core::logging::{init_json_subscriber, init_subscriber};
use doclink_core::{ChannelError, DocumentEvent, encode_event};
use doclink_settings::{ChannelSettings, DoclinkSettings, load_settings_from_path, settings_path};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Watch document processing events.
#[derive(Parser, Debug)]
#[command(name = "doclink-watch", about = "Watch document processing events")]
struct Cli {
    /// Base WebSocket URL (overrides settings).
    #[arg(long)]
    url: Option<String>,

    /// Event stream path appended to the URL (overrides settings).
    #[arg(long)]
    path: Option<String>,

    /// Only print events for this document. Repeatable; none means all.
    #[arg(long = "document", value_name = "ID")]
    documents: Vec<String>,

    /// Log filter, e.g. `debug` or `doclink_channel=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Settings file (default: `~/.doclink/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Load settings from the chosen file, then apply flag overrides.
    fn resolve_settings(&self) -> Result<DoclinkSettings> {
        let path = self.settings.clone().unwrap_or_else(settings_path);
        let mut settings = load_settings_from_path(&path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        self.apply_overrides(&mut settings);
        settings
            .validate()
            .context("invalid settings after command-line overrides")?;
        Ok(settings)
    }

    fn apply_overrides(&self, settings: &mut DoclinkSettings) {
        if let Some(ref url) = self.url {
            settings.channel.url.clone_from(url);
        }
        if let Some(ref path) = self.path {
            settings.channel.path.clone_from(path);
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn print_event(event: &DocumentEvent) {
    println!("{}", encode_event(event));
}

/// Build the channel, register subscribers, and open the connection.
///
/// Connect-on-subscribe is off: the explicit `connect()` here is the one that
/// dials, so an unreachable endpoint fails startup. A failed start also stops
/// the reconnect timer the failure armed.
async fn start(
    settings: &ChannelSettings,
    documents: &[String],
) -> Result<(EventChannel, Vec<Subscription>)> {
    let config = ChannelConfig::from(settings).with_auto_connect(false);
    let channel = EventChannel::new(config, Arc::new(WebSocketTransport::from_settings(settings)));

    let subscriptions = if documents.is_empty() {
        vec![channel.subscribe_to_all(print_event)]
    } else {
        documents
            .iter()
            .map(|id| channel.subscribe_to_document(id.as_str(), print_event))
            .collect()
    };
    info!(
        url = %channel.config().url,
        subscriptions = subscriptions.len(),
        "watching"
    );

    if let Err(e) = channel.connect().await {
        channel.disconnect();
        return Err(e).with_context(|| format!("failed to connect to {}", settings.endpoint()));
    }
    Ok((channel, subscriptions))
}

/// Wait until the channel stops reconnecting, logging other reports.
async fn wait_for_terminal(mut reports: broadcast::Receiver<ChannelError>) -> Option<ChannelError> {
    loop {
        match reports.recv().await {
            Ok(report) if report.is_terminal() => return Some(report),
            Ok(report) if report.is_warning() => warn!(code = report.code(), %report, "channel report"),
            Ok(report) => debug!(code = report.code(), %report, "channel report"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "report stream lagged"),
            Err(RecvError::Closed) => return None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.resolve_settings()?;

    if settings.logging.json {
        init_json_subscriber(&settings.logging.level);
    } else {
        init_subscriber(&settings.logging.level);
    }
    if settings.reconcile.enabled {
        warn!("reconciliation is enabled but doclink-watch has no status source, ignoring");
    }

    let (channel, _subscriptions) = start(&settings.channel, &cli.documents).await?;
    let reports = channel.reports();

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("interrupted, shutting down");
        }
        Some(report) = wait_for_terminal(reports) => {
            channel.disconnect();
            bail!("{report}");
        }
    }

    channel.disconnect();
    Ok(())
}
