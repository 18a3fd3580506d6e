//! Console transport.
//!
//! Each stdin line is one inbound message: either a JSON object with the
//! [`InboundMessage`] fields, or plain text sent as a private message from
//! `--as` (the first owner by default). Replies are printed to stdout as one
//! JSON object per line.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};
use wabot_dispatch::{
    default_registry, spawn_sweeper, Dispatcher, InboundMessage, Outcome, ReplySink,
    TransportError,
};
use wabot_guard::SecurityManager;
use wabot_types::WabotConfig;

#[derive(Debug, Serialize)]
struct OutboundLine<'a> {
    chat_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reaction: Option<&'a str>,
}

/// Prints replies to stdout.
struct ConsoleSink;

impl ConsoleSink {
    fn emit(line: &OutboundLine<'_>) -> Result<(), TransportError> {
        let json = serde_json::to_string(line).map_err(|e| TransportError::Other(e.to_string()))?;
        println!("{json}");
        Ok(())
    }
}

#[async_trait]
impl ReplySink for ConsoleSink {
    async fn reply(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
        Self::emit(&OutboundLine {
            chat_id,
            text: Some(text),
            reaction: None,
        })
    }

    async fn react(&self, chat_id: &str, emoji: &str) -> Result<(), TransportError> {
        Self::emit(&OutboundLine {
            chat_id,
            text: None,
            reaction: Some(emoji),
        })
    }
}

/// Turn one input line into a message. Blank lines yield `None`.
fn parse_line(line: &str, default_sender: &str) -> Result<Option<InboundMessage>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line.starts_with('{') {
        let msg: InboundMessage =
            serde_json::from_str(line).context("malformed inbound message JSON")?;
        return Ok(Some(msg));
    }
    Ok(Some(InboundMessage::direct(default_sender, line)))
}

fn report(joined: Result<Outcome, JoinError>) {
    match joined {
        Ok(outcome) => debug!(?outcome, "message handled"),
        Err(e) => warn!(error = %e, "dispatch task failed"),
    }
}

/// Collect tasks that already finished so the set only holds work in flight.
fn reap_finished(tasks: &mut JoinSet<Outcome>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = tasks.try_join_next() {
        report(joined);
        reaped += 1;
    }
    reaped
}

/// Run the `wabot run` command.
pub async fn run(config_path: &Path, sender: Option<String>) -> Result<()> {
    let config = WabotConfig::load(config_path)
        .with_context(|| format!("refusing to start: cannot load {}", config_path.display()))?;
    let default_sender = match sender {
        Some(s) => s,
        None => config
            .bot
            .owners
            .first()
            .cloned()
            .context("no owner configured")?,
    };

    let security = Arc::new(SecurityManager::from_config(&config));
    let registry = default_registry().context("failed to register commands")?;
    let dispatcher = Arc::new(Dispatcher::new(
        &config,
        Arc::clone(&security),
        registry,
        Arc::new(ConsoleSink),
    ));
    let sweeper = spawn_sweeper(
        Arc::clone(&security),
        Duration::from_secs(config.limits.sweep_interval_secs.max(1)),
    );
    info!(bot = %config.bot.name, prefix = %config.bot.prefix, "console transport ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse_line(&line, &default_sender) {
                    Ok(Some(msg)) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        tasks.spawn(async move { dispatcher.handle_inbound(msg).await });
                        reap_finished(&mut tasks);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "skipping input line"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        report(joined);
    }
    sweeper.abort();
    Ok(())
}
