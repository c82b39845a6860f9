use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use google_ai_integration::{bridge, logging};
use google_ai_integration::{Config, Integration};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the bridge protocol
    let (subscriber, filter) = logging::subscriber(std::io::stderr, logging::initial_filter());
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    let config = Config::load();
    if !logging::rust_log_set() {
        if let Err(e) = logging::set_level(&filter, &config.logging.level) {
            tracing::warn!("{} - keeping default log level", e);
        }
    }

    tracing::info!(
        provider = %config.provider.kind,
        answer_on_lookup = config.lookup.answer_on_lookup,
        "Configuration loaded"
    );

    let integration = Integration::startup(config).context("Failed to start integration")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = bridge::handle_line(&integration, &line).await;
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    tracing::info!("Input closed, shutting down");
    Ok(())
}
