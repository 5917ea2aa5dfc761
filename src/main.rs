//! chrome-debugger - attach to a running Chrome and log debugger activity
//!
//! Connects to the configured remote-debugging endpoint, enables the
//! debugger on the first page, and reports console output and pauses until
//! interrupted.

use chrome_debugger::{BridgeConfig, ConnectTarget, DebugBridge};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often to report new console output and pause state
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chrome_debugger=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = BridgeConfig::from_env();
    let target = ConnectTarget::new(config.default_host.clone(), config.default_port);
    let bridge = DebugBridge::with_chromium(config);

    let id = bridge.connect(None, &target).await?;
    bridge.enable_debugger(Some(&id)).await?;
    tracing::info!(connection_id = %id, endpoint = %target.http_endpoint(), "Debugger attached; Ctrl-C to stop");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut last_pause: Option<String> = None;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let report = bridge.take_console_logs(Some(&id), None)?;
                if let Some(notice) = report.freshness.notice() {
                    tracing::info!(connection_id = %id, epoch = report.navigation_epoch, "{notice}");
                }
                for message in &report.messages {
                    tracing::info!(connection_id = %id, level = %message.level, epoch = message.epoch, "{}", message.text);
                }

                let pause = bridge
                    .call_stack(Some(&id))
                    .ok()
                    .and_then(|frames| frames.first().map(|f| format!("{}:{} in {}", f.url, f.line, f.function_name)));
                if pause != last_pause {
                    match &pause {
                        Some(location) => tracing::info!(connection_id = %id, location = %location, "Paused"),
                        None => tracing::info!(connection_id = %id, "Running"),
                    }
                    last_pause = pause;
                }
            }
        }
    }

    bridge.disconnect(&id).await?;
    Ok(())
}
