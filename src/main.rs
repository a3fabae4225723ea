// viewport-demo - a mailbox browser over a simulated mail server
//
// Exercises the viewport engine end to end:
// - Mock server (tokio task): answers viewport requests with simulated latency
// - Viewport: decides what to fetch, caches rows, renders the visible window
// - TUI (ratatui): draws the window, routes keys and mouse into the engine
// - Headless mode: a scripted walk that logs to stdout instead
// - mpsc channels carry requests, responses and viewport events

mod cli;
mod headless;
mod tui;

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use viewport::config::Config;
use viewport::demo::{run_server, MockMailServer};
use viewport::logging::{self, LogBuffer, Output};
use viewport::types::ViewKey;
use viewport::Viewport;

#[tokio::main]
async fn main() -> Result<()> {
    // Handle CLI commands first (config --show, --reset, --path)
    // If a command was handled, exit early
    let Some(args) = cli::handle_cli() else {
        return Ok(());
    };

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    let mut config = Config::from_env();
    args.apply(&mut config);
    config
        .viewport
        .validate()
        .context("Invalid [viewport] configuration")?;

    // In TUI mode logs go to the log strip, headless mode prints them.
    // The guard flushes file logging on drop.
    let log_buffer = LogBuffer::new();
    let output = if args.headless {
        Output::Stdout
    } else {
        Output::Capture(log_buffer.clone())
    };
    let _log_guard = logging::init(&config.logging, output);

    tracing::info!(
        version = viewport::config::VERSION,
        mailboxes = ?config.demo.mailboxes,
        rows = config.demo.rows,
        latency_ms = config.demo.latency_ms,
        "starting"
    );

    // Mock server task: requests in, responses out
    let server = Arc::new(Mutex::new(MockMailServer::from_config(&config.demo)));
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();
    let server_handle = tokio::spawn(run_server(
        server.clone(),
        request_rx,
        response_tx,
        Duration::from_millis(config.demo.latency_ms),
    ));

    if args.headless {
        tokio::select! {
            result = headless::run_headless(
                config.viewport.clone(),
                config.demo.mailboxes.clone(),
                server,
                request_tx,
                response_rx,
            ) => result?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
            }
        }
    } else {
        let mut vp = Viewport::builder(request_tx, tui::app::render_row)
            .config(config.viewport.clone())
            .on_failure(|err| tracing::warn!(error = %err, "request could not be sent"))
            .build()
            .context("Failed to build viewport")?;
        let events = vp.subscribe_channel();

        let mailboxes = config.demo.mailboxes.iter().map(ViewKey::new).collect();
        let app = tui::app::App::new(vp, server, mailboxes, log_buffer);
        tui::run_tui(app, response_rx, events).await?;
    }

    server_handle.abort();
    Ok(())
}
