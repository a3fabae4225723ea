// TUI module - Terminal User Interface
//
// This module manages the terminal UI using ratatui. It handles:
// - Terminal initialization and cleanup
// - Event loop (keyboard and mouse input, timer ticks)
// - Feeding server responses and viewport events into the app
// - Keeping the engine's geometry in step with the terminal size

pub mod app;
pub mod components;
pub mod ui;

use anyhow::{Context, Result};
use app::App;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal};
use std::io;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use viewport::{ViewportEvent, ViewportResponse};

/// Run the TUI
///
/// This function sets up the terminal, runs the event loop, and cleans up
/// when done.
pub async fn run_tui(
    mut app: App,
    mut responses: mpsc::UnboundedReceiver<ViewportResponse>,
    mut events: mpsc::UnboundedReceiver<ViewportEvent>,
) -> Result<()> {
    // Set up terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("Failed to setup terminal")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    let result = run_event_loop(&mut terminal, &mut app, &mut responses, &mut events).await;

    // Restore terminal
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("Failed to restore terminal")?;
    terminal.show_cursor().context("Failed to show cursor")?;

    result
}

/// Main event loop
///
/// Waits on four sources with tokio::select!:
/// 1. Keyboard and mouse input
/// 2. Timer ticks (redraws and the slow-server check)
/// 3. Responses from the mail server
/// 4. Events emitted by the viewport
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    responses: &mut mpsc::UnboundedReceiver<ViewportResponse>,
    events: &mut mpsc::UnboundedReceiver<ViewportEvent>,
) -> Result<()> {
    let mut tick_interval = tokio::time::interval(Duration::from_millis(200));

    // Geometry must be known before the first load can go out
    let size = terminal.size().context("Failed to read terminal size")?;
    app.sync_geometry(ui::geometry_for(Rect::new(0, 0, size.width, size.height)));
    app.start();

    loop {
        let size = terminal.size().context("Failed to read terminal size")?;
        let size = Rect::new(0, 0, size.width, size.height);
        app.sync_geometry(ui::geometry_for(size));

        let areas = ui::areas(size, &app.vp.layout());
        app.list_area = areas.list;
        terminal
            .draw(|f| ui::draw(f, app, &areas))
            .context("Failed to draw terminal")?;

        tokio::select! {
            // Keyboard or mouse input
            _ = async {
                if event::poll(Duration::from_millis(10)).unwrap_or(false) {
                    match event::read() {
                        Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => app.handle_key(key),
                        Ok(Event::Mouse(mouse)) => app.handle_mouse(mouse),
                        _ => {}
                    }
                }
            } => {}

            _ = tick_interval.tick() => {
                app.on_tick(Instant::now());
            }

            Some(response) = responses.recv() => {
                app.ingest(response);
            }

            Some(event) = events.recv() => {
                app.on_viewport_event(event);
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
