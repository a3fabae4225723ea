// Headless mode - a scripted session against the mock server
//
// Walks every mailbox page by page, search-selects the first unseen
// message, deletes it, and logs what the viewport did at each step. Useful
// for watching fetch behavior with `RUST_LOG=viewport=debug`.

use crate::tui::app::render_row;
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};
use viewport::demo::MockMailServer;
use viewport::events::{LoadOptions, RemoveOptions, ScrollOptions, SelectOptions};
use viewport::{Geometry, Viewport, ViewportRequest, ViewportResponse};

/// A terminal-sized list: 28 rows under a one-line header
const GEOMETRY: Geometry = Geometry {
    viewport_height: 29,
    line_height: 1,
    header_height: 1,
    container_width: 100,
};

/// Longest the walk waits for one response
const ANSWER_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run_headless(
    config: viewport::config::ViewportConfig,
    mailboxes: Vec<String>,
    server: Arc<Mutex<MockMailServer>>,
    requests: mpsc::UnboundedSender<ViewportRequest>,
    mut responses: mpsc::UnboundedReceiver<ViewportResponse>,
) -> Result<()> {
    let mut vp = Viewport::builder(requests, render_row)
        .config(config)
        .on_failure(|err| warn!(error = %err, "request could not be sent"))
        .build()
        .context("Invalid viewport configuration")?;
    vp.set_geometry(GEOMETRY);

    for name in &mailboxes {
        vp.load_view(name.as_str(), LoadOptions::default());
        settle(&mut vp, &mut responses).await;
        let total = vp.total_rows();
        info!(view = %name, total, "opened mailbox");

        // Page through to the end
        let mut pages = 1;
        loop {
            let range = vp.current_viewable_range();
            if range.end >= total || range.is_empty() {
                break;
            }
            let before = vp.current_offset();
            vp.scroll_to(
                range.end + 1,
                ScrollOptions {
                    top: true,
                    ..Default::default()
                },
            );
            settle(&mut vp, &mut responses).await;
            if vp.current_offset() == before {
                break;
            }
            pages += 1;
        }
        let cached = vp.buffer(None).map_or(0, |b| b.row_count());
        info!(view = %name, pages, cached, "reached the end");

        // First unseen message, then delete it
        vp.select(
            Vec::<usize>::new(),
            SelectOptions {
                search: Some(serde_json::json!({ "unseen": true })),
                ..Default::default()
            },
        );
        settle(&mut vp, &mut responses).await;
        let Some(selection) = vp.selected().filter(|s| !s.is_empty()).cloned() else {
            info!(view = %name, "no unseen messages");
            continue;
        };
        info!(view = %name, uids = ?selection.uids(), offset = vp.current_offset(), "selected first unseen");

        let deleted = server
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .delete(selection.view(), selection.uids());
        vp.remove(selection, RemoveOptions::default());
        settle(&mut vp, &mut responses).await;
        info!(view = %name, deleted, total = vp.total_rows(), "deleted");
    }

    // Revisit the first mailbox: served from cache, then validated
    if let Some(first) = mailboxes.first() {
        vp.load_view(first.as_str(), LoadOptions::default());
        let shown = vp.content().nodes().len();
        info!(view = %first, shown, offset = vp.current_offset(), "returned to first mailbox");

        // The validation request is not tracked; wait for its answer directly
        if let Ok(Some(response)) = tokio::time::timeout(ANSWER_TIMEOUT, responses.recv()).await {
            vp.ingest(response);
        }
        settle(&mut vp, &mut responses).await;
        info!(view = %first, total = vp.total_rows(), "cache validated");
    }

    Ok(())
}

/// Feed responses back until nothing is outstanding
async fn settle(vp: &mut Viewport, responses: &mut mpsc::UnboundedReceiver<ViewportResponse>) {
    while outstanding(vp) {
        vp.poll_wait(Instant::now());
        match tokio::time::timeout(ANSWER_TIMEOUT, responses.recv()).await {
            Ok(Some(response)) => vp.ingest(response),
            Ok(None) => {
                warn!("server channel closed");
                return;
            }
            Err(_) => {
                warn!("no answer from server, moving on");
                return;
            }
        }
    }
}

fn outstanding(vp: &Viewport) -> bool {
    vp.is_fetching()
        || vp
            .views()
            .filter_map(|v| vp.buffer(Some(v)))
            .any(|b| b.pending_requests() > 0)
}
