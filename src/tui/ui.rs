// UI rendering - screen layout and the draw entry point
//
// ┌ title ─────────────────────────────────┐
// │ message list  (+ preview, per split)   │
// ├ status ────────────────────────────────┤
// │ logs                                   │
// └────────────────────────────────────────┘
//
// The engine owns the split: it reports how tall (or wide) the list is and
// the preview takes the rest. Terminal cells are the measurement unit, so
// the line height is 1.

use super::app::App;
use super::components::{logs_panel, message_list, preview, status_bar};
use ratatui::{
    layout::{Constraint, Direction, Layout as Split, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use viewport::engine::{Geometry, Layout};

/// Log lines shown under the status bar
const LOG_LINES: u16 = 6;

/// Screen regions for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Areas {
    pub title: Rect,
    pub list: Rect,
    pub preview: Option<Rect>,
    pub status: Rect,
    pub logs: Rect,
}

/// Title, body, status and logs
fn frame_rows(size: Rect) -> [Rect; 4] {
    let rows = Split::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(4),
            Constraint::Length(1),
            Constraint::Length(LOG_LINES + 2),
        ])
        .split(size);
    [rows[0], rows[1], rows[2], rows[3]]
}

/// Measurements the engine gets for a terminal of `size`
///
/// The list block's border takes two rows; the header line is one more.
pub fn geometry_for(size: Rect) -> Geometry {
    let [_, body, _, _] = frame_rows(size);
    Geometry {
        viewport_height: body.height.saturating_sub(2) as usize,
        line_height: 1,
        header_height: 1,
        container_width: body.width as usize,
    }
}

/// Split the body between list and preview the way the engine laid it out
pub fn areas(size: Rect, layout: &Layout) -> Areas {
    let [title, body, status, logs] = frame_rows(size);

    let (list, preview) = if !layout.preview_visible {
        (body, None)
    } else if let Some(width) = layout.list_width {
        let width = (width as u16).min(body.width);
        let cols = Split::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(width), Constraint::Min(0)])
            .split(body);
        (cols[0], Some(cols[1]))
    } else {
        let height = (layout.list_height as u16 + 2).min(body.height);
        let rows = Split::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(height), Constraint::Min(0)])
            .split(body);
        (rows[0], Some(rows[1]))
    };

    Areas {
        title,
        list,
        preview: preview.filter(|r| r.height > 0 && r.width > 0),
        status,
        logs,
    }
}

/// Render the whole screen
pub fn draw(f: &mut Frame, app: &App, areas: &Areas) {
    render_title(f, areas.title, app);
    message_list::render(f, areas.list, app);
    if let Some(area) = areas.preview {
        preview::render(f, area, app);
    }
    status_bar::render(f, areas.status, app);
    logs_panel::render(f, areas.logs, &app.logs);
}

fn render_title(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::styled(
        " viewport-demo ",
        Style::default().add_modifier(Modifier::BOLD),
    )];
    for (i, view) in app.mailboxes.iter().enumerate() {
        let style = if i == app.current {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::raw(" "));
        spans.push(Span::styled(format!(" {} ", view), style));
    }
    spans.push(Span::styled(
        "   ↑↓ move  space select  / unseen  d delete  s split  tab mailbox  q quit",
        Style::default().fg(Color::DarkGray),
    ));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
