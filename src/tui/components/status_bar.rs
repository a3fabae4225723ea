// Status bar component
//
// One line at the bottom: mailbox, position, cache fill, selection, fetch
// state and the last message. Narrow terminals get the compact form.

use crate::tui::app::App;
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

/// Below this width the labels are dropped
const WIDE: u16 = 100;

pub fn render(f: &mut Frame, area: Rect, app: &App) {
    let vp = &app.vp;
    let total = vp.total_rows();
    let cached = vp.buffer(None).map_or(0, |b| b.row_count());
    let selected = vp.selected().map_or(0, |s| s.len());
    let range = vp.current_viewable_range();
    let unseen = vp
        .metadata("unseen", None)
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    let text = if area.width >= WIDE {
        format!(
            " row {}/{} │ showing {}-{} │ cached {} │ unseen {} │ selected {} │ pane {} ",
            app.cursor.min(total),
            total,
            range.start,
            range.end,
            cached,
            unseen,
            selected,
            vp.pane_mode().as_str(),
        )
    } else {
        format!(" {}/{} │ {}c │ {}s ", app.cursor.min(total), total, cached, selected)
    };

    let mut spans = vec![Span::raw(text)];
    if app.status.waiting {
        spans.push(Span::styled(" ⏳ waiting ", Style::default().fg(Color::Yellow)));
    } else if app.status.fetching {
        spans.push(Span::styled(" ⟳ loading ", Style::default().fg(Color::Cyan)));
    }
    if let Some(message) = &app.status.message {
        spans.push(Span::styled(
            format!(" {} ", message),
            Style::default().fg(Color::Gray),
        ));
    }

    let bar = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    f.render_widget(bar, area);
}
