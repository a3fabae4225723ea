//! Message list component
//!
//! Draws the engine's rendered window: a header line, one line per row
//! node, and the scrollbar. Row markup is split on [`FIELD_SEP`] into
//! columns sized to the available width.

use super::scrollbar::{render_scrollbar, ScrollbarStyle};
use crate::tui::app::{App, FIELD_SEP};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use viewport::engine::Content;
use viewport::util::fit_width;

const FROM_WIDTH: usize = 20;
const DATE_WIDTH: usize = 16;

/// Lay out one row's columns into `width` cells
pub fn format_columns(markup: &str, width: usize) -> String {
    let mut cols = markup.split(FIELD_SEP);
    let marker = cols.next().unwrap_or(" ");
    let from = cols.next().unwrap_or("");
    let subject = cols.next().unwrap_or("");
    let date = cols.next().unwrap_or("");

    // marker + 3 separating spaces
    let fixed = 1 + FROM_WIDTH + DATE_WIDTH + 3;
    if width <= fixed {
        return fit_width(&format!("{} {}", marker, subject), width);
    }
    let subject_width = width - fixed;
    format!(
        "{} {:<fw$} {:<sw$} {}",
        marker,
        fit_width(from, FROM_WIDTH),
        fit_width(subject, subject_width),
        fit_width(date, DATE_WIDTH),
        fw = FROM_WIDTH,
        sw = subject_width,
    )
}

pub fn render(f: &mut Frame, area: Rect, app: &App) {
    let vp = &app.vp;
    let label = vp
        .buffer(None)
        .and_then(|b| b.label().map(str::to_string))
        .or_else(|| app.current_view().map(|v| v.to_string()))
        .unwrap_or_default();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ({}) ", label, vp.total_rows()));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if inner.height == 0 {
        return;
    }
    // Leave the last column for the scrollbar
    let width = inner.width.saturating_sub(1) as usize;

    let header_style = Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
    let mut lines = vec![Line::styled(
        format_columns(&["", "From", "Subject", "Date"].join(&FIELD_SEP.to_string()), width),
        header_style,
    )];

    match vp.content() {
        Content::Empty(message) => {
            lines.push(Line::styled(
                format!("  {}", message),
                Style::default().fg(Color::DarkGray),
            ));
        }
        Content::Rows(nodes) => {
            for node in nodes {
                let mut style = Style::default();
                if node.selected {
                    style = style.bg(Color::Blue).fg(Color::White);
                }
                if node.rownum == app.cursor {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                if node.markup.starts_with('*') {
                    style = style.add_modifier(Modifier::BOLD);
                }
                lines.push(Line::from(Span::styled(
                    format_columns(&node.markup, width),
                    style,
                )));
            }
        }
    }

    f.render_widget(Paragraph::new(lines), inner);

    let track = Rect {
        y: inner.y + 1,
        height: inner.height.saturating_sub(1),
        ..inner
    };
    render_scrollbar(f, track, vp.scroller(), ScrollbarStyle::Minimal);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_columns_pads_to_width() {
        let markup = ["*", "Ada Lovelace", "Engines", "2024-01-01 08:00"].join(&FIELD_SEP.to_string());
        let line = format_columns(&markup, 60);
        assert!(line.starts_with("* Ada Lovelace"));
        assert!(line.ends_with("2024-01-01 08:00"));
        assert_eq!(line.chars().count(), 60);
    }

    #[test]
    fn test_format_columns_narrow_keeps_subject() {
        let markup = [" ", "Ada", "Engines of the future", "2024-01-01"].join(&FIELD_SEP.to_string());
        let line = format_columns(&markup, 12);
        assert!(line.starts_with("  Engines"));
        assert_eq!(line.chars().count(), 12);
    }
}
