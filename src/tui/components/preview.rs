// Preview pane
//
// Shows the cached fields of the row under the cursor. Rows that are not
// cached yet show a loading note.

use crate::tui::app::App;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use serde_json::Value;

pub fn render(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default().borders(Borders::ALL).title(" Preview ");

    let Some(row) = app.cursor_row() else {
        let note = Paragraph::new(Span::styled(
            "(loading)",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block);
        f.render_widget(note, area);
        return;
    };

    let label = Style::default().add_modifier(Modifier::BOLD);
    let mut lines = vec![Line::from(vec![
        Span::styled("Subject: ", label),
        Span::raw(row.str_field("subject").unwrap_or("").to_string()),
    ])];
    for (name, key) in [("From", "from"), ("Date", "date")] {
        lines.push(Line::from(vec![
            Span::styled(format!("{}: ", name), label),
            Span::raw(row.str_field(key).unwrap_or("").to_string()),
        ]));
    }
    if let Some(size) = row.field("size").and_then(Value::as_u64) {
        lines.push(Line::from(vec![
            Span::styled("Size: ", label),
            Span::raw(format!("{} bytes", size)),
        ]));
    }
    let flags = row
        .field("flag")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    lines.push(Line::from(vec![Span::styled("Flags: ", label), Span::raw(flags)]));
    lines.push(Line::raw(""));
    lines.push(Line::styled(
        format!("uid {} · row {}", row.uid, app.cursor),
        Style::default().fg(Color::DarkGray),
    ));

    let body = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    f.render_widget(body, area);
}
