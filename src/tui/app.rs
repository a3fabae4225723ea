// TUI application state
//
// Owns the viewport, the handle to the mock server, and what the screen
// needs beyond the rendered rows: the keyboard cursor, the status line and
// the captured log buffer.

use super::components::scrollbar::offset_at;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use viewport::demo::{Flag, MockMailServer};
use viewport::engine::{Geometry, RowContext, Visibility};
use viewport::events::{LoadOptions, RemoveOptions, ScrollOptions, SelectOptions};
use viewport::logging::LogBuffer;
use viewport::selection::{Coords, Selection};
use viewport::types::{Row, Uid, ViewKey};
use viewport::{Viewport, ViewportEvent, ViewportResponse};

/// Separates the columns inside a rendered row
pub const FIELD_SEP: char = '\u{1f}';

/// Row renderer shared by the TUI and the headless walk
///
/// Produces `marker, from, subject, date` joined by [`FIELD_SEP`]; the list
/// widget lays the columns out.
pub fn render_row(row: &Row, _ctx: &RowContext) -> String {
    let flags: Vec<&str> = row
        .field("flag")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let marker = if flags.contains(&"\\flagged") {
        "!"
    } else if !flags.contains(&"\\seen") {
        "*"
    } else {
        " "
    };
    [
        marker,
        row.str_field("from").unwrap_or(""),
        row.str_field("subject").unwrap_or(""),
        row.str_field("date").unwrap_or(""),
    ]
    .join(&FIELD_SEP.to_string())
}

/// What the status line shows
#[derive(Debug, Clone, Default)]
pub struct Status {
    /// A foreground fetch is outstanding
    pub fetching: bool,
    /// The server missed the slow-response deadline
    pub waiting: bool,
    /// Last user-facing message
    pub message: Option<String>,
}

/// Main application state for the TUI
pub struct App {
    pub vp: Viewport,
    server: Arc<Mutex<MockMailServer>>,

    /// Mailboxes in display order
    pub mailboxes: Vec<ViewKey>,
    pub current: usize,

    /// Row number under the keyboard cursor
    pub cursor: usize,
    /// Start of a shift-selection
    anchor: Option<usize>,

    pub status: Status,
    pub logs: LogBuffer,
    pub should_quit: bool,

    /// Where the list was last drawn, for mouse hit-testing
    pub list_area: Rect,
    geometry: Option<Geometry>,
}

impl App {
    pub fn new(
        vp: Viewport,
        server: Arc<Mutex<MockMailServer>>,
        mailboxes: Vec<ViewKey>,
        logs: LogBuffer,
    ) -> Self {
        Self {
            vp,
            server,
            mailboxes,
            current: 0,
            cursor: 1,
            anchor: None,
            status: Status::default(),
            logs,
            should_quit: false,
            list_area: Rect::default(),
            geometry: None,
        }
    }

    fn server(&self) -> MutexGuard<'_, MockMailServer> {
        self.server.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open the first mailbox (waits for geometry inside the engine)
    pub fn start(&mut self) {
        if let Some(view) = self.mailboxes.first().cloned() {
            self.vp.load_view(view, LoadOptions::default());
        }
    }

    pub fn current_view(&self) -> Option<&ViewKey> {
        self.mailboxes.get(self.current)
    }

    /// Push measurements when the list area changes size
    pub fn sync_geometry(&mut self, geometry: Geometry) {
        if self.geometry == Some(geometry) {
            return;
        }
        self.geometry = Some(geometry);
        self.vp.set_geometry(geometry);
    }

    pub fn ingest(&mut self, response: ViewportResponse) {
        self.vp.ingest(response);
        self.clamp_cursor();
    }

    pub fn on_tick(&mut self, now: Instant) {
        self.vp.poll_wait(now);
        self.status.fetching = self.vp.is_fetching();
    }

    pub fn on_viewport_event(&mut self, event: ViewportEvent) {
        match event {
            ViewportEvent::Fetch(_) => self.status.fetching = true,
            ViewportEvent::EndFetch(_) | ViewportEvent::EndRangeFetch(_) => {
                self.status.fetching = self.vp.is_fetching();
                self.status.waiting = false;
            }
            ViewportEvent::Wait(view) => {
                self.status.waiting = true;
                self.status.message = Some(format!("{} is slow to respond", view));
            }
            ViewportEvent::Remove(selection) => {
                self.status.message = Some(format!("removed {} message(s)", selection.len()));
            }
            ViewportEvent::Select { selection, .. } if selection.len() == 1 => {
                // Search selections land anywhere; follow them
                let rownum = self
                    .vp
                    .buffer(Some(selection.view()))
                    .and_then(|b| selection.uids().first().and_then(|u| b.uid_to_rownum(u)));
                if let Some(rownum) = rownum {
                    self.cursor = rownum;
                }
            }
            ViewportEvent::SplitBarEnd(mode) => {
                self.status.message = Some(format!("split pane: {}", mode.as_str()));
            }
            _ => {}
        }
    }

    fn clamp_cursor(&mut self) {
        let total = self.vp.total_rows();
        self.cursor = self.cursor.clamp(1, total.max(1));
    }

    /// Uid under the cursor, if cached
    pub fn cursor_uid(&self) -> Option<Uid> {
        self.vp.buffer(None)?.uid_at(self.cursor).cloned()
    }

    /// Row under the cursor, if cached
    pub fn cursor_row(&self) -> Option<&Row> {
        let buffer = self.vp.buffer(None)?;
        buffer.row(buffer.uid_at(self.cursor)?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Input
    // ─────────────────────────────────────────────────────────────────────

    pub fn handle_key(&mut self, key: KeyEvent) {
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);
        let page = self.vp.page_size(viewport::PageSizeKind::Current).unwrap_or(1).max(1) as isize;

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true
            }
            KeyCode::Up | KeyCode::Char('k') => self.move_cursor(-1, shift),
            KeyCode::Down | KeyCode::Char('j') => self.move_cursor(1, shift),
            KeyCode::PageUp => self.move_cursor(-page, shift),
            KeyCode::PageDown => self.move_cursor(page, shift),
            KeyCode::Home => self.move_cursor(isize::MIN / 2, shift),
            KeyCode::End => self.move_cursor(isize::MAX / 2, shift),
            KeyCode::Char(' ') => self.toggle_cursor_selection(),
            KeyCode::Char('a') => self.select_all(),
            KeyCode::Char('/') => self.select_first_unseen(),
            KeyCode::Char('d') | KeyCode::Delete => self.delete_selected(),
            KeyCode::Char('u') => self.toggle_flag(Flag::Seen),
            KeyCode::Char('f') => self.toggle_flag(Flag::Flagged),
            KeyCode::Char('n') => self.deliver_new_message(),
            KeyCode::Char('r') => self.vp.reload(Map::new()),
            KeyCode::Char('D') => {
                if let Some(buffer) = self.vp.buffer(None) {
                    tracing::debug!(cache = %buffer.debug_json(), "buffer dump");
                }
            }
            KeyCode::Char('s') => {
                let mode = self.vp.pane_mode().next();
                self.vp.show_split_pane(mode);
                self.status.message = Some(format!("split pane: {}", mode.as_str()));
            }
            KeyCode::Char('+') => self.nudge_split(1),
            KeyCode::Char('-') => self.nudge_split(-1),
            KeyCode::Char('=') => self.vp.split_bar_double_click(),
            KeyCode::Tab => self.switch_mailbox(1),
            KeyCode::BackTab => self.switch_mailbox(-1),
            _ => {}
        }
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        // Inside the border: header line, then rows; scrollbar in the last column
        let area = self.list_area;
        let rows_top = area.y + 2;
        let rows_bottom = (area.y + area.height).saturating_sub(1);
        let on_rows = mouse.row >= rows_top && mouse.row < rows_bottom;
        let on_track = on_rows && mouse.column + 2 == area.x + area.width;

        match mouse.kind {
            MouseEventKind::ScrollUp => self.vp.scroll_wheel(true),
            MouseEventKind::ScrollDown => self.vp.scroll_wheel(false),
            MouseEventKind::Down(MouseButton::Left) | MouseEventKind::Drag(MouseButton::Left)
                if on_track =>
            {
                let track = rows_bottom.saturating_sub(rows_top) as usize;
                let offset = offset_at(self.vp.scroller(), track, (mouse.row - rows_top) as usize);
                self.vp.scroll_drag(offset);
            }
            MouseEventKind::Down(MouseButton::Left) if on_rows => {
                let rownum = self.vp.current_offset() + (mouse.row - rows_top) as usize + 1;
                if rownum > self.vp.total_rows() {
                    return;
                }
                self.cursor = rownum;
                let add = mouse.modifiers.contains(KeyModifiers::CONTROL);
                let range = mouse.modifiers.contains(KeyModifiers::SHIFT);
                let rows = match (range, self.anchor) {
                    (true, Some(anchor)) => (anchor.min(rownum)..=anchor.max(rownum)).collect(),
                    _ => vec![rownum],
                };
                if !range {
                    self.anchor = Some(rownum);
                }
                self.vp.select(
                    rows,
                    SelectOptions {
                        add,
                        range,
                        ..Default::default()
                    },
                );
            }
            _ => {}
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Actions
    // ─────────────────────────────────────────────────────────────────────

    fn move_cursor(&mut self, delta: isize, extend: bool) {
        let total = self.vp.total_rows();
        if total == 0 {
            return;
        }
        let before = self.cursor;
        self.cursor = (self.cursor as isize + delta).clamp(1, total as isize) as usize;

        match self.vp.is_visible(self.cursor) {
            Visibility::Visible => {}
            Visibility::Above => self.vp.scroll_to(self.cursor, ScrollOptions::default()),
            Visibility::Below => self.vp.scroll_to(
                self.cursor,
                ScrollOptions {
                    bottom: true,
                    ..Default::default()
                },
            ),
        }

        if extend {
            let anchor = *self.anchor.get_or_insert(before);
            let (lo, hi) = (anchor.min(self.cursor), anchor.max(self.cursor));
            self.vp.select(
                (lo..=hi).collect::<Vec<_>>(),
                SelectOptions {
                    range: true,
                    ..Default::default()
                },
            );
        } else {
            self.anchor = None;
        }
    }

    fn toggle_cursor_selection(&mut self) {
        let Some(uid) = self.cursor_uid() else {
            return;
        };
        let Some(selection) = self.vp.create_selection(Coords::Uids(vec![uid.clone()]), None) else {
            return;
        };
        let selected = self.vp.selected().is_some_and(|s| s.contains_uid(&uid));
        if selected {
            self.vp.deselect(&selection, Default::default());
        } else {
            self.vp.select(
                selection,
                SelectOptions {
                    add: true,
                    ..Default::default()
                },
            );
        }
        self.anchor = Some(self.cursor);
    }

    fn select_all(&mut self) {
        if let Some(selection) = self.vp.create_selection_buffer(None) {
            let count = selection.len();
            self.vp.select(selection, SelectOptions::default());
            self.status.message = Some(format!("selected {} cached message(s)", count));
        }
    }

    fn select_first_unseen(&mut self) {
        self.vp.select(
            Vec::<usize>::new(),
            SelectOptions {
                search: Some(json!({ "unseen": true })),
                ..Default::default()
            },
        );
    }

    /// Delete the selection (or the cursor row) on the server, then locally
    fn delete_selected(&mut self) {
        let Some(view) = self.current_view().cloned() else {
            return;
        };
        let selection = match self.vp.selected() {
            Some(s) if !s.is_empty() => s.clone(),
            _ => match self.cursor_uid() {
                Some(uid) => {
                    let mut s = Selection::empty(view.clone());
                    if let Some(buffer) = self.vp.buffer(None) {
                        s.add(buffer, Coords::Uids(vec![uid]));
                    }
                    s
                }
                None => return,
            },
        };

        let deleted = self.server().delete(&view, selection.uids());
        tracing::info!(view = %view, deleted, "deleted on server");
        self.vp.remove(selection, RemoveOptions::default());
        self.anchor = None;
        self.clamp_cursor();
    }

    /// Flip a flag on the server and patch the cached row in place
    fn toggle_flag(&mut self, flag: Flag) {
        let (Some(view), Some(uid)) = (self.current_view().cloned(), self.cursor_uid()) else {
            return;
        };
        let fields = {
            let mut server = self.server();
            if server.toggle_flag(&view, &uid, flag).is_none() {
                return;
            }
            server.message(&view, &uid).map(|m| m.fields())
        };
        let Some(Value::Object(fields)) = fields else {
            return;
        };
        if let Some(selection) = self.vp.create_selection(Coords::Uids(vec![uid]), None) {
            self.vp.set_row_fields(&selection, &fields);
        }
    }

    /// New mail arrives server-side; revalidate the open view
    fn deliver_new_message(&mut self) {
        let Some(view) = self.current_view().cloned() else {
            return;
        };
        let uid = self.server().append(&view, "New message");
        if let Some(uid) = uid {
            self.status.message = Some(format!("new message {} in {}", uid, view));
            self.vp.load_view(view, LoadOptions::default());
        }
    }

    fn switch_mailbox(&mut self, step: isize) {
        if self.mailboxes.is_empty() {
            return;
        }
        let len = self.mailboxes.len() as isize;
        self.current = ((self.current as isize + step).rem_euclid(len)) as usize;
        let view = self.mailboxes[self.current].clone();
        self.vp.load_view(view, LoadOptions::default());
        self.cursor = self.vp.current_offset() + 1;
        self.anchor = None;
        self.status.message = None;
    }

    /// Grow or shrink the list by one row (horizontal) or column (vertical)
    fn nudge_split(&mut self, delta: isize) {
        let layout = self.vp.layout();
        let pos = match layout.list_width {
            Some(width) => width,
            // Bar offset below the list top, in cells (line height is 1)
            None => layout.list_height.saturating_sub(self.header_height()),
        };
        self.vp.split_bar_start();
        self.vp
            .split_bar_drag((pos as isize + delta).max(1) as usize);
        self.vp.split_bar_end();
    }

    fn header_height(&self) -> usize {
        self.geometry.map_or(0, |g| g.header_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use viewport::types::DomId;

    fn row(fields: Value) -> Row {
        let Value::Object(fields) = fields else {
            panic!("fields must be an object");
        };
        Row::new(Uid::new("7"), DomId::new("vp_1"), fields)
    }

    #[test]
    fn test_render_row_marks_unseen_and_flagged() {
        let ctx = RowContext {
            selected: false,
            pane_mode: Default::default(),
        };
        let unseen = row(json!({"from": "ada", "subject": "hi", "date": "2024-01-01 08:00", "flag": []}));
        let cols: Vec<String> = render_row(&unseen, &ctx)
            .split(FIELD_SEP)
            .map(String::from)
            .collect();
        assert_eq!(cols, vec!["*", "ada", "hi", "2024-01-01 08:00"]);

        let flagged = row(json!({"from": "ada", "subject": "hi", "flag": ["\\seen", "\\flagged"]}));
        assert!(render_row(&flagged, &ctx).starts_with('!'));

        let seen = row(json!({"from": "ada", "flag": ["\\seen"]}));
        assert!(render_row(&seen, &ctx).starts_with(' '));
    }
}
