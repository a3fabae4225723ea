// Window rendering and scrolling
//
// The rendered window is a list of row nodes (or an empty placeholder).
// Re-rendering diffs against the previous list: nodes still on screen are
// reused unless their row changed, new rows are rendered, and departing
// rows are announced before they go.

use super::Viewport;
use crate::events::{RefreshOptions, RowNode, ScrollOptions, ViewportEvent};
use crate::selection::Selection;
use crate::types::{DomId, PaneMode, Row, RowRange, Uid};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Passed to the row renderer alongside the row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowContext {
    pub selected: bool,
    pub pane_mode: PaneMode,
}

/// What the list area currently shows
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Rows(Vec<RowNode>),
    /// Placeholder for a view with no rows
    Empty(String),
}

impl Default for Content {
    fn default() -> Self {
        Self::Rows(Vec::new())
    }
}

impl Content {
    pub fn nodes(&self) -> &[RowNode] {
        match self {
            Self::Rows(nodes) => nodes,
            Self::Empty(_) => &[],
        }
    }

    fn take_nodes(self) -> Vec<RowNode> {
        match self {
            Self::Rows(nodes) => nodes,
            Self::Empty(_) => Vec::new(),
        }
    }
}

/// Where a row sits relative to the visible window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Above,
    Visible,
    Below,
}

impl Viewport {
    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn current_offset(&self) -> usize {
        self.scroller.current_offset()
    }

    /// First and last visible row numbers
    pub fn current_viewable_range(&self) -> RowRange {
        let offset = self.current_offset();
        RowRange::new(offset + 1, (offset + self.ps()).min(self.total_rows()))
    }

    /// Show the window starting at `offset`
    ///
    /// Returns `false` when rows had to be fetched first; the window renders
    /// when the response arrives.
    pub fn request_content_refresh(&mut self, offset: usize, opts: RefreshOptions) -> bool {
        let shown = self.refresh(offset, opts);
        self.pump();
        shown
    }

    pub(super) fn refresh(&mut self, offset: usize, opts: RefreshOptions) -> bool {
        if !self.update_content(offset, opts) {
            return false;
        }
        let offset = self.current_offset();
        let ps = self.ps();
        let tolerance = self.limit_tolerance();
        let limit = self
            .buffer(None)
            .and_then(|b| b.is_nearing_limit(offset, ps, tolerance));
        if let Some(limit) = limit {
            tracing::debug!(offset, ?limit, "prefetching");
            self.fetch_buffer(super::FetchOptions {
                background: true,
                nearing: Some(limit),
                offset: Some(offset),
                ..Default::default()
            });
        }
        true
    }

    pub(super) fn update_content(&mut self, offset: usize, opts: RefreshOptions) -> bool {
        let Some(view) = self.view.clone() else {
            return false;
        };
        let ps = self.ps();
        let Some(buffer) = self.views.get(&view) else {
            return false;
        };

        // The last page starts at total - ps; check the rows that page shows
        let offset = match buffer.total_rows() {
            Some(total) => offset.min(total.saturating_sub(ps)),
            None => offset,
        };
        if !buffer.slice_loaded(offset, ps, &[]) {
            self.fetch_buffer(super::FetchOptions {
                offset: Some(offset),
                ..Default::default()
            });
            return false;
        }

        let total = buffer.total_rows().unwrap_or(0);
        self.scroller.set_size(ps, total);
        self.scroll_to_inner(
            offset + 1,
            ScrollOptions {
                noupdate: true,
                top: true,
                ..Default::default()
            },
        );

        let mut offset = self.current_offset();
        if let Some(adjust) = &self.hooks.on_content_offset {
            offset = adjust(offset);
        }

        let Some(buffer) = self.views.get(&view) else {
            return false;
        };
        let rows: Vec<(Row, bool)> = (offset + 1..=offset + ps)
            .filter_map(|n| buffer.uid_at(n))
            .filter_map(|uid| buffer.row(uid))
            .map(|row| (row.clone(), buffer.selected().contains_uid(&row.uid)))
            .collect();

        let old = std::mem::take(&mut self.content).take_nodes();

        if rows.is_empty() {
            for node in old {
                self.emit(ViewportEvent::RowCleared(node));
            }
            let msg = match &self.hooks.empty_msg {
                Some(f) => f(),
                None => self.config.empty_msg.clone(),
            };
            self.content = Content::Empty(msg);
        } else {
            let mut previous: HashMap<DomId, RowNode> =
                old.into_iter().map(|n| (n.dom_id.clone(), n)).collect();
            let keep: HashSet<DomId> = rows.iter().map(|(r, _)| r.dom_id.clone()).collect();

            let mut nodes = Vec::with_capacity(rows.len());
            let mut added = Vec::new();
            for (row, selected) in &rows {
                let reusable = previous
                    .remove(&row.dom_id)
                    .filter(|n| !opts.updated && n.revision == row.revision);
                match reusable {
                    Some(mut node) => {
                        node.rownum = row.rownum.unwrap_or(node.rownum);
                        nodes.push(node);
                    }
                    None => {
                        let node = self.render_row(row, *selected);
                        added.push(node.clone());
                        nodes.push(node);
                    }
                }
            }

            // Announce departures before the new window lands
            let mut gone: Vec<RowNode> = previous
                .into_values()
                .filter(|n| !keep.contains(&n.dom_id))
                .collect();
            gone.sort_by_key(|n| n.rownum);
            for node in gone {
                self.emit(ViewportEvent::RowCleared(node));
            }

            self.content = Content::Rows(nodes);
            for node in added {
                self.emit(ViewportEvent::RowAdded(node));
            }
        }

        self.emit(ViewportEvent::ContentComplete);
        true
    }

    fn render_row(&self, row: &Row, selected: bool) -> RowNode {
        let ctx = RowContext {
            selected,
            pane_mode: self.pane_mode,
        };
        RowNode {
            dom_id: row.dom_id.clone(),
            uid: row.uid.clone(),
            rownum: row.rownum.unwrap_or(0),
            markup: (self.renderer)(row, &ctx),
            selected,
            revision: row.revision,
        }
    }

    /// Empty the screen (view switch to an uncached view)
    pub(super) fn clear_screen(&mut self) {
        let old = std::mem::take(&mut self.content).take_nodes();
        for node in old {
            self.emit(ViewportEvent::RowCleared(node));
        }
        self.scroller.clear();
    }

    /// Re-render on-screen rows whose selected state changed
    pub(super) fn mark_selected(&mut self, uids: &[Uid], selected: bool) {
        if uids.is_empty() {
            return;
        }
        let wanted: HashSet<&Uid> = uids.iter().collect();
        let Some(view) = self.view.clone() else {
            return;
        };
        let mut nodes = std::mem::take(&mut self.content);
        if let Content::Rows(list) = &mut nodes {
            for node in list.iter_mut().filter(|n| wanted.contains(&n.uid) && n.selected != selected) {
                if let Some(row) = self.views.get(&view).and_then(|b| b.row(&node.uid)) {
                    *node = self.render_row(row, selected);
                } else {
                    node.selected = selected;
                }
            }
        }
        self.content = nodes;
    }

    /// Re-render one row in place after its data changed
    pub fn update_row(&mut self, uid: &Uid) {
        let Some(view) = self.view.clone() else {
            return;
        };
        let Some(pos) = self.content.nodes().iter().position(|n| &n.uid == uid) else {
            return;
        };
        let Some(buffer) = self.views.get(&view) else {
            return;
        };
        let Some(row) = buffer.row(uid) else {
            return;
        };
        let selected = buffer.selected().contains_uid(uid);
        let fresh = self.render_row(row, selected);

        if let Content::Rows(list) = &mut self.content {
            let old = std::mem::replace(&mut list[pos], fresh.clone());
            self.emit(ViewportEvent::RowCleared(old));
            self.emit(ViewportEvent::RowAdded(fresh));
        }
    }

    /// Overwrite caller fields on rows and refresh them on screen
    pub fn set_row_fields(&mut self, selection: &Selection, fields: &Map<String, Value>) {
        let Some(buffer) = self.views.get_mut(selection.view()) else {
            return;
        };
        buffer.set_fields(selection, fields);
        if self.view.as_ref() == Some(selection.view()) {
            for uid in selection.uids() {
                self.update_row(uid);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scrolling
    // ─────────────────────────────────────────────────────────────────────

    pub fn is_visible(&self, rownum: usize) -> Visibility {
        let offset = self.current_offset();
        let current = self.page_size(super::PageSizeKind::Current).unwrap_or(0);
        if rownum < offset + 1 {
            Visibility::Above
        } else if rownum > offset + current {
            Visibility::Below
        } else {
            Visibility::Visible
        }
    }

    /// Bring `rownum` into view
    pub fn scroll_to(&mut self, rownum: usize, opts: ScrollOptions) {
        self.scroll_to_inner(rownum, opts);
        self.pump();
    }

    pub(super) fn scroll_to_inner(&mut self, rownum: usize, opts: ScrollOptions) {
        let rownum = rownum.max(1);
        let ps = self.ps();
        self.scroller.noupdate = opts.noupdate;

        let target = match self.is_visible(rownum) {
            Visibility::Above => Some(rownum - 1),
            Visibility::Visible => opts.top.then_some(rownum - 1),
            Visibility::Below => Some(if opts.bottom {
                rownum.saturating_sub(ps)
            } else {
                (rownum - 1).min(self.total_rows().saturating_sub(ps))
            }),
        };
        if let Some(offset) = target {
            self.move_scroll(offset);
        }

        self.scroller.noupdate = false;
    }

    /// Move the handle; a user-visible change refreshes the content
    fn move_scroll(&mut self, offset: usize) {
        if self.scroller.move_scroll(offset) && !self.scroller.noupdate {
            let offset = self.current_offset();
            self.refresh(offset, RefreshOptions::default());
        }
    }

    /// One mouse-wheel notch
    pub fn scroll_wheel(&mut self, up: bool) {
        let step = self.scroller.wheel_step();
        let offset = self.current_offset();
        let target = if up {
            offset.saturating_sub(step)
        } else {
            offset + step
        };
        self.move_scroll(target);
        self.pump();
    }

    /// Scroll handle dragged to `offset`
    pub fn scroll_drag(&mut self, offset: usize) {
        self.emit(ViewportEvent::Slide { offset });
        self.move_scroll(offset);
        self.pump();
    }
}
