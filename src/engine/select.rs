// Selection operations on the active view

use super::{Continuation, FetchOptions, Viewport};
use crate::events::{DeselectOptions, SelectOptions, ViewportEvent};
use crate::protocol::RequestKind;
use crate::selection::{Coords, Selection};
use crate::types::{RowRange, Uid, ViewKey};
use serde_json::Map;
use tracing::debug;

/// What to select
#[derive(Debug, Clone, PartialEq)]
pub enum SelectTarget {
    Selection(Selection),
    /// Row numbers; uncached rows are resolved by the server first
    RowNumbers(Vec<usize>),
}

impl From<Selection> for SelectTarget {
    fn from(selection: Selection) -> Self {
        Self::Selection(selection)
    }
}

impl From<Vec<usize>> for SelectTarget {
    fn from(rows: Vec<usize>) -> Self {
        Self::RowNumbers(rows)
    }
}

impl Viewport {
    /// Select rows, replacing the current selection unless `opts.add`
    ///
    /// With `opts.search` the target is ignored: the server is asked for the
    /// row matching the search and that row is selected when it answers.
    pub fn select(&mut self, target: impl Into<SelectTarget>, opts: SelectOptions) {
        self.select_inner(target.into(), opts);
        self.pump();
    }

    pub(super) fn select_inner(&mut self, target: SelectTarget, opts: SelectOptions) {
        let Some(view) = self.view.clone() else {
            return;
        };

        if let Some(search) = opts.search.clone() {
            self.fetch_buffer(FetchOptions {
                search: Some(search),
                continuation: Some(Continuation::SelectRownum { add: opts.add }),
                ..Default::default()
            });
            return;
        }

        let selection = match target {
            SelectTarget::Selection(selection) => selection,
            SelectTarget::RowNumbers(rows) => {
                let Some(buffer) = self.views.get(&view) else {
                    return;
                };
                if rows.iter().all(|n| buffer.uid_at(*n).is_some()) {
                    Selection::from_coords(buffer, Coords::RowNumbers(rows))
                } else {
                    self.fetch_range(&view, &rows);
                    return;
                }
            }
        };

        let target_view = selection.view().clone();
        let Some(buffer) = self.views.get(&target_view) else {
            return;
        };
        let selection = Selection::from_coords(buffer, Coords::Uids(selection.uids().to_vec()));

        if !opts.add {
            let previous = buffer.selected().clone();
            let dropped: Vec<Uid> = previous
                .uids()
                .iter()
                .filter(|u| !selection.contains_uid(u))
                .cloned()
                .collect();
            if !dropped.is_empty() {
                let mut stale = Selection::empty(target_view.clone());
                stale.add_uids(dropped);
                self.deselect_inner(&stale, DeselectOptions::default());
            }
        }

        let Some(buffer) = self.views.get_mut(&target_view) else {
            return;
        };
        buffer.select(&selection);
        if target_view == view {
            self.mark_selected(selection.uids(), true);
        }
        debug!(view = %target_view, rows = selection.len(), add = opts.add, "selected");
        self.emit(ViewportEvent::Select { selection, opts });
    }

    /// Ask the server which rows a row-number range holds
    fn fetch_range(&mut self, view: &ViewKey, rows: &[usize]) {
        let (Some(&min), Some(&max)) = (rows.iter().min(), rows.iter().max()) else {
            return;
        };
        debug!(view = %view, start = min, end = max, "resolving uncached range");
        self.emit(ViewportEvent::Fetch(view.clone()));
        let id = self.next_request_id();
        self.dispatch(
            view,
            id,
            RequestKind::RangeSlice {
                slice: RowRange::new(min, max),
            },
            false,
            Map::new(),
        );
    }

    pub fn deselect(&mut self, selection: &Selection, opts: DeselectOptions) -> bool {
        let changed = self.deselect_inner(selection, opts);
        self.pump();
        changed
    }

    /// Returns whether anything was deselected
    pub(super) fn deselect_inner(&mut self, selection: &Selection, opts: DeselectOptions) -> bool {
        let view = selection.view().clone();
        let Some(buffer) = self.views.get_mut(&view) else {
            return false;
        };
        let affected: Vec<Uid> = if opts.clearall {
            buffer.selected().uids().to_vec()
        } else {
            selection
                .uids()
                .iter()
                .filter(|u| buffer.selected().contains_uid(u))
                .cloned()
                .collect()
        };
        if !buffer.deselect(selection, opts.clearall) {
            return false;
        }
        if self.view.as_ref() == Some(&view) {
            self.mark_selected(&affected, false);
        }
        self.emit(ViewportEvent::Deselect {
            selection: selection.clone(),
            opts,
        });
        true
    }

    /// Selection of the active view
    pub fn selected(&self) -> Option<&Selection> {
        self.buffer(None).map(|b| b.selected())
    }

    /// Selection of any cached view
    pub fn selection(&self, view: &ViewKey) -> Option<&Selection> {
        self.views.get(view).map(|b| b.selected())
    }

    /// Selection over a view's buffer from any coordinates
    pub fn create_selection(&self, coords: Coords, view: Option<&ViewKey>) -> Option<Selection> {
        self.buffer(view).map(|b| Selection::from_coords(b, coords))
    }

    /// Selection holding every indexed row of a view
    pub fn create_selection_buffer(&self, view: Option<&ViewKey>) -> Option<Selection> {
        self.buffer(view)
            .map(|b| Selection::from_coords(b, Coords::Uids(b.all_uids())))
    }
}
