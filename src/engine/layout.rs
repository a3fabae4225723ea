// Geometry, page sizing and the split pane

use super::{Deferred, Viewport};
use crate::events::{RefreshOptions, ViewportEvent};
use crate::types::PaneMode;
use tracing::debug;

/// Smallest page the default horizontal split will shrink to
const MIN_DEFAULT_PAGE: usize = 5;

/// Measurements pushed by the host (pixels, or terminal cells)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Geometry {
    /// Height available to the list, header included
    pub viewport_height: usize,
    /// Height of one row
    pub line_height: usize,
    /// Height of the list header
    pub header_height: usize,
    /// Width of the whole container
    pub container_width: usize,
}

/// Computed placement of the list and the preview pane
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Layout {
    pub list_height: usize,
    /// Fixed list width in vertical mode
    pub list_width: Option<usize>,
    pub preview_visible: bool,
    pub preview_height: usize,
    pub preview_width: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSizeKind {
    /// Page size in use
    Configured,
    /// In-use size clipped to the row count
    Current,
    /// Size a fresh split pane starts with
    Default,
    /// Rows that fit the available height
    Max,
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    orig: usize,
    lines: usize,
    max: usize,
    width: Option<usize>,
}

/// Split-pane bookkeeping
#[derive(Debug, Clone, Default)]
pub(super) struct SplitPane {
    /// Mode the current layout was built for
    curr: Option<PaneMode>,
    /// Remembered horizontal page size
    horiz_loc: Option<usize>,
    vert_width: Option<usize>,
    drag: Option<Drag>,
}

impl SplitPane {
    pub(super) fn new(page_size: Option<usize>, pane_width: Option<usize>) -> Self {
        Self {
            horiz_loc: page_size,
            vert_width: pane_width,
            ..Default::default()
        }
    }
}

impl Viewport {
    /// Page size in use, 0 before the first measurement
    pub(crate) fn ps(&self) -> usize {
        self.page_size.unwrap_or(0)
    }

    pub fn page_size(&self, kind: PageSizeKind) -> Option<usize> {
        match kind {
            PageSizeKind::Configured => self.page_size,
            PageSizeKind::Current => {
                let ps = self.page_size?;
                Some(match self.buffer(None).and_then(|b| b.total_rows()) {
                    Some(total) => ps.min(total),
                    None => ps,
                })
            }
            PageSizeKind::Default => {
                let max = self.page_size(PageSizeKind::Max)?;
                Some(match self.pane_mode {
                    PaneMode::Vertical => max,
                    _ => (max * 45 / 100).max(MIN_DEFAULT_PAGE),
                })
            }
            PageSizeKind::Max => {
                let g = self.geometry?;
                if g.line_height == 0 {
                    return None;
                }
                Some((g.viewport_height.saturating_sub(g.header_height) / g.line_height).max(1))
            }
        }
    }

    pub fn pane_mode(&self) -> PaneMode {
        self.pane_mode
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// List width in vertical mode, 0 otherwise
    pub fn vert_width(&self) -> usize {
        match self.pane_mode {
            PaneMode::Vertical => self.split.vert_width.unwrap_or(0),
            _ => 0,
        }
    }

    /// New measurements from the host
    ///
    /// Resumes a load that was waiting for a page size; otherwise schedules
    /// a resize.
    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = Some(geometry);
        match self.pending_load.take() {
            Some((view, opts)) => self.load_view_inner(view, opts),
            None => self.on_resize(false, None),
        }
        self.pump();
    }

    /// Recompute sizes; `nowait` runs immediately, otherwise the resize is
    /// coalesced and runs on the next pump
    pub fn on_resize(&mut self, nowait: bool, size: Option<usize>) {
        if nowait {
            self.resize_now(size);
        } else {
            self.defer(Deferred::Resize(size));
        }
    }

    /// Switch split mode and re-layout
    pub fn show_split_pane(&mut self, mode: PaneMode) {
        self.pane_mode = mode;
        self.resize_now(None);
        self.pump();
    }

    pub(super) fn resize_now(&mut self, size: Option<usize>) {
        let geometry = self.geometry.unwrap_or_default();
        let lh = geometry.line_height;
        let mut opts = RefreshOptions::default();

        if size.is_some() {
            self.page_size = size;
        }
        let curr = self.split.curr.unwrap_or(PaneMode::None);
        if self.view.is_some() && curr != self.pane_mode {
            opts.updated = true;
        }

        match self.pane_mode {
            PaneMode::Horizontal => {
                self.split.curr = Some(PaneMode::Horizontal);
                if size.is_none() {
                    let max = self.page_size(PageSizeKind::Max);
                    let ps = match (self.split.horiz_loc.filter(|l| *l > 0), max) {
                        (Some(loc), Some(max)) => Some(loc.min(max)),
                        (Some(loc), None) => Some(loc),
                        (None, _) => self.page_size(PageSizeKind::Default),
                    };
                    if ps.is_some() {
                        self.page_size = ps;
                    }
                }
                self.split.horiz_loc = self.page_size;

                let list_height = geometry.header_height + lh * self.ps();
                self.layout = Layout {
                    list_height,
                    list_width: None,
                    preview_visible: true,
                    preview_height: geometry.viewport_height.saturating_sub(list_height),
                    preview_width: geometry.container_width,
                };
            }
            PaneMode::Vertical => {
                self.split.curr = Some(PaneMode::Vertical);
                if size.is_none() {
                    if let Some(max) = self.page_size(PageSizeKind::Max) {
                        self.page_size = Some(max);
                    }
                }
                let width = *self
                    .split
                    .vert_width
                    .get_or_insert(geometry.container_width * 35 / 100);

                let list_height = geometry.header_height + lh * self.ps();
                self.layout = Layout {
                    list_height,
                    list_width: Some(width),
                    preview_visible: true,
                    preview_height: list_height,
                    preview_width: geometry.container_width.saturating_sub(width),
                };
            }
            PaneMode::None => {
                self.split.curr = None;
                if size.is_none() {
                    if let Some(max) = self.page_size(PageSizeKind::Max) {
                        self.page_size = Some(max);
                    }
                }
                self.layout = Layout {
                    list_height: geometry.header_height + lh * self.ps(),
                    ..Default::default()
                };
            }
        }

        debug!(page_size = ?self.page_size, pane = self.pane_mode.as_str(), "resized");

        if self.view.is_some() {
            let offset = self.current_offset();
            self.refresh(offset, opts);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Split bar dragging
    // ─────────────────────────────────────────────────────────────────────

    pub fn split_bar_start(&mut self) {
        if self.pane_mode == PaneMode::None {
            return;
        }
        let ps = self.ps();
        self.split.drag = Some(Drag {
            orig: ps,
            lines: ps,
            max: self.page_size(PageSizeKind::Max).unwrap_or(ps),
            width: None,
        });
        self.emit(ViewportEvent::SplitBarStart(self.pane_mode));
    }

    /// Move the bar; returns the snapped position
    ///
    /// Horizontal: `pos` is the bar's offset below the list top and snaps to
    /// whole rows in `[1, max]`. Vertical: `pos` is the new list width.
    pub fn split_bar_drag(&mut self, pos: usize) -> usize {
        let lh = self.geometry.map(|g| g.line_height).unwrap_or(0);
        let mode = self.pane_mode;
        let Some(drag) = self.split.drag.as_mut() else {
            return pos;
        };
        match mode {
            PaneMode::Horizontal if lh > 0 => {
                drag.lines = (pos / lh).clamp(1, drag.max.max(1));
                drag.lines * lh
            }
            PaneMode::Vertical => {
                drag.width = Some(pos);
                pos
            }
            _ => pos,
        }
    }

    pub fn split_bar_end(&mut self) {
        let Some(drag) = self.split.drag.take() else {
            return;
        };
        let changed = match self.pane_mode {
            PaneMode::Horizontal => {
                self.resize_now(Some(drag.lines));
                drag.orig != drag.lines
            }
            PaneMode::Vertical => match drag.width {
                Some(width) => {
                    self.split.vert_width = Some(width);
                    self.apply_vert_width(width);
                    true
                }
                None => false,
            },
            PaneMode::None => false,
        };
        if changed {
            self.emit(ViewportEvent::SplitBarChange(self.pane_mode));
        }
        self.emit(ViewportEvent::SplitBarEnd(self.pane_mode));
        self.pump();
    }

    /// Reset the split to its default size
    pub fn split_bar_double_click(&mut self) {
        let changed = match self.pane_mode {
            PaneMode::Horizontal => {
                let old = self.page_size;
                let default = self.page_size(PageSizeKind::Default);
                self.resize_now(default);
                old != self.page_size
            }
            PaneMode::Vertical => {
                let width = self.geometry.map(|g| g.container_width).unwrap_or(0) * 45 / 100;
                self.split.vert_width = Some(width);
                self.apply_vert_width(width);
                true
            }
            PaneMode::None => false,
        };
        if changed {
            self.emit(ViewportEvent::SplitBarChange(self.pane_mode));
        }
        self.pump();
    }

    fn apply_vert_width(&mut self, width: usize) {
        let container = self.geometry.map(|g| g.container_width).unwrap_or(0);
        self.layout.list_width = Some(width);
        self.layout.preview_width = container.saturating_sub(width);
    }
}
