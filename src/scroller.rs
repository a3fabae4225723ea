// Scroll cursor for the viewport list
//
// Tracks where the visible window starts within the full row set. It knows
// nothing about which rows are cached; the engine asks it for an offset and
// decides whether that offset can be rendered or must be fetched first.

/// Scrollbar model: position, content size, page size
#[derive(Debug, Clone, Default)]
pub struct Scroller {
    /// 0-based index of the top visible row
    offset: usize,

    /// Total rows in the view (server side)
    total: usize,

    /// Rows visible at once
    page: usize,

    /// Suppress the refresh a position change would normally trigger
    ///
    /// Set while the engine repositions the handle itself during a render.
    pub noupdate: bool,
}

impl Scroller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure handle proportions
    pub fn set_size(&mut self, visible: usize, total: usize) {
        self.page = visible;
        self.total = total;
        self.offset = self.offset.min(self.max_offset());
    }

    /// Reposition the handle; returns whether the offset changed
    ///
    /// Offsets are clamped to `[0, total - page]`.
    pub fn move_scroll(&mut self, offset: usize) -> bool {
        let clamped = offset.min(self.max_offset());
        let changed = clamped != self.offset;
        self.offset = clamped;
        changed
    }

    /// Reset to an empty, unscrolled state
    pub fn clear(&mut self) {
        self.set_size(0, 0);
        self.offset = 0;
    }

    pub fn current_offset(&self) -> usize {
        self.offset
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn page(&self) -> usize {
        self.page
    }

    /// Whether content overflows the page
    pub fn needs_scroll(&self) -> bool {
        self.total > self.page
    }

    /// Handle length in cells for a track of `track` cells (at least 1)
    pub fn handle_length(&self, track: usize) -> usize {
        if self.total == 0 || !self.needs_scroll() {
            return track;
        }
        ((track * self.page) / self.total).clamp(1, track.max(1))
    }

    /// Handle top position in cells for a track of `track` cells
    pub fn handle_position(&self, track: usize) -> usize {
        let free = track.saturating_sub(self.handle_length(track));
        match self.max_offset() {
            0 => 0,
            max => (free * self.offset + max / 2) / max,
        }
    }

    /// Rows one wheel notch moves
    pub fn wheel_step(&self) -> usize {
        self.page.min(3)
    }

    fn max_offset(&self) -> usize {
        self.total.saturating_sub(self.page)
    }
}
