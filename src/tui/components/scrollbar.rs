//! Scrollbar rendering and hit-testing for the message list
//!
//! The list's scroll position lives in the engine's [`Scroller`]; this
//! module draws it with ratatui's scrollbar widget and maps mouse positions
//! on the track back to row offsets.

use ratatui::{
    layout::Rect,
    widgets::{Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame,
};
use viewport::scroller::Scroller;

/// Visual style for the scrollbar
#[derive(Debug, Clone, Copy, Default)]
pub enum ScrollbarStyle {
    /// Arrows at top and bottom (↑ ↓)
    Arrows,
    /// Minimal style - no arrows, just the thumb
    #[default]
    Minimal,
}

/// Render a vertical scrollbar on the right edge of `area`
///
/// Only renders if the view has more rows than fit on a page.
pub fn render_scrollbar(f: &mut Frame, area: Rect, scroller: &Scroller, style: ScrollbarStyle) {
    if !scroller.needs_scroll() {
        return;
    }

    let scrollbar = match style {
        ScrollbarStyle::Arrows => Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("↑"))
            .end_symbol(Some("↓")),
        ScrollbarStyle::Minimal => Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(None)
            .end_symbol(None),
    };

    // ScrollbarState wants: content_length (how much can scroll) and position
    let content_length = scroller.total().saturating_sub(scroller.page());
    let mut scrollbar_state = ScrollbarState::new(content_length)
        .viewport_content_length(scroller.page())
        .position(scroller.current_offset());

    f.render_stateful_widget(scrollbar, area, &mut scrollbar_state);
}

/// Row offset for a pointer at `row` cells down a track of `track` cells
///
/// The track maps linearly onto `[0, total - page]`.
pub fn offset_at(scroller: &Scroller, track: usize, row: usize) -> usize {
    let max = scroller.total().saturating_sub(scroller.page());
    if track <= 1 || max == 0 {
        return 0;
    }
    let row = row.min(track - 1);
    (row * max + (track - 1) / 2) / (track - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_at_track_ends() {
        let mut scroller = Scroller::new();
        scroller.set_size(10, 110);
        assert_eq!(offset_at(&scroller, 11, 0), 0);
        assert_eq!(offset_at(&scroller, 11, 10), 100);
        assert_eq!(offset_at(&scroller, 11, 5), 50);
        // Past the end clamps
        assert_eq!(offset_at(&scroller, 11, 40), 100);
    }

    #[test]
    fn test_offset_at_without_overflow() {
        let mut scroller = Scroller::new();
        scroller.set_size(10, 8);
        assert_eq!(offset_at(&scroller, 10, 9), 0);
    }
}
