// Notifications the engine emits to the surrounding UI
//
// Every notification carries just enough for a listener to react (the row,
// the selection, the pane mode) without reaching back into the engine.
// Listeners are plain closures; a tokio channel is available for listeners
// living in another task.

use crate::selection::Selection;
use crate::types::{DomId, PaneMode, Uid, ViewKey};
use serde_json::Value;
use tokio::sync::mpsc;

/// A rendered row as the engine currently displays it
#[derive(Debug, Clone, PartialEq)]
pub struct RowNode {
    pub dom_id: DomId,
    pub uid: Uid,
    pub rownum: usize,
    /// Output of the row renderer
    pub markup: String,
    pub selected: bool,
    /// Row revision the markup was built from
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewportEvent {
    /// A row node entered the screen
    RowAdded(RowNode),
    /// A row node is about to leave the screen
    RowCleared(RowNode),
    ContentComplete,
    Select {
        selection: Selection,
        opts: SelectOptions,
    },
    Deselect {
        selection: Selection,
        opts: DeselectOptions,
    },
    /// Rows are about to be removed
    Remove(Selection),
    /// Foreground fetch started
    Fetch(ViewKey),
    /// Foreground fetch finished
    EndFetch(ViewKey),
    EndRangeFetch(ViewKey),
    SplitBarStart(PaneMode),
    SplitBarChange(PaneMode),
    SplitBarEnd(PaneMode),
    /// Server has not answered a foreground request in time
    Wait(ViewKey),
    /// Scroll handle is being dragged
    Slide { offset: usize },
}

impl ViewportEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::RowAdded(_) => "add",
            Self::RowCleared(_) => "clear",
            Self::ContentComplete => "contentComplete",
            Self::Select { .. } => "select",
            Self::Deselect { .. } => "deselect",
            Self::Remove(_) => "remove",
            Self::Fetch(_) => "fetch",
            Self::EndFetch(_) => "endFetch",
            Self::EndRangeFetch(_) => "endRangeFetch",
            Self::SplitBarStart(_) => "splitBarStart",
            Self::SplitBarChange(_) => "splitBarChange",
            Self::SplitBarEnd(_) => "splitBarEnd",
            Self::Wait(_) => "wait",
            Self::Slide { .. } => "slide",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operation options
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOptions {
    /// Fill the cache without touching the screen
    pub background: bool,
    /// Open the view at the row matching this search
    pub search: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectOptions {
    /// Add to the current selection instead of replacing it
    pub add: bool,
    /// Shift-click style range selection
    pub range: bool,
    pub right_click: bool,
    /// Ask the server for the row matching this search and select it
    pub search: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeselectOptions {
    pub clearall: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Skip the content refresh after removal
    pub noupdate: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollOptions {
    /// Put the row at the top of the page even if it is already visible
    pub top: bool,
    /// Put the row at the bottom of the page when scrolling down
    pub bottom: bool,
    pub noupdate: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Rebuild every node instead of reusing on-screen ones
    pub updated: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Listener registry
// ─────────────────────────────────────────────────────────────────────────────

pub type Listener = Box<dyn FnMut(&ViewportEvent)>;

/// Fans events out to closures and channels
#[derive(Default)]
pub struct Emitter {
    listeners: Vec<Listener>,
    channels: Vec<mpsc::UnboundedSender<ViewportEvent>>,
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}

impl Emitter {
    pub fn on(&mut self, listener: impl FnMut(&ViewportEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn subscribe_channel(&mut self) -> mpsc::UnboundedReceiver<ViewportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.push(tx);
        rx
    }

    pub fn emit(&mut self, event: ViewportEvent) {
        tracing::trace!(event = event.name(), "viewport event");
        for listener in &mut self.listeners {
            listener(&event);
        }
        // Closed receivers are dropped
        self.channels.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
