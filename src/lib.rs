//! viewport - a windowed, server-backed list engine
//!
//! A [`Viewport`] shows a page-sized window onto a list that lives on a
//! server (a mailbox, a search result) while caching only the rows it has
//! seen. It decides which slice of rows to request, merges responses into a
//! per-view [`Buffer`], renders the visible window through a caller-supplied
//! row renderer and tracks selections across scrolling and view switches.
//!
//! The engine is transport-agnostic: requests go out through a [`Transport`]
//! and responses come back through [`Viewport::ingest`]. The [`demo`] module
//! has an in-memory mail server that speaks the same protocol.
//!
//! [`Viewport`]: engine::Viewport
//! [`Buffer`]: buffer::Buffer
//! [`Transport`]: protocol::Transport
//! [`Viewport::ingest`]: engine::Viewport::ingest

pub mod buffer;
pub mod config;
pub mod demo;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod protocol;
pub mod scroller;
pub mod selection;
pub mod types;
pub mod util;

pub use engine::{Geometry, PageSizeKind, RowContext, Viewport};
pub use error::{Result, TransportError, ViewportError};
pub use events::ViewportEvent;
pub use protocol::{Transport, ViewportRequest, ViewportResponse};
pub use selection::{Coords, Selection};
pub use types::{PaneMode, Row, Uid, ViewKey};
