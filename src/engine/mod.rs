//! The viewport engine
//!
//! Owns every view's buffer, the single rendered window, the scroller and
//! the split-pane geometry. Hosts drive it through a handful of entry
//! points (load a view, scroll, resize, select, ingest a response) and get
//! notified through [`ViewportEvent`]s.
//!
//! # Re-entrancy
//!
//! Applying a response, fetching and removing rows only run while the
//! engine is idle. A nested call (for example a render inside a response
//! that discovers missing rows) is queued and runs on the next
//! [`Viewport::pump`]. Every public entry point pumps before returning, so
//! hosts only need to call `pump` themselves after direct buffer surgery.

mod fetch;
mod layout;
mod render;
mod response;
mod select;

#[cfg(test)]
mod tests;

pub use fetch::FetchOptions;
pub use layout::{Geometry, Layout, PageSizeKind};
pub use render::{Content, RowContext, Visibility};
pub use select::SelectTarget;

use crate::buffer::Buffer;
use crate::config::ViewportConfig;
use crate::error::{Result, TransportError, ViewportError};
use crate::events::{Emitter, LoadOptions, RemoveOptions, ViewportEvent};
use crate::protocol::{RequestKind, Transport, ViewportRequest, ViewportResponse};
use crate::scroller::Scroller;
use crate::selection::Selection;
use crate::types::{DomIdAllocator, PaneMode, RequestId, Row, ViewKey};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Upper bound on deferred-task rounds per pump
const MAX_PUMP_ROUNDS: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Collaborators
// ─────────────────────────────────────────────────────────────────────────────

/// Turns a row into markup
///
/// The markup must identify the row by `row.dom_id` and show the selected
/// state from `ctx`.
pub type RowRenderer = Box<dyn Fn(&Row, &RowContext) -> String>;

/// Optional host callbacks
#[derive(Default)]
pub struct Hooks {
    /// Adjust every outgoing request (extra params, sort order, ...)
    pub on_request: Option<Box<dyn FnMut(&mut ViewportRequest)>>,
    /// Adjust the offset a render starts at
    pub on_content_offset: Option<Box<dyn Fn(usize) -> usize>>,
    /// Transport failures
    pub on_failure: Option<Box<dyn FnMut(&TransportError)>>,
    /// Placeholder text for an empty view, overriding the configured one
    pub empty_msg: Option<Box<dyn Fn() -> String>>,
}

/// What a continuation sees of the response that resolved its request
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseInfo {
    pub view: ViewKey,
    pub request_id: RequestId,
    pub rownum: Option<usize>,
    pub totalrows: Option<usize>,
}

/// Work to run when a specific request's response arrives
pub enum Continuation {
    /// Select the row the server pointed at (search selection)
    SelectRownum { add: bool },
    Custom(Box<dyn FnOnce(&mut Viewport, &ResponseInfo)>),
}

impl std::fmt::Debug for Continuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelectRownum { add } => f.debug_struct("SelectRownum").field("add", add).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine state
// ─────────────────────────────────────────────────────────────────────────────

/// What the engine is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Applying,
    Fetching,
}

/// A call that arrived while the engine was busy
#[derive(Debug)]
enum Deferred {
    Response(ViewportResponse),
    Fetch(FetchOptions),
    Remove(Selection, RemoveOptions),
    Resize(Option<usize>),
}

pub struct Viewport {
    config: ViewportConfig,
    hooks: Hooks,
    transport: Box<dyn Transport>,
    renderer: RowRenderer,
    events: Emitter,

    views: HashMap<ViewKey, Buffer>,
    view: Option<ViewKey>,
    ids: DomIdAllocator,

    geometry: Option<Geometry>,
    page_size: Option<usize>,
    pane_mode: PaneMode,
    split: layout::SplitPane,
    layout: Layout,
    scroller: Scroller,
    content: Content,

    phase: Phase,
    queue: VecDeque<Deferred>,
    /// Load waiting for a measurable page size
    pending_load: Option<(ViewKey, LoadOptions)>,
    request_num: u64,
    active_req: Option<RequestId>,
    wait_deadline: Option<Instant>,
}

impl std::fmt::Debug for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewport")
            .field("view", &self.view)
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .field("page_size", &self.page_size)
            .field("pane_mode", &self.pane_mode)
            .field("phase", &self.phase)
            .field("active_req", &self.active_req)
            .field("queued", &self.queue.len())
            .finish()
    }
}

/// Builder for [`Viewport`]
pub struct ViewportBuilder {
    config: ViewportConfig,
    transport: Box<dyn Transport>,
    renderer: RowRenderer,
    hooks: Hooks,
}

impl ViewportBuilder {
    pub fn config(mut self, config: ViewportConfig) -> Self {
        self.config = config;
        self
    }

    pub fn on_request(mut self, f: impl FnMut(&mut ViewportRequest) + 'static) -> Self {
        self.hooks.on_request = Some(Box::new(f));
        self
    }

    pub fn on_content_offset(mut self, f: impl Fn(usize) -> usize + 'static) -> Self {
        self.hooks.on_content_offset = Some(Box::new(f));
        self
    }

    pub fn on_failure(mut self, f: impl FnMut(&TransportError) + 'static) -> Self {
        self.hooks.on_failure = Some(Box::new(f));
        self
    }

    pub fn empty_msg(mut self, f: impl Fn() -> String + 'static) -> Self {
        self.hooks.empty_msg = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Result<Viewport> {
        self.config.validate()?;
        let split = layout::SplitPane::new(self.config.page_size, self.config.pane_width);
        Ok(Viewport {
            pane_mode: self.config.pane_mode,
            config: self.config,
            hooks: self.hooks,
            transport: self.transport,
            renderer: self.renderer,
            events: Emitter::default(),
            views: HashMap::new(),
            view: None,
            ids: DomIdAllocator::new(),
            geometry: None,
            page_size: None,
            split,
            layout: Layout::default(),
            scroller: Scroller::new(),
            content: Content::default(),
            phase: Phase::Idle,
            queue: VecDeque::new(),
            pending_load: None,
            request_num: 1,
            active_req: None,
            wait_deadline: None,
        })
    }
}

impl Viewport {
    pub fn builder(
        transport: impl Transport + 'static,
        renderer: impl Fn(&Row, &RowContext) -> String + 'static,
    ) -> ViewportBuilder {
        ViewportBuilder {
            config: ViewportConfig::default(),
            transport: Box::new(transport),
            renderer: Box::new(renderer),
            hooks: Hooks::default(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Listeners
    // ─────────────────────────────────────────────────────────────────────

    pub fn on_event(&mut self, listener: impl FnMut(&ViewportEvent) + 'static) {
        self.events.on(listener);
    }

    pub fn subscribe_channel(&mut self) -> tokio::sync::mpsc::UnboundedReceiver<ViewportEvent> {
        self.events.subscribe_channel()
    }

    fn emit(&mut self, event: ViewportEvent) {
        self.events.emit(event);
    }

    // ─────────────────────────────────────────────────────────────────────
    // View lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Show (or, with `background`, prefetch) a view
    ///
    /// A cached view renders from its buffer immediately and then asks the
    /// server whether that cache is still valid. An unseen view gets a new
    /// buffer and an initial fetch. Before the page size can be measured
    /// the load is parked until [`Viewport::set_geometry`].
    pub fn load_view(&mut self, view: impl Into<ViewKey>, opts: LoadOptions) {
        let view = view.into();
        self.load_view_inner(view, opts);
        self.pump();
    }

    fn load_view_inner(&mut self, view: ViewKey, opts: LoadOptions) {
        self.clear_wait();

        if self.page_size.is_none() {
            let kind = match self.pane_mode {
                PaneMode::None => PageSizeKind::Max,
                _ => PageSizeKind::Default,
            };
            match self.page_size(kind) {
                Some(ps) => self.page_size = Some(ps),
                None => {
                    debug!(view = %view, "no geometry yet, deferring load");
                    self.pending_load = Some((view, opts));
                    return;
                }
            }
        }

        let mut first = true;
        if let Some(current) = self.view.clone() {
            // Reloading the active view keeps its position too
            if !opts.background {
                let offset = self.current_offset();
                if let Some(buffer) = self.views.get_mut(&current) {
                    buffer.meta.offset = Some(offset);
                }
            }
            first = false;
        }

        let mut fetch = FetchOptions::default();
        if opts.background {
            fetch.background = true;
            fetch.view = Some(view.clone());
        } else {
            if self.view.is_none() {
                self.resize_now(None);
            } else if self.view.as_ref() != Some(&view) {
                self.active_req = None;
            }
            self.view = Some(view.clone());
        }

        if let Some(buffer) = self.views.get(&view) {
            let offset = buffer.meta.offset.unwrap_or(0);
            if opts.background {
                if !buffer.slice_loaded(offset, self.ps(), &[]) {
                    fetch.offset = Some(offset);
                    self.fetch_buffer(fetch);
                }
            } else {
                info!(view = %view, offset, "switching to cached view");
                self.update_content(offset, Default::default());
                self.send_validate(&view);
            }
            return;
        }

        if !first && !opts.background {
            self.clear_screen();
        }

        info!(view = %view, background = opts.background, "creating view buffer");
        self.views
            .insert(view.clone(), Buffer::new(view.clone(), self.ids.clone()));

        match opts.search {
            Some(search) => fetch.search = Some(search),
            None => fetch.offset = Some(0),
        }
        fetch.initial = true;
        self.fetch_buffer(fetch);
    }

    /// Drop a background view's cache
    pub fn delete_view(&mut self, view: &ViewKey) -> Result<()> {
        if self.view.as_ref() == Some(view) {
            return Err(ViewportError::ActiveView(view.clone()));
        }
        match self.views.remove(view) {
            Some(_) => {
                info!(view = %view, "deleted view");
                Ok(())
            }
            None => Err(ViewportError::UnknownView(view.clone())),
        }
    }

    /// Purge the rowlist and refetch around the current offset
    pub fn reload(&mut self, params: Map<String, Value>) {
        let offset = self.current_offset();
        self.fetch_buffer(FetchOptions {
            offset: Some(offset),
            params,
            purge: true,
            ..Default::default()
        });
        self.pump();
    }

    /// Remove rows (server-side deletion already happened)
    pub fn remove(&mut self, selection: Selection, opts: RemoveOptions) {
        self.remove_guarded(selection, opts);
        self.pump();
    }

    fn remove_guarded(&mut self, selection: Selection, opts: RemoveOptions) {
        if selection.is_empty() {
            return;
        }
        if self.phase != Phase::Idle {
            self.defer(Deferred::Remove(selection, opts));
            return;
        }
        self.phase = Phase::Applying;
        self.remove_rows(&selection);
        if !opts.noupdate && self.view.as_ref() == Some(selection.view()) {
            let offset = self.current_offset();
            self.refresh(offset, Default::default());
        }
        self.phase = Phase::Idle;
    }

    /// Notify, deselect and drop rows, then shrink the total
    fn remove_rows(&mut self, selection: &Selection) {
        let view = selection.view().clone();
        if self.view.as_ref() == Some(&view) {
            self.deselect_inner(selection, Default::default());
        }

        self.emit(ViewportEvent::Remove(selection.clone()));

        let Some(buffer) = self.views.get_mut(&view) else {
            return;
        };
        let rownums = selection.rownums(buffer);
        let unindexed: Vec<_> = selection
            .uids()
            .iter()
            .filter(|u| buffer.uid_to_rownum(u).is_none())
            .cloned()
            .collect();
        let removed = buffer.remove(&rownums);
        buffer.remove_data(&unindexed);
        if let Some(total) = buffer.meta.total_rows {
            buffer.meta.total_rows = Some(total.saturating_sub(selection.len()));
        }
        debug!(view = %view, removed, unindexed = unindexed.len(), "removed rows");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Deferred work
    // ─────────────────────────────────────────────────────────────────────

    fn defer(&mut self, task: Deferred) {
        if let Deferred::Resize(_) = task {
            self.queue.retain(|t| !matches!(t, Deferred::Resize(_)));
        }
        debug!(phase = ?self.phase, task = deferred_name(&task), "deferring");
        self.queue.push_back(task);
    }

    /// Run queued work; returns how many tasks ran
    pub fn pump(&mut self) -> usize {
        if self.phase != Phase::Idle {
            return 0;
        }
        let mut ran = 0;
        for _ in 0..MAX_PUMP_ROUNDS {
            if self.queue.is_empty() {
                return ran;
            }
            let batch: Vec<Deferred> = self.queue.drain(..).collect();
            for task in batch {
                ran += 1;
                match task {
                    Deferred::Response(r) => self.ingest_guarded(r),
                    Deferred::Fetch(opts) => self.fetch_buffer(opts),
                    Deferred::Remove(sel, opts) => self.remove_guarded(sel, opts),
                    Deferred::Resize(size) => self.resize_now(size),
                }
            }
        }
        if !self.queue.is_empty() {
            warn!(queued = self.queue.len(), "deferred work still pending after pump");
        }
        ran
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Requests
    // ─────────────────────────────────────────────────────────────────────

    fn next_request_id(&mut self) -> RequestId {
        let id = RequestId(self.request_num);
        self.request_num += 1;
        id
    }

    /// Fill in cache token and cached uids, run the request hook, send
    fn dispatch(
        &mut self,
        view: &ViewKey,
        request_id: RequestId,
        kind: RequestKind,
        initial: bool,
        params: Map<String, Value>,
    ) {
        let (cacheid, cache) = match self.views.get(view) {
            Some(b) => (b.cacheid().map(str::to_string), b.all_uids()),
            None => (None, Vec::new()),
        };
        let mut request = ViewportRequest {
            view: view.clone(),
            request_id,
            cacheid,
            cache,
            kind,
            initial,
            params,
        };
        if let Some(hook) = self.hooks.on_request.as_mut() {
            hook(&mut request);
        }
        debug!(view = %view, request_id = %request_id, slice = ?request.slice(), "sending request");
        if let Err(err) = self.transport.send(request) {
            self.fail_inner(err);
        }
    }

    /// Ask whether the cached rowlist is still current
    fn send_validate(&mut self, view: &ViewKey) {
        let slice = self.slice_bounds(self.current_offset() + 1, None, view);
        let id = self.next_request_id();
        self.dispatch(view, id, RequestKind::Validate { slice }, false, Map::new());
    }

    /// Report a transport failure for an outstanding request
    pub fn fail(&mut self, err: TransportError) {
        self.fail_inner(err);
        self.pump();
    }

    fn fail_inner(&mut self, err: TransportError) {
        error!(view = %err.view, request_id = %err.request_id, "request failed: {}", err.message);
        if let Some(buffer) = self.views.get_mut(&err.view) {
            buffer.resolve_request(err.request_id);
            buffer.meta.continuations.remove(&err.request_id);
        }
        if self.active_req == Some(err.request_id) {
            self.active_req = None;
            self.clear_wait();
            self.emit(ViewportEvent::EndFetch(err.view.clone()));
        }
        if let Some(hook) = self.hooks.on_failure.as_mut() {
            hook(&err);
        }
    }

    /// Whether a foreground request is outstanding
    pub fn is_fetching(&self) -> bool {
        self.active_req.is_some()
    }

    pub fn active_request(&self) -> Option<RequestId> {
        self.active_req
    }

    // ─────────────────────────────────────────────────────────────────────
    // Slow-server notification
    // ─────────────────────────────────────────────────────────────────────

    fn wait_interval(&self) -> Option<Duration> {
        self.config.wait_secs.map(Duration::from_secs)
    }

    fn arm_wait(&mut self) {
        self.wait_deadline = self.wait_interval().map(|d| Instant::now() + d);
    }

    fn clear_wait(&mut self) {
        self.wait_deadline = None;
    }

    /// Emit `Wait` if the foreground request is overdue; re-arms itself
    pub fn poll_wait(&mut self, now: Instant) -> bool {
        match (self.wait_deadline, self.wait_interval()) {
            (Some(deadline), Some(interval)) if now >= deadline => {
                self.wait_deadline = Some(now + interval);
                if let Some(view) = self.view.clone() {
                    warn!(view = %view, "server is slow to respond");
                    self.emit(ViewportEvent::Wait(view));
                }
                true
            }
            _ => false,
        }
    }

    pub fn wait_deadline(&self) -> Option<Instant> {
        self.wait_deadline
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn active_view(&self) -> Option<&ViewKey> {
        self.view.as_ref()
    }

    pub fn views(&self) -> impl Iterator<Item = &ViewKey> {
        self.views.keys()
    }

    pub fn buffer(&self, view: Option<&ViewKey>) -> Option<&Buffer> {
        let view = view.or(self.view.as_ref())?;
        self.views.get(view)
    }

    pub(crate) fn buffer_mut(&mut self, view: Option<&ViewKey>) -> Option<&mut Buffer> {
        let view = view.or(self.view.as_ref())?.clone();
        self.views.get_mut(&view)
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn scroller(&self) -> &Scroller {
        &self.scroller
    }

    /// Metadata of a view (active view by default)
    pub fn metadata(&self, key: &str, view: Option<&ViewKey>) -> Option<Value> {
        self.buffer(view)?.metadata(key)
    }

    /// Caller metadata on a view (active view by default)
    pub fn set_metadata(&mut self, values: Map<String, Value>, view: Option<&ViewKey>) {
        if let Some(buffer) = self.buffer_mut(view) {
            buffer.set_metadata(values);
        }
    }

    /// Total rows of the active view, 0 while unknown
    pub fn total_rows(&self) -> usize {
        self.buffer(None).and_then(|b| b.total_rows()).unwrap_or(0)
    }
}

fn deferred_name(task: &Deferred) -> &'static str {
    match task {
        Deferred::Response(_) => "response",
        Deferred::Fetch(_) => "fetch",
        Deferred::Remove(..) => "remove",
        Deferred::Resize(_) => "resize",
    }
}
