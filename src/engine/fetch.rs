// Request scheduling: slice arithmetic, ledger dedup, continuations

use super::{Continuation, Deferred, Phase, Viewport};
use crate::events::ViewportEvent;
use crate::protocol::{Hydrate, RequestKind, Window};
use crate::types::{Limit, RequestId, RowRange, ViewKey};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Parameters of a data fetch
#[derive(Debug, Default)]
pub struct FetchOptions {
    /// Top offset the caller wants rendered (row requests)
    pub offset: Option<usize>,
    /// Search descriptor (search requests)
    pub search: Option<Value>,
    /// Do not track as the request the screen waits on
    pub background: bool,
    /// First load of the view
    pub initial: bool,
    /// Which edge of the cache is running out
    pub nearing: Option<Limit>,
    /// Extra request parameters
    pub params: Map<String, Value>,
    /// Drop the rowlist and rebuild it from the response
    pub purge: bool,
    /// Target view; the active view when `None`
    pub view: Option<ViewKey>,
    /// Run when this request's response arrives
    pub continuation: Option<Continuation>,
}

impl Viewport {
    /// Single funnel for every data request
    pub(crate) fn fetch_buffer(&mut self, opts: FetchOptions) {
        if self.phase != Phase::Idle {
            self.defer(Deferred::Fetch(opts));
            return;
        }
        self.phase = Phase::Fetching;
        self.fetch_buffer_do(opts);
        self.phase = Phase::Idle;
    }

    fn fetch_buffer_do(&mut self, mut opts: FetchOptions) {
        let Some(view) = opts.view.clone().or_else(|| self.view.clone()) else {
            return;
        };
        if !self.views.contains_key(&view) {
            warn!(view = %view, "fetch for unknown view");
            return;
        }

        let mut hydrate = Hydrate {
            purge: opts.purge,
            ..Default::default()
        };

        if opts.search.is_some() || opts.initial || opts.purge {
            let before = self.lookbehind();
            hydrate.window = Some(Window {
                before,
                after: self.buffer_size().saturating_sub(before),
            });
            hydrate.search = opts.search.clone();
            if let Some(buffer) = self.views.get_mut(&view) {
                if let Some(search) = &opts.search {
                    buffer.meta.search = Some(search.clone());
                }
                if opts.purge {
                    buffer.reset_rowlist();
                }
            }
        }

        let mut tracked = None;
        if opts.search.is_none() {
            let offset = opts.offset.unwrap_or(0);
            let rownum = offset + 1;
            let ps = self.ps();
            let bounds = self.slice_bounds(rownum, opts.nearing, &view);

            let Some(buffer) = self.views.get_mut(&view) else {
                return;
            };
            buffer.meta.req_offset = Some(offset);
            let loading = buffer.loading_rows();

            // Window already covered by an in-flight request: wait on it
            if !loading.is_empty() && buffer.slice_loaded(offset, ps, &loading) {
                let target = buffer.pending_request_for(rownum);
                self.promote(&view, target, opts.background);
                return;
            }

            let missing: Vec<usize> = bounds.iter().filter(|n| buffer.uid_at(*n).is_none()).collect();
            if missing.is_empty() {
                return;
            }
            let needed: Vec<usize> = missing.into_iter().filter(|n| !loading.contains(n)).collect();
            let (Some(&first), Some(&last)) = (needed.first(), needed.last()) else {
                let target = buffer.pending_request_for(rownum);
                self.promote(&view, target, opts.background);
                return;
            };
            hydrate.slice = Some(RowRange::new(first, last));
            tracked = Some(needed);
        }

        let id = self.next_request_id();
        if let Some(buffer) = self.views.get_mut(&view) {
            if let Some(rows) = tracked {
                buffer.track_request(id, rows);
            }
            if let Some(continuation) = opts.continuation.take() {
                buffer.meta.continuations.insert(id, continuation);
            }
        }

        if !opts.background {
            self.active_req = Some(id);
            self.emit(ViewportEvent::Fetch(view.clone()));
            self.arm_wait();
        }

        let params = std::mem::take(&mut opts.params);
        self.dispatch(&view, id, RequestKind::Hydrate(hydrate), opts.initial, params);
    }

    /// A foreground caller now waits on an in-flight request
    fn promote(&mut self, view: &ViewKey, target: Option<RequestId>, background: bool) {
        if background || self.active_req.is_some() {
            return;
        }
        if let Some(id) = target {
            debug!(view = %view, request_id = %id, "promoting pending request");
            self.active_req = Some(id);
            self.emit(ViewportEvent::Fetch(view.clone()));
            self.arm_wait();
        }
    }

    /// Row range to request around `rownum`
    ///
    /// Without a direction, `lookbehind` rows go before the target and the
    /// rest of the buffer after it. Budget that would run past either end of
    /// the known row set moves to the other side. Rows past the known total
    /// may still be requested since the view can have grown.
    pub(crate) fn slice_bounds(&self, rownum: usize, nearing: Option<Limit>, view: &ViewKey) -> RowRange {
        let size = self.buffer_size();
        match nearing {
            Some(Limit::Bottom) => {
                let start = rownum + self.ps();
                RowRange::new(start, start + size)
            }
            Some(Limit::Top) => RowRange::new(rownum.saturating_sub(size).max(1), rownum),
            None => {
                let size = size as i64;
                let mut start = rownum as i64 - self.lookbehind() as i64;
                let total = self.views.get(view).and_then(|b| b.total_rows()).unwrap_or(0) as i64;
                let mut end;
                if total > 0 {
                    end = start + size;
                    if end > total {
                        start -= end - total;
                    }
                    if start < 1 {
                        end += 1 - start;
                        start = 1;
                    }
                } else {
                    start = start.max(1);
                    end = start + size;
                }
                RowRange::new(start as usize, end as usize)
            }
        }
    }

    /// Rows cached per view: at least one more than a full screen
    pub fn buffer_size(&self) -> usize {
        let max = self.page_size(super::PageSizeKind::Max).unwrap_or(0);
        (max + 1).max(self.config.buffer_pages * self.ps())
    }

    /// Distance from the cache edge that triggers a prefetch
    pub fn limit_tolerance(&self) -> usize {
        (self.buffer_size() * self.config.limit_factor + 50) / 100
    }

    /// Rows fetched behind the requested row
    pub fn lookbehind(&self) -> usize {
        self.buffer_size() * self.config.lookbehind / 100
    }
}
