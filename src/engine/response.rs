// Response ingestion
//
// Row data from every response is merged into its view's buffer, stale or
// not. Only the response to the active request moves the screen; any other
// response re-renders the current window in place when that window is
// fully cached.

use super::{Continuation, Deferred, Phase, ResponseInfo, SelectTarget, Viewport};
use crate::buffer::UpdateFlags;
use crate::error::Result;
use crate::events::{DeselectOptions, RefreshOptions, SelectOptions, ViewportEvent};
use crate::protocol::ViewportResponse;
use crate::selection::{Coords, Selection};
use tracing::{debug, info, warn};

impl Viewport {
    /// Feed a server response into the engine
    pub fn ingest(&mut self, response: ViewportResponse) {
        self.ingest_guarded(response);
        self.pump();
    }

    /// Decode and ingest a JSON response body
    pub fn ingest_json(&mut self, body: &str) -> Result<()> {
        let response = ViewportResponse::from_json(body)?;
        self.ingest(response);
        Ok(())
    }

    pub(super) fn ingest_guarded(&mut self, mut r: ViewportResponse) {
        if self.phase != Phase::Idle {
            self.defer(Deferred::Response(r));
            return;
        }
        self.phase = Phase::Applying;

        if let Some(token) = r.updatecacheid.take() {
            debug!(view = %r.view, cacheid = %token, "cache confirmed");
            if let Some(buffer) = self.views.get_mut(&r.view) {
                buffer.meta.cacheid = Some(token);
            }
            self.phase = Phase::Idle;
            return;
        }

        let view = r.view.clone();
        let rangelist = r.rangelist.take();

        if r.cacheid.is_some() {
            self.apply_response(r);
        } else {
            debug!(view = %view, request_id = ?r.requestid, "response without cache token, nothing merged");
            self.settle_request(&r);
        }

        if let Some(uids) = rangelist {
            if self.view.as_ref() == Some(&view) {
                if let Some(buffer) = self.views.get(&view) {
                    let selection = Selection::from_coords(buffer, Coords::Uids(uids));
                    self.select_inner(
                        SelectTarget::Selection(selection),
                        SelectOptions {
                            range: true,
                            ..Default::default()
                        },
                    );
                }
            }
            self.emit(ViewportEvent::EndRangeFetch(view));
        }

        self.phase = Phase::Idle;
    }

    /// Drop ledger, continuation and active-request state for a response
    /// that carried nothing to merge
    fn settle_request(&mut self, r: &ViewportResponse) {
        let Some(id) = r.requestid else {
            return;
        };
        if let Some(buffer) = self.views.get_mut(&r.view) {
            buffer.resolve_request(id);
            buffer.meta.continuations.remove(&id);
        }
        if self.active_req == Some(id) {
            self.active_req = None;
            self.clear_wait();
            self.emit(ViewportEvent::EndFetch(r.view.clone()));
        }
    }

    fn apply_response(&mut self, r: ViewportResponse) {
        let view = r.view.clone();
        let is_active = r.requestid.is_some() && r.requestid == self.active_req;
        let on_screen = self.view.as_ref() == Some(&view);
        let ps = self.ps();

        if !self.views.contains_key(&view) {
            warn!(view = %view, "response for unknown view");
            self.settle_request(&r);
            return;
        }
        if is_active {
            self.clear_wait();
        }

        if r.data_reset {
            if on_screen {
                if let Some(selected) = self.selected().cloned() {
                    self.deselect_inner(&selected, DeselectOptions { clearall: true });
                }
            } else if let Some(buffer) = self.views.get_mut(&view) {
                let selected = buffer.selected().clone();
                buffer.deselect(&selected, true);
            }
        }

        if !r.disappear.is_empty() {
            if let Some(buffer) = self.views.get(&view) {
                let gone = Selection::from_coords(buffer, Coords::Uids(r.disappear.clone()));
                if !gone.is_empty() {
                    info!(view = %view, rows = gone.len(), "rows disappeared on server");
                    self.remove_rows(&gone);
                }
            }
        }

        let ViewportResponse {
            cacheid,
            totalrows,
            data,
            rowlist,
            metadata,
            label,
            data_reset,
            rowlist_reset,
            metadata_reset,
            requestid,
            rownum,
            ..
        } = r;

        let Some(buffer) = self.views.get_mut(&view) else {
            return;
        };
        let merged = data.len();
        buffer.update(
            data,
            rowlist,
            metadata,
            UpdateFlags {
                data_reset,
                rowlist_reset,
                metadata_reset,
            },
        );
        if let Some(id) = requestid {
            buffer.resolve_request(id);
        }
        buffer.meta.cacheid = cacheid;
        if label.is_some() {
            buffer.meta.label = label;
        }
        if let Some(total) = totalrows {
            buffer.set_total_rows(total);
        }
        if buffer.total_rows().is_none() {
            let count = buffer.row_count();
            buffer.set_total_rows(count);
        }
        let continuation = requestid.and_then(|id| buffer.meta.continuations.remove(&id));
        debug!(
            view = %view,
            request_id = ?requestid,
            rows = merged,
            total = ?buffer.total_rows(),
            active = is_active,
            "merged response"
        );

        let mut offset = None;
        if is_active {
            self.active_req = None;
            let req_offset = buffer.meta.req_offset.take();
            offset = match rownum {
                Some(n) => {
                    let total = buffer.total_rows().unwrap_or(0);
                    Some((n.max(1) - 1).min(total.saturating_sub(ps)))
                }
                None => req_offset,
            };
            self.emit(ViewportEvent::EndFetch(view.clone()));
        } else if !on_screen {
            if let Some(n) = rownum {
                buffer.meta.offset = Some(n.max(1) - 1);
            }
        }

        if on_screen {
            let opts = RefreshOptions {
                updated: data_reset,
            };
            match offset {
                Some(offset) => {
                    self.refresh(offset, opts);
                }
                None if is_active => {
                    let offset = self.current_offset();
                    self.refresh(offset, opts);
                }
                None => {
                    let offset = self.current_offset();
                    let loaded = self
                        .views
                        .get(&view)
                        .is_some_and(|b| b.slice_loaded(offset, ps, &[]));
                    if loaded {
                        self.refresh(offset, opts);
                    }
                }
            }
        }

        if let (Some(continuation), Some(request_id)) = (continuation, requestid) {
            let info = ResponseInfo {
                view,
                request_id,
                rownum,
                totalrows,
            };
            self.run_continuation(continuation, &info);
        }
    }

    fn run_continuation(&mut self, continuation: Continuation, info: &ResponseInfo) {
        debug!(view = %info.view, request_id = %info.request_id, ?continuation, "running continuation");
        match continuation {
            Continuation::SelectRownum { add } => match info.rownum {
                Some(n) if self.view.as_ref() == Some(&info.view) => {
                    self.select_inner(
                        SelectTarget::RowNumbers(vec![n]),
                        SelectOptions {
                            add,
                            ..Default::default()
                        },
                    );
                }
                _ => debug!(view = %info.view, "search matched no row"),
            },
            Continuation::Custom(f) => f(self, info),
        }
    }
}
