//! Per-view row cache
//!
//! A buffer holds the rows of one view that the client has seen so far:
//! uid -> row data, row number -> uid, the view's selection, and metadata.
//! The two row maps are kept mutually consistent on every mutation: every
//! indexed row number points at a cached row whose `rownum` is that number.

use crate::engine::Continuation;
use crate::selection::Selection;
use crate::types::{DomIdAllocator, Limit, RequestId, Row, RowRange, Uid, ViewKey};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// How `update` treats existing state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateFlags {
    /// Replace all row data (implies a rowlist reset)
    pub data_reset: bool,
    /// Replace the row number index but keep cached row payloads
    pub rowlist_reset: bool,
    /// Drop user metadata before merging
    pub metadata_reset: bool,
}

/// Engine-private bookkeeping stored with each buffer
#[derive(Debug, Default)]
pub(crate) struct SystemMeta {
    /// `None` until the server has reported a row count
    pub total_rows: Option<usize>,
    pub cacheid: Option<String>,
    pub label: Option<String>,
    /// Offset saved when the view was last switched away from
    pub offset: Option<usize>,
    /// Offset the last foreground row request wants rendered
    pub req_offset: Option<usize>,
    /// Search descriptor of the last search request
    pub search: Option<Value>,
    /// In-flight request -> row numbers it will resolve
    pub pending: BTreeMap<RequestId, Vec<usize>>,
    pub continuations: HashMap<RequestId, Continuation>,
}

#[derive(Debug)]
pub struct Buffer {
    view: ViewKey,
    ids: DomIdAllocator,
    data: HashMap<Uid, Row>,
    rowlist: BTreeMap<usize, Uid>,
    selected: Selection,
    pub(crate) meta: SystemMeta,
    user_meta: Map<String, Value>,
}

impl Buffer {
    pub fn new(view: ViewKey, ids: DomIdAllocator) -> Self {
        Self {
            selected: Selection::empty(view.clone()),
            view,
            ids,
            data: HashMap::new(),
            rowlist: BTreeMap::new(),
            meta: SystemMeta::default(),
            user_meta: Map::new(),
        }
    }

    pub fn view(&self) -> &ViewKey {
        &self.view
    }

    // ─────────────────────────────────────────────────────────────────────
    // Merge
    // ─────────────────────────────────────────────────────────────────────

    /// Merge a server payload into the cache
    ///
    /// `data` maps uid -> row fields, `rowlist` assigns row numbers. Rows the
    /// rowlist names but that have no cached data are skipped.
    pub fn update(
        &mut self,
        data: Map<String, Value>,
        rowlist: Vec<(Uid, usize)>,
        metadata: Map<String, Value>,
        flags: UpdateFlags,
    ) {
        if flags.data_reset {
            self.data.clear();
        }

        for (uid, fields) in data {
            let fields = match fields {
                Value::Object(map) => map,
                other => {
                    warn!(view = %self.view, uid = %uid, "row data is not an object: {}", other);
                    continue;
                }
            };
            let uid = Uid::from(uid);
            match self.data.get_mut(&uid) {
                Some(row) => row.replace_fields(fields),
                None => {
                    let row = Row::new(uid.clone(), self.ids.allocate(), fields);
                    self.data.insert(uid, row);
                }
            }
        }

        if flags.data_reset || flags.rowlist_reset {
            self.reset_rowlist();
        }
        if flags.data_reset {
            let Self { selected, data, .. } = self;
            selected.retain_uids(|u| data.contains_key(u));
        }

        for (uid, rownum) in rowlist {
            self.assign(uid, rownum);
        }

        if flags.metadata_reset {
            self.user_meta.clear();
        }
        merge_metadata(&mut self.user_meta, metadata);
    }

    /// Point `rownum` at `uid`, unlinking whatever either side was before
    fn assign(&mut self, uid: Uid, rownum: usize) {
        if rownum == 0 {
            warn!(view = %self.view, uid = %uid, "ignoring row number 0");
            return;
        }
        let Some(row) = self.data.get_mut(&uid) else {
            warn!(view = %self.view, uid = %uid, rownum, "rowlist entry without row data");
            return;
        };
        let old = row.rownum.replace(rownum);

        if let Some(old) = old.filter(|&o| o != rownum) {
            if self.rowlist.get(&old) == Some(&uid) {
                self.rowlist.remove(&old);
            }
        }
        if let Some(prev) = self.rowlist.insert(rownum, uid.clone()) {
            if prev != uid {
                if let Some(prev_row) = self.data.get_mut(&prev) {
                    prev_row.rownum = None;
                }
            }
        }
    }

    /// Overwrite caller fields on the selected rows
    pub fn set_fields(&mut self, selection: &Selection, fields: &Map<String, Value>) {
        for uid in selection.uids() {
            if let Some(row) = self.data.get_mut(uid) {
                let mut merged = row.fields.clone();
                for (k, v) in fields {
                    merged.insert(k.clone(), v.clone());
                }
                row.replace_fields(merged);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Window checks
    // ─────────────────────────────────────────────────────────────────────

    /// Whether every row of the window at `offset` is present
    ///
    /// Rows in `extra` count as present (used to treat loading rows as
    /// covered). An unknown total never counts as loaded.
    pub fn slice_loaded(&self, offset: usize, page_size: usize, extra: &[usize]) -> bool {
        let Some(total) = self.meta.total_rows else {
            return false;
        };
        let range = RowRange::new(offset + 1, (offset + page_size).min(total));
        range
            .iter()
            .all(|n| self.rowlist.contains_key(&n) || extra.contains(&n))
    }

    /// Which edge of the cached slice the window at `offset` is close to
    pub fn is_nearing_limit(&self, offset: usize, page_size: usize, tolerance: usize) -> Option<Limit> {
        let total = self.meta.total_rows?;
        if self.rowlist.len() == total {
            return None;
        }

        let top = RowRange::new((offset + 1).saturating_sub(tolerance).max(1), offset);
        if offset != 0 && top.iter().any(|n| !self.rowlist.contains_key(&n)) {
            return Some(Limit::Top);
        }

        let far = (offset + tolerance + page_size).saturating_sub(1).min(total);
        let bottom = RowRange::new(offset + 1, far);
        if bottom.iter().rev().any(|n| !self.rowlist.contains_key(&n)) {
            return Some(Limit::Bottom);
        }
        None
    }

    // ─────────────────────────────────────────────────────────────────────
    // Removal
    // ─────────────────────────────────────────────────────────────────────

    /// Delete rows by number and close the gaps they leave
    ///
    /// Each surviving row moves down by the count of removed numbers below
    /// it. Returns how many cached rows were removed.
    pub fn remove(&mut self, rownums: &[usize]) -> usize {
        let gone: BTreeSet<usize> = rownums.iter().copied().collect();
        let Some(&min) = gone.first() else {
            return 0;
        };

        let mut removed = 0;
        let tail = self.rowlist.split_off(&min);
        for (n, uid) in tail {
            if gone.contains(&n) {
                self.data.remove(&uid);
                self.selected.remove_uids(std::slice::from_ref(&uid));
                removed += 1;
                continue;
            }
            let shift = gone.range(..n).count();
            let target = n - shift;
            if let Some(row) = self.data.get_mut(&uid) {
                row.rownum = Some(target);
            }
            self.rowlist.insert(target, uid);
        }

        debug!(view = %self.view, removed, "compacted rowlist");
        removed
    }

    /// Drop cached rows that have no row number
    pub(crate) fn remove_data(&mut self, uids: &[Uid]) {
        for uid in uids {
            if let Some(row) = self.data.remove(uid) {
                if let Some(n) = row.rownum {
                    if self.rowlist.get(&n) == Some(uid) {
                        self.rowlist.remove(&n);
                    }
                }
            }
        }
        self.selected.remove_uids(uids);
    }

    /// Forget all row numbers; payloads stay cached
    pub fn reset_rowlist(&mut self) {
        self.rowlist.clear();
        for row in self.data.values_mut() {
            row.rownum = None;
        }
        self.meta.total_rows = None;
    }

    /// Wipe rows, selection and metadata
    pub fn clear(&mut self) {
        self.data.clear();
        self.selected.clear();
        self.user_meta.clear();
        self.meta = SystemMeta::default();
        self.reset_rowlist();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Selection delegation
    // ─────────────────────────────────────────────────────────────────────

    pub fn select(&mut self, selection: &Selection) {
        let uids: Vec<Uid> = selection
            .uids()
            .iter()
            .filter(|u| self.data.contains_key(*u))
            .cloned()
            .collect();
        self.selected.add_uids(uids);
    }

    /// Returns whether the selection changed
    pub fn deselect(&mut self, selection: &Selection, clearall: bool) -> bool {
        let before = self.selected.len();
        if clearall {
            self.selected.clear();
        } else {
            self.selected.remove_uids(selection.uids());
        }
        before != self.selected.len()
    }

    pub fn selected(&self) -> &Selection {
        &self.selected
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lookups
    // ─────────────────────────────────────────────────────────────────────

    pub fn row(&self, uid: &Uid) -> Option<&Row> {
        self.data.get(uid)
    }

    pub fn contains_uid(&self, uid: &Uid) -> bool {
        self.data.contains_key(uid)
    }

    pub fn uid_at(&self, rownum: usize) -> Option<&Uid> {
        self.rowlist.get(&rownum)
    }

    pub fn uid_to_rownum(&self, uid: &Uid) -> Option<usize> {
        self.data.get(uid).and_then(|r| r.rownum)
    }

    pub fn rows_to_uids(&self, rownums: &[usize]) -> Vec<Uid> {
        rownums
            .iter()
            .filter_map(|n| self.rowlist.get(n))
            .cloned()
            .collect()
    }

    pub fn dom_ids_to_uids(&self, ids: &[crate::types::DomId]) -> Vec<Uid> {
        ids.iter()
            .filter_map(|id| self.data.values().find(|r| &r.dom_id == id))
            .map(|r| r.uid.clone())
            .collect()
    }

    /// Indexed uids in row order
    pub fn all_uids(&self) -> Vec<Uid> {
        self.rowlist.values().cloned().collect()
    }

    /// Indexed row numbers, ascending
    pub fn all_rows(&self) -> Vec<usize> {
        self.rowlist.keys().copied().collect()
    }

    pub fn row_count(&self) -> usize {
        self.rowlist.len()
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Metadata
    // ─────────────────────────────────────────────────────────────────────

    pub fn total_rows(&self) -> Option<usize> {
        self.meta.total_rows
    }

    pub fn set_total_rows(&mut self, total: usize) {
        self.meta.total_rows = Some(total);
    }

    pub fn cacheid(&self) -> Option<&str> {
        self.meta.cacheid.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.meta.label.as_deref()
    }

    /// System keys first (`total_rows`, `cacheid`, `label`, `offset`), then
    /// user metadata
    pub fn metadata(&self, key: &str) -> Option<Value> {
        let system = match key {
            "total_rows" => self.meta.total_rows.map(Value::from),
            "cacheid" => self.meta.cacheid.clone().map(Value::from),
            "label" => self.meta.label.clone().map(Value::from),
            "offset" => self.meta.offset.map(Value::from),
            _ => None,
        };
        system.or_else(|| self.user_meta.get(key).cloned())
    }

    pub fn set_metadata(&mut self, values: Map<String, Value>) {
        for (k, v) in values {
            self.user_meta.insert(k, v);
        }
    }

    pub fn user_metadata(&self) -> &Map<String, Value> {
        &self.user_meta
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pending-request ledger
    // ─────────────────────────────────────────────────────────────────────

    /// Row numbers covered by any in-flight request
    pub fn loading_rows(&self) -> Vec<usize> {
        self.meta.pending.values().flatten().copied().collect()
    }

    pub(crate) fn track_request(&mut self, id: RequestId, rows: Vec<usize>) {
        self.meta.pending.insert(id, rows);
    }

    pub(crate) fn resolve_request(&mut self, id: RequestId) -> bool {
        self.meta.pending.remove(&id).is_some()
    }

    /// In-flight request covering `rownum`, else the newest one
    pub(crate) fn pending_request_for(&self, rownum: usize) -> Option<RequestId> {
        self.meta
            .pending
            .iter()
            .find(|(_, rows)| rows.contains(&rownum))
            .map(|(id, _)| *id)
            .or_else(|| self.meta.pending.keys().next_back().copied())
    }

    pub fn pending_requests(&self) -> usize {
        self.meta.pending.len()
    }

    /// JSON dump of the cache for debugging
    pub fn debug_json(&self) -> Value {
        let rowlist: Map<String, Value> = self
            .rowlist
            .iter()
            .map(|(n, uid)| (n.to_string(), Value::from(uid.as_str())))
            .collect();
        let data: Map<String, Value> = self
            .data
            .iter()
            .map(|(uid, row)| {
                (
                    uid.to_string(),
                    serde_json::to_value(row).unwrap_or(Value::Null),
                )
            })
            .collect();
        serde_json::json!({
            "view": self.view,
            "data": data,
            "rowlist": rowlist,
            "metadata": {
                "total_rows": self.meta.total_rows,
                "cacheid": self.meta.cacheid,
                "label": self.meta.label,
                "offset": self.meta.offset,
                "pending": self.meta.pending.iter()
                    .map(|(id, rows)| (id.to_string(), Value::from(rows.clone())))
                    .collect::<Map<String, Value>>(),
            },
            "usermetadata": self.user_meta,
            "selected": self.selected.uids(),
        })
    }
}

/// Scalars and arrays overwrite, objects merge key by key
fn merge_metadata(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(update)) => {
                merge_metadata(existing, update);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}
