//! Engine tests
//!
//! The engine talks to a recording transport; `Harness::serve` answers the
//! recorded requests with the in-memory mail server, so most tests run a
//! full request/response cycle without any async machinery.
//!
//! Geometry used throughout: 100 rows of list height at 10 per row gives a
//! page size of 10, a buffer of 100 rows, 40 rows of lookbehind and a
//! prefetch tolerance of 35 rows.

use super::*;
use crate::demo::MockMailServer;
use crate::events::{DeselectOptions, RefreshOptions, ScrollOptions, SelectOptions};
use crate::protocol::Hydrate;
use crate::selection::Coords;
use crate::types::{RowRange, Uid};
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Outbox {
    sent: Rc<RefCell<Vec<ViewportRequest>>>,
    offline: Rc<Cell<bool>>,
}

impl Outbox {
    fn take(&self) -> Vec<ViewportRequest> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    fn len(&self) -> usize {
        self.sent.borrow().len()
    }
}

impl Transport for Outbox {
    fn send(&mut self, request: ViewportRequest) -> std::result::Result<(), TransportError> {
        if self.offline.get() {
            return Err(TransportError::new(request.view, request.request_id, "offline"));
        }
        self.sent.borrow_mut().push(request);
        Ok(())
    }
}

fn render(row: &Row, ctx: &RowContext) -> String {
    format!("{}{}", row.uid, if ctx.selected { "*" } else { "" })
}

fn geometry() -> Geometry {
    Geometry {
        viewport_height: 120,
        line_height: 10,
        header_height: 20,
        container_width: 100,
    }
}

struct Harness {
    vp: Viewport,
    outbox: Outbox,
    events: Rc<RefCell<Vec<ViewportEvent>>>,
    failures: Rc<Cell<usize>>,
    server: MockMailServer,
}

impl Harness {
    fn new(rows: usize) -> Self {
        Self::with_config(rows, ViewportConfig::default())
    }

    fn with_config(rows: usize, config: ViewportConfig) -> Self {
        let mut server = MockMailServer::new();
        server.add_mailbox("INBOX", rows);
        server.add_mailbox("Archive", 50);
        server.add_mailbox("Trash", 0);

        let outbox = Outbox::default();
        let failures = Rc::new(Cell::new(0));
        let counter = failures.clone();
        let mut vp = Viewport::builder(outbox.clone(), render)
            .config(config)
            .on_failure(move |_| counter.set(counter.get() + 1))
            .build()
            .unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        vp.on_event(move |e| sink.borrow_mut().push(e.clone()));
        vp.set_geometry(geometry());

        Self {
            vp,
            outbox,
            events,
            failures,
            server,
        }
    }

    /// Harness with INBOX loaded and every request answered
    fn loaded(rows: usize) -> Self {
        let mut h = Self::new(rows);
        h.vp.load_view("INBOX", LoadOptions::default());
        h.serve();
        h.clear_events();
        h
    }

    /// Answer outstanding requests until none are left
    fn serve(&mut self) -> usize {
        let mut answered = 0;
        for _ in 0..20 {
            let requests = self.outbox.take();
            if requests.is_empty() {
                break;
            }
            for request in requests {
                let response = self.server.handle(&request);
                self.vp.ingest(response);
                answered += 1;
            }
        }
        answered
    }

    fn answer(&mut self, request: &ViewportRequest) {
        let response = self.server.handle(request);
        self.vp.ingest(response);
    }

    fn markup(&self) -> Vec<String> {
        self.vp.content().nodes().iter().map(|n| n.markup.clone()).collect()
    }

    fn first_uid(&self) -> Option<String> {
        self.vp.content().nodes().first().map(|n| n.uid.to_string())
    }

    fn names(&self) -> Vec<&'static str> {
        self.events.borrow().iter().map(|e| e.name()).collect()
    }

    fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    fn selected_uids(&self) -> Vec<String> {
        self.vp
            .selected()
            .map(|s| s.uids().iter().map(|u| u.to_string()).collect())
            .unwrap_or_default()
    }
}

fn inbox() -> ViewKey {
    ViewKey::from("INBOX")
}

fn uids(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
    range.map(|n| n.to_string()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Sizing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_derived_sizes() {
    let h = Harness::new(10);
    assert_eq!(h.vp.page_size(PageSizeKind::Max), Some(10));
    assert_eq!(h.vp.page_size(PageSizeKind::Configured), Some(10));
    assert_eq!(h.vp.buffer_size(), 100);
    assert_eq!(h.vp.lookbehind(), 40);
    assert_eq!(h.vp.limit_tolerance(), 35);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = ViewportConfig {
        buffer_pages: 0,
        ..Default::default()
    };
    let built = Viewport::builder(Outbox::default(), render).config(config).build();
    assert!(matches!(built, Err(ViewportError::Config(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_initial_load_sends_one_initial_request() {
    let mut h = Harness::new(2);
    h.vp.load_view("INBOX", LoadOptions::default());

    let sent = h.outbox.take();
    assert_eq!(sent.len(), 1);
    let req = &sent[0];
    assert!(req.initial);
    assert_eq!(req.request_id, RequestId(1));
    assert!(req.cache.is_empty());
    assert_eq!(
        req.kind,
        RequestKind::Hydrate(Hydrate {
            slice: Some(RowRange::new(1, 101)),
            search: None,
            window: Some(crate::protocol::Window { before: 40, after: 60 }),
            purge: false,
        })
    );
    assert!(h.vp.is_fetching());

    h.vp.ingest_json(
        r#"{
            "view": "INBOX",
            "cacheid": "c1",
            "totalrows": 2,
            "requestid": 1,
            "data": { "a": { "subject": "hi" }, "b": { "subject": "yo" } },
            "rowlist": { "a": 1, "b": 2 }
        }"#,
    )
    .unwrap();

    assert_eq!(h.markup(), vec!["a", "b"]);
    assert_eq!(h.vp.metadata("total_rows", None), Some(json!(2)));
    assert_eq!(h.vp.current_viewable_range(), RowRange::new(1, 2));
    assert!(!h.vp.is_fetching());
    assert_eq!(
        h.names(),
        vec!["fetch", "endFetch", "add", "add", "contentComplete"]
    );
}

#[test]
fn test_load_waits_for_geometry() {
    let outbox = Outbox::default();
    let mut vp = Viewport::builder(outbox.clone(), render).build().unwrap();

    vp.load_view("INBOX", LoadOptions::default());
    assert_eq!(outbox.len(), 0);
    assert_eq!(vp.active_view(), None);

    vp.set_geometry(geometry());
    assert_eq!(outbox.len(), 1);
    assert_eq!(vp.active_view(), Some(&inbox()));
}

#[test]
fn test_response_fills_metadata() {
    let mut h = Harness::loaded(300);
    assert_eq!(h.vp.total_rows(), 300);
    assert_eq!(h.vp.metadata("label", None), Some(json!("INBOX")));
    assert_eq!(h.vp.metadata("cacheid", None), Some(json!("INBOX|0")));
    assert!(h.vp.metadata("unseen", None).is_some_and(|v| v.is_u64()));

    let mut values = Map::new();
    values.insert("sortby".into(), json!("date"));
    h.vp.set_metadata(values, None);
    assert_eq!(h.vp.metadata("sortby", None), Some(json!("date")));
    assert_eq!(h.markup(), uids(1..=10));
}

#[test]
fn test_empty_view_shows_placeholder() {
    let mut h = Harness::new(10);
    h.vp.load_view("Trash", LoadOptions::default());
    h.serve();

    assert_eq!(h.vp.content(), &Content::Empty("No messages".to_string()));
    assert_eq!(h.vp.total_rows(), 0);
    assert!(!h.vp.is_fetching());
}

#[test]
fn test_empty_message_hook_overrides_config() {
    let outbox = Outbox::default();
    let mut vp = Viewport::builder(outbox.clone(), render)
        .empty_msg(|| "Folder is empty".to_string())
        .build()
        .unwrap();
    vp.set_geometry(geometry());
    vp.load_view("Trash", LoadOptions::default());

    let mut server = MockMailServer::new();
    server.add_mailbox("Trash", 0);
    for req in outbox.take() {
        vp.ingest(server.handle(&req));
    }
    assert_eq!(vp.content(), &Content::Empty("Folder is empty".to_string()));
}

#[test]
fn test_response_without_cacheid_settles_request() {
    let mut h = Harness::new(10);
    h.vp.load_view("INBOX", LoadOptions::default());
    assert!(h.vp.is_fetching());

    h.vp.ingest_json(r#"{"view":"INBOX","requestid":1}"#).unwrap();
    assert!(!h.vp.is_fetching());
    assert!(h.names().contains(&"endFetch"));
    assert_eq!(h.vp.buffer(None).map(|b| b.pending_requests()), Some(0));
}

#[test]
fn test_malformed_json_is_decode_error() {
    let mut h = Harness::new(10);
    assert!(matches!(h.vp.ingest_json("{"), Err(ViewportError::Decode(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Scrolling and prefetch
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_scroll_near_cache_edge_prefetches_in_background() {
    let mut h = Harness::loaded(300);

    assert!(h.vp.request_content_refresh(60, RefreshOptions::default()));
    assert_eq!(h.first_uid().as_deref(), Some("61"));

    let sent = h.outbox.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].slice(), Some(RowRange::new(102, 171)));
    assert!(!sent[0].initial);
    assert_eq!(h.vp.active_request(), None);

    // Departing rows are announced before new ones land
    let names = h.names();
    let first_add = names.iter().position(|n| *n == "add");
    let last_clear = names.iter().rposition(|n| *n == "clear");
    assert!(last_clear < first_add);
}

#[test]
fn test_scroll_into_loading_region_does_not_refetch() {
    let mut h = Harness::loaded(300);
    h.vp.request_content_refresh(60, RefreshOptions::default());
    assert_eq!(h.outbox.len(), 1);

    // Rows 111..120 are covered by the in-flight prefetch
    assert!(!h.vp.request_content_refresh(110, RefreshOptions::default()));
    assert!(!h.vp.request_content_refresh(115, RefreshOptions::default()));
    assert_eq!(h.outbox.len(), 1);
    assert_eq!(h.vp.buffer(None).map(|b| b.pending_requests()), Some(1));
    assert_eq!(h.vp.active_request(), Some(RequestId(2)));

    h.serve();
    assert_eq!(h.vp.current_offset(), 115);
    assert_eq!(h.first_uid().as_deref(), Some("116"));
    assert!(!h.vp.is_fetching());
    assert_eq!(h.outbox.len(), 0);
}

#[test]
fn test_stale_response_merges_without_moving_screen() {
    let mut h = Harness::loaded(300);

    assert!(!h.vp.request_content_refresh(200, RefreshOptions::default()));
    assert!(!h.vp.request_content_refresh(150, RefreshOptions::default()));
    let sent = h.outbox.take();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].slice(), Some(RowRange::new(161, 261)));
    assert_eq!(sent[1].slice(), Some(RowRange::new(111, 160)));
    assert_eq!(h.vp.active_request(), Some(sent[1].request_id));

    // Newer answer first
    h.answer(&sent[1]);
    assert_eq!(h.vp.current_offset(), 150);
    assert_eq!(h.first_uid().as_deref(), Some("151"));
    h.clear_events();

    h.answer(&sent[0]);
    assert_eq!(h.vp.current_offset(), 150);
    assert_eq!(h.first_uid().as_deref(), Some("151"));
    assert!(!h.names().contains(&"add"));
    assert!(!h.names().contains(&"endFetch"));

    // ...but its rows were cached
    let buffer = h.vp.buffer(None).unwrap();
    assert_eq!(buffer.uid_at(200), Some(&Uid::from("200")));
    assert_eq!(buffer.pending_requests(), 0);
}

#[test]
fn test_scroll_to_uncached_row_fetches_then_renders() {
    let mut h = Harness::loaded(300);
    h.vp.scroll_to(250, ScrollOptions::default());

    let sent = h.outbox.take();
    assert_eq!(sent.len(), 1);
    // Budget past the last row moves before the target
    assert_eq!(sent[0].slice(), Some(RowRange::new(200, 300)));
    assert!(h.vp.is_fetching());

    h.answer(&sent[0]);
    assert_eq!(h.vp.current_offset(), 249);
    assert_eq!(h.first_uid().as_deref(), Some("250"));
    assert_eq!(h.outbox.len(), 0);
}

#[test]
fn test_out_of_range_offset_is_clamped_and_fetched() {
    let mut h = Harness::loaded(300);
    assert!(h.vp.buffer(None).unwrap().uid_at(291).is_none());

    // The last page starts at row 291 and none of it is cached yet
    let shown = h.vp.request_content_refresh(300, RefreshOptions::default());
    assert!(!shown);
    assert!(h.vp.is_fetching());
    assert_eq!(h.first_uid().as_deref(), Some("1"));

    let sent = h.outbox.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].slice(), Some(RowRange::new(200, 300)));

    h.answer(&sent[0]);
    assert_eq!(h.vp.current_offset(), 290);
    assert_eq!(h.markup(), uids(291..=300));
    assert!(!h.vp.is_fetching());
}

#[test]
fn test_clamped_offset_on_cached_rows_renders_last_page() {
    let mut h = Harness::loaded(50);
    assert_eq!(h.vp.buffer(None).unwrap().row_count(), 50);

    assert!(h.vp.request_content_refresh(75, RefreshOptions::default()));
    assert_eq!(h.vp.current_offset(), 40);
    assert_eq!(h.markup(), uids(41..=50));
    assert_eq!(h.outbox.len(), 0);
}

#[test]
fn test_wheel_drag_and_visibility() {
    let mut h = Harness::loaded(300);

    h.vp.scroll_wheel(false);
    assert_eq!(h.vp.current_offset(), 3);
    assert_eq!(h.first_uid().as_deref(), Some("4"));

    h.vp.scroll_drag(20);
    assert_eq!(h.vp.current_offset(), 20);
    assert_eq!(h.first_uid().as_deref(), Some("21"));
    assert!(h
        .events
        .borrow()
        .contains(&ViewportEvent::Slide { offset: 20 }));

    assert_eq!(h.vp.is_visible(20), Visibility::Above);
    assert_eq!(h.vp.is_visible(21), Visibility::Visible);
    assert_eq!(h.vp.is_visible(30), Visibility::Visible);
    assert_eq!(h.vp.is_visible(31), Visibility::Below);

    h.vp.scroll_wheel(true);
    assert_eq!(h.vp.current_offset(), 17);
    assert_eq!(h.outbox.len(), 0);
}

#[test]
fn test_content_offset_hook_shifts_render() {
    let outbox = Outbox::default();
    let mut vp = Viewport::builder(outbox.clone(), render)
        .on_content_offset(|offset| offset.saturating_sub(1))
        .build()
        .unwrap();
    vp.set_geometry(geometry());
    vp.load_view("INBOX", LoadOptions::default());

    let mut server = MockMailServer::new();
    server.add_mailbox("INBOX", 300);
    for req in outbox.take() {
        vp.ingest(server.handle(&req));
    }
    vp.request_content_refresh(5, RefreshOptions::default());
    assert_eq!(vp.content().nodes().first().map(|n| n.uid.as_str()), Some("5"));
}

// ─────────────────────────────────────────────────────────────────────────────
// View switching
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_cached_view_renders_before_validation() {
    let mut h = Harness::loaded(300);
    h.vp.load_view("Archive", LoadOptions::default());
    h.serve();
    assert_eq!(h.first_uid().as_deref(), Some("301"));
    h.clear_events();

    h.vp.load_view("INBOX", LoadOptions::default());

    // Rendered synchronously from the cache...
    assert_eq!(h.markup(), uids(1..=10));
    assert!(h.names().contains(&"contentComplete"));
    assert!(!h.names().contains(&"fetch"));

    // ...then a token-only validation is sent
    let sent = h.outbox.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, RequestKind::Validate { slice: RowRange::new(1, 101) });
    assert_eq!(sent[0].cacheid.as_deref(), Some("INBOX|0"));
    assert_eq!(sent[0].cache.len(), 101);

    h.clear_events();
    h.answer(&sent[0]);
    assert_eq!(h.markup(), uids(1..=10));
    assert!(!h.names().contains(&"add"));
}

#[test]
fn test_stale_cache_on_switch_drops_disappeared_rows() {
    let mut h = Harness::loaded(300);
    h.vp.load_view("Archive", LoadOptions::default());
    h.serve();

    h.server.delete(&inbox(), &[Uid::from("5")]);
    h.vp.load_view("INBOX", LoadOptions::default());
    h.clear_events();
    h.serve();

    let mut expected = uids(1..=4);
    expected.extend(uids(6..=11));
    assert_eq!(h.markup(), expected);
    assert_eq!(h.vp.total_rows(), 299);
    assert!(h.names().contains(&"remove"));
    assert!(h.vp.buffer(None).is_some_and(|b| !b.contains_uid(&Uid::from("5"))));
}

#[test]
fn test_view_offset_is_restored() {
    let mut h = Harness::loaded(300);
    h.vp.request_content_refresh(30, RefreshOptions::default());
    h.vp.load_view("Archive", LoadOptions::default());
    h.serve();
    assert_eq!(h.vp.current_offset(), 0);

    h.vp.load_view("INBOX", LoadOptions::default());
    assert_eq!(h.vp.current_offset(), 30);
    assert_eq!(h.first_uid().as_deref(), Some("31"));
}

#[test]
fn test_background_load_and_delete_view() {
    let mut h = Harness::loaded(300);
    h.vp.load_view(
        "Archive",
        LoadOptions {
            background: true,
            ..Default::default()
        },
    );
    assert_eq!(h.vp.active_request(), None);
    h.serve();

    assert_eq!(h.vp.active_view(), Some(&inbox()));
    assert_eq!(h.markup(), uids(1..=10));
    let archive = ViewKey::from("Archive");
    assert_eq!(h.vp.buffer(Some(&archive)).and_then(|b| b.total_rows()), Some(50));

    assert!(matches!(
        h.vp.delete_view(&inbox()),
        Err(ViewportError::ActiveView(_))
    ));
    assert!(h.vp.delete_view(&archive).is_ok());
    assert!(matches!(
        h.vp.delete_view(&archive),
        Err(ViewportError::UnknownView(_))
    ));
}

#[test]
fn test_reload_purges_rowlist() {
    let mut h = Harness::loaded(300);
    h.vp.reload(Map::new());

    let sent = h.outbox.take();
    assert_eq!(sent.len(), 1);
    match &sent[0].kind {
        RequestKind::Hydrate(hydrate) => {
            assert!(hydrate.purge);
            assert!(hydrate.window.is_some());
            assert_eq!(hydrate.slice, Some(RowRange::new(1, 101)));
        }
        other => panic!("expected hydrate, got {:?}", other),
    }
    assert!(sent[0].cache.is_empty());

    h.answer(&sent[0]);
    assert_eq!(h.markup(), uids(1..=10));
    assert_eq!(h.vp.total_rows(), 300);
}

#[test]
fn test_request_hook_adds_params() {
    let outbox = Outbox::default();
    let mut vp = Viewport::builder(outbox.clone(), render)
        .on_request(|req| {
            req.params.insert("sortby".into(), json!("arrival"));
        })
        .build()
        .unwrap();
    vp.set_geometry(geometry());
    vp.load_view("INBOX", LoadOptions::default());

    let sent = outbox.take();
    assert_eq!(sent[0].to_params()["sortby"], json!("arrival"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Selection
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_select_replaces_and_marks_rows() {
    let mut h = Harness::loaded(300);

    h.vp.select(vec![2, 3], SelectOptions::default());
    assert_eq!(h.selected_uids(), vec!["2", "3"]);
    assert_eq!(&h.markup()[..4], &["1", "2*", "3*", "4"]);

    h.clear_events();
    h.vp.select(vec![5], SelectOptions::default());
    assert_eq!(h.selected_uids(), vec!["5"]);
    assert_eq!(h.names(), vec!["deselect", "select"]);
    assert_eq!(&h.markup()[..5], &["1", "2", "3", "4", "5*"]);

    h.vp.select(
        vec![7],
        SelectOptions {
            add: true,
            ..Default::default()
        },
    );
    assert_eq!(h.selected_uids(), vec!["5", "7"]);

    let five = h.vp.create_selection(Coords::uid("5"), None).unwrap();
    assert!(h.vp.deselect(&five, DeselectOptions::default()));
    assert!(!h.vp.deselect(&five, DeselectOptions::default()));
    assert_eq!(h.selected_uids(), vec!["7"]);
    assert_eq!(h.outbox.len(), 0);
}

#[test]
fn test_range_select_on_uncached_rows_asks_server() {
    let mut h = Harness::loaded(300);

    h.vp.select(
        vec![150, 151, 152],
        SelectOptions {
            range: true,
            ..Default::default()
        },
    );
    // Nothing selected until the server resolves the range
    assert!(h.selected_uids().is_empty());
    assert!(!h.names().contains(&"select"));

    let sent = h.outbox.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, RequestKind::RangeSlice { slice: RowRange::new(150, 152) });
    assert_eq!(sent[0].to_params()["rangeslice"], json!(1));

    h.answer(&sent[0]);
    assert_eq!(h.selected_uids(), vec!["150", "151", "152"]);
    let names = h.names();
    assert!(names.contains(&"select"));
    assert_eq!(names.last(), Some(&"endRangeFetch"));
    assert_eq!(h.vp.current_offset(), 0);
}

#[test]
fn test_search_select_scrolls_and_selects() {
    let mut h = Harness::loaded(300);
    h.vp.select(
        Vec::<usize>::new(),
        SelectOptions {
            search: Some(json!({ "uid": "42" })),
            ..Default::default()
        },
    );

    let sent = h.outbox.take();
    assert_eq!(sent.len(), 1);
    match &sent[0].kind {
        RequestKind::Hydrate(hydrate) => {
            assert_eq!(hydrate.search, Some(json!({ "uid": "42" })));
            assert_eq!(hydrate.slice, None);
        }
        other => panic!("expected hydrate, got {:?}", other),
    }
    assert!(h.vp.is_fetching());

    h.answer(&sent[0]);
    assert_eq!(h.vp.current_offset(), 41);
    assert_eq!(h.selected_uids(), vec!["42"]);
    assert_eq!(h.markup().first().map(String::as_str), Some("42*"));
}

#[test]
fn test_selection_of_whole_buffer() {
    let h = Harness::loaded(300);
    let all = h.vp.create_selection_buffer(None).unwrap();
    assert_eq!(all.len(), 101);
    assert_eq!(h.vp.selection(&inbox()).map(|s| s.len()), Some(0));
}

// ─────────────────────────────────────────────────────────────────────────────
// Row edits and removal
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_remove_compacts_and_refreshes() {
    let mut h = Harness::loaded(300);
    h.vp.select(vec![4], SelectOptions::default());
    h.clear_events();

    let gone = h
        .vp
        .create_selection(Coords::RowNumbers(vec![2, 4]), None)
        .unwrap();
    h.vp.remove(gone, RemoveOptions::default());

    assert_eq!(h.vp.total_rows(), 298);
    assert_eq!(
        h.markup(),
        vec!["1", "3", "5", "6", "7", "8", "9", "10", "11", "12"]
    );
    assert!(h.selected_uids().is_empty());

    let names = h.names();
    assert_eq!(&names[..2], &["deselect", "remove"]);
    let cleared: Vec<String> = h
        .events
        .borrow()
        .iter()
        .filter_map(|e| match e {
            ViewportEvent::RowCleared(node) => Some(node.uid.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(cleared, vec!["2", "4"]);
}

#[test]
fn test_remove_without_update_keeps_screen() {
    let mut h = Harness::loaded(300);
    let gone = h.vp.create_selection(Coords::rownum(1), None).unwrap();
    h.vp.remove(gone, RemoveOptions { noupdate: true });
    assert_eq!(h.markup(), uids(1..=10));
    assert_eq!(h.vp.total_rows(), 299);
}

#[test]
fn test_set_row_fields_rerenders_in_place() {
    let mut h = Harness::loaded(300);
    let first = h.vp.create_selection(Coords::uid("1"), None).unwrap();
    let mut fields = Map::new();
    fields.insert("subject".into(), json!("edited"));

    h.vp.set_row_fields(&first, &fields);

    assert_eq!(h.names(), vec!["clear", "add"]);
    let row = h.vp.buffer(None).and_then(|b| b.row(&Uid::from("1"))).unwrap();
    assert_eq!(row.str_field("subject"), Some("edited"));
    assert_eq!(h.vp.content().nodes()[0].revision, row.revision);
}

// ─────────────────────────────────────────────────────────────────────────────
// Failures and the wait timer
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_wait_fires_until_failure() {
    let mut h = Harness::with_config(
        300,
        ViewportConfig {
            wait_secs: Some(5),
            ..Default::default()
        },
    );
    h.vp.load_view("INBOX", LoadOptions::default());
    assert!(h.vp.wait_deadline().is_some());

    assert!(!h.vp.poll_wait(Instant::now()));
    assert!(h.vp.poll_wait(Instant::now() + Duration::from_secs(6)));
    assert!(h.events.borrow().contains(&ViewportEvent::Wait(inbox())));

    h.vp.fail(TransportError::new(inbox(), RequestId(1), "timed out"));
    assert_eq!(h.failures.get(), 1);
    assert!(!h.vp.is_fetching());
    assert_eq!(h.vp.wait_deadline(), None);
    assert_eq!(h.names().last(), Some(&"endFetch"));
    assert!(!h.vp.poll_wait(Instant::now() + Duration::from_secs(60)));
}

#[test]
fn test_response_clears_wait() {
    let mut h = Harness::with_config(
        300,
        ViewportConfig {
            wait_secs: Some(5),
            ..Default::default()
        },
    );
    h.vp.load_view("INBOX", LoadOptions::default());
    h.serve();
    assert_eq!(h.vp.wait_deadline(), None);
}

#[test]
fn test_send_failure_reaches_hook() {
    let mut h = Harness::new(300);
    h.outbox.offline.set(true);
    h.vp.load_view("INBOX", LoadOptions::default());

    assert_eq!(h.failures.get(), 1);
    assert!(!h.vp.is_fetching());
    assert_eq!(h.names(), vec!["fetch", "endFetch"]);
    assert_eq!(h.vp.buffer(None).map(|b| b.pending_requests()), Some(0));
}

// ─────────────────────────────────────────────────────────────────────────────
// Layout
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_horizontal_split_bar() {
    let mut h = Harness::loaded(300);
    h.vp.show_split_pane(PaneMode::Horizontal);

    assert_eq!(h.vp.page_size(PageSizeKind::Configured), Some(5));
    assert_eq!(h.vp.content().nodes().len(), 5);
    let layout = h.vp.layout();
    assert_eq!(layout.list_height, 70);
    assert!(layout.preview_visible);
    assert_eq!(layout.preview_height, 50);

    h.clear_events();
    h.vp.split_bar_start();
    assert_eq!(h.vp.split_bar_drag(73), 70);
    h.vp.split_bar_end();
    assert_eq!(h.vp.page_size(PageSizeKind::Configured), Some(7));
    assert_eq!(h.vp.content().nodes().len(), 7);
    assert_eq!(
        h.names().into_iter().filter(|n| n.starts_with("splitBar")).collect::<Vec<_>>(),
        vec!["splitBarStart", "splitBarChange", "splitBarEnd"]
    );

    h.vp.split_bar_double_click();
    assert_eq!(h.vp.page_size(PageSizeKind::Configured), Some(5));
}

#[test]
fn test_growing_page_fetches_missing_rows() {
    let mut h = Harness::loaded(300);
    h.vp.show_split_pane(PaneMode::Horizontal);
    assert_eq!(h.vp.page_size(PageSizeKind::Configured), Some(5));
    h.serve();

    // Park the five-row page on the last cached row without a refresh
    let last = h.vp.buffer(None).unwrap().row_count();
    assert!(h.vp.buffer(None).unwrap().uid_at(last + 1).is_none());
    h.vp.scroll_to(
        last,
        ScrollOptions {
            bottom: true,
            noupdate: true,
            ..Default::default()
        },
    );
    assert_eq!(h.vp.current_offset(), last - 5);
    assert_eq!(h.outbox.len(), 0);
    h.clear_events();

    // Back to a full-height list: ten rows, half of them uncached
    h.vp.show_split_pane(PaneMode::None);
    assert_eq!(h.vp.page_size(PageSizeKind::Configured), Some(10));
    assert!(h.vp.is_fetching());
    assert!(h.names().contains(&"fetch"));
    let sent = h.outbox.take();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].slice().is_some_and(|s| s.iter().contains(&(last + 1))));

    h.answer(&sent[0]);
    assert_eq!(h.markup(), uids(last - 4..=last + 5));
}

#[test]
fn test_vertical_split_width() {
    let mut h = Harness::loaded(300);
    h.vp.show_split_pane(PaneMode::Vertical);

    assert_eq!(h.vp.page_size(PageSizeKind::Configured), Some(10));
    assert_eq!(h.vp.vert_width(), 35);
    assert_eq!(h.vp.layout().list_width, Some(35));
    assert_eq!(h.vp.layout().preview_width, 65);

    h.vp.split_bar_double_click();
    assert_eq!(h.vp.vert_width(), 45);
    assert_eq!(h.vp.layout().preview_width, 55);

    h.vp.show_split_pane(PaneMode::None);
    assert!(!h.vp.layout().preview_visible);
    assert_eq!(h.vp.vert_width(), 0);
}

#[test]
fn test_resize_requests_coalesce() {
    let mut h = Harness::loaded(300);
    h.vp.on_resize(false, None);
    h.vp.on_resize(false, Some(4));
    assert_eq!(h.vp.pending_tasks(), 1);
    assert_eq!(h.vp.pump(), 1);
    assert_eq!(h.vp.page_size(PageSizeKind::Configured), Some(4));
    assert_eq!(h.vp.content().nodes().len(), 4);
}

// ─────────────────────────────────────────────────────────────────────────────
// Re-entrancy
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_nested_ingest_is_deferred_until_idle() {
    let mut h = Harness::loaded(300);
    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();

    h.vp.fetch_buffer(FetchOptions {
        offset: Some(200),
        background: true,
        continuation: Some(Continuation::Custom(Box::new(move |vp: &mut Viewport, info: &ResponseInfo| {
            let mut late = ViewportResponse::new(info.view.clone());
            late.updatecacheid = Some("late".into());
            vp.ingest(late);
            assert_eq!(vp.phase(), Phase::Applying);
            assert_eq!(vp.pending_tasks(), 1);
            flag.set(true);
        }))),
        ..Default::default()
    });
    h.serve();

    assert!(ran.get());
    assert_eq!(h.vp.phase(), Phase::Idle);
    assert_eq!(h.vp.pending_tasks(), 0);
    assert_eq!(h.vp.metadata("cacheid", None), Some(json!("late")));
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel transport
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_round_trip_through_server_task() {
    use crate::demo::run_server;
    use std::sync::{Arc, Mutex};

    let mut server = MockMailServer::new();
    server.add_mailbox("INBOX", 40);
    let server = Arc::new(Mutex::new(server));

    let (req_tx, req_rx) = tokio::sync::mpsc::unbounded_channel();
    let (resp_tx, mut resp_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(run_server(server, req_rx, resp_tx, Duration::ZERO));

    let mut vp = Viewport::builder(req_tx, render).build().unwrap();
    let mut events = vp.subscribe_channel();
    vp.set_geometry(geometry());
    vp.load_view("INBOX", LoadOptions::default());

    let response = resp_rx.recv().await.unwrap();
    vp.ingest(response);

    assert_eq!(vp.total_rows(), 40);
    assert_eq!(vp.content().nodes().len(), 10);
    assert_eq!(events.recv().await, Some(ViewportEvent::Fetch(inbox())));
    assert_eq!(events.recv().await, Some(ViewportEvent::EndFetch(inbox())));
}
