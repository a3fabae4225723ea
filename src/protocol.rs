// Wire types exchanged with the list backend
//
// A request names the view, the client's cache token, the uids it already
// holds, and what it wants (a validation check, a slice of rows, or the row
// numbers of a range). The response merges into the view's buffer.
//
// Responses come from loosely typed backends: empty maps arrive as `[]`,
// request ids and row numbers arrive as strings or numbers, and several
// flags have legacy names. Deserialization tolerates all of these.

use crate::error::TransportError;
use crate::types::{RequestId, RowRange, Uid, ViewKey};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Rows around the requested row the server should add
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub before: usize,
    pub after: usize,
}

/// A data-bearing fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hydrate {
    /// Row numbers wanted; `None` for a pure search
    pub slice: Option<RowRange>,
    /// Search descriptor; the server answers with the matching row's number
    pub search: Option<Value>,
    /// Extra rows around the target (initial, search and purge loads)
    pub window: Option<Window>,
    /// Client dropped its rowlist; the server should resend it
    pub purge: bool,
}

/// What a request asks of the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestKind {
    /// Is the cached rowlist still valid? Carries no search or window.
    Validate { slice: RowRange },
    Hydrate(Hydrate),
    /// Resolve a row-number range to uids (range selection on uncached rows)
    RangeSlice { slice: RowRange },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportRequest {
    pub view: ViewKey,
    pub request_id: RequestId,
    pub cacheid: Option<String>,
    /// Uids the client holds, in row order
    pub cache: Vec<Uid>,
    pub kind: RequestKind,
    /// First load of this view
    pub initial: bool,
    /// Caller-supplied extra parameters
    pub params: Map<String, Value>,
}

impl ViewportRequest {
    pub fn is_validate(&self) -> bool {
        matches!(self.kind, RequestKind::Validate { .. })
    }

    /// Row range this request names, if any
    pub fn slice(&self) -> Option<RowRange> {
        match &self.kind {
            RequestKind::Validate { slice } | RequestKind::RangeSlice { slice } => Some(*slice),
            RequestKind::Hydrate(h) => h.slice,
        }
    }

    /// Flatten into the classic form-parameter map
    ///
    /// Keys: `view`, `cacheid`, `cache` (JSON uid list), `requestid`,
    /// `initial`, `slice` (`"a:b"`), `search` (JSON), `before`, `after`,
    /// `rangeslice`, `checkcache`, then any extra params.
    pub fn to_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("view".into(), Value::from(self.view.as_str()));
        if let Some(cacheid) = &self.cacheid {
            params.insert("cacheid".into(), Value::from(cacheid.as_str()));
        }
        if !self.cache.is_empty() {
            let uids: Vec<&str> = self.cache.iter().map(|u| u.as_str()).collect();
            params.insert(
                "cache".into(),
                Value::from(serde_json::to_string(&uids).unwrap_or_default()),
            );
        }
        params.insert("requestid".into(), Value::from(self.request_id.0));
        if self.initial {
            params.insert("initial".into(), Value::from(1));
        }

        match &self.kind {
            RequestKind::Validate { slice } => {
                params.insert("slice".into(), Value::from(slice.to_wire()));
                params.insert("checkcache".into(), Value::from(1));
            }
            RequestKind::RangeSlice { slice } => {
                params.insert("slice".into(), Value::from(slice.to_wire()));
                params.insert("rangeslice".into(), Value::from(1));
            }
            RequestKind::Hydrate(h) => {
                if let Some(slice) = h.slice {
                    params.insert("slice".into(), Value::from(slice.to_wire()));
                }
                if let Some(search) = &h.search {
                    params.insert("search".into(), Value::from(search.to_string()));
                }
                if let Some(window) = h.window {
                    params.insert("before".into(), Value::from(window.before));
                    params.insert("after".into(), Value::from(window.after));
                }
            }
        }

        for (k, v) in &self.params {
            params.insert(k.clone(), v.clone());
        }
        params
    }
}

/// Sends requests to the backend
///
/// Implementations deliver the eventual response (or failure) back to the
/// engine via `Viewport::ingest` / `Viewport::fail`. An `Err` here means
/// the request could not even be dispatched.
pub trait Transport {
    fn send(&mut self, request: ViewportRequest) -> Result<(), TransportError>;
}

impl Transport for tokio::sync::mpsc::UnboundedSender<ViewportRequest> {
    fn send(&mut self, request: ViewportRequest) -> Result<(), TransportError> {
        let view = request.view.clone();
        let id = request.request_id;
        tokio::sync::mpsc::UnboundedSender::send(self, request)
            .map_err(|_| TransportError::new(view, id, "request channel closed"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewportResponse {
    pub view: ViewKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cacheid: Option<String>,
    #[serde(default, deserialize_with = "lenient_usize", skip_serializing_if = "Option::is_none")]
    pub totalrows: Option<usize>,
    /// uid -> row fields
    #[serde(default, deserialize_with = "map_or_empty")]
    pub data: Map<String, Value>,
    /// uid -> row number
    #[serde(
        default,
        deserialize_with = "rowlist_de",
        serialize_with = "rowlist_ser"
    )]
    pub rowlist: Vec<(Uid, usize)>,
    #[serde(default, deserialize_with = "map_or_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, alias = "reset", deserialize_with = "lenient_bool")]
    pub data_reset: bool,
    #[serde(default, alias = "update", deserialize_with = "lenient_bool")]
    pub rowlist_reset: bool,
    #[serde(default, alias = "resetmd", deserialize_with = "lenient_bool")]
    pub metadata_reset: bool,
    #[serde(default)]
    pub disappear: Vec<Uid>,
    #[serde(default, deserialize_with = "lenient_request_id", skip_serializing_if = "Option::is_none")]
    pub requestid: Option<RequestId>,
    /// Row the client should scroll to (1-based)
    #[serde(default, deserialize_with = "lenient_usize", skip_serializing_if = "Option::is_none")]
    pub rownum: Option<usize>,
    /// Uids of a resolved range slice
    #[serde(default, deserialize_with = "rangelist_de", skip_serializing_if = "Option::is_none")]
    pub rangelist: Option<Vec<Uid>>,
    /// Cache confirmed valid; only the token changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updatecacheid: Option<String>,
}

impl ViewportResponse {
    pub fn new(view: ViewKey) -> Self {
        Self {
            view,
            ..Default::default()
        }
    }

    /// Decode a JSON response body
    pub fn from_json(body: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

fn lenient_usize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0" && s != "false",
        _ => false,
    })
}

fn lenient_request_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<RequestId>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_u64().map(RequestId),
        Value::String(s) => s.trim().parse().ok().map(RequestId),
        _ => None,
    })
}

fn map_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Map<String, Value>, D::Error> {
    match Value::deserialize(d)? {
        Value::Object(map) => Ok(map),
        Value::Array(items) if items.is_empty() => Ok(Map::new()),
        Value::Null => Ok(Map::new()),
        other => Err(de::Error::custom(format!("expected object, got {}", other))),
    }
}

fn rowlist_de<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<(Uid, usize)>, D::Error> {
    let map = map_or_empty(d)?;
    let mut rows = Vec::with_capacity(map.len());
    for (uid, n) in map {
        let rownum = match &n {
            Value::Number(num) => num.as_u64().map(|v| v as usize),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| de::Error::custom(format!("bad row number for {}: {}", uid, n)))?;
        rows.push((Uid::from(uid), rownum));
    }
    Ok(rows)
}

fn rowlist_ser<S: Serializer>(rows: &[(Uid, usize)], s: S) -> Result<S::Ok, S::Error> {
    let mut map = s.serialize_map(Some(rows.len()))?;
    for (uid, n) in rows {
        map.serialize_entry(uid.as_str(), n)?;
    }
    map.end()
}

/// Array of uids, or a uid -> row number object
fn rangelist_de<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<Uid>>, D::Error> {
    let to_uid = |v: Value| match v {
        Value::String(s) => Some(Uid::from(s)),
        Value::Number(n) => Some(Uid::new(n.to_string())),
        _ => None,
    };
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => Some(items.into_iter().filter_map(to_uid).collect()),
        Value::Object(map) => Some(map.into_iter().map(|(k, _)| Uid::from(k)).collect()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(kind: RequestKind) -> ViewportRequest {
        ViewportRequest {
            view: ViewKey::from("INBOX"),
            request_id: RequestId(7),
            cacheid: Some("c1".into()),
            cache: vec![Uid::from("a"), Uid::from("b")],
            kind,
            initial: false,
            params: Map::new(),
        }
    }

    #[test]
    fn test_validate_params() {
        let params = request(RequestKind::Validate {
            slice: RowRange::new(1, 30),
        })
        .to_params();
        assert_eq!(params["view"], json!("INBOX"));
        assert_eq!(params["cacheid"], json!("c1"));
        assert_eq!(params["cache"], json!("[\"a\",\"b\"]"));
        assert_eq!(params["requestid"], json!(7));
        assert_eq!(params["slice"], json!("1:30"));
        assert_eq!(params["checkcache"], json!(1));
        assert!(params.get("initial").is_none());
    }

    #[test]
    fn test_hydrate_params() {
        let mut req = request(RequestKind::Hydrate(Hydrate {
            slice: None,
            search: Some(json!({ "uid": "42" })),
            window: Some(Window { before: 12, after: 18 }),
            purge: false,
        }));
        req.initial = true;
        req.params.insert("sortby".into(), json!(3));

        let params = req.to_params();
        assert_eq!(params["initial"], json!(1));
        assert_eq!(params["search"], json!("{\"uid\":\"42\"}"));
        assert_eq!(params["before"], json!(12));
        assert_eq!(params["after"], json!(18));
        assert_eq!(params["sortby"], json!(3));
        assert!(params.get("slice").is_none());
    }

    #[test]
    fn test_response_tolerates_loose_types() {
        let body = r#"{
            "view": "INBOX",
            "cacheid": "c2",
            "totalrows": "2",
            "data": { "a": { "subject": "hi" }, "b": { "subject": "yo" } },
            "rowlist": { "a": 1, "b": "2" },
            "metadata": [],
            "reset": 1,
            "update": true,
            "requestid": "5",
            "rownum": 1
        }"#;
        let resp = ViewportResponse::from_json(body).unwrap();
        assert_eq!(resp.totalrows, Some(2));
        assert_eq!(resp.requestid, Some(RequestId(5)));
        assert!(resp.data_reset);
        assert!(resp.rowlist_reset);
        assert!(!resp.metadata_reset);
        assert!(resp.metadata.is_empty());
        assert_eq!(resp.rowlist.len(), 2);
        assert!(resp.rowlist.contains(&(Uid::from("b"), 2)));
    }

    #[test]
    fn test_degenerate_and_rangelist_responses() {
        let resp = ViewportResponse::from_json(r#"{"view":"INBOX","updatecacheid":"c9"}"#).unwrap();
        assert_eq!(resp.updatecacheid.as_deref(), Some("c9"));
        assert!(resp.cacheid.is_none());
        assert!(resp.data.is_empty());

        let resp =
            ViewportResponse::from_json(r#"{"view":"INBOX","rangelist":["a","b"],"rowlist":[]}"#).unwrap();
        assert_eq!(resp.rangelist, Some(vec![Uid::from("a"), Uid::from("b")]));
        assert!(resp.rowlist.is_empty());

        let resp = ViewportResponse::from_json(r#"{"view":"INBOX","rangelist":{"a":3}}"#).unwrap();
        assert_eq!(resp.rangelist, Some(vec![Uid::from("a")]));
    }

    #[test]
    fn test_response_serializes_rowlist_as_object() {
        let mut resp = ViewportResponse::new(ViewKey::from("INBOX"));
        resp.rowlist = vec![(Uid::from("a"), 1)];
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["rowlist"], json!({ "a": 1 }));

        let back: ViewportResponse = serde_json::from_value(value).unwrap();
        assert_eq!(back.rowlist, resp.rowlist);
    }

    #[test]
    fn test_missing_view_is_decode_error() {
        let err = ViewportResponse::from_json(r#"{"cacheid":"x"}"#);
        assert!(matches!(err, Err(crate::error::ViewportError::Decode(_))));
    }

    #[tokio::test]
    async fn test_channel_transport() {
        let (mut tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let req = request(RequestKind::RangeSlice {
            slice: RowRange::new(3, 9),
        });
        Transport::send(&mut tx, req.clone()).unwrap();
        assert_eq!(rx.recv().await, Some(req.clone()));

        drop(rx);
        let err = Transport::send(&mut tx, req).unwrap_err();
        assert_eq!(err.request_id, RequestId(7));
    }
}
