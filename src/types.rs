//! Core identifiers and row records shared by every viewport component
//!
//! Row numbers are 1-based positions in the server's full ordering. Offsets
//! (scroll positions) are 0-based. Keep the two apart: row `n` is visible at
//! offset `n - 1`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque key of a logical list (a mailbox, a search result set)
#[derive(Debug, Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewKey(pub String);

/// Stable row identity, the primary key of a buffer
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub String);

/// Identifier correlating a row with its rendered node
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomId(pub String);

/// Correlates an outgoing request with its response
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(ViewKey);
string_id!(Uid);
string_id!(DomId);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out `VProw_<n>` identities, shared by all buffers of one engine
///
/// Cloning shares the counter, so identities never collide across views.
#[derive(Debug, Clone, Default)]
pub struct DomIdAllocator {
    next: Arc<AtomicU64>,
}

impl DomIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> DomId {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        DomId(format!("VProw_{}", n))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rows
// ─────────────────────────────────────────────────────────────────────────────

/// A cached row: server-supplied fields plus engine-assigned identity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub uid: Uid,
    /// Position in the server ordering; `None` once the rowlist was reset
    pub rownum: Option<usize>,
    pub dom_id: DomId,
    /// Caller-defined fields as delivered by the server
    pub fields: serde_json::Map<String, serde_json::Value>,
    /// Bumped whenever `fields` is replaced; rendered nodes remember it
    #[serde(skip)]
    pub revision: u64,
}

impl Row {
    pub fn new(uid: Uid, dom_id: DomId, fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            uid,
            rownum: None,
            dom_id,
            fields,
            revision: 0,
        }
    }

    /// Look up a caller field by name
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// Field as a string slice, if it is one
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }

    pub(crate) fn replace_fields(&mut self, fields: serde_json::Map<String, serde_json::Value>) {
        self.fields = fields;
        self.revision += 1;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Layout enums
// ─────────────────────────────────────────────────────────────────────────────

/// Split-view layout; affects how the page size is computed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaneMode {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "horiz")]
    Horizontal,
    #[serde(rename = "vert")]
    Vertical,
}

impl PaneMode {
    /// Parse mode string from config (unknown values fall back to none)
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "horiz" | "horizontal" => Self::Horizontal,
            "vert" | "vertical" => Self::Vertical,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Horizontal => "horiz",
            Self::Vertical => "vert",
        }
    }

    /// Cycle none -> horizontal -> vertical -> none
    pub fn next(self) -> Self {
        match self {
            Self::None => Self::Horizontal,
            Self::Horizontal => Self::Vertical,
            Self::Vertical => Self::None,
        }
    }
}

/// Direction in which the cached slice is running out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Top,
    Bottom,
}

/// Inclusive range of 1-based row numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Wire form used by the `slice` request parameter
    pub fn to_wire(&self) -> String {
        format!("{}:{}", self.start, self.end)
    }

    /// Parse `"start:end"`
    pub fn parse(s: &str) -> Option<Self> {
        let (start, end) = s.split_once(':')?;
        Some(Self {
            start: start.trim().parse().ok()?,
            end: end.trim().parse().ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_ids_are_unique_across_clones() {
        let a = DomIdAllocator::new();
        let b = a.clone();
        assert_eq!(a.allocate().as_str(), "VProw_1");
        assert_eq!(b.allocate().as_str(), "VProw_2");
        assert_eq!(a.allocate().as_str(), "VProw_3");
    }

    #[test]
    fn test_row_range_wire_form() {
        let range = RowRange::new(11, 40);
        assert_eq!(range.to_wire(), "11:40");
        assert_eq!(RowRange::parse("11:40"), Some(range));
        assert_eq!(RowRange::parse("11"), None);
        assert_eq!(range.len(), 30);
        assert!(RowRange::new(5, 4).is_empty());
    }

    #[test]
    fn test_pane_mode_cycle() {
        assert_eq!(PaneMode::None.next(), PaneMode::Horizontal);
        assert_eq!(PaneMode::Vertical.next(), PaneMode::None);
        assert_eq!(PaneMode::from_str("VERT"), PaneMode::Vertical);
        assert_eq!(PaneMode::from_str("bogus"), PaneMode::None);
    }

    #[test]
    fn test_replace_fields_bumps_revision() {
        let mut row = Row::new(Uid::from("a"), DomId::from("VProw_1"), Default::default());
        assert_eq!(row.revision, 0);
        let mut fields = serde_json::Map::new();
        fields.insert("subject".into(), serde_json::json!("hi"));
        row.replace_fields(fields);
        assert_eq!(row.revision, 1);
        assert_eq!(row.str_field("subject"), Some("hi"));
    }
}
