//! Selection: a snapshot set of rows addressable in four coordinate systems
//!
//! A selection stores unique IDs only. Row numbers, DOM identities and row
//! data are derived on demand from the buffer that owns the rows, so a
//! selection taken earlier still reflects the buffer's current state.

use crate::buffer::Buffer;
use crate::error::{Result, ViewportError};
use crate::types::{DomId, Row, Uid, ViewKey};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

/// Input/output coordinates of a selection
#[derive(Debug, Clone, PartialEq)]
pub enum Coords {
    Uids(Vec<Uid>),
    RowNumbers(Vec<usize>),
    DomIds(Vec<DomId>),
    Rows(Vec<Row>),
}

impl Coords {
    pub fn uid(uid: impl Into<Uid>) -> Self {
        Self::Uids(vec![uid.into()])
    }

    pub fn rownum(n: usize) -> Self {
        Self::RowNumbers(vec![n])
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Uids(v) => v.len(),
            Self::RowNumbers(v) => v.len(),
            Self::DomIds(v) => v.len(),
            Self::Rows(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output format for [`Selection::get`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Uid,
    RowNumber,
    DomId,
    Row,
}

/// Set of unique IDs scoped to one view's buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    view: ViewKey,
    uids: Vec<Uid>,
}

impl Selection {
    /// Empty selection for a view
    pub fn empty(view: ViewKey) -> Self {
        Self {
            view,
            uids: Vec::new(),
        }
    }

    /// Build a selection from any coordinate system
    pub fn from_coords(buffer: &Buffer, coords: Coords) -> Self {
        let mut sel = Self::empty(buffer.view().clone());
        sel.add(buffer, coords);
        sel
    }

    pub fn view(&self) -> &ViewKey {
        &self.view
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }

    pub fn clear(&mut self) {
        self.uids.clear();
    }

    /// Add rows; duplicates are ignored
    pub fn add(&mut self, buffer: &Buffer, coords: Coords) {
        let uids = convert(buffer, coords);
        self.add_uids(uids);
    }

    /// Remove rows
    pub fn remove(&mut self, buffer: &Buffer, coords: Coords) {
        let uids = convert(buffer, coords);
        self.remove_uids(&uids);
    }

    pub(crate) fn add_uids(&mut self, uids: impl IntoIterator<Item = Uid>) {
        let mut seen: HashSet<Uid> = self.uids.iter().cloned().collect();
        for uid in uids {
            if seen.insert(uid.clone()) {
                self.uids.push(uid);
            }
        }
    }

    pub(crate) fn remove_uids(&mut self, uids: &[Uid]) {
        if uids.is_empty() {
            return;
        }
        let gone: HashSet<&Uid> = uids.iter().collect();
        self.uids.retain(|u| !gone.contains(u));
    }

    pub(crate) fn retain_uids(&mut self, keep: impl Fn(&Uid) -> bool) {
        self.uids.retain(|u| keep(u));
    }

    pub fn uids(&self) -> &[Uid] {
        &self.uids
    }

    /// Row numbers of the selected rows that currently have one
    pub fn rownums(&self, buffer: &Buffer) -> Vec<usize> {
        self.rows(buffer).into_iter().filter_map(|r| r.rownum).collect()
    }

    pub fn dom_ids(&self, buffer: &Buffer) -> Vec<DomId> {
        self.rows(buffer)
            .into_iter()
            .map(|r| r.dom_id.clone())
            .collect()
    }

    /// Row data for the selected uids still present in the buffer
    pub fn rows<'a>(&self, buffer: &'a Buffer) -> Vec<&'a Row> {
        self.uids.iter().filter_map(|u| buffer.row(u)).collect()
    }

    /// Convert to the requested coordinate system
    pub fn get(&self, buffer: &Buffer, format: Format) -> Coords {
        match format {
            Format::Uid => Coords::Uids(self.uids.clone()),
            Format::RowNumber => Coords::RowNumbers(self.rownums(buffer)),
            Format::DomId => Coords::DomIds(self.dom_ids(buffer)),
            Format::Row => Coords::Rows(self.rows(buffer).into_iter().cloned().collect()),
        }
    }

    /// Membership test on the first converted value
    pub fn contains(&self, buffer: &Buffer, coords: Coords) -> bool {
        convert(buffer, coords)
            .first()
            .map(|u| self.uids.contains(u))
            .unwrap_or(false)
    }

    pub fn contains_uid(&self, uid: &Uid) -> bool {
        self.uids.contains(uid)
    }

    /// New selection of the rows matching every term of `query`
    pub fn search(&self, buffer: &Buffer, query: &SearchQuery) -> Selection {
        let uids = self
            .rows(buffer)
            .into_iter()
            .filter(|row| query.matches(row))
            .map(|row| row.uid.clone())
            .collect();
        Selection {
            view: self.view.clone(),
            uids,
        }
    }
}

/// Normalise coordinates to uids that exist in the buffer
fn convert(buffer: &Buffer, coords: Coords) -> Vec<Uid> {
    match coords {
        Coords::Uids(uids) => uids.into_iter().filter(|u| buffer.contains_uid(u)).collect(),
        Coords::RowNumbers(rows) => buffer.rows_to_uids(&rows),
        Coords::DomIds(ids) => buffer.dom_ids_to_uids(&ids),
        Coords::Rows(rows) => rows
            .into_iter()
            .map(|r| r.uid)
            .filter(|u| buffer.contains_uid(u))
            .collect(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Predicate search
// ─────────────────────────────────────────────────────────────────────────────

/// Field a search term applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchField {
    Uid,
    RowNumber,
    DomId,
    Data(String),
}

impl SearchField {
    /// Map a field name, honouring the reserved `VP_` names
    pub fn parse(name: &str) -> Self {
        match name {
            "VP_id" => Self::Uid,
            "VP_rownum" => Self::RowNumber,
            "VP_domid" => Self::DomId,
            other => Self::Data(other.to_string()),
        }
    }

    fn value_of(&self, row: &Row) -> Option<Value> {
        match self {
            Self::Uid => Some(Value::String(row.uid.0.clone())),
            Self::RowNumber => row.rownum.map(|n| Value::from(n as u64)),
            Self::DomId => Some(Value::String(row.dom_id.0.clone())),
            Self::Data(name) => row.field(name).cloned(),
        }
    }

    /// Coerce a query value to the type this field holds
    fn normalize(&self, value: &Value) -> Option<Value> {
        match self {
            Self::Uid | Self::DomId => Some(Value::String(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })),
            Self::RowNumber => match value {
                Value::Number(n) => n.as_u64().map(Value::from),
                Value::String(s) => s.trim().parse::<u64>().ok().map(Value::from),
                _ => None,
            },
            Self::Data(_) => Some(value.clone()),
        }
    }
}

/// One criterion on a field
#[derive(Debug, Clone)]
pub enum Criterion {
    /// Field value is one of the set
    Equal(Vec<Value>),
    /// Field value is none of the set
    NotEqual(Vec<Value>),
    /// Array field contains the value
    Include(Value),
    /// Array field does not contain the value
    NotInclude(Value),
    /// String field matches
    Regex(Regex),
}

/// AND of field terms, each an AND of criteria
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    terms: Vec<(SearchField, Vec<Criterion>)>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a criterion on a field (builder style)
    pub fn with(mut self, field: SearchField, criterion: Criterion) -> Self {
        match self.terms.iter_mut().find(|(f, _)| *f == field) {
            Some((_, criteria)) => criteria.push(criterion),
            None => self.terms.push((field, vec![criterion])),
        }
        self
    }

    /// Parse `{ field: { equal: [..], notequal: [..], include: v,
    /// notinclude: v, regex: "..." } }`
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(ViewportError::InvalidSearch(
                "query must be an object".to_string(),
            ));
        };

        let mut query = Self::new();
        for (name, value) in fields {
            let field = SearchField::parse(name);
            let Value::Object(criteria) = value else {
                return Err(ViewportError::InvalidSearch(format!(
                    "criteria for '{}' must be an object",
                    name
                )));
            };
            for (kind, arg) in criteria {
                let criterion = match kind.as_str() {
                    "equal" => Criterion::Equal(as_list(arg)),
                    "notequal" => Criterion::NotEqual(as_list(arg)),
                    "include" => Criterion::Include(arg.clone()),
                    "notinclude" => Criterion::NotInclude(arg.clone()),
                    "regex" => {
                        let pattern = arg.as_str().ok_or_else(|| {
                            ViewportError::InvalidSearch(format!(
                                "regex for '{}' must be a string",
                                name
                            ))
                        })?;
                        let re = Regex::new(pattern).map_err(|source| {
                            ViewportError::InvalidRegex {
                                field: name.clone(),
                                source,
                            }
                        })?;
                        Criterion::Regex(re)
                    }
                    other => {
                        return Err(ViewportError::InvalidSearch(format!(
                            "unknown criterion '{}' for '{}'",
                            other, name
                        )))
                    }
                };
                query = query.with(field.clone(), criterion);
            }
        }
        Ok(query)
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.terms.iter().all(|(field, criteria)| {
            let value = field.value_of(row);
            criteria.iter().all(|c| criterion_holds(field, c, value.as_ref()))
        })
    }
}

fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn criterion_holds(field: &SearchField, criterion: &Criterion, value: Option<&Value>) -> bool {
    match criterion {
        Criterion::Equal(set) | Criterion::NotEqual(set) => {
            let hit = value.is_some_and(|v| set.iter().filter_map(|q| field.normalize(q)).any(|q| &q == v));
            matches!(criterion, Criterion::Equal(_)) == hit
        }
        Criterion::Include(needle) | Criterion::NotInclude(needle) => {
            let hit = matches!(value, Some(Value::Array(items)) if items.contains(needle));
            matches!(criterion, Criterion::Include(_)) == hit
        }
        Criterion::Regex(re) => matches!(value, Some(Value::String(s)) if re.is_match(s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Buffer, UpdateFlags};
    use crate::types::DomIdAllocator;
    use serde_json::json;

    fn mailbox() -> Buffer {
        let mut buffer = Buffer::new(ViewKey::from("INBOX"), DomIdAllocator::new());
        let data = json!({
            "a": { "subject": "Lunch", "flag": ["seen"], "from": "ann" },
            "b": { "subject": "Invoice 42", "flag": ["flagged"], "from": "bob" },
            "c": { "subject": "Re: Lunch", "flag": [], "from": "ann" },
        });
        let rowlist = json!({ "a": 1, "b": 2, "c": 3 });
        buffer.update(
            data.as_object().cloned().unwrap_or_default(),
            rowlist
                .as_object()
                .unwrap()
                .iter()
                .map(|(k, v)| (Uid::from(k.as_str()), v.as_u64().unwrap() as usize))
                .collect(),
            Default::default(),
            UpdateFlags::default(),
        );
        buffer.set_total_rows(3);
        buffer
    }

    #[test]
    fn test_add_is_idempotent() {
        let buffer = mailbox();
        let mut sel = Selection::empty(buffer.view().clone());
        sel.add(&buffer, Coords::uid("a"));
        let once = sel.len();
        sel.add(&buffer, Coords::uid("a"));
        assert_eq!(sel.len(), once);
        assert_eq!(once, 1);
    }

    #[test]
    fn test_unknown_uids_are_dropped() {
        let buffer = mailbox();
        let sel = Selection::from_coords(&buffer, Coords::Uids(vec!["a".into(), "zz".into()]));
        assert_eq!(sel.uids(), &[Uid::from("a")]);
    }

    #[test]
    fn test_format_round_trip() {
        let buffer = mailbox();
        let sel = Selection::from_coords(&buffer, Coords::RowNumbers(vec![1, 3]));
        let expected: HashSet<Uid> = sel.uids().iter().cloned().collect();

        for format in [Format::Uid, Format::RowNumber, Format::DomId, Format::Row] {
            let back = Selection::from_coords(&buffer, sel.get(&buffer, format));
            let got: HashSet<Uid> = back.uids().iter().cloned().collect();
            assert_eq!(got, expected, "round trip through {:?}", format);
        }
    }

    #[test]
    fn test_contains_by_rownum_and_domid() {
        let buffer = mailbox();
        let sel = Selection::from_coords(&buffer, Coords::uid("b"));
        assert!(sel.contains(&buffer, Coords::rownum(2)));
        assert!(!sel.contains(&buffer, Coords::rownum(1)));
        let dom = buffer.row(&Uid::from("b")).map(|r| r.dom_id.clone()).unwrap();
        assert!(sel.contains(&buffer, Coords::DomIds(vec![dom])));
    }

    #[test]
    fn test_search_criteria() {
        let buffer = mailbox();
        let all = Selection::from_coords(&buffer, Coords::RowNumbers(vec![1, 2, 3]));

        let seen = all.search(
            &buffer,
            &SearchQuery::new().with(SearchField::parse("flag"), Criterion::Include(json!("seen"))),
        );
        assert_eq!(seen.uids(), &[Uid::from("a")]);

        let lunch_not_seen = all.search(
            &buffer,
            &SearchQuery::new()
                .with(SearchField::parse("subject"), Criterion::Regex(Regex::new("Lunch").unwrap()))
                .with(SearchField::parse("flag"), Criterion::NotInclude(json!("seen"))),
        );
        assert_eq!(lunch_not_seen.uids(), &[Uid::from("c")]);

        let not_ann = all.search(
            &buffer,
            &SearchQuery::new().with(SearchField::parse("from"), Criterion::NotEqual(vec![json!("ann")])),
        );
        assert_eq!(not_ann.uids(), &[Uid::from("b")]);
    }

    #[test]
    fn test_search_from_json_normalizes_rownums() {
        let buffer = mailbox();
        let all = Selection::from_coords(&buffer, Coords::RowNumbers(vec![1, 2, 3]));
        let query = SearchQuery::from_json(&json!({ "VP_rownum": { "equal": ["2", 3] } })).unwrap();
        let hit = all.search(&buffer, &query);
        assert_eq!(hit.len(), 2);
        assert!(hit.contains_uid(&Uid::from("b")));
        assert!(hit.contains_uid(&Uid::from("c")));
    }

    #[test]
    fn test_search_from_json_rejects_bad_regex() {
        let err = SearchQuery::from_json(&json!({ "subject": { "regex": "(" } }));
        assert!(matches!(err, Err(ViewportError::InvalidRegex { .. })));
        let err = SearchQuery::from_json(&json!({ "subject": { "like": "x" } }));
        assert!(matches!(err, Err(ViewportError::InvalidSearch(_))));
    }
}
