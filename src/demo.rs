// Demo mode: an in-memory mail server answering viewport requests
//
// Mailboxes hold generated messages. The server answers the way a real
// list backend does: a cache token per mailbox generation, token-only
// replies to still-valid validation requests, a full rowlist with
// `disappear` when the client's cache is stale, row data only for messages
// the client has not cached (or that changed), and slice windows around
// the row an initial or search request lands on.
//
// Run with: cargo run --bin viewport-demo

use crate::config::DemoConfig;
use crate::protocol::{RequestKind, ViewportRequest, ViewportResponse, Window};
use crate::types::{RowRange, Uid, ViewKey};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const SENDERS: &[&str] = &[
    "Ada Lovelace",
    "Grace Hopper",
    "Alan Turing",
    "Barbara Liskov",
    "Ken Thompson",
    "Margaret Hamilton",
    "Dennis Ritchie",
    "Frances Allen",
];

const SUBJECTS: &[&str] = &[
    "Quarterly report draft",
    "Re: lunch on Friday?",
    "Build failed on main",
    "Invoice #{n}",
    "Meeting notes",
    "Your order has shipped",
    "Re: Re: migration plan",
    "Weekend hiking trip",
    "Security advisory",
    "Welcome to the team!",
];

const SEED: u64 = 0x2545_f491_4f6c_dd1d;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Seen,
    Flagged,
}

impl Flag {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Seen => "\\seen",
            Self::Flagged => "\\flagged",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub uid: Uid,
    pub from: String,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub size: u64,
    pub seen: bool,
    pub flagged: bool,
}

impl Message {
    /// Row fields as sent to the client
    pub fn fields(&self) -> Value {
        let mut flags = Vec::new();
        if self.seen {
            flags.push(Flag::Seen.as_str());
        }
        if self.flagged {
            flags.push(Flag::Flagged.as_str());
        }
        json!({
            "from": self.from,
            "subject": self.subject,
            "date": self.date.format("%Y-%m-%d %H:%M").to_string(),
            "size": self.size,
            "flag": flags,
        })
    }
}

#[derive(Debug, Default)]
struct Mailbox {
    messages: Vec<Message>,
    /// Bumped on every change; part of the cache token
    generation: u64,
    /// uid -> generation of its last data change
    changed: HashMap<Uid, u64>,
}

impl Mailbox {
    fn cacheid(&self, view: &ViewKey) -> String {
        format!("{}|{}", view, self.generation)
    }

    fn position(&self, uid: &Uid) -> Option<usize> {
        self.messages.iter().position(|m| &m.uid == uid)
    }
}

/// Generation encoded in a cache token, if it belongs to this view
fn token_generation(view: &ViewKey, cacheid: Option<&str>) -> Option<u64> {
    let (name, generation) = cacheid?.rsplit_once('|')?;
    (name == view.as_str()).then(|| generation.parse().ok()).flatten()
}

/// In-memory mail backend
#[derive(Debug, Default)]
pub struct MockMailServer {
    mailboxes: BTreeMap<ViewKey, Mailbox>,
    next_uid: u64,
    seed: u64,
}

impl MockMailServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DemoConfig) -> Self {
        let mut server = Self::new();
        for name in &config.mailboxes {
            server.add_mailbox(name.as_str(), config.rows);
        }
        server
    }

    /// Create a mailbox with `count` generated messages, oldest first
    pub fn add_mailbox(&mut self, view: impl Into<ViewKey>, count: usize) {
        let view = view.into();
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 8, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let messages = (0..count)
            .map(|i| self.generate(start + ChronoDuration::minutes(37 * i as i64)))
            .collect();
        self.mailboxes.insert(
            view,
            Mailbox {
                messages,
                ..Default::default()
            },
        );
    }

    pub fn mailboxes(&self) -> impl Iterator<Item = &ViewKey> {
        self.mailboxes.keys()
    }

    pub fn message_count(&self, view: &ViewKey) -> usize {
        self.mailboxes.get(view).map_or(0, |m| m.messages.len())
    }

    pub fn message(&self, view: &ViewKey, uid: &Uid) -> Option<&Message> {
        let mailbox = self.mailboxes.get(view)?;
        mailbox.messages.iter().find(|m| &m.uid == uid)
    }

    pub fn cacheid(&self, view: &ViewKey) -> Option<String> {
        self.mailboxes.get(view).map(|m| m.cacheid(view))
    }

    // xorshift; deterministic so tests and demos look the same every run
    fn next_random(&mut self) -> u64 {
        let mut x = if self.seed == 0 { SEED } else { self.seed };
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.seed = x;
        x
    }

    fn generate(&mut self, date: DateTime<Utc>) -> Message {
        self.next_uid += 1;
        let r = self.next_random();
        let subject = SUBJECTS[(r % SUBJECTS.len() as u64) as usize]
            .replace("{n}", &(1000 + self.next_uid).to_string());
        Message {
            uid: Uid::new(self.next_uid.to_string()),
            from: SENDERS[((r >> 8) % SENDERS.len() as u64) as usize].to_string(),
            subject,
            date,
            size: 512 + (r >> 16) % 200_000,
            seen: (r >> 40) % 4 != 0,
            flagged: (r >> 44) % 11 == 0,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────

    /// Delete messages; returns how many existed
    pub fn delete(&mut self, view: &ViewKey, uids: &[Uid]) -> usize {
        let Some(mailbox) = self.mailboxes.get_mut(view) else {
            return 0;
        };
        let gone: HashSet<&Uid> = uids.iter().collect();
        let before = mailbox.messages.len();
        mailbox.messages.retain(|m| !gone.contains(&m.uid));
        let removed = before - mailbox.messages.len();
        if removed > 0 {
            mailbox.generation += 1;
        }
        removed
    }

    /// Deliver a new message at the end of a mailbox
    pub fn append(&mut self, view: &ViewKey, subject: &str) -> Option<Uid> {
        let date = self
            .mailboxes
            .get(view)?
            .messages
            .last()
            .map(|m| m.date + ChronoDuration::minutes(5))
            .unwrap_or_else(Utc::now);
        let mut message = self.generate(date);
        message.subject = subject.to_string();
        message.seen = false;
        let uid = message.uid.clone();

        let mailbox = self.mailboxes.get_mut(view)?;
        mailbox.messages.push(message);
        mailbox.generation += 1;
        Some(uid)
    }

    /// Flip a flag; returns the new state
    pub fn toggle_flag(&mut self, view: &ViewKey, uid: &Uid, flag: Flag) -> Option<bool> {
        let mailbox = self.mailboxes.get_mut(view)?;
        let message = mailbox.messages.iter_mut().find(|m| &m.uid == uid)?;
        let state = match flag {
            Flag::Seen => {
                message.seen = !message.seen;
                message.seen
            }
            Flag::Flagged => {
                message.flagged = !message.flagged;
                message.flagged
            }
        };
        mailbox.generation += 1;
        let generation = mailbox.generation;
        mailbox.changed.insert(uid.clone(), generation);
        Some(state)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Request handling
    // ─────────────────────────────────────────────────────────────────────

    pub fn handle(&self, req: &ViewportRequest) -> ViewportResponse {
        let view = req.view.clone();
        let mut result = ViewportResponse::new(view.clone());
        result.requestid = Some(req.request_id);

        let Some(mailbox) = self.mailboxes.get(&view) else {
            // Unknown mailbox lists as empty
            result.cacheid = Some(format!("{}|0", view));
            result.label = Some(view.to_string());
            return result;
        };
        let cacheid = mailbox.cacheid(&view);
        let client_gen = token_generation(&view, req.cacheid.as_deref());
        let changed = client_gen != Some(mailbox.generation);

        if req.is_validate() && !changed {
            result.updatecacheid = Some(cacheid);
            return result;
        }

        result.cacheid = Some(cacheid);
        result.label = Some(view.to_string());
        let total = mailbox.messages.len();
        if total == 0 {
            result.data_reset = req.initial || changed;
            result.rowlist_reset = result.data_reset;
            return result;
        }
        result.totalrows = Some(total);
        let unseen = mailbox.messages.iter().filter(|m| !m.seen).count();
        result.metadata.insert("unseen".into(), Value::from(unseen));

        let mut cached: HashSet<&Uid> = req.cache.iter().collect();
        if !req.initial && !cached.is_empty() && changed {
            result.rowlist_reset = true;
        }

        let (slice, window, search) = match &req.kind {
            RequestKind::Validate { slice } | RequestKind::RangeSlice { slice } => (Some(*slice), None, None),
            RequestKind::Hydrate(h) => (h.slice, h.window, h.search.as_ref()),
        };

        let mut rownum = None;
        if let Some(search) = search {
            rownum = match self.search_row(mailbox, search, &cached) {
                Some(n) => Some(n),
                None => return result,
            };
        } else if req.initial {
            rownum = Some(1);
        }

        let range = match (rownum, slice) {
            (_, Some(slice)) => slice,
            (Some(n), None) => around(n, window.unwrap_or(Window { before: 0, after: 0 }), total),
            (None, None) => RowRange::new(1, total),
        };
        let range = RowRange::new(range.start.max(1), range.end.min(total));
        if rownum.is_some() {
            result.rownum = rownum;
        }

        if !cached.is_empty() && result.rowlist_reset {
            let present: HashSet<&Uid> = mailbox.messages.iter().map(|m| &m.uid).collect();
            let disappear: Vec<Uid> = cached
                .iter()
                .filter(|u| !present.contains(*u))
                .map(|u| (*u).clone())
                .collect();
            for uid in &disappear {
                cached.remove(uid);
            }
            result.disappear = disappear;
        }

        let mut data = Map::new();
        let mut rowlist = Vec::new();
        if !range.is_empty() {
            for (i, message) in mailbox.messages[range.start - 1..range.end].iter().enumerate() {
                rowlist.push((message.uid.clone(), range.start + i));
                let stale = client_gen.is_some_and(|g| mailbox.changed.get(&message.uid).is_some_and(|c| *c > g));
                if !cached.contains(&message.uid) || stale {
                    data.insert(message.uid.to_string(), message.fields());
                }
            }
        }

        if matches!(req.kind, RequestKind::RangeSlice { .. }) {
            result.rangelist = Some(rowlist.iter().map(|(u, _)| u.clone()).collect());
        }
        result.rowlist = rowlist;
        result.data = data;
        result
    }

    /// 1-based row a search lands on
    ///
    /// `{"unseen": true}` finds the first unseen message the client has not
    /// cached; `{"uid": "..."}` finds that message.
    fn search_row(&self, mailbox: &Mailbox, search: &Value, cached: &HashSet<&Uid>) -> Option<usize> {
        if search.get("unseen").and_then(Value::as_bool) == Some(true) {
            return mailbox
                .messages
                .iter()
                .position(|m| !m.seen && !cached.contains(&m.uid))
                .map(|i| i + 1);
        }
        let uid = search.get("uid").and_then(|v| match v {
            Value::String(s) => Some(Uid::new(s.as_str())),
            Value::Number(n) => Some(Uid::new(n.to_string())),
            _ => None,
        })?;
        mailbox.position(&uid).map(|i| i + 1)
    }
}

/// Slice around `rownum`, moving budget that falls off one end to the other
fn around(rownum: usize, window: Window, total: usize) -> RowRange {
    let mut start = rownum as i64 - window.before as i64;
    let mut end = rownum as i64 + window.after as i64;
    if start < 1 {
        end += 1 - start;
    } else if end > total as i64 {
        start -= end - total as i64;
    }
    RowRange::new(start.max(1) as usize, end.max(0) as usize)
}

/// Answer requests after a simulated latency until the request channel closes
pub async fn run_server(
    server: Arc<Mutex<MockMailServer>>,
    mut requests: mpsc::UnboundedReceiver<ViewportRequest>,
    responses: mpsc::UnboundedSender<ViewportResponse>,
    latency: Duration,
) {
    while let Some(request) = requests.recv().await {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let response = {
            let server = server.lock().unwrap_or_else(|e| e.into_inner());
            server.handle(&request)
        };
        tracing::debug!(
            view = %request.view,
            request_id = %request.request_id,
            rows = response.rowlist.len(),
            "mock server answered"
        );
        if responses.send(response).is_err() {
            break;
        }
    }
}
