//! Submission queue: registrations that failed delivery, oldest first,
//! persisted as one JSON array under a fixed key.
//!
//! Every read-modify-write is a single load → mutate → persist cycle on the
//! whole array. The page session and the background sync handler share the
//! same key and never run at the same time, so this is enough to avoid lost
//! updates between them.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::network::{deliver, resolve_url, DeliveryError, HttpClient, HttpRequest, NetworkError};
use crate::web_storage::{KeyValueStore, StorageError};

// ── Types ───────────────────────────────────────────────────

/// A submitted field: a single value, or every value of a repeated name in
/// submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    Multiple(Vec<String>),
}

impl FieldValue {
    /// All values in order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            FieldValue::Single(v) => vec![v.as_str()],
            FieldValue::Multiple(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

/// Field name → value(s).
pub type Payload = BTreeMap<String, FieldValue>;

/// Collapse ordered `(name, value)` entries into a payload. A name seen more
/// than once becomes [`FieldValue::Multiple`] holding its values in order.
pub fn payload_from_entries<'a, I>(entries: I) -> Payload
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut payload = Payload::new();
    for (name, value) in entries {
        match payload.remove(name) {
            None => {
                payload.insert(name.to_string(), FieldValue::Single(value.to_string()));
            }
            Some(FieldValue::Single(first)) => {
                payload.insert(
                    name.to_string(),
                    FieldValue::Multiple(vec![first, value.to_string()]),
                );
            }
            Some(FieldValue::Multiple(mut values)) => {
                values.push(value.to_string());
                payload.insert(name.to_string(), FieldValue::Multiple(values));
            }
        }
    }
    payload
}

/// `application/x-www-form-urlencoded` body for a payload.
pub fn encode_payload(payload: &Payload) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in payload {
        for v in value.values() {
            serializer.append_pair(name, v);
        }
    }
    serializer.finish()
}

/// One failed submission awaiting replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedSubmission {
    /// Idempotency key, sent as `Idempotency-Key` on every replay.
    pub id: Uuid,
    /// The form's action URL.
    #[serde(rename = "url")]
    pub destination_url: String,
    pub payload: Payload,
    #[serde(default)]
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl QueuedSubmission {
    pub fn new(destination_url: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            destination_url: destination_url.into(),
            payload,
            enqueued_at: Some(Utc::now()),
        }
    }
}

/// A queue entry as persisted. Entries written before ids existed carry
/// only `url` and `payload`.
#[derive(Deserialize)]
struct StoredSubmission {
    #[serde(default)]
    id: Option<Uuid>,
    url: String,
    payload: Payload,
    #[serde(default)]
    enqueued_at: Option<DateTime<Utc>>,
}

impl StoredSubmission {
    fn into_submission(self) -> QueuedSubmission {
        QueuedSubmission {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            destination_url: self.url,
            payload: self.payload,
            enqueued_at: self.enqueued_at,
        }
    }
}

/// Content type of every submission POST.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Re-POST a queued submission to its destination.
///
/// Relative destinations resolve against `origin`. The item's id travels as
/// `Idempotency-Key` so a server can drop a duplicate replay.
pub fn replay<C: HttpClient + ?Sized>(
    client: &C,
    origin: &str,
    item: &QueuedSubmission,
    timeout: Duration,
) -> Result<(), DeliveryError> {
    let url = resolve_url(origin, &item.destination_url)
        .map_err(|e| NetworkError::Other(format!("bad destination {}: {e}", item.destination_url)))?;
    let request = HttpRequest::post(
        url.as_str(),
        FORM_CONTENT_TYPE,
        encode_payload(&item.payload).into_bytes(),
    )
    .with_header("Idempotency-Key", &item.id.to_string())
    .with_timeout(timeout);
    deliver(client, &request).map(|_| ())
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Items handed to the sender.
    pub attempted: usize,
    /// Items the sender delivered; removed from the queue.
    pub delivered: usize,
    /// Items the sender failed; still queued.
    pub retained: usize,
    /// Snapshot items already gone from the queue when their turn came.
    pub skipped: usize,
}

impl DrainReport {
    /// Whether anything was tried at all.
    pub fn processed_any(&self) -> bool {
        self.attempted > 0
    }
}

// ── Queue ───────────────────────────────────────────────────

pub struct SubmissionQueue<S> {
    storage: S,
    key: String,
}

impl<S: KeyValueStore> SubmissionQueue<S> {
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the queue. Entries stored without an id are given one, and the
    /// ids are persisted before returning so every later read agrees.
    fn load(&self) -> Result<Vec<QueuedSubmission>, StorageError> {
        let Some(raw) = self.storage.get_item(&self.key)? else {
            return Ok(Vec::new());
        };
        let stored: Vec<StoredSubmission> = serde_json::from_str(&raw)?;
        let missing = stored.iter().filter(|s| s.id.is_none()).count();
        let items: Vec<QueuedSubmission> = stored
            .into_iter()
            .map(StoredSubmission::into_submission)
            .collect();
        if missing > 0 {
            self.persist(&items)?;
            info!("outbox: assigned ids to {missing} legacy submission(s)");
        }
        Ok(items)
    }

    fn persist(&self, items: &[QueuedSubmission]) -> Result<(), StorageError> {
        let json = serde_json::to_string(items)?;
        self.storage.set_item(&self.key, &json)
    }

    /// Current queue contents, oldest first. Unreadable state reads as empty.
    pub fn items(&self) -> Vec<QueuedSubmission> {
        self.load().unwrap_or_else(|e| {
            warn!("outbox: read of {} failed: {e}", self.key);
            Vec::new()
        })
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `item` to the end of the queue. Failures are logged.
    pub fn enqueue(&self, item: QueuedSubmission) {
        let mut items = match self.load() {
            Ok(items) => items,
            Err(StorageError::Serialization(e)) => {
                warn!("outbox: discarding unreadable queue under {}: {e}", self.key);
                Vec::new()
            }
            Err(e) => {
                warn!("outbox: enqueue of {} failed: {e}", item.id);
                return;
            }
        };
        let id = item.id;
        items.push(item);
        match self.persist(&items) {
            Ok(()) => info!("outbox: queued submission {id} ({} pending)", items.len()),
            Err(e) => warn!("outbox: enqueue of {id} failed: {e}"),
        }
    }

    /// Try every queued item, oldest first, with `sender`.
    ///
    /// Delivered items are removed as soon as the sender reports success;
    /// failed items keep their place. A failure never stops the pass. An item
    /// that another drain already removed is skipped, never resent. An empty
    /// queue performs no write.
    pub fn drain<F>(&self, mut sender: F) -> DrainReport
    where
        F: FnMut(&QueuedSubmission) -> Result<(), DeliveryError>,
    {
        let mut report = DrainReport::default();
        let snapshot = match self.load() {
            Ok(items) => items,
            Err(e) => {
                warn!("outbox: drain aborted, read of {} failed: {e}", self.key);
                return report;
            }
        };
        if snapshot.is_empty() {
            return report;
        }

        for item in &snapshot {
            match self.load() {
                Ok(current) if !current.iter().any(|q| q.id == item.id) => {
                    debug!("outbox: {} already delivered, skipping", item.id);
                    report.skipped += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("outbox: cannot confirm {} is still queued: {e}", item.id);
                    report.retained += 1;
                    continue;
                }
            }

            report.attempted += 1;
            match sender(item) {
                Ok(()) => {
                    report.delivered += 1;
                    self.remove(item);
                }
                Err(e) => {
                    debug!("outbox: replay of {} failed: {e}", item.id);
                    report.retained += 1;
                }
            }
        }

        info!(
            "outbox: drain attempted {} delivered {} retained {} skipped {}",
            report.attempted, report.delivered, report.retained, report.skipped
        );
        report
    }

    fn remove(&self, item: &QueuedSubmission) {
        let result = self.load().and_then(|mut items| {
            items.retain(|q| q.id != item.id);
            self.persist(&items)
        });
        if let Err(e) = result {
            warn!("outbox: {} delivered but could not be dequeued: {e}", item.id);
        }
    }
}
