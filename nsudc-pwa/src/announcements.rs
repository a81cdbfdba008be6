//! Top-bar announcements: the feed, its rotation, and "new since last
//! visit" detection.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::notify::{Notice, Notifier};
use crate::web_storage::KeyValueStore;

pub const DEFAULT_LINK_TEXT: &str = "Learn more";

/// Announcement ids appear as numbers or strings in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnouncementId {
    Number(i64),
    Text(String),
}

impl fmt::Display for AnnouncementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnouncementId::Number(n) => write!(f, "{n}"),
            AnnouncementId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(default)]
    pub id: Option<AnnouncementId>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default, rename = "linkText")]
    pub link_text: Option<String>,
}

impl Announcement {
    /// Label for the link, when there is one.
    pub fn link_label(&self) -> Option<&str> {
        self.href
            .as_ref()
            .map(|_| self.link_text.as_deref().unwrap_or(DEFAULT_LINK_TEXT))
    }
}

/// Parse `announcements.json` (a JSON array).
pub fn parse(json: &str) -> Result<Vec<Announcement>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Compare the newest announcement against the last one seen.
///
/// When it differs, a [`Notice::NewAnnouncement`] goes out and its id is
/// stored. Returns whether the announcement was new. Storage failures are
/// logged; at worst the notice repeats on the next visit.
pub fn check_latest<S: KeyValueStore + ?Sized>(
    storage: &S,
    key: &str,
    feed: &[Announcement],
    notifier: &dyn Notifier,
) -> bool {
    let Some(latest) = feed.first() else {
        return false;
    };
    let Some(id) = latest.id.as_ref().map(ToString::to_string) else {
        return false;
    };
    let seen = storage.get_item(key).unwrap_or_else(|e| {
        warn!("announcements: read of {key} failed: {e}");
        None
    });
    if seen.as_deref() == Some(id.as_str()) {
        return false;
    }

    debug!("announcements: new announcement {id}");
    notifier.notify(Notice::NewAnnouncement {
        message: latest.message.clone().unwrap_or_default(),
    });
    if let Err(e) = storage.set_item(key, &id) {
        warn!("announcements: could not remember {id}: {e}");
    }
    true
}

/// Round-robin rotation over the feed on a fixed interval.
#[derive(Debug, Clone)]
pub struct Rotation {
    items: Vec<Announcement>,
    index: usize,
    interval: Duration,
    shown_at: DateTime<Utc>,
}

impl Rotation {
    pub fn new(items: Vec<Announcement>, interval_ms: u64, now: DateTime<Utc>) -> Self {
        Self {
            items,
            index: 0,
            interval: Duration::milliseconds(i64::try_from(interval_ms).unwrap_or(i64::MAX)),
            shown_at: now,
        }
    }

    pub fn current(&self) -> Option<&Announcement> {
        self.items.get(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Advance past every interval that elapsed by `now`.
    /// Returns `true` if the shown announcement changed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        if self.items.len() < 2 || self.interval <= Duration::zero() {
            return false;
        }
        let step = self.interval.num_milliseconds();
        let elapsed = (now - self.shown_at).num_milliseconds();
        if elapsed < step {
            return false;
        }
        let steps = elapsed / step;
        let len = self.items.len() as i64;
        let before = self.index;
        self.index = ((self.index as i64 + steps % len) % len) as usize;
        self.shown_at += Duration::milliseconds(steps * step);
        self.index != before
    }
}
