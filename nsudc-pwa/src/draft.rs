//! Draft store: the in-progress registration form, persisted under a fixed
//! key so a reload mid-edit restores it.
//!
//! Every operation is best-effort: storage failures are logged and
//! swallowed so the form stays usable.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::web_storage::KeyValueStore;

/// Field name → current value. There is at most one draft at a time.
pub type Draft = BTreeMap<String, String>;

pub struct DraftStore<S> {
    storage: S,
    key: String,
}

impl<S: KeyValueStore> DraftStore<S> {
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Persist `draft`, replacing any previous one.
    pub fn save(&self, draft: &Draft) {
        let json = match serde_json::to_string(draft) {
            Ok(json) => json,
            Err(e) => {
                warn!("draft: serialize failed: {e}");
                return;
            }
        };
        if let Err(e) = self.storage.set_item(&self.key, &json) {
            warn!("draft: save to {} failed: {e}", self.key);
        }
    }

    /// The persisted draft, or `None` when absent or unreadable.
    pub fn load(&self) -> Option<Draft> {
        let raw = match self.storage.get_item(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("draft: read of {} failed: {e}", self.key);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(draft) => Some(draft),
            Err(e) => {
                debug!("draft: discarding unreadable draft: {e}");
                None
            }
        }
    }

    /// Remove the persisted draft. Idempotent.
    pub fn clear(&self) {
        if let Err(e) = self.storage.remove_item(&self.key) {
            warn!("draft: clear of {} failed: {e}", self.key);
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}
