//! Background Sync
//!
//! The replay trigger. A page registers a tag ("run my replay once the
//! connection is back, even if I'm closed"); the manager fires the tag
//! through the worker's sync handler when online, and reschedules it with
//! backoff while the handler keeps reporting failure.
//!
//! - `register(tag)` schedules (or re-arms) a sync task
//! - offline → online resets pending delays so tasks fire immediately
//! - retry delays come from config (30s, 60s, 300s by default); a task
//!   is discarded after `max_retries` failures

use std::cell::RefCell;
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::{SyncConfig, MAX_RETRY_DELAY_SECS};
use crate::connectivity::NetworkState;
use crate::service_worker::SyncOutcome;

// ── Types ───────────────────────────────────────────────────

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("background sync is not supported on this platform")]
    Unsupported,

    #[error("sync registration rejected: {0}")]
    Rejected(String),
}

/// Host capability: ask for a deferred replay.
pub trait DeferredReplayRegistrar {
    fn register(&self, tag: &str) -> Result<(), SyncError>;
}

impl<T: DeferredReplayRegistrar + ?Sized> DeferredReplayRegistrar for std::rc::Rc<T> {
    fn register(&self, tag: &str) -> Result<(), SyncError> {
        (**self).register(tag)
    }
}

/// Registrar for platforms without background sync.
#[derive(Debug, Default)]
pub struct NoBackgroundSync;

impl DeferredReplayRegistrar for NoBackgroundSync {
    fn register(&self, _tag: &str) -> Result<(), SyncError> {
        Err(SyncError::Unsupported)
    }
}

/// A registered sync task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncTask {
    pub tag: String,
    /// Failed attempts so far.
    pub attempts: u32,
    /// Earliest time the task may fire again. `None` means now.
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// Background sync manager for the site.
#[derive(Debug)]
pub struct SyncManager {
    max_retries: u32,
    retry_delays: Vec<Duration>,
    tasks: BTreeMap<String, SyncTask>,
    network_state: NetworkState,
}

impl SyncManager {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delays: config
                .retry_delays_secs
                .iter()
                .map(|s| retry_delay(*s))
                .collect(),
            tasks: BTreeMap::new(),
            network_state: NetworkState::Online,
        }
    }

    /// Register a task. Re-registering an existing tag re-arms it.
    pub fn register(&mut self, tag: &str) {
        let task = self
            .tasks
            .entry(tag.to_string())
            .or_insert_with(|| SyncTask {
                tag: tag.to_string(),
                attempts: 0,
                next_attempt_at: None,
            });
        task.attempts = 0;
        task.next_attempt_at = None;
        debug!("sync: registered {tag}");
    }

    pub fn unregister(&mut self, tag: &str) -> bool {
        self.tasks.remove(tag).is_some()
    }

    pub fn tags(&self) -> Vec<&str> {
        self.tasks.keys().map(|s| s.as_str()).collect()
    }

    pub fn task(&self, tag: &str) -> Option<&SyncTask> {
        self.tasks.get(tag)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Update network state. Coming back online makes every task due.
    pub fn update_network_state(&mut self, state: NetworkState) {
        if self.network_state == NetworkState::Offline && state == NetworkState::Online {
            for task in self.tasks.values_mut() {
                task.next_attempt_at = None;
            }
        }
        self.network_state = state;
    }

    pub fn network_state(&self) -> NetworkState {
        self.network_state
    }

    /// Tags due at `now`. Nothing is due while offline.
    pub fn ready_tags(&self, now: DateTime<Utc>) -> Vec<String> {
        if self.network_state != NetworkState::Online {
            return Vec::new();
        }
        self.tasks
            .values()
            .filter(|t| t.next_attempt_at.map_or(true, |at| at <= now))
            .map(|t| t.tag.clone())
            .collect()
    }

    /// Record the outcome of firing `tag` at `now`.
    pub fn report_result(&mut self, tag: &str, outcome: &SyncOutcome, now: DateTime<Utc>) {
        let Some(task) = self.tasks.get_mut(tag) else {
            return;
        };
        match outcome {
            SyncOutcome::Success(_) | SyncOutcome::Ignored => {
                self.tasks.remove(tag);
            }
            SyncOutcome::Failed(_) => {
                task.attempts += 1;
                if task.attempts >= self.max_retries {
                    warn!("sync: {tag} gave up after {} attempts", task.attempts);
                    self.tasks.remove(tag);
                } else {
                    let idx = (task.attempts as usize - 1).min(self.retry_delays.len().saturating_sub(1));
                    let delay = self.retry_delays.get(idx).copied().unwrap_or_else(Duration::zero);
                    task.next_attempt_at =
                        Some(now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC));
                    debug!("sync: {tag} retry {} in {}s", task.attempts, delay.num_seconds());
                }
            }
        }
    }

    /// Fire every due tag through `handler` and record each outcome.
    pub fn dispatch_ready<F>(&mut self, now: DateTime<Utc>, mut handler: F) -> Vec<(String, SyncOutcome)>
    where
        F: FnMut(&str) -> SyncOutcome,
    {
        let mut fired = Vec::new();
        for tag in self.ready_tags(now) {
            info!("sync: firing {tag}");
            let outcome = handler(&tag);
            self.report_result(&tag, &outcome, now);
            fired.push((tag, outcome));
        }
        fired
    }
}

/// Delays beyond [`MAX_RETRY_DELAY_SECS`] are capped.
fn retry_delay(secs: u64) -> Duration {
    let capped = secs.min(MAX_RETRY_DELAY_SECS);
    i64::try_from(capped)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or_else(Duration::zero)
}

impl DeferredReplayRegistrar for RefCell<SyncManager> {
    fn register(&self, tag: &str) -> Result<(), SyncError> {
        let mut manager = self
            .try_borrow_mut()
            .map_err(|_| SyncError::Rejected("sync manager busy".to_string()))?;
        manager.register(tag);
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::DrainReport;

    fn manager() -> SyncManager {
        SyncManager::new(&SyncConfig::default())
    }

    fn failed() -> SyncOutcome {
        SyncOutcome::Failed(DrainReport {
            attempted: 1,
            retained: 1,
            ..DrainReport::default()
        })
    }

    #[test]
    fn register_and_tags() {
        let mut sm = manager();
        sm.register("background-sync");
        assert_eq!(sm.tags(), vec!["background-sync"]);
        assert!(sm.unregister("background-sync"));
        assert!(sm.tags().is_empty());
    }

    #[test]
    fn ready_when_online_only() {
        let now = Utc::now();
        let mut sm = manager();
        sm.register("s");
        assert_eq!(sm.ready_tags(now), vec!["s".to_string()]);
        sm.update_network_state(NetworkState::Offline);
        assert!(sm.ready_tags(now).is_empty());
    }

    #[test]
    fn success_removes_task() {
        let now = Utc::now();
        let mut sm = manager();
        sm.register("s");
        sm.report_result("s", &SyncOutcome::Success(DrainReport::default()), now);
        assert_eq!(sm.task_count(), 0);
    }

    #[test]
    fn failure_backs_off() {
        let now = Utc::now();
        let mut sm = manager();
        sm.register("s");
        sm.report_result("s", &failed(), now);

        let task = sm.task("s").unwrap();
        assert_eq!(task.attempts, 1);
        assert_eq!(task.next_attempt_at, Some(now + Duration::seconds(30)));
        assert!(sm.ready_tags(now + Duration::seconds(29)).is_empty());
        assert_eq!(sm.ready_tags(now + Duration::seconds(30)).len(), 1);

        sm.report_result("s", &failed(), now);
        assert_eq!(
            sm.task("s").unwrap().next_attempt_at,
            Some(now + Duration::seconds(60))
        );
    }

    #[test]
    fn extreme_delays_do_not_overflow() {
        let config = SyncConfig {
            retry_delays_secs: vec![u64::MAX],
            ..SyncConfig::default()
        };
        let mut sm = SyncManager::new(&config);
        let now = Utc::now();
        sm.register("s");
        sm.report_result("s", &failed(), now);
        assert_eq!(
            sm.task("s").unwrap().next_attempt_at,
            Some(now + Duration::seconds(MAX_RETRY_DELAY_SECS as i64))
        );

        let mut sm = manager();
        let late = DateTime::<Utc>::MAX_UTC - Duration::seconds(10);
        sm.register("s");
        sm.report_result("s", &failed(), late);
        assert_eq!(sm.task("s").unwrap().next_attempt_at, Some(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn max_retries_discards() {
        let now = Utc::now();
        let mut sm = manager();
        sm.register("s");
        for _ in 0..3 {
            sm.report_result("s", &failed(), now);
        }
        assert_eq!(sm.task_count(), 0);
    }

    #[test]
    fn coming_online_makes_tasks_due() {
        let now = Utc::now();
        let mut sm = manager();
        sm.register("s");
        sm.report_result("s", &failed(), now);
        sm.update_network_state(NetworkState::Offline);
        sm.update_network_state(NetworkState::Online);
        assert_eq!(sm.ready_tags(now), vec!["s".to_string()]);
    }

    #[test]
    fn re_register_re_arms() {
        let now = Utc::now();
        let mut sm = manager();
        sm.register("s");
        sm.report_result("s", &failed(), now);
        sm.register("s");
        let task = sm.task("s").unwrap();
        assert_eq!(task.attempts, 0);
        assert_eq!(task.next_attempt_at, None);
    }

    #[test]
    fn dispatch_records_outcomes() {
        let now = Utc::now();
        let mut sm = manager();
        sm.register("a");
        sm.register("b");
        let fired = sm.dispatch_ready(now, |tag| {
            if tag == "a" {
                SyncOutcome::Success(DrainReport::default())
            } else {
                failed()
            }
        });
        assert_eq!(fired.len(), 2);
        assert_eq!(sm.tags(), vec!["b"]);
        assert!(sm.dispatch_ready(now, |_| unreachable!()).is_empty());
    }

    #[test]
    fn registrars() {
        let shared = RefCell::new(manager());
        DeferredReplayRegistrar::register(&shared, "s").unwrap();
        assert_eq!(shared.borrow().task_count(), 1);
        assert_eq!(NoBackgroundSync.register("s"), Err(SyncError::Unsupported));
    }
}
