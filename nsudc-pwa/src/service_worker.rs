//! Service worker: the cache-and-fallback layer.
//!
//! Two lifecycle phases and a per-request handler:
//!
//! - **install**: fetch the static manifest into the static partition
//! - **activate**: delete every partition that is not the current static or
//!   dynamic one
//! - **fetch**: for intercepted GETs, serve from cache, else from the
//!   network (remembering successful same-origin responses in the dynamic
//!   partition), else the offline document for navigations
//!
//! Dynamic cache writes never gate the response. They are queued as side
//! writes and committed by [`ServiceWorker::settle`], the analogue of the
//! event's `waitUntil` work finishing after `respondWith` has returned.
//!
//! The worker also owns the background-sync handler that replays the
//! offline submission queue.

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::cache_storage::{CacheError, CacheStorage, CachedResponse, RequestKey};
use crate::config::{InstallPolicy, SiteConfig};
use crate::network::{
    resolve_url, HttpClient, HttpRequest, HttpResponse, Method, NetworkError, RequestDestination,
    ResponseType,
};
use crate::notify::{Notice, Notifier};
use crate::outbox::{self, DrainReport, SubmissionQueue};
use crate::web_storage::KeyValueStore;

// ── Types ───────────────────────────────────────────────────

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

impl WorkerState {
    pub fn can_transition_to(self, target: WorkerState) -> bool {
        matches!(
            (self, target),
            (WorkerState::Parsed, WorkerState::Installing)
                | (WorkerState::Installing, WorkerState::Installed)
                | (WorkerState::Installed, WorkerState::Activating)
                | (WorkerState::Activating, WorkerState::Activated)
                // A new version re-runs install over a live worker.
                | (WorkerState::Activated, WorkerState::Installing)
        )
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FetchSource {
    Cache,
    Network,
    /// The offline document, served for a failed navigation.
    OfflineFallback,
}

/// A response produced by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub response: HttpResponse,
    pub source: FetchSource,
}

/// Why the worker could not produce a response.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// A non-navigation request failed on the network.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// A navigation failed on the network and no offline document is cached.
    #[error("navigation to {url} failed and no offline document is cached")]
    FallbackExhausted { url: String },
}

/// Result of intercepting a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// Not intercepted; the host performs the request natively.
    Passthrough,
    Response(FetchResponse),
    Error(FetchError),
}

/// Outcome of the install phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub policy: InstallPolicy,
    /// Manifest entries now in the static partition.
    pub cached: Vec<String>,
    /// Manifest entries that failed, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Outcome of a background sync event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncOutcome {
    /// Tag is not ours; nothing ran.
    Ignored,
    /// The queue is empty after the replay.
    Success(DrainReport),
    /// Some items were retained; the platform should fire again later.
    Failed(DrainReport),
}

// ── ServiceWorker ───────────────────────────────────────────

pub struct ServiceWorker<C> {
    config: SiteConfig,
    client: C,
    caches: CacheStorage,
    state: WorkerState,
    side_writes: Vec<(String, CachedResponse)>,
}

impl<C: HttpClient> ServiceWorker<C> {
    pub fn new(config: SiteConfig, client: C) -> Self {
        let caches = CacheStorage::with_quota(config.cache.max_bytes);
        Self::with_caches(config, client, caches)
    }

    /// Resume a worker over previously persisted caches.
    pub fn with_caches(config: SiteConfig, client: C, caches: CacheStorage) -> Self {
        Self {
            config,
            client,
            caches,
            state: WorkerState::Parsed,
            side_writes: Vec::new(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn caches(&self) -> &CacheStorage {
        &self.caches
    }

    pub fn into_caches(self) -> CacheStorage {
        self.caches
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state.can_transition_to(next) {
            debug!("sw: {:?} -> {:?}", self.state, next);
        } else {
            warn!("sw: unexpected transition {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }

    // ── Lifecycle ───────────────────────────────────────────

    /// Populate the static partition from the manifest.
    ///
    /// Never fails the host: fetch failures are reported and logged. Under
    /// [`InstallPolicy::AllOrNothing`] a single failure leaves the static
    /// partition untouched.
    pub fn install(&mut self) -> InstallReport {
        self.transition(WorkerState::Installing);
        let policy = self.config.cache.install_policy;
        info!(
            "sw: installing {} manifest entries ({policy})",
            self.config.cache.manifest.len()
        );

        let mut fetched = Vec::new();
        let mut failed = Vec::new();
        for entry in &self.config.cache.manifest {
            let url = match resolve_url(&self.config.origin, entry) {
                Ok(url) => url,
                Err(e) => {
                    failed.push((entry.clone(), e.to_string()));
                    continue;
                }
            };
            match self.client.fetch(&HttpRequest::get(url.as_str())) {
                Ok(response) if response.ok() => fetched.push((entry.clone(), url, response)),
                Ok(response) => failed.push((entry.clone(), format!("HTTP {}", response.status))),
                Err(e) => failed.push((entry.clone(), e.to_string())),
            }
        }

        let mut cached = Vec::new();
        if failed.is_empty() || policy == InstallPolicy::BestEffort {
            let now = Utc::now();
            let static_name = self.config.cache.static_name.clone();
            for (entry, url, response) in fetched {
                let cached_response =
                    CachedResponse::from_response(RequestKey::get(url.as_str()), &response, now);
                match self.caches.put(&static_name, cached_response) {
                    Ok(()) => cached.push(entry),
                    Err(e) => failed.push((entry, e.to_string())),
                }
            }
        }

        for (entry, reason) in &failed {
            warn!("sw: could not cache {entry}: {reason}");
        }
        if !failed.is_empty() && policy == InstallPolicy::AllOrNothing {
            warn!("sw: all-or-nothing install cached nothing ({} failures)", failed.len());
        }
        info!("sw: installed, {} cached, {} failed", cached.len(), failed.len());

        self.transition(WorkerState::Installed);
        InstallReport {
            policy,
            cached,
            failed,
        }
    }

    /// Delete every partition other than the current static and dynamic ones.
    /// Returns the deleted names.
    pub fn activate(&mut self) -> Vec<String> {
        self.transition(WorkerState::Activating);
        let keep = [
            self.config.cache.static_name.as_str(),
            self.config.cache.dynamic_name.as_str(),
        ];
        let stale: Vec<String> = self
            .caches
            .keys()
            .into_iter()
            .filter(|name| !keep.contains(name))
            .map(str::to_string)
            .collect();
        for name in &stale {
            info!("sw: clearing old cache {name}");
            self.caches.delete(name);
        }
        self.transition(WorkerState::Activated);
        stale
    }

    // ── Fetch ───────────────────────────────────────────────

    fn same_origin(&self, url: &url::Url) -> bool {
        url::Url::parse(&self.config.origin)
            .map(|origin| origin.origin() == url.origin())
            .unwrap_or(false)
    }

    /// Whether `url` is the site's own origin or an allow-listed host.
    fn in_scope(&self, url: &url::Url) -> bool {
        if self.same_origin(url) {
            return true;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        self.config
            .external_hosts
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }

    fn lookup(&self, key: &RequestKey) -> Result<&CachedResponse, CacheError> {
        let partitions = [
            self.config.cache.static_name.as_str(),
            self.config.cache.dynamic_name.as_str(),
        ];
        self.caches
            .match_in_any(&partitions, key)
            .ok_or_else(|| CacheError::Miss(key.clone()))
    }

    /// Handle an outgoing request from the page.
    pub fn handle_fetch(&mut self, request: &HttpRequest) -> FetchResult {
        if request.method != Method::Get {
            return FetchResult::Passthrough;
        }
        let url = match resolve_url(&self.config.origin, &request.url) {
            Ok(url) => url,
            Err(_) => return FetchResult::Passthrough,
        };
        if !self.in_scope(&url) {
            return FetchResult::Passthrough;
        }

        let key = RequestKey::get(url.as_str());
        match self.lookup(&key) {
            Ok(hit) => {
                debug!("sw: serving from cache {key}");
                return FetchResult::Response(FetchResponse {
                    response: hit.to_response(),
                    source: FetchSource::Cache,
                });
            }
            Err(miss) => debug!("sw: {miss}"),
        }

        let mut outbound = request.clone();
        outbound.url = url.to_string();
        match self.client.fetch(&outbound) {
            Ok(response) => {
                // Only same-origin basic responses, whatever type the client reports.
                if response.status == 200
                    && response.response_type == ResponseType::Basic
                    && self.same_origin(&url)
                {
                    let entry = CachedResponse::from_response(key, &response, Utc::now());
                    self.side_writes
                        .push((self.config.cache.dynamic_name.clone(), entry));
                }
                FetchResult::Response(FetchResponse {
                    response,
                    source: FetchSource::Network,
                })
            }
            Err(e) => {
                debug!("sw: fetch failed for {key}: {e}");
                if request.destination != RequestDestination::Document {
                    return FetchResult::Error(FetchError::Network(e));
                }
                self.offline_fallback(url.as_str())
            }
        }
    }

    fn offline_fallback(&self, url: &str) -> FetchResult {
        let offline = resolve_url(&self.config.origin, &self.config.cache.offline_document)
            .ok()
            .and_then(|doc| {
                self.caches
                    .match_in(&self.config.cache.static_name, &RequestKey::get(doc.as_str()))
            });
        match offline {
            Some(doc) => FetchResult::Response(FetchResponse {
                response: doc.to_response(),
                source: FetchSource::OfflineFallback,
            }),
            None => {
                error!("sw: navigation to {url} failed with no offline document cached");
                FetchResult::Error(FetchError::FallbackExhausted {
                    url: url.to_string(),
                })
            }
        }
    }

    /// Number of side writes not yet committed.
    pub fn pending_side_writes(&self) -> usize {
        self.side_writes.len()
    }

    /// Commit queued dynamic-cache writes. Failures are logged and dropped.
    /// Returns how many were stored.
    pub fn settle(&mut self) -> usize {
        let mut stored = 0;
        for (cache_name, entry) in std::mem::take(&mut self.side_writes) {
            let key = entry.key.clone();
            match self.caches.put(&cache_name, entry) {
                Ok(()) => stored += 1,
                Err(e) => warn!("sw: dynamic cache write for {key} failed: {e}"),
            }
        }
        stored
    }

    // ── Background sync ─────────────────────────────────────

    /// Handle a `sync` event: replay the offline queue.
    ///
    /// Each delivered item raises a notice; failures stay queued silently
    /// for the next trigger.
    pub fn handle_sync<S: KeyValueStore>(
        &self,
        tag: &str,
        queue: &SubmissionQueue<S>,
        notifier: &dyn Notifier,
    ) -> SyncOutcome {
        if tag != self.config.sync.tag {
            return SyncOutcome::Ignored;
        }
        info!("sw: background sync triggered ({tag})");

        let timeout = self.config.submit_timeout();
        let report = queue.drain(|item| {
            outbox::replay(&self.client, &self.config.origin, item, timeout)?;
            notifier.notify(Notice::ReplayDelivered {
                destination_url: item.destination_url.clone(),
            });
            Ok(())
        });

        if report.retained == 0 {
            SyncOutcome::Success(report)
        } else {
            SyncOutcome::Failed(report)
        }
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;

    use crate::config::CacheConfig;
    use crate::notify::Notice;
    use crate::outbox::{payload_from_entries, QueuedSubmission};
    use crate::web_storage::MemoryStorage;

    /// Serves canned responses by absolute URL; 404 for anything else.
    #[derive(Default)]
    struct Site {
        offline: Cell<bool>,
        pages: BTreeMap<String, HttpResponse>,
        log: RefCell<Vec<(Method, String)>>,
    }

    impl Site {
        fn with(mut self, url: &str, response: HttpResponse) -> Self {
            self.pages.insert(url.to_string(), response);
            self
        }

        fn calls(&self) -> usize {
            self.log.borrow().len()
        }
    }

    impl HttpClient for Site {
        fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
            self.log
                .borrow_mut()
                .push((request.method, request.url.clone()));
            if self.offline.get() {
                return Err(NetworkError::Offline);
            }
            Ok(self
                .pages
                .get(&request.url)
                .cloned()
                .unwrap_or_else(|| HttpResponse::new(404, "not found")))
        }
    }

    #[derive(Default)]
    struct Recorder(RefCell<Vec<Notice>>);

    impl Notifier for Recorder {
        fn notify(&self, notice: Notice) {
            self.0.borrow_mut().push(notice);
        }
    }

    const ORIGIN: &str = "http://localhost:3000";

    fn small_config(policy: InstallPolicy) -> SiteConfig {
        SiteConfig {
            cache: CacheConfig {
                manifest: vec!["/".into(), "/index.html".into(), "/offline.html".into()],
                install_policy: policy,
                ..CacheConfig::default()
            },
            ..SiteConfig::default()
        }
    }

    fn full_site() -> Site {
        Site::default()
            .with(&format!("{ORIGIN}/"), HttpResponse::new(200, "home"))
            .with(&format!("{ORIGIN}/index.html"), HttpResponse::new(200, "home"))
            .with(&format!("{ORIGIN}/offline.html"), HttpResponse::new(200, "offline"))
            .with(
                &format!("{ORIGIN}/data/social.json"),
                HttpResponse::new(200, r#"{"instagram":{"followers":1840}}"#),
            )
    }

    fn installed(site: &Site) -> ServiceWorker<&Site> {
        let mut sw = ServiceWorker::new(small_config(InstallPolicy::BestEffort), site);
        sw.install();
        sw.activate();
        sw
    }

    fn body(result: &FetchResult) -> (FetchSource, String) {
        match result {
            FetchResult::Response(r) => (r.source, r.response.text()),
            other => panic!("expected a response, got {other:?}"),
        }
    }

    #[test]
    fn lifecycle_states() {
        let site = full_site();
        let mut sw = ServiceWorker::new(small_config(InstallPolicy::BestEffort), &site);
        assert_eq!(sw.state(), WorkerState::Parsed);
        sw.install();
        assert_eq!(sw.state(), WorkerState::Installed);
        sw.activate();
        assert_eq!(sw.state(), WorkerState::Activated);
        assert!(!WorkerState::Parsed.can_transition_to(WorkerState::Activated));
    }

    #[test]
    fn best_effort_install_keeps_what_it_got() {
        let site = Site::default().with(&format!("{ORIGIN}/offline.html"), HttpResponse::new(200, "offline"));
        let mut sw = ServiceWorker::new(small_config(InstallPolicy::BestEffort), &site);
        let report = sw.install();
        assert_eq!(report.cached, vec!["/offline.html".to_string()]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].1, "HTTP 404");
        assert_eq!(sw.caches().get("nsudc-static-v1").map(|c| c.len()), Some(1));
    }

    #[test]
    fn all_or_nothing_install_caches_nothing_on_failure() {
        let site = Site::default().with(&format!("{ORIGIN}/offline.html"), HttpResponse::new(200, "offline"));
        let mut sw = ServiceWorker::new(small_config(InstallPolicy::AllOrNothing), &site);
        let report = sw.install();
        assert_eq!(report.policy, InstallPolicy::AllOrNothing);
        assert!(report.cached.is_empty());
        assert!(sw.caches().get("nsudc-static-v1").map_or(true, |c| c.is_empty()));

        let site = full_site();
        let mut sw = ServiceWorker::new(small_config(InstallPolicy::AllOrNothing), &site);
        assert_eq!(sw.install().cached.len(), 3);
    }

    #[test]
    fn activate_removes_old_versions() {
        let site = full_site();
        let mut caches = CacheStorage::new();
        caches.open("nsudc-static-v0");
        caches.open("nsudc-dynamic-v1");
        let mut sw = ServiceWorker::with_caches(small_config(InstallPolicy::BestEffort), &site, caches);
        sw.install();
        assert_eq!(sw.activate(), vec!["nsudc-static-v0".to_string()]);
        assert_eq!(sw.caches().keys(), vec!["nsudc-dynamic-v1", "nsudc-static-v1"]);
    }

    #[test]
    fn non_get_and_foreign_requests_pass_through() {
        let site = full_site();
        let mut sw = installed(&site);
        let before = site.calls();

        let post = HttpRequest::post("/register", "application/x-www-form-urlencoded", b"a=1".to_vec());
        assert_eq!(sw.handle_fetch(&post), FetchResult::Passthrough);
        assert_eq!(
            sw.handle_fetch(&HttpRequest::get("https://api.example.org/feed")),
            FetchResult::Passthrough
        );
        assert_eq!(
            sw.handle_fetch(&HttpRequest::get("https://evilcdn.tailwindcss.com.example.org/x")),
            FetchResult::Passthrough
        );
        assert_eq!(site.calls(), before);
    }

    #[test]
    fn allow_listed_hosts_are_intercepted() {
        let site = full_site().with("https://fonts.googleapis.com/css2?family=Inter", HttpResponse::new(200, "css"));
        let mut sw = installed(&site);
        let result = sw.handle_fetch(&HttpRequest::get("https://fonts.googleapis.com/css2?family=Inter"));
        assert_eq!(body(&result), (FetchSource::Network, "css".to_string()));
    }

    #[test]
    fn static_hit_needs_no_network() {
        let site = full_site();
        let mut sw = installed(&site);
        site.offline.set(true);
        let before = site.calls();
        let result = sw.handle_fetch(&HttpRequest::navigate("/index.html"));
        assert_eq!(body(&result), (FetchSource::Cache, "home".to_string()));
        assert_eq!(site.calls(), before);
    }

    #[test]
    fn dynamic_writes_wait_for_settle() {
        let site = full_site();
        let mut sw = installed(&site);

        let first = sw.handle_fetch(&HttpRequest::get("/data/social.json"));
        assert_eq!(body(&first).0, FetchSource::Network);
        assert_eq!(sw.pending_side_writes(), 1);
        assert!(sw.caches().get("nsudc-dynamic-v1").map_or(true, |c| c.is_empty()));

        assert_eq!(sw.settle(), 1);
        assert_eq!(sw.pending_side_writes(), 0);

        site.offline.set(true);
        let before = site.calls();
        let cached = sw.handle_fetch(&HttpRequest::get("/data/social.json"));
        assert_eq!(body(&cached).0, FetchSource::Cache);
        assert_eq!(site.calls(), before);
    }

    #[test]
    fn only_ok_basic_responses_are_cached() {
        let site = full_site()
            .with(&format!("{ORIGIN}/created"), HttpResponse::new(201, "created"))
            .with(
                "https://cdn.tailwindcss.com/3.3.0",
                HttpResponse::new(200, "tw").with_type(ResponseType::Opaque),
            );
        let mut sw = installed(&site);
        sw.handle_fetch(&HttpRequest::get("/created"));
        sw.handle_fetch(&HttpRequest::get("/missing"));
        sw.handle_fetch(&HttpRequest::get("https://cdn.tailwindcss.com/3.3.0"));
        assert_eq!(sw.pending_side_writes(), 0);
    }

    #[test]
    fn allow_listed_responses_reported_as_basic_are_not_cached() {
        let url = "https://fonts.googleapis.com/css2?family=Inter";
        let site = full_site().with(url, HttpResponse::new(200, "css"));
        let mut sw = installed(&site);
        assert_eq!(body(&sw.handle_fetch(&HttpRequest::get(url))).0, FetchSource::Network);
        assert_eq!(sw.pending_side_writes(), 0);
        assert_eq!(sw.settle(), 0);
    }

    #[test]
    fn offline_navigation_gets_offline_document() {
        let site = full_site();
        let mut sw = installed(&site);
        site.offline.set(true);
        let result = sw.handle_fetch(&HttpRequest::navigate("/events.html"));
        assert_eq!(body(&result), (FetchSource::OfflineFallback, "offline".to_string()));
    }

    #[test]
    fn offline_subresource_fails() {
        let site = full_site();
        let mut sw = installed(&site);
        site.offline.set(true);
        assert_eq!(
            sw.handle_fetch(&HttpRequest::get("/js/app.js")),
            FetchResult::Error(FetchError::Network(NetworkError::Offline))
        );
    }

    #[test]
    fn missing_offline_document_exhausts_fallback() {
        let site = Site::default();
        site.offline.set(true);
        let mut sw = ServiceWorker::new(small_config(InstallPolicy::BestEffort), &site);
        sw.install();
        assert_eq!(
            sw.handle_fetch(&HttpRequest::navigate("/index.html")),
            FetchResult::Error(FetchError::FallbackExhausted {
                url: format!("{ORIGIN}/index.html")
            })
        );
    }

    #[test]
    fn sync_replays_queue_and_notifies_each_delivery() {
        let site = full_site().with(&format!("{ORIGIN}/register"), HttpResponse::new(200, "ok"));
        let sw = installed(&site);
        let queue = SubmissionQueue::new(MemoryStorage::new(), "q");
        queue.enqueue(QueuedSubmission::new("/register", payload_from_entries([("name", "Amara")])));
        queue.enqueue(QueuedSubmission::new("/gone", payload_from_entries([("name", "Bo")])));
        let notices = Recorder::default();

        assert_eq!(sw.handle_sync("other-tag", &queue, &notices), SyncOutcome::Ignored);
        assert_eq!(queue.len(), 2);

        let outcome = sw.handle_sync("background-sync", &queue, &notices);
        assert!(matches!(outcome, SyncOutcome::Failed(r) if r.delivered == 1 && r.retained == 1));
        assert_eq!(queue.items()[0].destination_url, "/gone");
        assert_eq!(
            *notices.0.borrow(),
            vec![Notice::ReplayDelivered {
                destination_url: "/register".into()
            }]
        );
    }

    #[test]
    fn sync_on_empty_queue_succeeds_quietly() {
        let site = full_site();
        let sw = installed(&site);
        let queue = SubmissionQueue::new(MemoryStorage::new(), "q");
        let notices = Recorder::default();
        assert_eq!(
            sw.handle_sync("background-sync", &queue, &notices),
            SyncOutcome::Success(DrainReport::default())
        );
        assert!(notices.0.borrow().is_empty());
    }
}
