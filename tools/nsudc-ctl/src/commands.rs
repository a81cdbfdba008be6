//! Subcommand handlers. Each returns a JSON value for [`crate::output::emit`].

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use nsudc_pwa::announcements;
use nsudc_pwa::config::SiteConfig;
use nsudc_pwa::draft::DraftStore;
use nsudc_pwa::motion::{self, MotionClient, MotionError};
use nsudc_pwa::network::HttpClient;
use nsudc_pwa::notify::ToastStack;
use nsudc_pwa::outbox::SubmissionQueue;
use nsudc_pwa::service_worker::{ServiceWorker, SyncOutcome};
use nsudc_pwa::PwaError;
use serde_json::{json, Value};

use crate::store;

/// What every handler needs: the config and where the data lives.
pub struct Context {
    pub config: SiteConfig,
    pub data_dir: PathBuf,
}

impl Context {
    pub fn new(config: SiteConfig, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            data_dir: data_dir.into(),
        }
    }
}

// ── draft ───────────────────────────────────────────────────

pub fn draft_show(ctx: &Context) -> Result<Value, PwaError> {
    let storage = store::open_storage(&ctx.data_dir, &ctx.config)?;
    let drafts = DraftStore::new(&storage, ctx.config.storage.draft_key.clone());
    Ok(json!({
        "key": drafts.key(),
        "draft": drafts.load(),
    }))
}

pub fn draft_clear(ctx: &Context) -> Result<Value, PwaError> {
    let storage = store::open_storage(&ctx.data_dir, &ctx.config)?;
    let drafts = DraftStore::new(&storage, ctx.config.storage.draft_key.clone());
    let existed = drafts.load().is_some();
    drafts.clear();
    Ok(json!({ "cleared": existed }))
}

// ── queue ───────────────────────────────────────────────────

pub fn queue_list(ctx: &Context) -> Result<Value, PwaError> {
    let storage = store::open_storage(&ctx.data_dir, &ctx.config)?;
    let queue = SubmissionQueue::new(&storage, ctx.config.storage.queue_key.clone());
    let items = queue.items();
    Ok(json!({
        "pending": items.len(),
        "items": items,
    }))
}

/// Replay the queue through the service worker's sync handler.
pub fn queue_flush<C: HttpClient>(ctx: &Context, client: C) -> Result<Value, PwaError> {
    let storage = store::open_storage(&ctx.data_dir, &ctx.config)?;
    let queue = SubmissionQueue::new(&storage, ctx.config.storage.queue_key.clone());
    let worker = ServiceWorker::new(ctx.config.clone(), client);
    let notices = ToastStack::new(ctx.config.notifications.toast_lifetime_ms);

    let report = match worker.handle_sync(&ctx.config.sync.tag, &queue, &notices) {
        SyncOutcome::Success(report) => report,
        SyncOutcome::Failed(report) => {
            warn!(
                "{} of {} submission(s) still queued",
                report.retained, report.attempted
            );
            return Err(PwaError::Undelivered(report.retained));
        }
        SyncOutcome::Ignored => return Ok(json!({ "attempted": 0 })),
    };
    let notifications: Vec<_> = notices
        .notices()
        .iter()
        .map(|n| n.to_notification(&ctx.config.notifications))
        .collect();
    Ok(json!({
        "attempted": report.attempted,
        "delivered": report.delivered,
        "skipped": report.skipped,
        "notifications": notifications,
    }))
}

// ── cache ───────────────────────────────────────────────────

pub fn cache_install<C: HttpClient>(ctx: &Context, client: C) -> Result<Value, PwaError> {
    let caches = store::read_caches(&ctx.data_dir, &ctx.config)?;
    let mut worker = ServiceWorker::with_caches(ctx.config.clone(), client, caches);
    let report = worker.install();
    store::write_caches(&ctx.data_dir, worker.caches())?;
    info!("install cached {} entries", report.cached.len());
    Ok(serde_json::to_value(report)?)
}

pub fn cache_activate<C: HttpClient>(ctx: &Context, client: C) -> Result<Value, PwaError> {
    let caches = store::read_caches(&ctx.data_dir, &ctx.config)?;
    let mut worker = ServiceWorker::with_caches(ctx.config.clone(), client, caches);
    let deleted = worker.activate();
    store::write_caches(&ctx.data_dir, worker.caches())?;
    Ok(json!({ "deleted": deleted }))
}

pub fn cache_list(ctx: &Context) -> Result<Value, PwaError> {
    let caches = store::read_caches(&ctx.data_dir, &ctx.config)?;
    let partitions: serde_json::Map<String, Value> = caches
        .keys()
        .into_iter()
        .filter_map(|name| caches.get(name).map(|c| (name, c)))
        .map(|(name, cache)| {
            let urls: Vec<&str> = cache.keys().iter().map(|k| k.url.as_str()).collect();
            (name.to_string(), json!(urls))
        })
        .collect();
    Ok(json!({
        "caches": partitions,
        "total_bytes": caches.total_size(),
    }))
}

// ── motion ──────────────────────────────────────────────────

pub fn motion_generate<C: HttpClient>(
    ctx: &Context,
    client: C,
    topic: &str,
    format: &str,
    motions: Option<&Path>,
    seed: u64,
) -> Result<Value, PwaError> {
    let generator = MotionClient::new(client, &ctx.config);
    if let Some(generated) = generator.generate(topic, format) {
        return Ok(serde_json::to_value(generated)?);
    }

    let Some(path) = motions else {
        return Err(MotionError::Unavailable.into());
    };
    let list = motion::parse_static(&fs::read_to_string(path)?)?;
    let picked = motion::pick_static(&list, Some(topic), seed).ok_or(MotionError::Unavailable)?;
    Ok(serde_json::to_value(picked)?)
}

// ── announcements ───────────────────────────────────────────

pub fn announcements_check(ctx: &Context, file: &Path) -> Result<Value, PwaError> {
    let feed = announcements::parse(&fs::read_to_string(file)?)?;
    let storage = store::open_storage(&ctx.data_dir, &ctx.config)?;
    let toasts = ToastStack::new(ctx.config.notifications.toast_lifetime_ms);
    let is_new = announcements::check_latest(
        &storage,
        &ctx.config.storage.announcement_key,
        &feed,
        &toasts,
    );
    let messages: Vec<String> = toasts.notices().iter().map(|n| n.message()).collect();
    Ok(json!({
        "new": is_new,
        "latest": feed.first().and_then(|a| a.id.as_ref()).map(ToString::to_string),
        "messages": messages,
    }))
}
