//! Handlers against a real data directory, with a stand-in HTTP client.

use std::collections::BTreeMap;
use std::fs;
use std::process::ExitCode;

use nsudc_ctl::commands::{self, Context};
use nsudc_ctl::store;
use nsudc_pwa::draft::DraftStore;
use nsudc_pwa::network::{HttpClient, HttpRequest, HttpResponse, NetworkError};
use nsudc_pwa::outbox::{payload_from_entries, QueuedSubmission, SubmissionQueue};
use nsudc_pwa::{PwaError, SiteConfig};

/// Answers 200 for the listed paths, 404 otherwise; or fails everything.
struct Stub {
    online: bool,
    ok_paths: Vec<&'static str>,
}

impl HttpClient for Stub {
    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        if !self.online {
            return Err(NetworkError::Offline);
        }
        let path = request.url.trim_start_matches("http://localhost:3000");
        if self.ok_paths.contains(&path) {
            Ok(HttpResponse::new(200, format!("body of {path}")))
        } else {
            Ok(HttpResponse::new(404, "missing"))
        }
    }
}

fn offline() -> Stub {
    Stub {
        online: false,
        ok_paths: vec![],
    }
}

fn context(dir: &tempfile::TempDir) -> Context {
    let mut config = SiteConfig::default();
    config.cache.manifest = vec!["/".into(), "/offline.html".into(), "/styles.css".into()];
    Context::new(config, dir.path())
}

fn seed_queue(ctx: &Context, names: &[&str]) {
    let storage = store::open_storage(&ctx.data_dir, &ctx.config).unwrap();
    let queue = SubmissionQueue::new(&storage, ctx.config.storage.queue_key.clone());
    for name in names {
        queue.enqueue(QueuedSubmission::new("/register", payload_from_entries([("name", *name)])));
    }
}

#[test]
fn draft_show_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    assert_eq!(commands::draft_show(&ctx).unwrap()["draft"], serde_json::Value::Null);

    {
        let storage = store::open_storage(&ctx.data_dir, &ctx.config).unwrap();
        let drafts = DraftStore::new(&storage, ctx.config.storage.draft_key.clone());
        drafts.save(&BTreeMap::from([("name".to_string(), "Amara".to_string())]));
    }
    let shown = commands::draft_show(&ctx).unwrap();
    assert_eq!(shown["draft"]["name"], "Amara");
    assert_eq!(shown["key"], "nsudc:registration-draft");

    assert_eq!(commands::draft_clear(&ctx).unwrap()["cleared"], true);
    assert_eq!(commands::draft_clear(&ctx).unwrap()["cleared"], false);
}

#[test]
fn queue_list_shows_pending_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    seed_queue(&ctx, &["Amara", "Bo"]);

    let listed = commands::queue_list(&ctx).unwrap();
    assert_eq!(listed["pending"], 2);
    assert_eq!(listed["items"][0]["url"], "/register");
    assert_eq!(listed["items"][1]["payload"]["name"], "Bo");
}

#[test]
fn queue_flush_offline_keeps_items_and_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    seed_queue(&ctx, &["Amara"]);

    let err = commands::queue_flush(&ctx, offline()).unwrap_err();
    assert!(matches!(err, PwaError::Undelivered(1)));
    assert_eq!(err.exit_code(), ExitCode::from(1));
    assert_eq!(commands::queue_list(&ctx).unwrap()["pending"], 1);
}

#[test]
fn queue_flush_online_delivers_and_notifies() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    seed_queue(&ctx, &["Amara", "Bo"]);

    let stub = Stub {
        online: true,
        ok_paths: vec!["/register"],
    };
    let flushed = commands::queue_flush(&ctx, stub).unwrap();
    assert_eq!(flushed["delivered"], 2);
    assert_eq!(flushed["notifications"][0]["title"], "Form submitted successfully!");
    assert_eq!(commands::queue_list(&ctx).unwrap()["pending"], 0);
}

#[test]
fn cache_install_activate_list() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);

    // Leftover partition from an older release.
    let mut caches = store::read_caches(&ctx.data_dir, &ctx.config).unwrap();
    caches.open("nsudc-static-v0");
    store::write_caches(&ctx.data_dir, &caches).unwrap();

    let stub = Stub {
        online: true,
        ok_paths: vec!["/", "/offline.html"],
    };
    let installed = commands::cache_install(&ctx, stub).unwrap();
    assert_eq!(installed["policy"], "best-effort");
    assert_eq!(installed["cached"].as_array().unwrap().len(), 2);
    assert_eq!(installed["failed"][0][0], "/styles.css");

    let activated = commands::cache_activate(&ctx, offline()).unwrap();
    assert_eq!(activated["deleted"][0], "nsudc-static-v0");

    let listed = commands::cache_list(&ctx).unwrap();
    let urls = listed["caches"]["nsudc-static-v1"].as_array().unwrap();
    assert_eq!(urls.len(), 2);
    assert!(listed["caches"].get("nsudc-static-v0").is_none());
}

#[test]
fn motion_falls_back_to_static_list() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    let path = dir.path().join("motions.json");
    fs::write(
        &path,
        r#"[{"motion": "THW ban zoos", "topic": "Environment"}, {"motion": "THW tax AI labs", "topic": "Technology"}]"#,
    )
    .unwrap();

    let picked = commands::motion_generate(&ctx, offline(), "technology", "BP", Some(path.as_path()), 7).unwrap();
    assert_eq!(picked["motion"], "THW tax AI labs");
    assert_eq!(picked["source"], "static");

    let err = commands::motion_generate(&ctx, offline(), "technology", "BP", None, 0).unwrap_err();
    assert_eq!(err.exit_code(), ExitCode::from(1));
}

#[test]
fn announcements_check_remembers_latest() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    let feed = dir.path().join("announcements.json");
    fs::write(&feed, r#"[{"id": 12, "message": "Trials on Friday"}]"#).unwrap();

    let first = commands::announcements_check(&ctx, &feed).unwrap();
    assert_eq!(first["new"], true);
    assert_eq!(first["latest"], "12");
    assert_eq!(first["messages"][0], "New announcement: Trials on Friday");

    let second = commands::announcements_check(&ctx, &feed).unwrap();
    assert_eq!(second["new"], false);
}
