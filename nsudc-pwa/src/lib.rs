//! NSUDC offline-first site pipeline
//!
//! The registration form keeps working without a connection: edits are
//! autosaved as a draft, a failed submit is queued durably, and the queue is
//! replayed when connectivity returns (in-page or via background sync). The
//! service-worker layer serves the site from cache and falls back to an
//! offline page for failed navigations.
//!
//! Host capabilities are injected as traits: [`KeyValueStore`],
//! [`HttpClient`], [`ConnectivityObserver`], [`DeferredReplayRegistrar`] and
//! [`Notifier`].

pub mod announcements;
pub mod background_sync;
pub mod cache_storage;
pub mod config;
pub mod connectivity;
pub mod draft;
pub mod error;
pub mod form;
pub mod motion;
pub mod network;
pub mod notify;
pub mod outbox;
pub mod service_worker;
pub mod session;
pub mod social;
pub mod web_storage;

pub use background_sync::{DeferredReplayRegistrar, NoBackgroundSync, SyncError, SyncManager};
pub use cache_storage::{CacheStorage, CachedResponse, RequestKey};
pub use config::{InstallPolicy, SiteConfig};
pub use connectivity::{ConnectivityObserver, ManualConnectivity, NetworkState};
pub use draft::{Draft, DraftStore};
pub use error::PwaError;
pub use form::{Form, FormField, ValidationError};
pub use network::{DeliveryError, HttpClient, HttpRequest, HttpResponse, NetworkError};
pub use notify::{Notice, Notifier, ToastStack};
pub use outbox::{DrainReport, QueuedSubmission, SubmissionQueue};
pub use service_worker::{FetchResult, ServiceWorker, SyncOutcome};
pub use session::{FormSession, SessionState, SubmitOutcome};
pub use web_storage::{FileStorage, KeyValueStore, MemoryStorage, StorageError};
