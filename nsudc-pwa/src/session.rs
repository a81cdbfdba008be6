//! Form session controller.
//!
//! One [`FormSession`] per registration form. It is built when the page
//! initializes, restores the draft, autosaves on every edit, submits or
//! queues, and flushes the queue when connectivity returns. It is torn down
//! explicitly with [`FormSession::teardown`].

use std::rc::Rc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

use crate::background_sync::DeferredReplayRegistrar;
use crate::config::SiteConfig;
use crate::connectivity::{ConnectivityObserver, Subscription};
use crate::draft::DraftStore;
use crate::form::{Form, ValidationError};
use crate::network::{deliver, resolve_url, DeliveryError, HttpClient, HttpRequest, NetworkError};
use crate::notify::{Notice, Notifier, Silent};
use crate::outbox::{self, DrainReport, QueuedSubmission, SubmissionQueue, FORM_CONTENT_TYPE};
use crate::web_storage::KeyValueStore;

// ── State ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Editing,
    Submitting,
    Succeeded,
    QueuedOffline,
}

impl SessionState {
    pub fn can_transition_to(self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (Idle, Editing)
                | (Idle | Editing, Submitting)
                | (Submitting, Succeeded | QueuedOffline | Editing)
                | (Succeeded | QueuedOffline, Editing)
        )
    }
}

/// What a submit attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Constraint checks failed; nothing was sent or queued.
    Invalid(ValidationError),
    Delivered,
    /// Delivery failed; the payload is in the offline queue.
    Queued(DeliveryError),
    /// A submit is only possible from `Idle` or `Editing`.
    Ignored,
}

// ── Session ─────────────────────────────────────────────────

pub struct FormSession<S, C> {
    form: Form,
    drafts: DraftStore<S>,
    queue: SubmissionQueue<S>,
    client: C,
    notifier: Rc<dyn Notifier>,
    registrar: Option<Rc<dyn DeferredReplayRegistrar>>,
    subscription: Option<Subscription>,
    origin: String,
    sync_tag: String,
    timeout: Duration,
    state: SessionState,
}

impl<S, C> FormSession<S, C>
where
    S: KeyValueStore + Clone,
    C: HttpClient,
{
    /// A session over `form`. Draft and queue share `storage` under the
    /// keys from `config`.
    pub fn new(form: Form, storage: S, client: C, config: &SiteConfig) -> Self {
        Self {
            form,
            drafts: DraftStore::new(storage.clone(), config.storage.draft_key.clone()),
            queue: SubmissionQueue::new(storage, config.storage.queue_key.clone()),
            client,
            notifier: Rc::new(Silent),
            registrar: None,
            subscription: None,
            origin: config.origin.clone(),
            sync_tag: config.sync.tag.clone(),
            timeout: config.submit_timeout(),
            state: SessionState::Idle,
        }
    }

    pub fn with_notifier(mut self, notifier: Rc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_registrar(mut self, registrar: Rc<dyn DeferredReplayRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn queue(&self) -> &SubmissionQueue<S> {
        &self.queue
    }

    pub fn drafts(&self) -> &DraftStore<S> {
        &self.drafts
    }

    fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            warn!("session: unexpected transition {:?} -> {:?}", self.state, next);
        }
        debug!("session: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn begin_editing(&mut self) {
        if self.state != SessionState::Editing {
            self.transition(SessionState::Editing);
        }
    }

    // ── Page lifecycle ──────────────────────────────────────

    /// Restore the draft, start listening for connectivity and, if the
    /// environment says it is online, flush the queue once.
    pub fn initialize(&mut self, observer: Option<&dyn ConnectivityObserver>) -> Option<DrainReport> {
        if let Some(draft) = self.drafts.load() {
            debug!("session: restoring draft with {} field(s)", draft.len());
            self.form.apply_draft(&draft);
        }
        let observer = observer?;
        self.subscription = Some(observer.subscribe());
        if observer.is_online() {
            Some(self.on_connectivity_restored())
        } else {
            None
        }
    }

    /// Stop listening for connectivity. Consumes the session.
    pub fn teardown(mut self, observer: Option<&dyn ConnectivityObserver>) {
        if let (Some(observer), Some(sub)) = (observer, self.subscription.take()) {
            observer.unsubscribe(sub.id());
        }
        debug!("session: torn down");
    }

    /// Process connectivity changes received since the last call.
    pub fn pump(&mut self) -> Option<DrainReport> {
        let restored = self
            .subscription
            .as_ref()
            .is_some_and(Subscription::consume_online_transition);
        restored.then(|| self.on_connectivity_restored())
    }

    // ── Editing ─────────────────────────────────────────────

    fn autosave(&self) {
        self.drafts.save(&self.form.snapshot());
    }

    /// A text-like control changed. Returns `false` for an unknown name.
    pub fn on_input(&mut self, name: &str, value: &str) -> bool {
        if !self.form.set_value(name, value) {
            debug!("session: input for unknown field {name}");
            return false;
        }
        self.begin_editing();
        self.autosave();
        true
    }

    /// A checkbox was toggled.
    pub fn on_toggle(&mut self, name: &str, value: &str, checked: bool) -> bool {
        if !self.form.set_checked(name, value, checked) {
            debug!("session: toggle for unknown checkbox {name}={value}");
            return false;
        }
        self.begin_editing();
        self.autosave();
        true
    }

    /// Explicit user gesture: forget the draft and empty the form. The
    /// queue is untouched.
    pub fn clear_draft(&mut self) {
        self.drafts.clear();
        self.form.reset();
        self.notifier.notify(Notice::DraftCleared);
        info!("session: draft cleared");
    }

    // ── Submit ──────────────────────────────────────────────

    /// Validate, then deliver or queue.
    pub fn submit(&mut self) -> SubmitOutcome {
        if !matches!(self.state, SessionState::Idle | SessionState::Editing) {
            warn!("session: submit ignored in state {:?}", self.state);
            return SubmitOutcome::Ignored;
        }
        self.transition(SessionState::Submitting);

        if let Err(invalid) = self.form.check_validity() {
            info!("session: {invalid}");
            self.notifier.notify(Notice::ValidationFailed {
                fields: invalid.fields.clone(),
            });
            self.transition(SessionState::Editing);
            return SubmitOutcome::Invalid(invalid);
        }

        let payload = self.form.payload();
        match self.post() {
            Ok(()) => {
                self.drafts.clear();
                self.transition(SessionState::Succeeded);
                self.notifier.notify(Notice::Submitted);
                info!("session: registration delivered to {}", self.form.action);
                SubmitOutcome::Delivered
            }
            Err(e) => {
                warn!("session: delivery to {} failed: {e}; queueing", self.form.action);
                self.queue
                    .enqueue(QueuedSubmission::new(self.form.action.clone(), payload));
                self.drafts.clear();
                self.transition(SessionState::QueuedOffline);
                self.notifier.notify(Notice::QueuedOffline);
                self.request_replay();
                SubmitOutcome::Queued(e)
            }
        }
    }

    fn post(&self) -> Result<(), DeliveryError> {
        let url = resolve_url(&self.origin, &self.form.action)
            .map_err(|e| NetworkError::Other(format!("bad action {}: {e}", self.form.action)))?;
        let request = HttpRequest::post(
            url.as_str(),
            FORM_CONTENT_TYPE,
            self.form.encoded().into_bytes(),
        )
        .with_timeout(self.timeout);
        deliver(&self.client, &request).map(|_| ())
    }

    fn request_replay(&self) {
        let Some(registrar) = &self.registrar else {
            return;
        };
        match registrar.register(&self.sync_tag) {
            Ok(()) => debug!("session: replay registered as {}", self.sync_tag),
            Err(e) => debug!("session: replay registration skipped: {e}"),
        }
    }

    // ── Reconnect ───────────────────────────────────────────

    /// Re-send everything queued. A `Flushed` notice follows when at least
    /// one item was tried.
    pub fn on_connectivity_restored(&mut self) -> DrainReport {
        let report = self
            .queue
            .drain(|item| outbox::replay(&self.client, &self.origin, item, self.timeout));
        if report.processed_any() {
            info!(
                "session: flushed queue, {} delivered, {} retained",
                report.delivered, report.retained
            );
            self.notifier.notify(Notice::Flushed {
                attempted: report.attempted,
            });
        }
        report
    }
}

// ── Tests ───────────────────────────────────────────────────
