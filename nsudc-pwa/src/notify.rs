//! User-visible notices.
//!
//! The pipeline reports outcomes as [`Notice`]s through a [`Notifier`]; the
//! host decides how they look. [`ToastStack`] is the page's toast list and
//! [`Notice::to_notification`] builds the system notification a background
//! replay shows.

use std::cell::RefCell;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::NotificationConfig;
use crate::form::InvalidField;

// ── Notices ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The registration reached the server.
    Submitted,
    /// Delivery failed; the registration waits in the offline queue.
    QueuedOffline,
    /// A reconnect flush ran over the queue.
    Flushed { attempted: usize },
    /// Built-in constraint checks rejected the form.
    ValidationFailed { fields: Vec<InvalidField> },
    /// A background replay delivered a queued registration.
    ReplayDelivered { destination_url: String },
    /// An announcement newer than the last one seen.
    NewAnnouncement { message: String },
    /// The draft was cleared by the user.
    DraftCleared,
}

impl Notice {
    /// Text for a toast.
    pub fn message(&self) -> String {
        match self {
            Notice::Submitted => "Registration submitted. Welcome aboard!".to_string(),
            Notice::QueuedOffline => {
                "You're offline. Your registration was saved and will be sent when you're back online."
                    .to_string()
            }
            Notice::Flushed { attempted } => {
                format!("Back online: tried sending {attempted} saved registration(s).")
            }
            Notice::ValidationFailed { fields } => {
                let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                format!("Please check: {}", names.join(", "))
            }
            Notice::ReplayDelivered { .. } => "Form submitted successfully!".to_string(),
            Notice::NewAnnouncement { message } => format!("New announcement: {message}"),
            Notice::DraftCleared => "Draft cleared.".to_string(),
        }
    }

    /// System notification shown by the background replay handler.
    pub fn to_notification(&self, config: &NotificationConfig) -> Notification {
        let (title, body) = match self {
            Notice::ReplayDelivered { .. } => (
                "Form submitted successfully!".to_string(),
                "Your registration has been processed.".to_string(),
            ),
            other => ("NSUDC Update".to_string(), other.message()),
        };
        Notification {
            title,
            options: NotificationOptions {
                body,
                icon: Some(config.icon.clone()),
                badge: Some(config.badge.clone()),
                tag: None,
                silent: false,
            },
        }
    }
}

/// Options passed to `showNotification(title, options)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: Option<String>,
    pub badge: Option<String>,
    /// De-duplication key.
    pub tag: Option<String>,
    pub silent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub options: NotificationOptions,
}

// ── Notifier ────────────────────────────────────────────────

pub trait Notifier {
    fn notify(&self, notice: Notice);
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn notify(&self, notice: Notice) {
        (**self).notify(notice)
    }
}

impl<T: Notifier + ?Sized> Notifier for std::rc::Rc<T> {
    fn notify(&self, notice: Notice) {
        (**self).notify(notice)
    }
}

/// Discards every notice.
#[derive(Debug, Default)]
pub struct Silent;

impl Notifier for Silent {
    fn notify(&self, _notice: Notice) {}
}

// ── ToastStack ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub notice: Notice,
    pub shown_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The page's toast list. Each toast lives for a fixed lifetime.
#[derive(Debug)]
pub struct ToastStack {
    lifetime: Duration,
    toasts: RefCell<Vec<Toast>>,
}

impl ToastStack {
    pub fn new(lifetime_ms: u64) -> Self {
        Self {
            lifetime: Duration::milliseconds(lifetime_ms as i64),
            toasts: RefCell::new(Vec::new()),
        }
    }

    /// Push a toast as of `now`.
    pub fn show_at(&self, notice: Notice, now: DateTime<Utc>) {
        self.toasts.borrow_mut().push(Toast {
            notice,
            shown_at: now,
            expires_at: now + self.lifetime,
        });
    }

    /// Drop toasts that have expired by `now` and return the rest.
    pub fn active(&self, now: DateTime<Utc>) -> Vec<Toast> {
        let mut toasts = self.toasts.borrow_mut();
        toasts.retain(|t| t.expires_at > now);
        toasts.clone()
    }

    /// Every notice shown so far that has not been pruned.
    pub fn notices(&self) -> Vec<Notice> {
        self.toasts.borrow().iter().map(|t| t.notice.clone()).collect()
    }
}

impl Notifier for ToastStack {
    fn notify(&self, notice: Notice) {
        self.show_at(notice, Utc::now());
    }
}
