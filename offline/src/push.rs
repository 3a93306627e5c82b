//! Push notifications
//!
//! Turns a push payload into a displayed notification and routes clicks on
//! that notification back to a window.

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{ActionConfig, PushDefaults};
use crate::lifecycle::{ClientId, Clients};

// ── Payload ─────────────────────────────────────────────────

/// Optional push payload `{title?, body?}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl PushPayload {
    /// Decode push data. Missing or malformed data yields an empty payload.
    pub fn parse(data: Option<&[u8]>) -> Self {
        let Some(data) = data else {
            return Self::default();
        };
        match serde_json::from_slice(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("ignoring malformed push payload: {e}");
                Self::default()
            }
        }
    }
}

// ── Notification ────────────────────────────────────────────

/// Data attached to every notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Milliseconds since the Unix epoch.
    pub date_of_arrival: i64,
    pub primary_key: u32,
}

/// Options for a displayed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<ActionConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub options: NotificationOptions,
}

impl Notification {
    /// Build a notification from `payload`, falling back to `defaults` for
    /// absent or empty fields.
    pub fn from_payload(payload: &PushPayload, defaults: &PushDefaults) -> Self {
        let pick = |value: &Option<String>, fallback: &str| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        Self {
            title: pick(&payload.title, &defaults.title),
            options: NotificationOptions {
                body: pick(&payload.body, &defaults.body),
                icon: defaults.icon.clone(),
                badge: defaults.badge.clone(),
                vibrate: defaults.vibrate.clone(),
                data: NotificationData {
                    date_of_arrival: Utc::now().timestamp_millis(),
                    primary_key: 1,
                },
                actions: defaults.actions.clone(),
            },
        }
    }
}

/// Where notifications are displayed.
pub trait NotificationSink: Send + Sync {
    fn show(&self, notification: &Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn show(&self, notification: &Notification) {
        info!(
            "notification: {} - {}",
            notification.title, notification.options.body
        );
    }
}

/// Keeps every notification shown.
#[derive(Debug, Default)]
pub struct RecordingSink {
    shown: spin::Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn show(&self, notification: &Notification) {
        self.shown.lock().push(notification.clone());
    }
}

// ── Clicks ──────────────────────────────────────────────────

/// Result of a notification click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickOutcome {
    /// The `close` action; nothing opened.
    Dismissed,
    /// An existing window on the app root was focused.
    Focused(ClientId),
    /// A new window was opened at this URL.
    Opened(String),
}

/// Handle a click with the given action. `close` only dismisses; anything
/// else focuses a window showing the app root or opens one.
pub fn handle_click(action: Option<&str>, clients: &Clients, origin: &Url) -> ClickOutcome {
    if action == Some("close") {
        return ClickOutcome::Dismissed;
    }

    let at_root = |client_url: &str| {
        Url::parse(client_url)
            .map(|url| url.origin() == origin.origin() && url.path() == "/")
            .unwrap_or(false)
    };
    if let Some(client) = clients.match_all().into_iter().find(|c| at_root(&c.url)) {
        clients.focus(client.id);
        return ClickOutcome::Focused(client.id);
    }

    let root = origin.join("/").map_or_else(|_| "/".to_string(), |url| url.to_string());
    clients.open_window(&root);
    ClickOutcome::Opened(root)
}
