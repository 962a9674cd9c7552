use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use super::alert::{Alert, AlertOrigin};

/// Lifecycle of one logical notification on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Pending,
    LocalShown,
    ProviderShown,
    /// Both channels surfaced it; one visible alert remains.
    Collapsed,
    Dismissed,
}

impl AlertState {
    pub fn is_visible(self) -> bool {
        matches!(self, Self::LocalShown | Self::ProviderShown | Self::Collapsed)
    }

    fn after(self, origin: AlertOrigin) -> Self {
        match (self, origin) {
            (Self::Dismissed, _) => Self::Dismissed,
            (Self::Pending, AlertOrigin::Local) => Self::LocalShown,
            (Self::Pending, AlertOrigin::Provider) => Self::ProviderShown,
            (Self::LocalShown, AlertOrigin::Local) => Self::LocalShown,
            (Self::ProviderShown, AlertOrigin::Provider) => Self::ProviderShown,
            (Self::LocalShown | Self::ProviderShown | Self::Collapsed, _) => Self::Collapsed,
        }
    }
}

/// Presentation layer seam. Implementations must replace an alert that has
/// the same tag rather than stacking a second one.
pub trait AlertPresenter: Send + Sync {
    fn present(&self, alert: Alert) -> AlertState;
    fn dismiss(&self, tag: &str);
}

struct TrayEntry {
    alert: Option<Alert>,
    state: AlertState,
    revision: u64,
}

/// In-memory alert tray keyed by dedup tag.
#[derive(Clone, Default)]
pub struct AlertTray {
    entries: Arc<DashMap<String, TrayEntry>>,
    revisions: Arc<AtomicU64>,
    auto_dismiss: Option<Duration>,
}

impl AlertTray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dismiss alerts that were not touched for `timeout`.
    pub fn with_auto_dismiss(timeout: Duration) -> Self {
        Self {
            auto_dismiss: Some(timeout),
            ..Self::default()
        }
    }

    /// Record a logical notification before any channel surfaced it.
    pub fn begin(&self, tag: &str) {
        self.entries.entry(tag.to_string()).or_insert_with(|| TrayEntry {
            alert: None,
            state: AlertState::Pending,
            revision: 0,
        });
    }

    pub fn state(&self, tag: &str) -> Option<AlertState> {
        self.entries.get(tag).map(|e| e.state)
    }

    pub fn visible(&self) -> Vec<Alert> {
        self.entries
            .iter()
            .filter(|e| e.state.is_visible())
            .filter_map(|e| e.alert.clone())
            .collect()
    }

    pub fn visible_count(&self) -> usize {
        self.entries.iter().filter(|e| e.state.is_visible()).count()
    }

    pub fn get(&self, tag: &str) -> Option<Alert> {
        self.entries
            .get(tag)
            .filter(|e| e.state.is_visible())
            .and_then(|e| e.alert.clone())
    }

    fn schedule_expiry(&self, tag: String, revision: u64) {
        let Some(timeout) = self.auto_dismiss else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(tag = %tag, "No async runtime, alert will not auto-dismiss");
            return;
        };

        let entries = self.entries.clone();
        handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(mut entry) = entries.get_mut(&tag) {
                // A newer write restarted the timer
                if entry.revision == revision && entry.state.is_visible() {
                    entry.state = AlertState::Dismissed;
                    tracing::debug!(tag = %tag, "Alert timed out");
                }
            }
        });
    }
}

impl AlertPresenter for AlertTray {
    fn present(&self, alert: Alert) -> AlertState {
        let revision = self.revisions.fetch_add(1, Ordering::Relaxed) + 1;
        let tag = alert.tag.clone();

        let state = {
            let mut entry = self.entries.entry(tag.clone()).or_insert_with(|| TrayEntry {
                alert: None,
                state: AlertState::Pending,
                revision: 0,
            });
            let next = entry.state.after(alert.origin);
            if next != AlertState::Dismissed {
                entry.alert = Some(alert);
                entry.revision = revision;
            }
            entry.state = next;
            next
        };

        if state.is_visible() {
            self.schedule_expiry(tag, revision);
        }
        state
    }

    fn dismiss(&self, tag: &str) {
        if let Some(mut entry) = self.entries.get_mut(tag) {
            entry.state = AlertState::Dismissed;
        }
    }
}

/// Presenter decorator that logs every alert passing through it.
pub struct LoggingPresenter<P> {
    inner: P,
}

impl<P: AlertPresenter> LoggingPresenter<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: AlertPresenter> AlertPresenter for LoggingPresenter<P> {
    fn present(&self, alert: Alert) -> AlertState {
        let tag = alert.tag.clone();
        let origin = alert.origin;
        let state = self.inner.present(alert);
        tracing::info!(tag = %tag, origin = ?origin, state = ?state, "Alert presented");
        state
    }

    fn dismiss(&self, tag: &str) {
        tracing::info!(tag = %tag, "Alert dismissed");
        self.inner.dismiss(tag);
    }
}
