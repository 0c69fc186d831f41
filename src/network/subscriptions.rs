//! Subscription registry: routes server notifications to handlers.
//!
//! Entries are keyed by `(method, first-param-string)` so one subscription
//! per address can be added and removed independently. The registry lives
//! inside the transport worker and dies with the connection run; callers
//! re-subscribe after a reconnect.

use std::collections::HashMap;

use crate::network::wire::RawNotification;

/// Invoked on the transport worker for every matching notification.
/// Handlers must not block; hand real work off to an executor.
pub type NotificationHandler = Box<dyn Fn(RawNotification) + Send>;

#[derive(Default)]
pub struct SubscriptionRegistry {
    handlers: HashMap<(String, String), NotificationHandler>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler for notifications matching `(method, key)`.
    /// A later insert under the same key replaces the previous handler.
    pub fn insert(&mut self, method: impl Into<String>, key: impl Into<String>, handler: NotificationHandler) {
        self.handlers.insert((method.into(), key.into()), handler);
    }

    /// Remove exactly one entry. Returns whether it existed.
    pub fn remove(&mut self, method: &str, key: &str) -> bool {
        self.handlers.remove(&(method.to_string(), key.to_string())).is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch a notification to the handler with an exact key match.
    /// Unmatched notifications are dropped with a warning.
    pub fn dispatch(&self, notification: RawNotification) {
        let Some(key) = notification.key_param().map(str::to_string) else {
            tracing::warn!(method = %notification.method, "notification without string key param, dropping");
            return;
        };
        match self.handlers.get(&(notification.method.clone(), key)) {
            Some(handler) => handler(notification),
            None => {
                tracing::warn!(
                    method = %notification.method,
                    key = ?notification.key_param(),
                    "no subscription handler matches notification, dropping"
                );
            }
        }
    }
}
