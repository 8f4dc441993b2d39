//! Subscription registry
//!
//! Ordered list of acknowledged subscriptions. Dispatch walks it in insertion
//! order and stops at the first entry matching both the source and the event
//! identifier, so one event reaches at most one subscription.

use super::handler::EventCallback;
use crate::transport::names::{EVENT_IDENTIFIER_ALL, EVENT_SOURCE_ALL};

pub struct Subscription {
    pub source: String,
    pub event: String,
    pub callback: Option<EventCallback>,
}

impl Subscription {
    pub fn new(source: &str, event: &str, callback: Option<EventCallback>) -> Self {
        Self {
            source: source.to_string(),
            event: event.to_string(),
            callback,
        }
    }

    pub fn matches(&self, source: &str, event: &str) -> bool {
        (self.source == EVENT_SOURCE_ALL || self.source == source)
            && (self.event == EVENT_IDENTIFIER_ALL || self.event == event)
    }

    fn is(&self, source: &str, event: &str) -> bool {
        self.source == source && self.event == event
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("source", &self.source)
            .field("event", &self.event)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Vec<Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact `(source, event)` lookup, wildcards compared literally.
    pub fn contains(&self, source: &str, event: &str) -> bool {
        self.entries.iter().any(|s| s.is(source, event))
    }

    pub fn insert(&mut self, subscription: Subscription) {
        self.entries.push(subscription);
    }

    pub fn remove(&mut self, source: &str, event: &str) -> Option<Subscription> {
        let index = self.entries.iter().position(|s| s.is(source, event))?;
        Some(self.entries.remove(index))
    }

    /// Index of the first entry matching an inbound event.
    pub fn find_match(&self, source: &str, event: &str) -> Option<usize> {
        self.entries.iter().position(|s| s.matches(source, event))
    }

    /// Lends out the callback of entry `index` while it runs.
    pub fn take_callback(&mut self, index: usize) -> Option<EventCallback> {
        self.entries.get_mut(index).and_then(|s| s.callback.take())
    }

    /// Puts a lent callback back, if its subscription is still registered
    /// and nobody installed a new one meanwhile.
    pub fn restore_callback(&mut self, source: &str, event: &str, callback: EventCallback) {
        if let Some(entry) = self.entries.iter_mut().find(|s| s.is(source, event)) {
            if entry.callback.is_none() {
                entry.callback = Some(callback);
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&Subscription> {
        self.entries.get(index)
    }

    pub fn drain(&mut self) -> Vec<Subscription> {
        std::mem::take(&mut self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
