//! # Events
//!
//! Services subscribe to event types with a priority. Publishing an event
//! copies it to every live subscriber, highest priority first; subscribers
//! with equal priority keep subscription order. Handles whose service is
//! gone are pruned as publishes run into them.

use crate::service::ServiceHandle;
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
struct Subscriber {
    priority: u32,
    handle: ServiceHandle,
}

#[derive(Default)]
pub(crate) struct EventRegistry {
    topics: Mutex<HashMap<TypeId, Vec<Subscriber>>>,
}

impl EventRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handle` to `topic`. Subscribing again only moves the
    /// service to its new priority.
    pub(crate) fn subscribe(&self, topic: TypeId, handle: &ServiceHandle, priority: u32) {
        let mut topics = self.topics.lock();
        let subscribers = topics.entry(topic).or_default();
        subscribers.retain(|sub| sub.handle != *handle);
        let position = subscribers
            .iter()
            .position(|sub| sub.priority < priority)
            .unwrap_or(subscribers.len());
        subscribers.insert(
            position,
            Subscriber {
                priority,
                handle: handle.clone(),
            },
        );
        debug!(service = %handle.id(), priority, subscribers = subscribers.len(), "Event subscribed");
    }

    pub(crate) fn unsubscribe(&self, topic: TypeId, handle: &ServiceHandle) -> bool {
        let mut topics = self.topics.lock();
        let Some(subscribers) = topics.get_mut(&topic) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|sub| sub.handle != *handle);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            topics.remove(&topic);
        }
        removed
    }

    /// Live subscribers of `topic` in delivery order. Dead ones are dropped
    /// from the registry on the way.
    pub(crate) fn subscribers(&self, topic: TypeId) -> Vec<ServiceHandle> {
        let mut topics = self.topics.lock();
        let Some(subscribers) = topics.get_mut(&topic) else {
            return Vec::new();
        };
        subscribers.retain(|sub| sub.handle.is_alive());
        let live = subscribers.iter().map(|sub| sub.handle.clone()).collect();
        if subscribers.is_empty() {
            topics.remove(&topic);
        }
        live
    }

    /// Registered subscribers, dead or alive, of `topic`.
    pub(crate) fn count(&self, topic: TypeId) -> usize {
        self.topics.lock().get(&topic).map_or(0, Vec::len)
    }

    /// Drops every subscription held by `handle`.
    pub(crate) fn remove_service(&self, handle: &ServiceHandle) {
        let mut topics = self.topics.lock();
        for subscribers in topics.values_mut() {
            subscribers.retain(|sub| sub.handle != *handle);
        }
        topics.retain(|_, subscribers| !subscribers.is_empty());
    }
}
