//! Front-end event bus
//!
//! Typed notifications published by the orchestrator while it drives the
//! modules. Subscribers are called synchronously in subscription order; the
//! same events are also queued for hosts that prefer polling via
//! [`EventBus::drain`].

use crate::module::{AlarmStatus, ModuleKind};
use std::collections::VecDeque;
use std::fmt;

/// Notification from the front end
#[derive(Debug, Clone, PartialEq)]
pub enum FrontEndEvent {
    /// A module's observable status changed this tick
    ModuleChanged(ModuleKind),
    AlarmRaised(AlarmStatus),
    AlarmCleared(AlarmStatus),
    /// GPSDO finished satellite re-acquisition
    GnssAcquired,
    /// HPA was forced off because the BUC lost power
    InterlockTripped,
    /// Persisted state was merged into the modules
    StateSynced,
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&FrontEndEvent)>;

/// Event bus owned by the orchestrator
pub struct EventBus {
    listeners: Vec<(SubscriptionId, Listener)>,
    queue: VecDeque<FrontEndEvent>,
    next_id: u64,
    max_queued: usize,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}

/// Queued events kept when nobody drains
const DEFAULT_MAX_QUEUED: usize = 1024;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            queue: VecDeque::new(),
            next_id: 0,
            max_queued: DEFAULT_MAX_QUEUED,
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn FnMut(&FrontEndEvent)>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Returns false when `id` was not subscribed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    pub fn publish(&mut self, event: FrontEndEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
        if self.queue.len() >= self.max_queued {
            self.queue.pop_front();
        }
        self.queue.push_back(event);
    }

    /// Take all queued events, oldest first
    pub fn drain(&mut self) -> Vec<FrontEndEvent> {
        self.queue.drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_publish_reaches_subscribers_and_queue() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut bus = EventBus::new();
        bus.subscribe(Box::new(move |e: &FrontEndEvent| sink.borrow_mut().push(e.clone())));

        bus.publish(FrontEndEvent::GnssAcquired);
        bus.publish(FrontEndEvent::ModuleChanged(ModuleKind::Lnb));

        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(bus.pending(), 2);
        let drained = bus.drain();
        assert_eq!(drained[0], FrontEndEvent::GnssAcquired);
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        let mut bus = EventBus::new();
        let id = bus.subscribe(Box::new(move |_: &FrontEndEvent| *c.borrow_mut() += 1));
        bus.publish(FrontEndEvent::StateSynced);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(FrontEndEvent::StateSynced);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_queue_is_bounded() {
        let mut bus = EventBus::new();
        for _ in 0..(DEFAULT_MAX_QUEUED + 10) {
            bus.publish(FrontEndEvent::InterlockTripped);
        }
        assert_eq!(bus.pending(), DEFAULT_MAX_QUEUED);
    }
}
