//! The event bus (§4.4, §4.5, §6): synchronous fan-out from the
//! scheduler/facade back to editor observers.

use std::collections::HashMap;

use crate::model::project::Project;

/// Events emitted by the engine (§6 "Events"). `SampleLoaded` carries the
/// instrument id rather than the decoded buffer itself, since the buffer
/// lives behind an `Arc` the observer can fetch from the facade.
#[derive(Debug, Clone)]
pub enum Event {
    PlayStart,
    PlayStop,
    RowChange { row: u16 },
    ProjectLoaded { project_name: String },
    SampleLoaded { instrument_id: String },
}

/// The named topic an [`Event`] is published under (§2, §4.5
/// "named-topic publish/subscribe"): one topic per `Event` variant, minus
/// its payload, so a caller can subscribe to `RowChange` without seeing
/// every other event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    PlayStart,
    PlayStop,
    RowChange,
    ProjectLoaded,
    SampleLoaded,
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::PlayStart => Topic::PlayStart,
            Event::PlayStop => Topic::PlayStop,
            Event::RowChange { .. } => Topic::RowChange,
            Event::ProjectLoaded { .. } => Topic::ProjectLoaded,
            Event::SampleLoaded { .. } => Topic::SampleLoaded,
        }
    }
}

/// A handle returned by [`EventBus::on`], passed back to [`EventBus::off`]
/// to detach that one handler.
pub type SubscriptionId = u64;

/// Fan-out subscriber list, keyed by topic. Subscribers MUST NOT call back
/// into mutating engine operations from within a handler (§5): delivery
/// happens synchronously on the control thread while the engine may still
/// be mid-mutation.
pub struct EventBus {
    subscribers: HashMap<Topic, Vec<(SubscriptionId, Box<dyn FnMut(&Event) + Send>)>>,
    next_id: SubscriptionId,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            subscribers: HashMap::new(),
            next_id: 0,
        }
    }
}

impl EventBus {
    /// `on(topic, cb)` (§4.5): registers `handler` against `topic` only,
    /// returning an id that `off` can later use to detach it.
    pub fn on(&mut self, topic: Topic, handler: impl FnMut(&Event) + Send + 'static) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers
            .entry(topic)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// `off(topic, cb)` (§4.5): removes the handler `on` returned `id` for.
    /// A stale or already-removed id is a no-op.
    pub fn off(&mut self, topic: Topic, id: SubscriptionId) {
        if let Some(subs) = self.subscribers.get_mut(&topic) {
            subs.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    pub fn emit(&mut self, event: Event) {
        if let Some(subs) = self.subscribers.get_mut(&event.topic()) {
            for (_, handler) in subs.iter_mut() {
                handler(&event);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.values().map(Vec::len).sum()
    }
}

pub fn project_loaded(project: &Project) -> Event {
    Event::ProjectLoaded {
        project_name: project.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn emits_to_every_subscriber() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::default();
        for _ in 0..3 {
            let count = Arc::clone(&count);
            bus.on(Topic::PlayStart, move |_event| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.emit(Event::PlayStart);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn row_change_carries_row_number() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut bus = EventBus::default();
        let seen_clone = Arc::clone(&seen);
        bus.on(Topic::RowChange, move |event| {
            if let Event::RowChange { row } = event {
                seen_clone.lock().unwrap().push(*row);
            }
        });
        bus.emit(Event::RowChange { row: 4 });
        assert_eq!(*seen.lock().unwrap(), vec![4]);
    }

    #[test]
    fn subscriber_only_sees_its_own_topic() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::default();
        let seen_clone = Arc::clone(&seen);
        bus.on(Topic::PlayStart, move |_event| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(Event::PlayStop);
        bus.emit(Event::RowChange { row: 0 });
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn off_detaches_the_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::default();
        let count_clone = Arc::clone(&count);
        let id = bus.on(Topic::PlayStart, move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(Event::PlayStart);
        bus.off(Topic::PlayStart, id);
        bus.emit(Event::PlayStart);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
