//! Events emitted during execution and the collector that gathers them

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// A single key/value attribute of an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
    /// Whether the external indexer should index this attribute
    pub index: bool,
}

/// A typed, attributed record of something that happened during execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    /// Create an event with no attributes
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    /// Append an attribute, not yet marked for indexing
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(EventAttribute {
            key: key.into(),
            value: value.into(),
            index: false,
        });
        self
    }

    /// Look up the value of an attribute by key
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }

    /// An event is indexed when at least one of its attributes is
    pub fn is_indexed(&self) -> bool {
        self.attributes.iter().any(|a| a.index)
    }
}

/// Collects events for one execution scope.
///
/// Clones share the same underlying buffer, so a context and its copies all
/// emit into one place. A branched context gets a fresh manager.
#[derive(Debug, Clone, Default)]
pub struct EventManager {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        // A panic while pushing cannot leave the vector half-written.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn emit(&self, event: Event) {
        self.lock().push(event);
    }

    pub fn emit_events(&self, events: impl IntoIterator<Item = Event>) {
        self.lock().extend(events);
    }

    /// Snapshot of everything emitted so far, in emission order
    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// True if both handles point at the same buffer
    pub fn same_as(&self, other: &EventManager) -> bool {
        Arc::ptr_eq(&self.events, &other.events)
    }
}

/// Rewrite the index flag of every attribute.
///
/// An attribute is indexed when `index_set` is empty or contains
/// `"{event kind}.{attribute key}"`.
pub fn mark_events_to_index(events: Vec<Event>, index_set: &HashSet<String>) -> Vec<Event> {
    let index_all = index_set.is_empty();

    events
        .into_iter()
        .map(|mut event| {
            for attr in &mut event.attributes {
                attr.index = index_all || index_set.contains(&format!("{}.{}", event.kind, attr.key));
            }
            event
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_and_mint() -> Vec<Event> {
        vec![
            Event::new("transfer")
                .with_attribute("recipient", "bob")
                .with_attribute("amount", "10"),
            Event::new("mint").with_attribute("amount", "5"),
        ]
    }

    #[test]
    fn test_empty_index_set_marks_everything() {
        let marked = mark_events_to_index(transfer_and_mint(), &HashSet::new());
        assert!(marked.iter().all(|e| e.attributes.iter().all(|a| a.index)));
    }

    #[test]
    fn test_index_set_selects_attributes() {
        let set: HashSet<String> = ["transfer.recipient".to_string()].into_iter().collect();
        let marked = mark_events_to_index(transfer_and_mint(), &set);

        assert!(marked[0].is_indexed());
        assert!(marked[0].attributes[0].index);
        assert!(!marked[0].attributes[1].index);
        assert!(!marked[1].is_indexed());
    }

    #[test]
    fn test_marking_clears_stale_flags() {
        let mut events = transfer_and_mint();
        events[1].attributes[0].index = true;

        let set: HashSet<String> = ["transfer.amount".to_string()].into_iter().collect();
        let marked = mark_events_to_index(events, &set);
        assert!(!marked[1].is_indexed());
    }

    #[test]
    fn test_event_manager_clones_share_buffer() {
        let manager = EventManager::new();
        let copy = manager.clone();
        copy.emit(Event::new("a"));

        assert_eq!(manager.len(), 1);
        assert!(manager.same_as(&copy));
        assert!(!manager.same_as(&EventManager::new()));
    }
}
