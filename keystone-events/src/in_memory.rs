//! In-memory event log.
//!
//! Keeps the most recent `capacity` events with a monotonically increasing
//! sequence number. Sequence numbers keep counting after old records are
//! dropped, so indexers can detect gaps.

use crate::EventSink;
use keystone_core::{AccessEvent, EventKind, KeystoneConfig, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// An event with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub at: Timestamp,
    pub event: AccessEvent,
}

#[derive(Debug, Default)]
struct LogState {
    records: VecDeque<EventRecord>,
    next_sequence: u64,
}

/// Bounded in-memory event log.
#[derive(Debug)]
pub struct InMemoryEventLog {
    state: Mutex<LogState>,
    capacity: usize,
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventLog {
    /// Create a log with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(KeystoneConfig::default().event_log_capacity)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LogState::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &KeystoneConfig) -> Self {
        Self::with_capacity(config.event_log_capacity)
    }

    // A panic while holding the lock leaves the log consistent (every
    // mutation is a single push/pop), so poisoning is ignored.
    fn state(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().records.is_empty()
    }

    /// All retained records, oldest first.
    pub fn records(&self) -> Vec<EventRecord> {
        self.state().records.iter().cloned().collect()
    }

    /// All retained events, oldest first.
    pub fn events(&self) -> Vec<AccessEvent> {
        self.state().records.iter().map(|r| r.event.clone()).collect()
    }

    /// Retained events of one kind, oldest first.
    pub fn of_kind(&self, kind: EventKind) -> Vec<AccessEvent> {
        self.state()
            .records
            .iter()
            .filter(|r| r.event.kind() == kind)
            .map(|r| r.event.clone())
            .collect()
    }

    pub fn last(&self) -> Option<AccessEvent> {
        self.state().records.back().map(|r| r.event.clone())
    }

    /// Records with a sequence number at or after `sequence`.
    pub fn since(&self, sequence: u64) -> Vec<EventRecord> {
        self.state()
            .records
            .iter()
            .filter(|r| r.sequence >= sequence)
            .cloned()
            .collect()
    }

    /// Drop all records. Sequence numbering continues.
    pub fn clear(&self) {
        self.state().records.clear();
    }
}

impl EventSink for InMemoryEventLog {
    fn emit(&self, event: &AccessEvent, at: Timestamp) {
        let mut state = self.state();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        if state.records.len() == self.capacity {
            state.records.pop_front();
        }
        state.records.push_back(EventRecord {
            sequence,
            at,
            event: event.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keystone_core::{AuthorizationMode, Identity};

    fn granted(n: u64) -> AccessEvent {
        AccessEvent::AccessGranted {
            resource: Identity::from_u64(n),
            caller: Identity::from_u64(n + 1),
            invoker: Identity::from_u64(n),
            mode: AuthorizationMode::Administered,
        }
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let log = InMemoryEventLog::new();
        log.emit(&granted(1), Utc::now());
        log.emit(&granted(2), Utc::now());
        let records = log.records();
        assert_eq!(records[0].sequence, 0);
        assert_eq!(records[1].sequence, 1);
        assert_eq!(log.last(), Some(granted(2)));
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let log = InMemoryEventLog::with_capacity(2);
        for n in 1..=3 {
            log.emit(&granted(n), Utc::now());
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.events(), vec![granted(2), granted(3)]);
        assert_eq!(log.since(2).len(), 1);
    }

    #[test]
    fn test_of_kind_filters() {
        let log = InMemoryEventLog::new();
        log.emit(&granted(1), Utc::now());
        log.emit(
            &AccessEvent::TierRevoked {
                resource: Identity::from_u64(1),
                identity: Identity::from_u64(2),
                invoker: Identity::from_u64(1),
                existed: false,
            },
            Utc::now(),
        );
        assert_eq!(log.of_kind(EventKind::TierRevoked).len(), 1);
        assert_eq!(log.of_kind(EventKind::AccessGranted).len(), 1);
        assert!(log.of_kind(EventKind::AgentUpdated).is_empty());
    }

    #[test]
    fn test_clear_keeps_sequence() {
        let log = InMemoryEventLog::new();
        log.emit(&granted(1), Utc::now());
        log.clear();
        assert!(log.is_empty());
        log.emit(&granted(2), Utc::now());
        assert_eq!(log.records()[0].sequence, 1);
    }

    #[test]
    fn test_record_serializes_with_sequence() {
        let log = InMemoryEventLog::new();
        log.emit(&granted(1), Utc::now());
        let record = log.records().remove(0);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"sequence\":0"));
        let back: EventRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use chrono::Utc;
    use keystone_core::{AuthorizationMode, Identity};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The log never exceeds its capacity and keeps the newest records.
        #[test]
        fn prop_log_respects_capacity(capacity in 1usize..16, emitted in 0u64..64) {
            let log = InMemoryEventLog::with_capacity(capacity);
            for n in 0..emitted {
                log.emit(
                    &AccessEvent::AccessGranted {
                        resource: Identity::from_u64(n + 1),
                        caller: Identity::from_u64(n + 2),
                        invoker: Identity::from_u64(n + 1),
                        mode: AuthorizationMode::SelfSovereign,
                    },
                    Utc::now(),
                );
            }
            prop_assert!(log.len() <= capacity);
            prop_assert_eq!(log.len() as u64, emitted.min(capacity as u64));
            if let Some(last) = log.records().last() {
                prop_assert_eq!(last.sequence, emitted - 1);
            }
        }
    }
}
