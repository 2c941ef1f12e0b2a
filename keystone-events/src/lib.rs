//! Keystone Events - Event Sink Trait and Implementations
//!
//! Every successful mutation in the access-control core emits one
//! [`AccessEvent`]. This crate defines where those events go:
//!
//! - `EventSink`: the delivery contract components are injected with
//! - `InMemoryEventLog`: bounded, sequenced log for tests and local indexers
//! - `TracingEventSink`: writes events as structured `tracing` records
//! - `FanoutSink`: delivers to several sinks in order

mod in_memory;
mod sink;

pub use in_memory::{EventRecord, InMemoryEventLog};
pub use sink::{EventSink, FanoutSink, TracingEventSink};

// Re-export core types for convenience
pub use keystone_core::{AccessEvent, AuthorizationMode, EventKind};
