//! Event sink trait and forwarding sinks.

use keystone_core::{AccessEvent, Timestamp};
use std::sync::Arc;

/// Destination for access-control events.
///
/// Emission happens after the operation's writes have landed, so a sink
/// cannot veto or roll back a state change.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &AccessEvent, at: Timestamp);
}

/// Logs every event through `tracing` under the `keystone::events` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &AccessEvent, at: Timestamp) {
        match event.to_json() {
            Ok(payload) => tracing::info!(
                target: "keystone::events",
                kind = ?event.kind(),
                at = %at,
                %payload,
                "access event"
            ),
            Err(e) => tracing::error!(
                target: "keystone::events",
                kind = ?event.kind(),
                error = %e,
                "failed to serialize access event"
            ),
        }
    }
}

/// Delivers each event to every inner sink, in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &AccessEvent, at: Timestamp) {
        for sink in &self.sinks {
            sink.emit(event, at);
        }
    }
}
