// In crates/events/src/sinks.rs

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::EngineEvent;

/// Receives every event the engine publishes. Implementations must not block:
/// the scheduler calls `emit` inline between trader cycles.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Publishes events on a tokio broadcast channel. Slow subscribers lag and
/// lose the oldest events; the engine never waits for them.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<EngineEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<EngineEvent> {
        self.tx.clone()
    }
}

impl AuditSink for BroadcastSink {
    fn emit(&self, event: EngineEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event);
    }
}

/// Writes each event as one JSON line through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AuditSink for LogSink {
    fn emit(&self, event: EngineEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(target: "audit", trader_id = event.trader_id(), event = %json, "Audit event."),
            Err(e) => tracing::error!(target: "audit", error = %e, "Failed to serialize audit event."),
        }
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
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

impl AuditSink for FanoutSink {
    fn emit(&self, event: EngineEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use core_types::TraderState;

    fn make_event(id: &str) -> EngineEvent {
        EngineEvent::TraderStateChanged {
            trader_id: id.to_string(),
            from: TraderState::Running,
            to: TraderState::Paused,
            at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn fanout_reaches_every_broadcast_subscriber() {
        let a = BroadcastSink::new(8);
        let b = BroadcastSink::new(8);
        let mut rx_a = a.subscribe();
        let mut rx_b = b.subscribe();

        let fanout = FanoutSink::default()
            .with(Arc::new(a))
            .with(Arc::new(b))
            .with(Arc::new(LogSink));
        assert_eq!(fanout.len(), 3);
        fanout.emit(make_event("t1"));

        assert_eq!(rx_a.recv().await.expect("a").trader_id(), "t1");
        assert_eq!(rx_b.recv().await.expect("b").trader_id(), "t1");
    }

    #[test]
    fn broadcast_without_subscribers_does_not_fail() {
        BroadcastSink::new(1).emit(make_event("nobody"));
    }
}
