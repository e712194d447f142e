//! Typed governor event notifications.
//!
//! Observability consumers subscribe to a broadcast channel of explicit
//! event variants; none of these notifications are required for control
//! correctness.

use tokio::sync::broadcast;

use slogrid_types::{ActionKind, RuleId, SloName};

/// Events emitted by the governor and its components.
#[derive(Debug, Clone, PartialEq)]
pub enum GovernorEvent {
    RuleAdded { rule_id: RuleId },
    RuleRemoved { rule_id: RuleId },
    RuleTriggered { rule_id: RuleId, kind: ActionKind },
    TriggerFailed { rule_id: RuleId, error: String },
    RuleReverted { rule_id: RuleId },
    RevertFailed { rule_id: RuleId, error: String },
    ThresholdCreated { objective: SloName },
    MonitoringStarted,
    MonitoringStopped,
    EvaluationError { message: String },
}

/// Broadcast fan-out for [`GovernorEvent`].
///
/// Sending never fails: with no subscribers the event is dropped, which
/// is acceptable for an observability-only channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GovernorEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GovernorEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: GovernorEvent) {
        let _ = self.tx.send(event);
    }
}
