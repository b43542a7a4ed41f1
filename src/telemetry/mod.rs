//! Verdict and telemetry stream consumed by the external sanction engine
//!
//! Every validation verdict, sweep flag and compensation outcome is published
//! on a broadcast channel. Publishing never blocks and is a no-op when nobody
//! is subscribed; slow subscribers lose the oldest events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::anticheat::sweep::SweepFlag;
use crate::anticheat::verdict::VerdictRecord;
use crate::game::lag::CompensationRecord;

/// Default channel depth
pub const DEFAULT_CAPACITY: usize = 1024;

/// One telemetry event stamped with wall-clock time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub recorded_at: DateTime<Utc>,
    pub kind: TelemetryKind,
}

/// Event payload variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryKind {
    /// Input gate verdict (pass or reject)
    Verdict(VerdictRecord),
    /// Coarse sweep found implausible replicated state
    SweepFlag(SweepFlag),
    /// Lag compensation outcome
    Compensation(CompensationRecord),
}

impl TelemetryKind {
    /// Whether the sanction engine should see this event
    pub fn is_violation(&self) -> bool {
        match self {
            TelemetryKind::Verdict(v) => !v.is_valid,
            TelemetryKind::SweepFlag(_) => true,
            TelemetryKind::Compensation(_) => false,
        }
    }
}

/// Broadcast bus for telemetry events
#[derive(Clone)]
pub struct TelemetryBus {
    sender: broadcast::Sender<TelemetryEvent>,
}

impl TelemetryBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; dropped silently when there are no subscribers
    pub fn publish(&self, kind: TelemetryKind) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        let _ = self.sender.send(TelemetryEvent {
            recorded_at: Utc::now(),
            kind,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
