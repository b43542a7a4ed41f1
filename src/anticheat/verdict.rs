//! Validation verdicts produced by the input gate

use serde::{Deserialize, Serialize};

use crate::game::PlayerId;

/// Why an input was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    None,
    TooFrequentInput,
    RateLimitExceeded,
    InvalidInputValues,
    PhysicallyImpossible,
    SuspiciousBehavior,
    PlayerNotFound,
}

/// Per-input result of the validation gate; not persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub reason: ReasonCode,
    pub detail: String,
}

impl ValidationVerdict {
    pub fn pass() -> Self {
        Self {
            is_valid: true,
            reason: ReasonCode::None,
            detail: String::new(),
        }
    }

    pub fn reject(reason: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason,
            detail: detail.into(),
        }
    }
}

/// Verdict as published on the telemetry stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub player_id: PlayerId,
    pub timestamp: f64,
    pub is_valid: bool,
    pub reason: ReasonCode,
    pub detail: String,
    /// Running suspicion count after this verdict
    pub suspicion_count: u32,
}
