//! Input validation gate and the coarse per-tick sweep

pub mod gate;
pub mod patterns;
pub mod sweep;
pub mod verdict;

pub use gate::{InputValidationGate, PlayerValidationState, RateWindow};
pub use patterns::{InputHistoryRing, PatternFinding};
pub use sweep::{AntiCheatSweep, SweepFlag, Violation};
pub use verdict::{ReasonCode, ValidationVerdict, VerdictRecord};
