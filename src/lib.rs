//! Vehicle Sync Server - authoritative synchronization core
//!
//! - Bounded snapshot history of the replicated world
//! - Lag compensation of movement and hit claims against that history
//! - Staged per-player input validation with behavioral pattern checks
//! - A coarse per-tick plausibility sweep over all replicated entities
//!
//! Verdicts and flags are published on a telemetry bus and optionally
//! forwarded to an external sanction engine.

pub mod anticheat;
pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod sanction;
pub mod telemetry;
pub mod util;
