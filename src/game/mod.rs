//! Authoritative simulation state: world views, snapshot history, lag compensation

pub mod combat;
pub mod lag;
pub mod physics;
pub mod session;
pub mod snapshot;
pub mod world;

pub use combat::ActionResult;
pub use lag::{LagCompensator, PlayerLagProfile};
pub use physics::{PhysicalState, PhysicalStateProvider, VehicleRoster};
pub use session::{SyncSession, TickReport};
pub use snapshot::{SnapshotError, SnapshotHistory, WorldSnapshot};
pub use world::{EntityKey, EntityState, EntityView, PlayerState, WorldSource};

use glam::Vec2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connected player identifier
pub type PlayerId = Uuid;

/// Identifier of a non-player networked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Player input received from the transport layer, already deserialized
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlayerInput {
    pub player_id: PlayerId,
    /// Client-stamped command time (seconds, world clock)
    pub timestamp: f64,
    pub controls: TickInput,
}

/// Control state for a single command
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TickInput {
    /// Requested movement direction; magnitude is throttle strength
    pub movement: Vec2,
    /// Steering input (-1.0 = full left, 1.0 = full right)
    pub steering: f32,
    pub accelerate: bool,
    pub brake: bool,
    pub handbrake: bool,
}

impl TickInput {
    pub fn new(movement: Vec2, steering: f32) -> Self {
        Self {
            movement,
            steering,
            ..Self::default()
        }
    }
}
