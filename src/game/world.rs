//! Entity views supplied by the world layer once per tick

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{EntityId, PlayerId};

/// Replicated state of a player-controlled vehicle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub player_id: PlayerId,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    /// World time of the last replicated update
    pub last_update: f64,
}

/// Replicated state of any other networked entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: EntityId,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub active: bool,
    pub last_update: f64,
}

/// Key that identifies an entity across ticks regardless of its kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityKey {
    Player(PlayerId),
    Entity(EntityId),
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKey::Player(id) => write!(f, "player#{}", id),
            EntityKey::Entity(id) => id.fmt(f),
        }
    }
}

/// One networked entity as seen by the snapshot and sweep pipelines
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityView {
    Player(PlayerState),
    Entity(EntityState),
}

impl EntityView {
    pub fn key(&self) -> EntityKey {
        match self {
            EntityView::Player(p) => EntityKey::Player(p.player_id),
            EntityView::Entity(e) => EntityKey::Entity(e.entity_id),
        }
    }

    pub fn position(&self) -> Vec3 {
        match self {
            EntityView::Player(p) => p.position,
            EntityView::Entity(e) => e.position,
        }
    }

    pub fn rotation(&self) -> Quat {
        match self {
            EntityView::Player(p) => p.rotation,
            EntityView::Entity(e) => e.rotation,
        }
    }

    pub fn velocity(&self) -> Vec3 {
        match self {
            EntityView::Player(p) => p.velocity,
            EntityView::Entity(e) => e.velocity,
        }
    }

    pub fn last_update(&self) -> f64 {
        match self {
            EntityView::Player(p) => p.last_update,
            EntityView::Entity(e) => e.last_update,
        }
    }
}

/// Per-tick enumeration of networked entities
pub trait WorldSource: Send + Sync {
    fn entities(&self) -> Vec<EntityView>;
}

/// A fixed entity list, handy for replays and tests
impl WorldSource for Vec<EntityView> {
    fn entities(&self) -> Vec<EntityView> {
        self.clone()
    }
}
