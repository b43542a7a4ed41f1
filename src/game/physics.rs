//! Vehicle physical constraints supplied by the gameplay layer

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::world::{EntityView, PlayerState, WorldSource};
use super::PlayerId;

/// Physical state consulted by the plausibility stage of the input gate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalState {
    /// Vehicle is bogged down and cannot move under its own power
    pub is_stuck: bool,
    /// Maximum speed the vehicle can reach (units/s)
    pub max_speed: f32,
}

impl Default for PhysicalState {
    fn default() -> Self {
        Self {
            is_stuck: false,
            max_speed: 10.0,
        }
    }
}

/// Lookup of a player's current physical state
pub trait PhysicalStateProvider: Send + Sync {
    fn physical_state(&self, player_id: PlayerId) -> Option<PhysicalState>;
}

#[derive(Debug, Clone, Copy)]
struct VehicleRecord {
    state: PlayerState,
    physical: PhysicalState,
}

/// Registry of live vehicles, written by gameplay code each tick
#[derive(Debug, Default)]
pub struct VehicleRoster {
    vehicles: DashMap<PlayerId, VehicleRecord>,
}

impl VehicleRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a vehicle's replicated state, keeping its physical state
    pub fn upsert(&self, state: PlayerState) {
        self.vehicles
            .entry(state.player_id)
            .and_modify(|record| record.state = state)
            .or_insert(VehicleRecord {
                state,
                physical: PhysicalState::default(),
            });
    }

    /// Set the physical constraints of a known vehicle; returns false when unknown
    pub fn set_physical(&self, player_id: PlayerId, physical: PhysicalState) -> bool {
        match self.vehicles.get_mut(&player_id) {
            Some(mut record) => {
                record.physical = physical;
                true
            }
            None => false,
        }
    }

    pub fn set_stuck(&self, player_id: PlayerId, is_stuck: bool) -> bool {
        match self.vehicles.get_mut(&player_id) {
            Some(mut record) => {
                record.physical.is_stuck = is_stuck;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, player_id: &PlayerId) -> Option<PlayerState> {
        self.vehicles.remove(player_id).map(|(_, r)| r.state)
    }

    pub fn get(&self, player_id: &PlayerId) -> Option<PlayerState> {
        self.vehicles.get(player_id).map(|r| r.state)
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

impl PhysicalStateProvider for VehicleRoster {
    fn physical_state(&self, player_id: PlayerId) -> Option<PhysicalState> {
        self.vehicles.get(&player_id).map(|r| r.physical)
    }
}

impl WorldSource for VehicleRoster {
    fn entities(&self) -> Vec<EntityView> {
        self.vehicles
            .iter()
            .map(|r| EntityView::Player(r.value().state))
            .collect()
    }
}
