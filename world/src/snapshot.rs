//! Published world state: whole-world snapshots and per-viewport updates.

use std::collections::HashMap;

use gridworld_core::{Bounds, EntityId, EntityState, WorldTime};
use serde::{Deserialize, Serialize};

use crate::terrain::{TerrainMap, TerrainMapSlices};

/// Entity states grouped by classification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityStates<S> {
    /// Entities gone since the previous tick, in their last known state.
    pub removed: Vec<S>,
    /// Entities that appeared this tick.
    pub new: Vec<S>,
    /// Entities that reported a difference this tick.
    pub changed: Vec<S>,
    /// Entities that stayed as they were.
    pub unchanged: Vec<S>,
}

impl<S> Default for EntityStates<S> {
    fn default() -> Self {
        Self {
            removed: Vec::new(),
            new: Vec::new(),
            changed: Vec::new(),
            unchanged: Vec::new(),
        }
    }
}

impl<S: EntityState> EntityStates<S> {
    /// States of entities still in the world.
    pub fn live(&self) -> impl Iterator<Item = &S> + '_ {
        self.new.iter().chain(&self.changed).chain(&self.unchanged)
    }

    /// Empties every list, keeping their allocations.
    pub fn clear(&mut self) {
        self.removed.clear();
        self.new.clear();
        self.changed.clear();
        self.unchanged.clear();
    }

    fn retain(&mut self, keep: impl Fn(&S) -> bool) {
        self.removed.retain(&keep);
        self.new.retain(&keep);
        self.changed.retain(&keep);
        self.unchanged.retain(&keep);
    }
}

/// Classified state of the world, or part of it, at one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<S> {
    /// Tick the snapshot was taken at.
    pub time: WorldTime,
    /// Region the snapshot covers.
    pub bounds: Bounds,
    /// Classified entity states.
    pub entities: EntityStates<S>,
    /// Terrain of the region, when included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terrain_map: Option<TerrainMap>,
}

impl<S: EntityState> Snapshot<S> {
    /// Copy of the snapshot restricted to `bounds`.
    #[must_use]
    pub fn cull(&self, bounds: Bounds) -> Self {
        let mut entities = self.entities.clone();
        entities.retain(|state| bounds.contains(state.cell()));
        Self {
            time: self.time,
            bounds,
            entities,
            terrain_map: self.terrain_map.as_ref().and_then(|map| map.clip(bounds)),
        }
    }

    /// Changes a client holding `self` needs to reach `next`.
    #[must_use]
    pub fn diff(&self, next: &Snapshot<S>) -> Update<S> {
        let before: HashMap<EntityId, &S> = self
            .entities
            .live()
            .map(|state| (state.entity_id(), state))
            .collect();
        let after: HashMap<EntityId, &S> = next
            .entities
            .live()
            .map(|state| (state.entity_id(), state))
            .collect();

        let entities = next
            .entities
            .live()
            .filter(|state| match before.get(&state.entity_id()) {
                Some(prior) => state.is_different_from(prior),
                None => true,
            })
            .cloned()
            .collect();
        let mut removed: Vec<EntityId> = self
            .entities
            .live()
            .map(EntityState::entity_id)
            .filter(|id| !after.contains_key(id))
            .collect();
        removed.sort_unstable();

        let terrain_map_slices = match (&self.terrain_map, &next.terrain_map) {
            (Some(prior), Some(current)) => Some(prior.diff(current)),
            (None, Some(current)) => Some(TerrainMapSlices {
                bounds: current.bounds(),
                slices: vec![current.to_slice()],
            }),
            _ => None,
        }
        .filter(|slices| !slices.is_empty());

        Update {
            time: next.time,
            bounds: next.bounds,
            entities,
            removed,
            terrain_map_slices,
        }
    }
}

/// Changes for a single viewport since its previous update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update<S> {
    /// Tick the update describes.
    pub time: WorldTime,
    /// Viewport bounds at that tick.
    pub bounds: Bounds,
    /// New and changed states inside the viewport.
    pub entities: Vec<S>,
    /// Entities that left the viewport or the world.
    pub removed: Vec<EntityId>,
    /// Terrain uncovered since the previous update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terrain_map_slices: Option<TerrainMapSlices>,
}

impl<S> Update<S> {
    /// Reports whether the update carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.removed.is_empty() && self.terrain_map_slices.is_none()
    }
}
