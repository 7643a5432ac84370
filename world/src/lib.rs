#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative grid world: entities, terrain, and the state they publish.

pub mod snapshot;
pub mod terrain;
pub mod viewport;

use gridworld_core::{Bounds, Clock, Entity, EntityId, EntityState, WorldTime};
use gridworld_quad::{
    InputPhaseHandler, NarrowPhaseHandler, PhaseRunner, QuadError, QuadState, Quadtree, StateType,
};
use thiserror::Error;

pub use snapshot::{EntityStates, Snapshot, Update};
pub use terrain::{
    TerrainError, TerrainMap, TerrainMapSlice, TerrainMapSlices, TerrainType, TypeChange,
};
pub use viewport::{Sector, Viewport, ViewportError, ViewportSize};

/// Failures raised while assembling a world.
#[derive(Debug, Error)]
pub enum WorldError {
    /// The quadtree or state index rejected its parameters.
    #[error(transparent)]
    Quad(#[from] QuadError),
    /// The terrain does not cover the quadtree.
    #[error("terrain {terrain} does not cover the world {world}")]
    TerrainTooSmall {
        /// Bounds of the terrain map.
        terrain: Bounds,
        /// Bounds of the quadtree.
        world: Bounds,
    },
}

/// Entities removed during a tick, by cause.
#[derive(Clone, Debug)]
pub struct StepReport<E> {
    /// Tick the report describes.
    pub time: WorldTime,
    /// Entities that moved outside the world.
    pub out_of_bounds: Vec<E>,
    /// Entities the narrow phase deleted.
    pub removed: Vec<E>,
}

/// Represents the authoritative world: clock, entities, terrain and the
/// classified states published for the current tick.
#[derive(Debug)]
pub struct World<E: Entity> {
    clock: Clock,
    quadtree: Quadtree<E>,
    terrain: TerrainMap,
    states: QuadState<E::State>,
    prior: Vec<(EntityId, E::State)>,
    next: Vec<(EntityId, E::State)>,
    runner: PhaseRunner<E>,
}

impl<E: Entity> World<E> {
    /// Creates a world at tick `now` from its entities and terrain.
    ///
    /// Entities already in the tree are published as new on the first tick.
    pub fn new(now: WorldTime, quadtree: Quadtree<E>, terrain: TerrainMap) -> Result<Self, WorldError> {
        if !terrain.bounds().contains_bounds(&quadtree.bounds()) {
            return Err(WorldError::TerrainTooSmall {
                terrain: terrain.bounds(),
                world: quadtree.bounds(),
            });
        }
        let states = QuadState::new(quadtree.bounds(), quadtree.max_size())?;
        Ok(Self {
            clock: Clock::new(now),
            quadtree,
            terrain,
            states,
            prior: Vec::new(),
            next: Vec::new(),
            runner: PhaseRunner::new(),
        })
    }

    /// Adds an entity; it is published as new on the next tick.
    pub fn insert_entity(&mut self, entity: E) -> Result<(), QuadError> {
        self.quadtree.insert(entity)
    }

    /// Removes an entity; it is published as removed on the next tick.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<E> {
        self.quadtree.remove(id)
    }

    /// Mutable access to the terrain.
    pub fn terrain_mut(&mut self) -> &mut TerrainMap {
        &mut self.terrain
    }

    /// Advances the clock one tick and runs every phase.
    pub fn step<I, N>(&mut self, input: &mut I, narrow: &mut N) -> StepReport<E>
    where
        I: InputPhaseHandler<E>,
        N: NarrowPhaseHandler<E>,
    {
        self.clock = self.clock.tick();
        let now = self.clock.now();
        let outcome = self.runner.run(&mut self.quadtree, now, input, narrow);
        self.classify();
        log::trace!(
            "tick {now}: {} entities, {} collision groups",
            self.quadtree.len(),
            outcome.groups
        );
        StepReport {
            time: now,
            out_of_bounds: outcome.out_of_bounds,
            removed: outcome.removed,
        }
    }

    /// Rebuilds the classified state index against the previous tick.
    ///
    /// Prior states are kept sorted by id, so removals are published in id
    /// order.
    pub fn classify(&mut self) {
        self.states.clear();
        self.next.clear();

        let (states, prior, next) = (&mut self.states, &self.prior, &mut self.next);
        self.quadtree.visit_bounds(self.quadtree.bounds(), |entity| {
            let state = entity.to_state();
            let state_type = match state_of(prior, entity.id()) {
                None => StateType::New,
                Some(prior) if state.is_different_from(prior) => StateType::Changed,
                Some(_) => StateType::Unchanged,
            };
            if let Err(err) = states.insert(state.clone(), state_type) {
                log::warn!("unpublishable state: {err}");
            }
            next.push((entity.id(), state));
        });
        self.next.sort_unstable_by_key(|(id, _)| *id);

        for (id, state) in &self.prior {
            if state_of(&self.next, *id).is_some() {
                continue;
            }
            if let Err(err) = self.states.insert(state.clone(), StateType::Removed) {
                log::warn!("unpublishable removal: {err}");
            }
        }

        std::mem::swap(&mut self.prior, &mut self.next);
    }

    /// Splits the world into its time, entities and terrain.
    #[must_use]
    pub fn into_parts(self) -> (WorldTime, Quadtree<E>, TerrainMap) {
        (self.clock.now(), self.quadtree, self.terrain)
    }
}

fn state_of<S>(states: &[(EntityId, S)], id: EntityId) -> Option<&S> {
    states
        .binary_search_by_key(&id, |(key, _)| *key)
        .ok()
        .map(|index| &states[index].1)
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use gridworld_core::{Bounds, Entity, EntityState, WorldTime};
    use gridworld_quad::{QuadState, Quadtree, StateType, StateTypeFlags};

    use super::{EntityStates, Snapshot, TerrainMap, World};

    /// Current tick.
    #[must_use]
    pub fn time<E: Entity>(world: &World<E>) -> WorldTime {
        world.clock.now()
    }

    /// Region the world covers.
    #[must_use]
    pub fn bounds<E: Entity>(world: &World<E>) -> Bounds {
        world.quadtree.bounds()
    }

    /// Provides read-only access to the entity index.
    #[must_use]
    pub fn quadtree<E: Entity>(world: &World<E>) -> &Quadtree<E> {
        &world.quadtree
    }

    /// Provides read-only access to the terrain.
    #[must_use]
    pub fn terrain<E: Entity>(world: &World<E>) -> &TerrainMap {
        &world.terrain
    }

    /// Classified states of the last tick.
    #[must_use]
    pub fn quad_state<E: Entity>(world: &World<E>) -> &QuadState<E::State> {
        &world.states
    }

    /// Snapshot of the whole world as of the last tick.
    #[must_use]
    pub fn snapshot<E: Entity>(world: &World<E>) -> Snapshot<E::State> {
        let mut entities = EntityStates::default();
        world
            .states
            .accumulate_all(StateTypeFlags::ALL, &mut |state_type, state: &E::State| {
                let list = match state_type {
                    StateType::Removed => &mut entities.removed,
                    StateType::New => &mut entities.new,
                    StateType::Changed => &mut entities.changed,
                    StateType::Unchanged => &mut entities.unchanged,
                };
                list.push(state.clone());
            });
        for list in [
            &mut entities.removed,
            &mut entities.new,
            &mut entities.changed,
            &mut entities.unchanged,
        ] {
            list.sort_by_key(EntityState::entity_id);
        }
        Snapshot {
            time: world.clock.now(),
            bounds: world.quadtree.bounds(),
            entities,
            terrain_map: Some(world.terrain.clone()),
        }
    }
}
