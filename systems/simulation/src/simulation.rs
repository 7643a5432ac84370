//! Synchronous simulation: world, handlers and connected actors.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use gridworld_core::{Entity, EntityId, WorldTime};
use gridworld_quad::{InputPhaseHandler, NarrowPhaseHandler, QuadError, Quadtree};
use gridworld_world::{query, StepReport, TerrainMap, Viewport, ViewportSize, World, WorldError};
use thiserror::Error;

use crate::actor::Actor;

/// Failures raised by the simulation and its handles.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The frame rate must be positive.
    #[error("frame rate must be positive")]
    InvalidFps,
    /// The world could not be assembled.
    #[error(transparent)]
    World(#[from] WorldError),
    /// The actor's entity could not be placed.
    #[error(transparent)]
    Quad(#[from] QuadError),
    /// An actor with this id is already connected.
    #[error("actor {0} is already connected")]
    AlreadyConnected(EntityId),
    /// No actor with this id is connected.
    #[error("actor {0} is not connected")]
    UnknownActor(EntityId),
    /// The simulation loop is no longer running.
    #[error("simulation loop stopped")]
    Stopped,
    /// The simulation thread could not be started.
    #[error("failed to spawn the simulation thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Everything needed to start a simulation.
#[derive(Debug)]
pub struct SimulationDef<E, I, N> {
    /// Ticks per second of the running loop.
    pub fps: u32,
    /// Tick the world starts at.
    pub start_time: WorldTime,
    /// Initial entities.
    pub quadtree: Quadtree<E>,
    /// Initial terrain.
    pub terrain_map: TerrainMap,
    /// Handler of the input phase.
    pub input_phase_handler: I,
    /// Handler of the narrow phase.
    pub narrow_phase_handler: N,
    /// Size of every actor's viewport.
    pub viewport_size: ViewportSize,
}

impl<E: Entity, I, N> SimulationDef<E, I, N> {
    /// Wall-clock time between ticks.
    pub fn period(&self) -> Result<Duration, SimulationError> {
        if self.fps == 0 {
            return Err(SimulationError::InvalidFps);
        }
        Ok(Duration::from_secs(1) / self.fps)
    }
}

/// World left behind by a halted simulation.
#[derive(Debug)]
pub struct HaltedSimulation<E> {
    time: WorldTime,
    quadtree: Quadtree<E>,
    terrain_map: TerrainMap,
}

impl<E: Entity> HaltedSimulation<E> {
    /// Tick the simulation stopped at.
    #[must_use]
    pub const fn time(&self) -> WorldTime {
        self.time
    }

    /// Entities at the time of the halt.
    #[must_use]
    pub const fn quadtree(&self) -> &Quadtree<E> {
        &self.quadtree
    }

    /// Terrain at the time of the halt.
    #[must_use]
    pub const fn terrain_map(&self) -> &TerrainMap {
        &self.terrain_map
    }

    /// Definition resuming from the halted state with new handlers.
    pub fn resume<I, N>(
        self,
        fps: u32,
        input_phase_handler: I,
        narrow_phase_handler: N,
        viewport_size: ViewportSize,
    ) -> SimulationDef<E, I, N> {
        SimulationDef {
            fps,
            start_time: self.time,
            quadtree: self.quadtree,
            terrain_map: self.terrain_map,
            input_phase_handler,
            narrow_phase_handler,
            viewport_size,
        }
    }
}

struct Connection<E: Entity> {
    actor: Box<dyn Actor<E>>,
    viewport: Viewport,
}

/// World plus the actors following it, advanced one tick at a time.
pub struct Simulation<E: Entity, I, N> {
    world: World<E>,
    input: I,
    narrow: N,
    viewport_size: ViewportSize,
    actors: BTreeMap<EntityId, Connection<E>>,
}

impl<E, I, N> Simulation<E, I, N>
where
    E: Entity,
    I: InputPhaseHandler<E>,
    N: NarrowPhaseHandler<E>,
{
    /// Builds the world described by `def`.
    pub fn new(def: SimulationDef<E, I, N>) -> Result<Self, SimulationError> {
        let world = World::new(def.start_time, def.quadtree, def.terrain_map)?;
        Ok(Self {
            world,
            input: def.input_phase_handler,
            narrow: def.narrow_phase_handler,
            viewport_size: def.viewport_size,
            actors: BTreeMap::new(),
        })
    }

    /// The world being simulated.
    #[must_use]
    pub fn world(&self) -> &World<E> {
        &self.world
    }

    /// Number of connected actors.
    #[must_use]
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Places the actor's entity in the world and opens its viewport.
    pub fn connect_actor(&mut self, actor: Box<dyn Actor<E>>) -> Result<(), SimulationError> {
        let id = actor.id();
        if self.actors.contains_key(&id) {
            return Err(SimulationError::AlreadyConnected(id));
        }
        let entity = actor.entity();
        let viewport = Viewport::new(self.viewport_size, entity.cell());
        self.world.insert_entity(entity)?;
        let _ = self.actors.insert(id, Connection { actor, viewport });
        log::info!("actor {id} connected");
        Ok(())
    }

    /// Disconnects the actor, deletes its entity and drops its buffered input.
    pub fn remove_actor(&mut self, id: EntityId) -> Result<(), SimulationError> {
        if self.actors.remove(&id).is_none() {
            return Err(SimulationError::UnknownActor(id));
        }
        let _ = self.world.remove_entity(id);
        self.input.forget(id);
        log::info!("actor {id} removed");
        Ok(())
    }

    /// Runs one tick and sends every actor its viewport update.
    pub fn tick(&mut self) -> StepReport<E> {
        let report = self.world.step(&mut self.input, &mut self.narrow);
        for entity in &report.out_of_bounds {
            log::debug!("entity {} left the world at {}", entity.id(), entity.cell());
        }

        let world = &self.world;
        for (id, connection) in &mut self.actors {
            if let Some(cell) = query::quadtree(world).locate(*id) {
                connection.viewport.follow(cell);
            }
            let update = connection.viewport.update(
                query::quad_state(world),
                query::terrain(world),
                report.time,
            );
            connection.actor.write_state(Arc::new(update));
        }
        report
    }

    /// Stops the simulation, keeping the world.
    #[must_use]
    pub fn halt(self) -> HaltedSimulation<E> {
        let (time, quadtree, terrain_map) = self.world.into_parts();
        HaltedSimulation {
            time,
            quadtree,
            terrain_map,
        }
    }
}
