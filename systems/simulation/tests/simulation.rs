use std::{sync::Arc, time::Duration};

use anyhow::{bail, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use gridworld_core::{
    Bounds, Cell, CellCollision, CollisionKind, Direction, Entity, EntityId, EntityState, Motion,
    PathCollision, WorldTime,
};
use gridworld_quad::{CollisionGroup, NarrowPhaseResult, Quadtree};
use gridworld_system_input::{input_channel, InputSender, InputSystem, Mobile, MoveTiming};
use gridworld_system_simulation::{Actor, Simulation, SimulationDef, SimulationError};
use gridworld_world::{query, TerrainMap, Update, ViewportSize};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Clone, Debug, PartialEq)]
struct Walker {
    id: EntityId,
    motion: Motion,
}

impl Walker {
    fn new(id: u64, x: i32, y: i32, facing: Direction) -> Self {
        Self {
            id: EntityId::new(id),
            motion: Motion::new(Cell::new(x, y), facing),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Sighting {
    id: EntityId,
    cell: Cell,
    bounds: Bounds,
    moving: bool,
}

impl EntityState for Sighting {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn cell(&self) -> Cell {
        self.cell
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn is_different_from(&self, other: &Self) -> bool {
        self != other
    }
}

impl Entity for Walker {
    type State = Sighting;

    fn id(&self) -> EntityId {
        self.id
    }

    fn cell(&self) -> Cell {
        self.motion.cell()
    }

    fn bounds(&self) -> Bounds {
        self.motion.bounds()
    }

    fn to_state(&self) -> Self::State {
        Sighting {
            id: self.id,
            cell: self.motion.cell(),
            bounds: self.motion.bounds(),
            moving: self.motion.is_moving(),
        }
    }

    fn undo_last_apply(&mut self) -> bool {
        self.motion.undo_last_apply()
    }
}

impl Mobile for Walker {
    fn motion(&self) -> &Motion {
        &self.motion
    }

    fn motion_mut(&mut self) -> &mut Motion {
        &mut self.motion
    }
}

struct Recorder {
    walker: Walker,
    updates: Sender<Arc<Update<Sighting>>>,
}

impl Actor<Walker> for Recorder {
    fn id(&self) -> EntityId {
        self.walker.id
    }

    fn entity(&self) -> Walker {
        self.walker.clone()
    }

    fn write_state(&self, update: Arc<Update<Sighting>>) {
        let _ = self.updates.send(update);
    }
}

fn recorder(walker: Walker) -> (Recorder, Receiver<Arc<Update<Sighting>>>) {
    let (tx, rx) = unbounded();
    (
        Recorder {
            walker,
            updates: tx,
        },
        rx,
    )
}

fn conflict(a: &Walker, b: &Walker) -> CollisionKind {
    match (a.motion.path(), b.motion.path()) {
        (Some(pa), Some(pb)) => PathCollision::classify(pa, pb).kind(),
        (Some(pa), None) => CellCollision::classify(pa, b.cell()).kind(),
        (None, Some(pb)) => CellCollision::classify(pb, a.cell()).kind(),
        (None, None) => CollisionKind::None,
    }
}

/// Rolls back every mover of a conflicting pair until no conflict is left.
fn revert_conflicts(group: &CollisionGroup<Walker>, _now: WorldTime) -> NarrowPhaseResult<Walker> {
    let mut resolved = group.entities().to_vec();
    let position = |walkers: &[Walker], id: EntityId| walkers.iter().position(|w| w.id == id);

    let mut reverted = true;
    while reverted {
        reverted = false;
        for collision in group.collisions() {
            let (Some(a), Some(b)) = (
                position(&resolved, collision.a()),
                position(&resolved, collision.b()),
            ) else {
                continue;
            };
            if conflict(&resolved[a], &resolved[b]) == CollisionKind::None {
                continue;
            }
            for index in [a, b] {
                if resolved[index].motion.is_moving() && resolved[index].undo_last_apply() {
                    reverted = true;
                }
            }
        }
    }

    NarrowPhaseResult {
        resolved,
        removed: Vec::new(),
    }
}

type Handler = fn(&CollisionGroup<Walker>, WorldTime) -> NarrowPhaseResult<Walker>;

fn world_bounds() -> Bounds {
    Bounds::new(Cell::new(-8, 8), Cell::new(7, -7))
}

fn definition(walkers: &[Walker]) -> Result<(SimulationDef<Walker, InputSystem, Handler>, InputSender)> {
    let mut quadtree = Quadtree::new(world_bounds(), 4)?;
    for walker in walkers {
        quadtree.insert(walker.clone())?;
    }
    let (tx, rx) = input_channel();
    let def = SimulationDef {
        fps: 200,
        start_time: 0,
        quadtree,
        terrain_map: TerrainMap::new(world_bounds(), "G")?,
        input_phase_handler: InputSystem::new(rx, MoveTiming::new(2, 1)),
        narrow_phase_handler: revert_conflicts as Handler,
        viewport_size: ViewportSize::new(5, 5)?,
    };
    Ok((def, tx))
}

#[test]
fn actor_walks_and_sees_itself_arrive() -> Result<()> {
    let (def, input) = definition(&[])?;
    let mut simulation = Simulation::new(def)?;
    let (actor, updates) = recorder(Walker::new(1, 0, 0, Direction::East));
    simulation.connect_actor(Box::new(actor))?;
    input.send_raw(EntityId::new(1), "move=0", "east")?;

    for _ in 0..4 {
        let _ = simulation.tick();
    }

    let received: Vec<Arc<Update<Sighting>>> = updates.try_iter().collect();
    assert_eq!(received.len(), 4);
    let first = &received[0];
    assert_eq!(first.entities.len(), 1);
    assert!(first.terrain_map_slices.is_some());

    let arrived = received
        .iter()
        .flat_map(|update| update.entities.iter())
        .any(|seen| seen.cell == Cell::new(1, 0) && !seen.moving);
    assert!(arrived, "walker never reported its arrival");
    assert_eq!(received[3].bounds, Bounds::around(Cell::new(1, 0), 5, 5));
    Ok(())
}

#[test]
fn head_to_head_walkers_are_both_turned_back() -> Result<()> {
    let (def, input) = definition(&[])?;
    let mut simulation = Simulation::new(def)?;
    let (left, _left_updates) = recorder(Walker::new(1, 0, 0, Direction::East));
    let (right, _right_updates) = recorder(Walker::new(2, 2, 0, Direction::West));
    simulation.connect_actor(Box::new(left))?;
    simulation.connect_actor(Box::new(right))?;
    input.send_raw(EntityId::new(1), "move=0", "east")?;
    input.send_raw(EntityId::new(2), "move=0", "west")?;

    for _ in 0..5 {
        let _ = simulation.tick();
    }

    let tree = query::quadtree(simulation.world());
    assert_eq!(tree.locate(EntityId::new(1)), Some(Cell::new(0, 0)));
    assert_eq!(tree.locate(EntityId::new(2)), Some(Cell::new(2, 0)));
    Ok(())
}

#[test]
fn actor_admission_is_checked() -> Result<()> {
    let (def, _input) = definition(&[])?;
    let mut simulation = Simulation::new(def)?;
    let (actor, _updates) = recorder(Walker::new(1, 0, 0, Direction::East));
    let (twin, _twin_updates) = recorder(Walker::new(1, 3, 3, Direction::East));
    let (outsider, _outsider_updates) = recorder(Walker::new(5, 40, 0, Direction::East));

    simulation.connect_actor(Box::new(actor))?;
    assert!(matches!(
        simulation.connect_actor(Box::new(twin)),
        Err(SimulationError::AlreadyConnected(_))
    ));
    assert!(matches!(
        simulation.connect_actor(Box::new(outsider)),
        Err(SimulationError::Quad(_))
    ));
    assert!(matches!(
        simulation.remove_actor(EntityId::new(9)),
        Err(SimulationError::UnknownActor(_))
    ));
    simulation.remove_actor(EntityId::new(1))?;
    assert_eq!(simulation.actor_count(), 0);
    assert!(query::quadtree(simulation.world()).is_empty());
    Ok(())
}

#[test]
fn reconnected_actor_starts_without_earlier_input() -> Result<()> {
    let (def, input) = definition(&[])?;
    let mut simulation = Simulation::new(def)?;
    let (actor, _updates) = recorder(Walker::new(1, 0, 0, Direction::East));
    simulation.connect_actor(Box::new(actor))?;
    input.send_raw(EntityId::new(1), "move=10", "east")?;
    let _ = simulation.tick();

    simulation.remove_actor(EntityId::new(1))?;
    let (again, _again_updates) = recorder(Walker::new(1, 0, 0, Direction::East));
    simulation.connect_actor(Box::new(again))?;
    for _ in 0..15 {
        let _ = simulation.tick();
    }

    let tree = query::quadtree(simulation.world());
    assert_eq!(tree.locate(EntityId::new(1)), Some(Cell::new(0, 0)));
    assert_eq!(
        tree.get(EntityId::new(1)).map(|walker| walker.motion.is_moving()),
        Some(false)
    );
    Ok(())
}

#[test]
fn running_simulation_serves_requests_between_ticks() -> Result<()> {
    let (def, input) = definition(&[Walker::new(7, -3, -3, Direction::North)])?;
    let running = def.start()?;
    let (actor, updates) = recorder(Walker::new(1, 0, 0, Direction::East));
    running.connect_actor(actor)?;
    input.send_raw(EntityId::new(1), "move=0", "east")?;

    let mut arrived = false;
    while !arrived {
        let Ok(update) = updates.recv_timeout(Duration::from_secs(5)) else {
            bail!("no update within five seconds");
        };
        arrived = update
            .entities
            .iter()
            .any(|seen| seen.id == EntityId::new(1) && seen.cell == Cell::new(1, 0));
    }

    let (twin, _twin_updates) = recorder(Walker::new(1, 2, 2, Direction::East));
    assert!(matches!(
        running.connect_actor(twin),
        Err(SimulationError::AlreadyConnected(_))
    ));

    let halted = running.halt()?;
    assert!(halted.time() > 0);
    assert_eq!(halted.quadtree().len(), 2);
    assert_eq!(halted.terrain_map().bounds(), world_bounds());
    Ok(())
}

#[test]
fn zero_fps_is_rejected() -> Result<()> {
    let (mut def, _input) = definition(&[])?;
    def.fps = 0;
    assert!(matches!(def.start(), Err(SimulationError::InvalidFps)));
    Ok(())
}

fn replay(seed: u64) -> Result<Vec<Vec<(u64, Cell)>>> {
    let walkers = [
        Walker::new(1, -2, -2, Direction::North),
        Walker::new(2, 2, -2, Direction::East),
        Walker::new(3, 2, 2, Direction::South),
        Walker::new(4, -2, 2, Direction::West),
    ];
    let (def, input) = definition(&[])?;
    let mut simulation = Simulation::new(def)?;
    let mut streams = Vec::new();
    for walker in &walkers {
        let (actor, updates) = recorder(walker.clone());
        simulation.connect_actor(Box::new(actor))?;
        streams.push(updates);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut history = Vec::new();
    for tick in 0..120 {
        for walker in &walkers {
            if rng.gen_bool(0.25) {
                let direction = Direction::ALL[rng.gen_range(0..4)];
                let verb = if rng.gen_bool(0.1) { "moveCancel" } else { "move" };
                input.send_raw(walker.id, &format!("{verb}={tick}"), direction.name())?;
            }
        }
        let _ = simulation.tick();

        let mut cells: Vec<(u64, Cell)> = query::quadtree(simulation.world())
            .entities()
            .into_iter()
            .map(|walker| (walker.id.get(), walker.cell()))
            .collect();
        cells.sort();
        history.push(cells);
    }

    for stream in &streams {
        assert_eq!(stream.try_iter().count(), 120);
    }
    Ok(history)
}

#[test]
fn seeded_replays_are_deterministic() -> Result<()> {
    let first = replay(0x9e37_79b9)?;
    let second = replay(0x9e37_79b9)?;
    assert_eq!(first, second, "replay diverged between runs");

    for cells in &first {
        for (_, cell) in cells {
            assert!(world_bounds().contains(*cell));
        }
        let mut occupied: Vec<Cell> = cells.iter().map(|(_, cell)| *cell).collect();
        occupied.sort();
        occupied.dedup();
        assert_eq!(occupied.len(), cells.len(), "walkers share a cell");
    }
    let moved = first.first() != first.last();
    assert!(moved, "nobody moved during the replay");
    Ok(())
}
