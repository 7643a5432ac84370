//! Per-actor window onto the world and the updates streamed through it.
//!
//! A [`Viewport`] indexes the entities it has shown by sector: the centre,
//! the four edges and the four corners of its bounds. Moving the window one
//! cell only touches the sectors along the trailing and leading edges, and
//! the newly exposed strip is filled from the [`QuadState`] on the next
//! update.

use std::collections::{HashMap, HashSet};

use gridworld_core::{Bounds, Cell, Direction, EntityId, EntityState, WorldTime};
use gridworld_quad::{QuadState, StateType, StateTypeFlags};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    snapshot::Update,
    terrain::{TerrainMap, TerrainMapSlices},
};

/// Failures raised when sizing a viewport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ViewportError {
    /// Both dimensions must be at least three cells.
    #[error("viewport {width}x{height} is smaller than 3x3")]
    TooSmall {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
}

/// Dimensions of a viewport in cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewportSize {
    width: u32,
    height: u32,
}

impl ViewportSize {
    /// Validates the dimensions.
    pub const fn new(width: u32, height: u32) -> Result<Self, ViewportError> {
        if width < 3 || height < 3 {
            return Err(ViewportError::TooSmall { width, height });
        }
        Ok(Self { width, height })
    }

    /// Width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Bounds of a viewport of this size centred on `cell`.
    #[must_use]
    pub fn around(&self, cell: Cell) -> Bounds {
        Bounds::around(cell, self.width, self.height)
    }
}

/// Region of a viewport an entity falls in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sector {
    /// Interior.
    C,
    /// North edge.
    N,
    /// North-east corner.
    NE,
    /// East edge.
    E,
    /// South-east corner.
    SE,
    /// South edge.
    S,
    /// South-west corner.
    SW,
    /// West edge.
    W,
    /// North-west corner.
    NW,
}

impl Sector {
    const fn index(self) -> usize {
        self as usize
    }

    /// Sector of `bounds` containing `cell`.
    #[must_use]
    pub fn of(bounds: Bounds, cell: Cell) -> Option<Self> {
        if !bounds.contains(cell) {
            return None;
        }
        let north = cell.y() == bounds.top_l().y();
        let south = cell.y() == bounds.bot_r().y();
        let west = cell.x() == bounds.top_l().x();
        let east = cell.x() == bounds.bot_r().x();
        Some(match (north, south, west, east) {
            (true, _, true, _) => Sector::NW,
            (true, _, _, true) => Sector::NE,
            (true, _, _, _) => Sector::N,
            (_, true, true, _) => Sector::SW,
            (_, true, _, true) => Sector::SE,
            (_, true, _, _) => Sector::S,
            (_, _, true, _) => Sector::W,
            (_, _, _, true) => Sector::E,
            _ => Sector::C,
        })
    }
}

struct ShiftPlan {
    dropped: [Sector; 3],
    complex: [(Sector, Sector); 3],
    simple: [(Sector, Sector); 3],
}

const fn shift_plan(direction: Direction) -> ShiftPlan {
    use Sector::{C, E, N, NE, NW, S, SE, SW, W};
    match direction {
        Direction::North => ShiftPlan {
            dropped: [SW, S, SE],
            complex: [(W, SW), (C, S), (E, SE)],
            simple: [(NW, W), (N, C), (NE, E)],
        },
        Direction::East => ShiftPlan {
            dropped: [NW, W, SW],
            complex: [(N, NW), (C, W), (S, SW)],
            simple: [(NE, N), (E, C), (SE, S)],
        },
        Direction::South => ShiftPlan {
            dropped: [NW, N, NE],
            complex: [(W, NW), (C, N), (E, NE)],
            simple: [(SW, W), (S, C), (SE, E)],
        },
        Direction::West => ShiftPlan {
            dropped: [NE, E, SE],
            complex: [(N, NE), (C, E), (S, SE)],
            simple: [(NW, N), (W, C), (SW, S)],
        },
    }
}

type Entry = (EntityId, Cell);

/// Window of fixed size following an actor through the world.
#[derive(Clone, Debug)]
pub struct Viewport {
    size: ViewportSize,
    bounds: Bounds,
    sectors: [Vec<Entry>; 9],
    locations: HashMap<EntityId, Sector>,
    out_of_bounds: Vec<EntityId>,
    exposed: Vec<Bounds>,
    sent: HashSet<EntityId>,
    terrain_view: Option<TerrainMap>,
    has_changed: bool,
    is_new: bool,
}

impl Viewport {
    /// Creates a viewport of `size` centred on `center`.
    #[must_use]
    pub fn new(size: ViewportSize, center: Cell) -> Self {
        Self {
            size,
            bounds: size.around(center),
            sectors: Default::default(),
            locations: HashMap::new(),
            out_of_bounds: Vec::new(),
            exposed: Vec::new(),
            sent: HashSet::new(),
            terrain_view: None,
            has_changed: false,
            is_new: true,
        }
    }

    /// Current bounds.
    #[must_use]
    pub const fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Size the viewport was created with.
    #[must_use]
    pub const fn size(&self) -> ViewportSize {
        self.size
    }

    /// Reports whether the next update is the first one.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.is_new
    }

    /// Reports whether the bounds moved since the last update.
    #[must_use]
    pub const fn has_changed(&self) -> bool {
        self.has_changed
    }

    /// Entities evicted since the last update.
    #[must_use]
    pub fn out_of_bounds(&self) -> &[EntityId] {
        &self.out_of_bounds
    }

    /// Sector the viewport has `id` filed under.
    #[must_use]
    pub fn sector_of(&self, id: EntityId) -> Option<Sector> {
        self.locations.get(&id).copied()
    }

    /// Entities filed under `sector`.
    #[must_use]
    pub fn sector(&self, sector: Sector) -> &[(EntityId, Cell)] {
        &self.sectors[sector.index()]
    }

    /// Number of entities the viewport currently shows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Reports whether the viewport shows no entity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Re-centres the viewport on `center`.
    ///
    /// A move of one cell along each axis is applied as one shift per axis.
    /// Larger jumps evict everything and rebuild the window from scratch.
    pub fn follow(&mut self, center: Cell) {
        let target = self.size.around(center);
        let dx = target.top_l().x() - self.bounds.top_l().x();
        let dy = target.top_l().y() - self.bounds.top_l().y();
        if dx == 0 && dy == 0 {
            return;
        }
        if dx.abs() > 1 || dy.abs() > 1 {
            log::debug!("viewport {} jumped to {target}; resetting", self.bounds);
            self.reset(target);
            return;
        }
        match dy {
            1 => self.shift(Direction::North),
            -1 => self.shift(Direction::South),
            _ => {}
        }
        match dx {
            1 => self.shift(Direction::East),
            -1 => self.shift(Direction::West),
            _ => {}
        }
    }

    /// Moves the bounds one cell toward `direction`.
    ///
    /// The trailing sectors are evicted, entries on the new trailing edge
    /// change sector and the leading strip is left for the next update.
    pub fn shift(&mut self, direction: Direction) {
        let plan = shift_plan(direction);
        self.bounds = self.bounds.shifted(direction);
        self.has_changed = true;

        for sector in plan.dropped {
            for (id, _) in self.sectors[sector.index()].drain(..) {
                let _ = self.locations.remove(&id);
                self.out_of_bounds.push(id);
            }
        }

        for (from, to) in plan.complex {
            let entries = std::mem::take(&mut self.sectors[from.index()]);
            for entry in entries {
                if Sector::of(self.bounds, entry.1) == Some(to) {
                    self.file(entry, to);
                } else {
                    self.sectors[from.index()].push(entry);
                }
            }
        }

        for (from, to) in plan.simple {
            let entries = std::mem::take(&mut self.sectors[from.index()]);
            for entry in entries {
                self.file(entry, to);
            }
        }

        self.exposed.push(leading_edge(self.bounds, direction));
    }

    fn reset(&mut self, bounds: Bounds) {
        for sector in &mut self.sectors {
            self.out_of_bounds.extend(sector.drain(..).map(|(id, _)| id));
        }
        self.locations.clear();
        self.bounds = bounds;
        self.exposed.clear();
        self.exposed.push(bounds);
        self.has_changed = true;
    }

    fn file(&mut self, entry: Entry, sector: Sector) {
        let _ = self.locations.insert(entry.0, sector);
        self.sectors[sector.index()].push(entry);
    }

    fn unfile(&mut self, id: EntityId) -> bool {
        let Some(sector) = self.locations.remove(&id) else {
            return false;
        };
        self.sectors[sector.index()].retain(|(entry, _)| *entry != id);
        true
    }

    fn place(&mut self, id: EntityId, cell: Cell) {
        let _ = self.unfile(id);
        if let Some(sector) = Sector::of(self.bounds, cell) {
            self.file((id, cell), sector);
        }
    }

    /// Produces the update for the tick at `now`.
    ///
    /// The first update carries every visible state and the whole terrain
    /// view. Later ones carry states that are new or changed, states
    /// exposed by shifts, departures and the terrain uncovered by shifts.
    pub fn update<S>(&mut self, states: &QuadState<S>, terrain: &TerrainMap, now: WorldTime) -> Update<S>
    where
        S: EntityState,
    {
        let view = terrain.clip(self.bounds);
        if self.is_new {
            return self.full_update(states, view, now);
        }

        let mut entities: Vec<S> = Vec::new();
        let mut removed = std::mem::take(&mut self.out_of_bounds);
        self.sent.clear();

        let mut exposed = std::mem::take(&mut self.exposed);
        let visible = StateTypeFlags::NEW | StateTypeFlags::CHANGED | StateTypeFlags::UNCHANGED;
        for strip in &exposed {
            states.query_bounds(*strip, visible, &mut |_, state: &S| {
                let id = state.entity_id();
                if self.sent.insert(id) {
                    self.place(id, state.cell());
                    entities.push(state.clone());
                }
            });
        }
        exposed.clear();
        self.exposed = exposed;

        let churn = StateTypeFlags::REMOVED | StateTypeFlags::NEW | StateTypeFlags::CHANGED;
        let area = self.bounds.expand(1);
        states.query_bounds(area, churn, &mut |state_type, state: &S| {
            let id = state.entity_id();
            if state_type == StateType::Removed || !self.bounds.contains(state.cell()) {
                if self.unfile(id) {
                    removed.push(id);
                }
                return;
            }
            self.place(id, state.cell());
            if self.sent.insert(id) {
                entities.push(state.clone());
            }
        });

        removed.retain(|id| !self.locations.contains_key(id));
        removed.sort_unstable();
        removed.dedup();

        let terrain_map_slices = match (&self.terrain_view, &view) {
            _ if !self.has_changed => None,
            (Some(prior), Some(current)) => Some(prior.diff(current)),
            (None, Some(current)) => Some(whole(current)),
            _ => None,
        };
        let terrain_map_slices = terrain_map_slices.filter(|slices| !slices.is_empty());

        self.terrain_view = view;
        self.has_changed = false;
        Update {
            time: now,
            bounds: self.bounds,
            entities,
            removed,
            terrain_map_slices,
        }
    }

    fn full_update<S>(&mut self, states: &QuadState<S>, view: Option<TerrainMap>, now: WorldTime) -> Update<S>
    where
        S: EntityState,
    {
        let mut entities: Vec<S> = Vec::new();
        let visible = StateTypeFlags::NEW | StateTypeFlags::CHANGED | StateTypeFlags::UNCHANGED;
        states.query_bounds(self.bounds, visible, &mut |_, state: &S| entities.push(state.clone()));
        for state in &entities {
            self.place(state.entity_id(), state.cell());
        }

        self.out_of_bounds.clear();
        self.exposed.clear();
        self.is_new = false;
        self.has_changed = false;
        let terrain_map_slices = view.as_ref().map(whole);
        self.terrain_view = view;
        Update {
            time: now,
            bounds: self.bounds,
            entities,
            removed: Vec::new(),
            terrain_map_slices,
        }
    }
}

fn whole(view: &TerrainMap) -> TerrainMapSlices {
    TerrainMapSlices {
        bounds: view.bounds(),
        slices: vec![view.to_slice()],
    }
}

fn leading_edge(bounds: Bounds, direction: Direction) -> Bounds {
    match direction {
        Direction::North => Bounds::new(bounds.top_l(), bounds.top_r()),
        Direction::East => Bounds::new(bounds.top_r(), bounds.bot_r()),
        Direction::South => Bounds::new(bounds.bot_l(), bounds.bot_r()),
        Direction::West => Bounds::new(bounds.top_l(), bounds.bot_l()),
    }
}
