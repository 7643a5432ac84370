//! The input, broad and narrow phases run over a [`Quadtree`] every tick.
//!
//! The input phase hands every leaf's entities to an [`InputPhaseHandler`]
//! and re-files the entities that moved out of their leaf. The broad phase
//! gathers entities whose bounds overlap into [`CollisionGroup`]s, and the
//! narrow phase lets a [`NarrowPhaseHandler`] resolve each group.

use std::{
    collections::HashMap,
    mem,
    panic::{catch_unwind, AssertUnwindSafe},
};

use gridworld_core::{Bounds, Cell, Entity, EntityFlags, EntityId, WorldTime};

use crate::tree::{QuadNode, Quadtree};

/// Entities of one leaf, handed to the input phase.
#[derive(Clone, Debug)]
pub struct Chunk<E> {
    /// Bounds of the leaf the entities were taken from.
    pub bounds: Bounds,
    /// The entities; the handler returns them, possibly moved.
    pub entities: Vec<E>,
}

/// Applies buffered inputs to the entities of a chunk.
pub trait InputPhaseHandler<E> {
    /// Returns the chunk's entities after applying inputs at `now`.
    fn apply_inputs_in(&mut self, chunk: Chunk<E>, now: WorldTime) -> Chunk<E>;

    /// Drops whatever the handler still holds for the entity `id`.
    fn forget(&mut self, _id: EntityId) {}
}

impl<E, F> InputPhaseHandler<E> for F
where
    F: FnMut(Chunk<E>, WorldTime) -> Chunk<E>,
{
    fn apply_inputs_in(&mut self, chunk: Chunk<E>, now: WorldTime) -> Chunk<E> {
        self(chunk, now)
    }
}

/// Outcome of resolving one collision group.
#[derive(Clone, Debug)]
pub struct NarrowPhaseResult<E> {
    /// Entities to keep, in their resolved state.
    pub resolved: Vec<E>,
    /// Entities to delete from the world.
    pub removed: Vec<E>,
}

impl<E> Default for NarrowPhaseResult<E> {
    fn default() -> Self {
        Self {
            resolved: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// Resolves the collisions inside a group.
pub trait NarrowPhaseHandler<E> {
    /// Decides the fate of every entity in `group` at `now`.
    fn resolve_collisions(&mut self, group: &CollisionGroup<E>, now: WorldTime) -> NarrowPhaseResult<E>;
}

impl<E, F> NarrowPhaseHandler<E> for F
where
    F: FnMut(&CollisionGroup<E>, WorldTime) -> NarrowPhaseResult<E>,
{
    fn resolve_collisions(&mut self, group: &CollisionGroup<E>, now: WorldTime) -> NarrowPhaseResult<E> {
        self(group, now)
    }
}

/// Unordered pair of entities whose bounds overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Collision {
    a: EntityId,
    b: EntityId,
}

impl Collision {
    /// Creates the pair with the smaller id first.
    #[must_use]
    pub fn new(x: EntityId, y: EntityId) -> Self {
        Self {
            a: x.min(y),
            b: x.max(y),
        }
    }

    /// Smaller id of the pair.
    #[must_use]
    pub const fn a(&self) -> EntityId {
        self.a
    }

    /// Larger id of the pair.
    #[must_use]
    pub const fn b(&self) -> EntityId {
        self.b
    }

    /// Reports whether `id` takes part in the collision.
    #[must_use]
    pub fn involves(&self, id: EntityId) -> bool {
        self.a == id || self.b == id
    }

    /// The other participant when `id` takes part.
    #[must_use]
    pub fn other(&self, id: EntityId) -> Option<EntityId> {
        if self.a == id {
            Some(self.b)
        } else if self.b == id {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Maximal set of entities connected through overlapping bounds.
#[derive(Clone, Debug)]
pub struct CollisionGroup<E> {
    entities: Vec<E>,
    collisions: Vec<Collision>,
    by_entity: HashMap<EntityId, Vec<usize>>,
}

impl<E> Default for CollisionGroup<E> {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            collisions: Vec::new(),
            by_entity: HashMap::new(),
        }
    }
}

impl<E: Entity> CollisionGroup<E> {
    /// Members ordered by id.
    #[must_use]
    pub fn entities(&self) -> &[E] {
        &self.entities
    }

    /// Every pairwise collision, each pair once.
    #[must_use]
    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Reports whether the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Member with `id`.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&E> {
        self.entities
            .binary_search_by_key(&id, Entity::id)
            .ok()
            .map(|index| &self.entities[index])
    }

    /// Collisions `id` takes part in.
    pub fn collisions_of(&self, id: EntityId) -> impl Iterator<Item = &Collision> + '_ {
        self.by_entity
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&index| &self.collisions[index])
    }

    /// Collision between `x` and `y`, in either order.
    #[must_use]
    pub fn collision_between(&self, x: EntityId, y: EntityId) -> Option<&Collision> {
        let wanted = Collision::new(x, y);
        self.collisions_of(x).find(|collision| **collision == wanted)
    }

    /// Union of the members' bounds.
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::join_all(self.entities.iter().map(Entity::bounds))
    }

    fn push_collision(&mut self, collision: Collision) {
        let index = self.collisions.len();
        self.collisions.push(collision);
        self.by_entity.entry(collision.a).or_default().push(index);
        self.by_entity.entry(collision.b).or_default().push(index);
    }

    fn reset(&mut self) {
        self.entities.clear();
        self.collisions.clear();
        self.by_entity.clear();
    }
}

/// Reusable storage for the groups built each tick.
#[derive(Clone, Debug)]
pub struct CollisionGroupPool<E> {
    groups: Vec<CollisionGroup<E>>,
    active: usize,
}

impl<E> Default for CollisionGroupPool<E> {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            active: 0,
        }
    }
}

impl<E: Entity> CollisionGroupPool<E> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases every group while keeping their allocations.
    pub fn reset(&mut self) {
        for group in &mut self.groups[..self.active] {
            group.reset();
        }
        self.active = 0;
    }

    /// Hands out an empty group.
    pub fn acquire(&mut self) -> &mut CollisionGroup<E> {
        if self.active == self.groups.len() {
            self.groups.push(CollisionGroup::default());
        }
        self.active += 1;
        &mut self.groups[self.active - 1]
    }

    /// Groups handed out since the last reset.
    #[must_use]
    pub fn groups(&self) -> &[CollisionGroup<E>] {
        &self.groups[..self.active]
    }

    /// Number of groups ever allocated.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.groups.len()
    }
}

/// What a full phase run did to the tree.
#[derive(Clone, Debug)]
pub struct PhaseOutcome<E> {
    /// Entities that left the tree's bounds and were dropped from it.
    pub out_of_bounds: Vec<E>,
    /// Entities the narrow phase deleted.
    pub removed: Vec<E>,
    /// Number of collision groups resolved.
    pub groups: usize,
}

/// Drives the three phases, reusing its buffers between ticks.
#[derive(Debug)]
pub struct PhaseRunner<E> {
    pool: CollisionGroupPool<E>,
    members: Vec<(EntityId, Bounds)>,
    index: HashMap<EntityId, usize>,
    nearby: Vec<(EntityId, Bounds)>,
    parents: Vec<usize>,
    pairs: Vec<(usize, usize)>,
    in_pair: Vec<bool>,
    slots: HashMap<usize, usize>,
}

impl<E> Default for PhaseRunner<E> {
    fn default() -> Self {
        Self {
            pool: CollisionGroupPool::default(),
            members: Vec::new(),
            index: HashMap::new(),
            nearby: Vec::new(),
            parents: Vec::new(),
            pairs: Vec::new(),
            in_pair: Vec::new(),
            slots: HashMap::new(),
        }
    }
}

impl<E: Entity> PhaseRunner<E> {
    /// Creates a runner with empty buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups built by the last broad phase.
    #[must_use]
    pub fn groups(&self) -> &[CollisionGroup<E>] {
        self.pool.groups()
    }

    /// Runs the input, broad and narrow phases in order.
    pub fn run<I, N>(
        &mut self,
        tree: &mut Quadtree<E>,
        now: WorldTime,
        input: &mut I,
        narrow: &mut N,
    ) -> PhaseOutcome<E>
    where
        I: InputPhaseHandler<E>,
        N: NarrowPhaseHandler<E>,
    {
        let mut out_of_bounds = self.input_phase(tree, now, input);
        let _ = self.broad_phase(tree);
        let (removed, escaped) = self.narrow_phase(tree, now, narrow);
        out_of_bounds.extend(escaped);
        PhaseOutcome {
            out_of_bounds,
            removed,
            groups: self.pool.groups().len(),
        }
    }

    /// Applies inputs leaf by leaf and re-files moved entities.
    ///
    /// Entities that escape a leaf are handed to its parent once all four
    /// siblings were processed, so no entity sees its inputs twice. Entities
    /// escaping the root are returned.
    ///
    /// Handlers may move an entity at most one cell along an axis per tick.
    pub fn input_phase<I>(&mut self, tree: &mut Quadtree<E>, now: WorldTime, input: &mut I) -> Vec<E>
    where
        I: InputPhaseHandler<E>,
    {
        let escaped = apply_inputs(&mut tree.root, &tree.locations, input, now, tree.max_size);
        tree.root.compact(tree.max_size);
        tree.reindex();
        if !escaped.is_empty() {
            log::debug!("{} entities left the world at tick {now}", escaped.len());
        }
        escaped
    }

    /// Groups entities whose bounds overlap, transitively.
    ///
    /// Groups are ordered by their smallest member id and members by id.
    /// Entities flagged [`EntityFlags::NO_COLLIDE`] and entities overlapping
    /// nobody are left out.
    pub fn broad_phase(&mut self, tree: &Quadtree<E>) -> &[CollisionGroup<E>] {
        self.pool.reset();
        self.pairs.clear();
        self.members.clear();
        self.index.clear();
        self.slots.clear();

        let mut reach = 0;
        let members = &mut self.members;
        tree.visit_bounds(tree.bounds(), |entity| {
            if !entity.flags().contains(EntityFlags::NO_COLLIDE) {
                reach = reach.max(reach_of(entity));
                members.push((entity.id(), entity.bounds()));
            }
        });
        self.members.sort_unstable_by_key(|&(id, _)| id);
        self.index.extend(
            self.members
                .iter()
                .enumerate()
                .map(|(position, &(id, _))| (id, position)),
        );

        self.parents.clear();
        self.parents.extend(0..self.members.len());

        for position in 0..self.members.len() {
            let bounds = self.members[position].1;
            self.nearby.clear();
            let nearby = &mut self.nearby;
            tree.visit_bounds(bounds.expand(reach), |other| nearby.push((other.id(), other.bounds())));
            for &(other_id, other_bounds) in &self.nearby {
                let Some(&other_position) = self.index.get(&other_id) else {
                    continue;
                };
                if other_position <= position || !bounds.overlaps(&other_bounds) {
                    continue;
                }
                self.pairs.push((position, other_position));
                union(&mut self.parents, position, other_position);
            }
        }
        self.pairs.sort_unstable();

        self.in_pair.clear();
        self.in_pair.resize(self.members.len(), false);
        for &(a, b) in &self.pairs {
            self.in_pair[a] = true;
            self.in_pair[b] = true;
        }
        for position in 0..self.members.len() {
            if !self.in_pair[position] {
                continue;
            }
            let Some(entity) = tree.get(self.members[position].0) else {
                continue;
            };
            let root = find(&mut self.parents, position);
            let next = self.slots.len();
            let slot = *self.slots.entry(root).or_insert(next);
            if slot == next {
                let _ = self.pool.acquire();
            }
            self.pool.groups[slot].entities.push(entity.clone());
        }
        for &(a, b) in &self.pairs {
            let root = find(&mut self.parents, a);
            if let Some(&slot) = self.slots.get(&root) {
                let collision = Collision::new(self.members[a].0, self.members[b].0);
                self.pool.groups[slot].push_collision(collision);
            }
        }

        self.pool.groups()
    }

    /// Resolves every group built by the last broad phase.
    ///
    /// Returns the deleted entities and those resolved outside the tree. A
    /// handler that panics leaves its group as it was before the phase.
    pub fn narrow_phase<N>(
        &mut self,
        tree: &mut Quadtree<E>,
        now: WorldTime,
        narrow: &mut N,
    ) -> (Vec<E>, Vec<E>)
    where
        N: NarrowPhaseHandler<E>,
    {
        let mut removed = Vec::new();
        let mut escaped = Vec::new();

        for group in self.pool.groups() {
            let outcome = catch_unwind(AssertUnwindSafe(|| narrow.resolve_collisions(group, now)));
            let NarrowPhaseResult {
                resolved,
                removed: deleted,
            } = match outcome {
                Ok(result) => result,
                Err(_) => {
                    log::error!(
                        "narrow phase failed for a group of {} entities at tick {now}; keeping their state",
                        group.len()
                    );
                    continue;
                }
            };

            for entity in deleted {
                let _ = tree.remove(entity.id());
                removed.push(entity);
            }
            for entity in resolved {
                if !tree.bounds().contains(entity.cell()) {
                    let _ = tree.remove(entity.id());
                    escaped.push(entity);
                    continue;
                }
                if let Err(err) = tree.insert(entity) {
                    log::warn!("dropping resolved entity: {err}");
                }
            }
        }

        tree.root.compact(tree.max_size);
        (removed, escaped)
    }
}

fn apply_inputs<E, I>(
    node: &mut QuadNode<E>,
    before: &HashMap<EntityId, Cell>,
    input: &mut I,
    now: WorldTime,
    max_size: usize,
) -> Vec<E>
where
    E: Entity,
    I: InputPhaseHandler<E>,
{
    let (bounds, lifted) = match node {
        QuadNode::Leaf { bounds, entities } => {
            let chunk = Chunk {
                bounds: *bounds,
                entities: mem::take(entities),
            };
            let chunk = input.apply_inputs_in(chunk, now);
            for entity in &chunk.entities {
                check_step(before, entity, now);
            }
            (*bounds, chunk.entities)
        }
        QuadNode::Branch { bounds, children } => {
            let mut lifted = Vec::new();
            for child in children.iter_mut() {
                lifted.extend(apply_inputs(child, before, input, now, max_size));
            }
            (*bounds, lifted)
        }
    };

    let (inside, outside): (Vec<E>, Vec<E>) = lifted
        .into_iter()
        .partition(|entity| bounds.contains(entity.cell()));
    for entity in inside {
        node.insert(entity, max_size);
    }
    outside
}

fn check_step<E: Entity>(before: &HashMap<EntityId, Cell>, entity: &E, now: WorldTime) {
    let Some(&from) = before.get(&entity.id()) else {
        return;
    };
    let to = entity.cell();
    let stepped = from == to || from.is_neighbor_of(to);
    if !stepped {
        log::error!("entity {} jumped from {from} to {to} at tick {now}", entity.id());
    }
    debug_assert!(stepped, "input phase moved entity {} from {from} to {to}", entity.id());
}

fn reach_of<E: Entity>(entity: &E) -> i32 {
    let cell = entity.cell();
    let bounds = entity.bounds();
    [
        (cell.x() - bounds.top_l().x()).abs(),
        (bounds.bot_r().x() - cell.x()).abs(),
        (bounds.top_l().y() - cell.y()).abs(),
        (cell.y() - bounds.bot_r().y()).abs(),
    ]
    .into_iter()
    .max()
    .unwrap_or(0)
}

fn find(parents: &mut [usize], mut node: usize) -> usize {
    while parents[node] != node {
        parents[node] = parents[parents[node]];
        node = parents[node];
    }
    node
}

fn union(parents: &mut [usize], a: usize, b: usize) {
    let (root_a, root_b) = (find(parents, a), find(parents, b));
    if root_a != root_b {
        parents[root_a.max(root_b)] = root_a.min(root_b);
    }
}

#[cfg(test)]
mod tests {
    use gridworld_core::{Cell, EntityId, WorldTime};

    use super::{Chunk, Collision, CollisionGroup, NarrowPhaseResult, PhaseRunner};
    use crate::tree::{
        tests::{world_bounds, Token},
        Quadtree,
    };

    fn tree_with(tokens: &[Token]) -> Quadtree<Token> {
        let mut tree = Quadtree::new(world_bounds(), 2).expect("tree");
        for token in tokens {
            tree.insert(token.clone()).expect("insert");
        }
        tree
    }

    fn reaching(id: u64, x: i32, y: i32, reach: (i32, i32)) -> Token {
        let mut token = Token::at(id, x, y);
        token.reach = Some(Cell::new(reach.0, reach.1));
        token
    }

    #[test]
    fn input_phase_refiles_moved_entities_once() {
        let tokens: Vec<Token> = (0..8).map(|id| Token::at(id, id as i32 - 4, 0)).collect();
        let mut tree = tree_with(&tokens);
        let mut runner = PhaseRunner::new();
        let mut applied = 0;

        let mut shift_east = |mut chunk: Chunk<Token>, _now: WorldTime| {
            for token in &mut chunk.entities {
                applied += 1;
                token.cell = token.cell.add(1, 0);
            }
            chunk
        };
        let escaped = runner.input_phase(&mut tree, 1, &mut shift_east);

        assert_eq!(applied, 8);
        assert_eq!(escaped.len(), 1);
        assert_eq!(escaped[0].id, EntityId::new(7));
        assert_eq!(tree.len(), 7);
        for id in 0..7 {
            assert_eq!(
                tree.locate(EntityId::new(id)),
                Some(Cell::new(id as i32 - 3, 0))
            );
        }
    }

    #[test]
    fn broad_phase_groups_overlaps_transitively() {
        let mut tree = tree_with(&[
            reaching(5, 0, 0, (1, 0)),
            reaching(3, 2, 0, (1, 0)),
            reaching(9, 3, 0, (2, 0)),
            Token::at(1, -4, 4),
            Token::at(2, -4, 4),
            Token::at(8, 3, -3),
        ]);
        let mut runner = PhaseRunner::new();
        let groups = runner.broad_phase(&tree);

        assert_eq!(groups.len(), 2);
        let ids: Vec<Vec<u64>> = groups
            .iter()
            .map(|g| g.entities().iter().map(|t| t.id.get()).collect())
            .collect();
        assert_eq!(ids, vec![vec![1, 2], vec![3, 5, 9]]);

        let chain = &groups[1];
        assert_eq!(chain.collisions().len(), 2);
        assert!(chain
            .collision_between(EntityId::new(9), EntityId::new(3))
            .is_some());
        assert!(chain
            .collision_between(EntityId::new(5), EntityId::new(9))
            .is_none());
        assert_eq!(chain.collisions_of(EntityId::new(3)).count(), 2);
        assert_eq!(chain.entity(EntityId::new(5)).map(|t| t.cell), Some(Cell::new(0, 0)));
        assert_eq!(
            chain.bounds(),
            Some(gridworld_core::Bounds::new(Cell::new(0, 0), Cell::new(3, 0)))
        );

        let _ = tree.remove(EntityId::new(3));
        assert_eq!(runner.broad_phase(&tree).len(), 1);
    }

    #[test]
    fn narrow_phase_applies_resolutions() {
        let mut tree = tree_with(&[Token::at(1, 0, 0), Token::at(2, 0, 0), Token::at(3, 2, 2)]);
        let mut runner = PhaseRunner::new();
        let mut no_input = |chunk: Chunk<Token>, _now: WorldTime| chunk;
        let mut keep_lowest = |group: &CollisionGroup<Token>, _now: WorldTime| {
            let mut entities = group.entities().to_vec();
            let removed = entities.split_off(1);
            let mut resolved = entities;
            resolved[0].cell = Cell::new(-1, 0);
            NarrowPhaseResult { resolved, removed }
        };

        let outcome = runner.run(&mut tree, 4, &mut no_input, &mut keep_lowest);
        assert_eq!(outcome.groups, 1);
        assert_eq!(outcome.removed.len(), 1);
        assert_eq!(outcome.removed[0].id, EntityId::new(2));
        assert!(outcome.out_of_bounds.is_empty());
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.locate(EntityId::new(1)), Some(Cell::new(-1, 0)));
    }

    #[test]
    fn panicking_narrow_phase_keeps_the_group() {
        let mut tree = tree_with(&[Token::at(1, 0, 0), Token::at(2, 0, 0)]);
        let mut runner = PhaseRunner::new();
        let _ = runner.broad_phase(&tree);
        let mut explode = |_: &CollisionGroup<Token>, _: WorldTime| -> NarrowPhaseResult<Token> {
            panic!("resolver failure")
        };

        let (removed, escaped) = runner.narrow_phase(&mut tree, 0, &mut explode);
        assert!(removed.is_empty());
        assert!(escaped.is_empty());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn broad_phase_keeps_its_buffers_between_ticks() {
        let mut tree = tree_with(&[
            Token::at(1, 0, 0),
            Token::at(2, 0, 0),
            Token::at(3, -3, 3),
            Token::at(4, -3, 3),
        ]);
        let mut runner = PhaseRunner::new();
        assert_eq!(runner.broad_phase(&tree).len(), 2);
        let members = runner.members.capacity();
        let parents = runner.parents.capacity();

        let _ = tree.remove(EntityId::new(4));
        for _ in 0..3 {
            let groups = runner.broad_phase(&tree);
            assert_eq!(groups.len(), 1);
            assert_eq!(groups[0].collisions().len(), 1);
        }
        assert_eq!(runner.members.len(), 3);
        assert_eq!(runner.index.len(), 3);
        assert_eq!(runner.members.capacity(), members);
        assert_eq!(runner.parents.capacity(), parents);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "input phase moved entity")]
    fn input_moves_must_be_single_orthogonal_steps() {
        let mut tree = tree_with(&[Token::at(1, 0, 0)]);
        let mut runner = PhaseRunner::new();
        let mut diagonal = |mut chunk: Chunk<Token>, _now: WorldTime| {
            for token in &mut chunk.entities {
                token.cell = token.cell.add(1, 1);
            }
            chunk
        };
        let _ = runner.input_phase(&mut tree, 1, &mut diagonal);
    }

    #[test]
    fn collisions_are_unordered_pairs() {
        let collision = Collision::new(EntityId::new(9), EntityId::new(4));
        assert_eq!(collision.a(), EntityId::new(4));
        assert_eq!(collision.other(EntityId::new(4)), Some(EntityId::new(9)));
        assert_eq!(collision.other(EntityId::new(5)), None);
        assert!(collision.involves(EntityId::new(9)));
    }

    #[test]
    fn pool_reuses_groups_between_ticks() {
        let tree = tree_with(&[Token::at(1, 0, 0), Token::at(2, 0, 0)]);
        let mut runner = PhaseRunner::new();
        for _ in 0..3 {
            assert_eq!(runner.broad_phase(&tree).len(), 1);
        }
        assert_eq!(runner.pool.capacity(), 1);
        assert_eq!(runner.groups()[0].len(), 2);
    }
}
