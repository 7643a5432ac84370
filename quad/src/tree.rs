//! Bounds-partitioned entity index.

use std::{collections::HashMap, mem};

use gridworld_core::{Bounds, Cell, Entity, EntityId};
use thiserror::Error;

/// Failures raised while building or feeding a quadtree.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum QuadError {
    /// Width and height must both be powers of two.
    #[error("bounds {width}x{height} are not a power of two on both axes")]
    NotPowerOfTwo {
        /// Width of the rejected bounds.
        width: i32,
        /// Height of the rejected bounds.
        height: i32,
    },
    /// The bounds have their corners swapped.
    #[error("quadtree bounds are inverted")]
    Inverted,
    /// Leaves must be allowed to hold at least two entries.
    #[error("max size {0} is smaller than 2")]
    MaxSizeTooSmall(usize),
    /// The entry's cell lies outside the tree.
    #[error("entity {id} at {cell} lies outside the quadtree")]
    OutOfBounds {
        /// Identifier of the rejected entity.
        id: EntityId,
        /// Cell of the rejected entity.
        cell: Cell,
    },
}

pub(crate) fn validate(bounds: Bounds, max_size: usize) -> Result<(), QuadError> {
    if bounds.is_inverted() {
        return Err(QuadError::Inverted);
    }
    let (width, height) = (bounds.width(), bounds.height());
    if !is_power_of_two(width) || !is_power_of_two(height) {
        return Err(QuadError::NotPowerOfTwo { width, height });
    }
    if max_size < 2 {
        return Err(QuadError::MaxSizeTooSmall(max_size));
    }
    Ok(())
}

fn is_power_of_two(value: i32) -> bool {
    value > 0 && value & (value - 1) == 0
}

/// Spatial index of entities keyed by the cell they occupy.
///
/// Leaves hold up to `max_size` entities before splitting into the four
/// [`Bounds::quads`] of their bounds. A leaf one cell wide or tall can no
/// longer split and grows without limit. Branches whose leaves drop back to
/// `max_size` entities in total collapse into a single leaf again.
#[derive(Clone, Debug)]
pub struct Quadtree<E> {
    pub(crate) bounds: Bounds,
    pub(crate) max_size: usize,
    pub(crate) root: QuadNode<E>,
    pub(crate) locations: HashMap<EntityId, Cell>,
}

impl<E: Entity> Quadtree<E> {
    /// Creates an empty tree, validating the bounds and leaf capacity.
    pub fn new(bounds: Bounds, max_size: usize) -> Result<Self, QuadError> {
        validate(bounds, max_size)?;
        Ok(Self {
            bounds,
            max_size,
            root: QuadNode::leaf(bounds),
            locations: HashMap::new(),
        })
    }

    /// Region covered by the tree.
    #[must_use]
    pub const fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Leaf capacity before splitting.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of indexed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Reports whether the tree is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Cell at which the entity with `id` is indexed.
    #[must_use]
    pub fn locate(&self, id: EntityId) -> Option<Cell> {
        self.locations.get(&id).copied()
    }

    /// Reports whether an entity with `id` is indexed.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.locations.contains_key(&id)
    }

    /// Entity indexed under `id`.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&E> {
        let cell = self.locate(id)?;
        self.root.leaf_for(cell)?.iter().find(|entity| entity.id() == id)
    }

    /// Indexes the entity, replacing any entity with the same id.
    pub fn insert(&mut self, entity: E) -> Result<(), QuadError> {
        let id = entity.id();
        let cell = entity.cell();
        if !self.bounds.contains(cell) {
            return Err(QuadError::OutOfBounds { id, cell });
        }

        if let Some(previous) = self.locations.get(&id).copied() {
            let _ = self.root.remove(id, previous, self.max_size);
        }
        self.root.insert(entity, self.max_size);
        let _ = self.locations.insert(id, cell);
        Ok(())
    }

    /// Removes and returns the entity with `id`.
    pub fn remove(&mut self, id: EntityId) -> Option<E> {
        let cell = self.locations.remove(&id)?;
        self.root.remove(id, cell, self.max_size)
    }

    /// Entities occupying `cell`.
    #[must_use]
    pub fn query_cell(&self, cell: Cell) -> Vec<&E> {
        self.root
            .leaf_for(cell)
            .map(|entities| entities.iter().filter(|e| e.cell() == cell).collect())
            .unwrap_or_default()
    }

    /// Entities whose cell lies within `bounds`.
    #[must_use]
    pub fn query_bounds(&self, bounds: Bounds) -> Vec<&E> {
        let mut found = Vec::new();
        self.root.visit_bounds(bounds, &mut |entity| found.push(entity));
        found
    }

    /// Calls `visit` with every entity whose cell lies within `bounds`.
    pub fn visit_bounds<'a, F>(&'a self, bounds: Bounds, mut visit: F)
    where
        F: FnMut(&'a E),
    {
        self.root.visit_bounds(bounds, &mut visit);
    }

    /// Every indexed entity in traversal order.
    #[must_use]
    pub fn entities(&self) -> Vec<&E> {
        self.query_bounds(self.bounds)
    }

    /// Removes every entity, returning them in traversal order.
    pub fn drain(&mut self) -> Vec<E> {
        let mut drained = Vec::with_capacity(self.len());
        self.root.drain_into(&mut drained);
        self.root = QuadNode::leaf(self.bounds);
        self.locations.clear();
        drained
    }

    /// Rebuilds the id index after entities moved inside the tree.
    pub(crate) fn reindex(&mut self) {
        let Self {
            root,
            locations,
            bounds,
            ..
        } = self;
        locations.clear();
        root.visit_bounds(*bounds, &mut |entity| {
            let _ = locations.insert(entity.id(), entity.cell());
        });
    }
}

#[derive(Clone, Debug)]
pub(crate) enum QuadNode<E> {
    Leaf { bounds: Bounds, entities: Vec<E> },
    Branch { bounds: Bounds, children: Box<[QuadNode<E>; 4]> },
}

impl<E: Entity> QuadNode<E> {
    pub(crate) fn leaf(bounds: Bounds) -> Self {
        Self::Leaf {
            bounds,
            entities: Vec::new(),
        }
    }

    pub(crate) fn bounds(&self) -> Bounds {
        match self {
            Self::Leaf { bounds, .. } | Self::Branch { bounds, .. } => *bounds,
        }
    }

    fn leaf_for(&self, cell: Cell) -> Option<&Vec<E>> {
        match self {
            Self::Leaf { bounds, entities } => bounds.contains(cell).then_some(entities),
            Self::Branch { children, .. } => children
                .iter()
                .find(|child| child.bounds().contains(cell))
                .and_then(|child| child.leaf_for(cell)),
        }
    }

    pub(crate) fn insert(&mut self, entity: E, max_size: usize) {
        let oversized = match self {
            Self::Branch { children, .. } => {
                let cell = entity.cell();
                match children.iter_mut().find(|child| child.bounds().contains(cell)) {
                    Some(child) => child.insert(entity, max_size),
                    None => log::warn!("entity {} at {cell} fell between quadrants", entity.id()),
                }
                false
            }
            Self::Leaf { entities, .. } => {
                entities.push(entity);
                true
            }
        };
        if oversized {
            self.split_if_oversized(max_size);
        }
    }

    /// Turns a leaf holding more than `max_size` entities into a branch.
    pub(crate) fn split_if_oversized(&mut self, max_size: usize) {
        let Self::Leaf { bounds, entities } = self else {
            return;
        };
        if entities.len() <= max_size || bounds.width() < 2 || bounds.height() < 2 {
            return;
        }
        let Ok(quads) = bounds.quads() else {
            return;
        };

        let bounds = *bounds;
        let entities = mem::take(entities);
        *self = Self::Branch {
            bounds,
            children: Box::new(quads.map(Self::leaf)),
        };
        for entity in entities {
            self.insert(entity, max_size);
        }
    }

    fn remove(&mut self, id: EntityId, cell: Cell, max_size: usize) -> Option<E> {
        let removed = match self {
            Self::Leaf { entities, .. } => {
                let position = entities.iter().position(|entity| entity.id() == id)?;
                return Some(entities.remove(position));
            }
            Self::Branch { children, .. } => children
                .iter_mut()
                .find(|child| child.bounds().contains(cell))
                .and_then(|child| child.remove(id, cell, max_size)),
        };
        if removed.is_some() {
            self.collapse_if_small(max_size);
        }
        removed
    }

    /// Collapses every branch whose leaves hold `max_size` entities or fewer.
    pub(crate) fn compact(&mut self, max_size: usize) {
        if let Self::Branch { children, .. } = self {
            for child in children.iter_mut() {
                child.compact(max_size);
            }
            self.collapse_if_small(max_size);
        }
    }

    fn collapse_if_small(&mut self, max_size: usize) {
        let Self::Branch { bounds, children } = self else {
            return;
        };

        let mut total = 0;
        for child in children.iter() {
            match child {
                Self::Leaf { entities, .. } => total += entities.len(),
                Self::Branch { .. } => return,
            }
        }
        if total > max_size {
            return;
        }

        let bounds = *bounds;
        let mut merged = Vec::with_capacity(total);
        for child in children.iter_mut() {
            if let Self::Leaf { entities, .. } = child {
                merged.append(entities);
            }
        }
        *self = Self::Leaf {
            bounds,
            entities: merged,
        };
    }

    fn visit_bounds<'a, F>(&'a self, query: Bounds, visit: &mut F)
    where
        F: FnMut(&'a E),
    {
        let Ok(shared) = query.intersection(&self.bounds()) else {
            return;
        };
        match self {
            Self::Leaf { bounds, entities } => {
                let whole = shared == *bounds;
                for entity in entities {
                    if whole || shared.contains(entity.cell()) {
                        visit(entity);
                    }
                }
            }
            Self::Branch { children, .. } => {
                for child in children.iter() {
                    child.visit_bounds(shared, visit);
                }
            }
        }
    }

    fn drain_into(&mut self, out: &mut Vec<E>) {
        match self {
            Self::Leaf { entities, .. } => out.append(entities),
            Self::Branch { children, .. } => {
                for child in children.iter_mut() {
                    child.drain_into(out);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use gridworld_core::{Bounds, Cell, Entity, EntityId, EntityState};

    use super::{QuadError, QuadNode, Quadtree};

    #[derive(Clone, Debug, PartialEq)]
    pub(crate) struct Token {
        pub(crate) id: EntityId,
        pub(crate) cell: Cell,
        pub(crate) reach: Option<Cell>,
    }

    impl Token {
        pub(crate) fn at(id: u64, x: i32, y: i32) -> Self {
            Self {
                id: EntityId::new(id),
                cell: Cell::new(x, y),
                reach: None,
            }
        }
    }

    impl EntityState for Token {
        fn entity_id(&self) -> EntityId {
            self.id
        }

        fn cell(&self) -> Cell {
            self.cell
        }

        fn bounds(&self) -> Bounds {
            Entity::bounds(self)
        }

        fn is_different_from(&self, other: &Self) -> bool {
            self != other
        }
    }

    impl Entity for Token {
        type State = Token;

        fn id(&self) -> EntityId {
            self.id
        }

        fn cell(&self) -> Cell {
            self.cell
        }

        fn bounds(&self) -> Bounds {
            match self.reach {
                Some(reach) => Bounds::from_corners(self.cell, reach),
                None => Bounds::of_cell(self.cell),
            }
        }

        fn to_state(&self) -> Self::State {
            self.clone()
        }
    }

    pub(crate) fn world_bounds() -> Bounds {
        Bounds::new(Cell::new(-4, 4), Cell::new(3, -3))
    }

    #[test]
    fn construction_validates_parameters() {
        let odd = Bounds::new(Cell::new(0, 0), Cell::new(2, -3));
        assert_eq!(
            Quadtree::<Token>::new(odd, 4).err(),
            Some(QuadError::NotPowerOfTwo {
                width: 3,
                height: 4
            })
        );
        assert_eq!(
            Quadtree::<Token>::new(world_bounds(), 1).err(),
            Some(QuadError::MaxSizeTooSmall(1))
        );
        assert!(Quadtree::<Token>::new(world_bounds(), 2).is_ok());
    }

    #[test]
    fn every_cell_is_queryable_after_filling_the_tree() {
        let mut tree = Quadtree::new(world_bounds(), 2).expect("tree");
        for (index, cell) in world_bounds().cells().enumerate() {
            tree.insert(Token::at(index as u64, cell.x(), cell.y()))
                .expect("insert");
        }

        for cell in world_bounds().cells() {
            let found = tree.query_cell(cell);
            assert_eq!(found.len(), 1, "cell {cell} should hold one entity");
            assert_eq!(found[0].cell, cell);
        }
        assert_eq!(tree.query_bounds(world_bounds()).len(), 64);
        assert_eq!(tree.len(), 64);
        assert!(matches!(tree.root, QuadNode::Branch { .. }));
    }

    #[test]
    fn query_bounds_filters_partially_covered_leaves() {
        let mut tree = Quadtree::new(world_bounds(), 2).expect("tree");
        for (index, cell) in world_bounds().cells().enumerate() {
            tree.insert(Token::at(index as u64, cell.x(), cell.y()))
                .expect("insert");
        }
        let window = Bounds::new(Cell::new(-1, 1), Cell::new(1, -1));
        let found = tree.query_bounds(window);
        assert_eq!(found.len(), 9);
        assert!(found.iter().all(|token| window.contains(token.cell)));
    }

    #[test]
    fn reinserting_an_id_replaces_the_stale_copy() {
        let mut tree = Quadtree::new(world_bounds(), 2).expect("tree");
        tree.insert(Token::at(7, -4, 4)).expect("insert");
        tree.insert(Token::at(8, 3, -3)).expect("insert");
        tree.insert(Token::at(9, 0, 0)).expect("insert");
        tree.insert(Token::at(7, 2, -2)).expect("move");

        assert_eq!(tree.len(), 3);
        assert!(tree.query_cell(Cell::new(-4, 4)).is_empty());
        assert_eq!(tree.query_cell(Cell::new(2, -2)).len(), 1);
        assert_eq!(tree.locate(EntityId::new(7)), Some(Cell::new(2, -2)));
        assert_eq!(tree.entities().len(), 3);
    }

    #[test]
    fn insert_outside_the_tree_is_rejected() {
        let mut tree = Quadtree::new(world_bounds(), 2).expect("tree");
        assert_eq!(
            tree.insert(Token::at(1, 4, 0)),
            Err(QuadError::OutOfBounds {
                id: EntityId::new(1),
                cell: Cell::new(4, 0)
            })
        );
        assert!(tree.is_empty());
    }

    #[test]
    fn removing_entities_collapses_branches() {
        let mut tree = Quadtree::new(world_bounds(), 2).expect("tree");
        tree.insert(Token::at(1, -4, 4)).expect("insert");
        tree.insert(Token::at(2, 3, 4)).expect("insert");
        tree.insert(Token::at(3, 3, -3)).expect("insert");
        assert!(matches!(tree.root, QuadNode::Branch { .. }));

        assert_eq!(tree.remove(EntityId::new(2)).map(|t| t.id), Some(EntityId::new(2)));
        assert!(matches!(tree.root, QuadNode::Leaf { .. }));
        assert_eq!(tree.remove(EntityId::new(2)), None);
        assert_eq!(tree.len(), 2);
        assert!(tree.get(EntityId::new(3)).is_some());
    }

    #[test]
    fn single_column_leaves_grow_without_splitting() {
        let narrow = Bounds::new(Cell::new(0, 0), Cell::new(0, -1));
        let mut tree = Quadtree::new(narrow, 2).expect("tree");
        for id in 0..5 {
            tree.insert(Token::at(id, 0, 0)).expect("insert");
        }
        assert_eq!(tree.query_cell(Cell::new(0, 0)).len(), 5);
        assert!(matches!(tree.root, QuadNode::Leaf { .. }));
    }

    #[test]
    fn drain_empties_the_tree() {
        let mut tree = Quadtree::new(world_bounds(), 2).expect("tree");
        for id in 0..6 {
            tree.insert(Token::at(id, id as i32 - 3, 0)).expect("insert");
        }
        assert_eq!(tree.drain().len(), 6);
        assert!(tree.is_empty());
        assert!(tree.entities().is_empty());
    }
}
