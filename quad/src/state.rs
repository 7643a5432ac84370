//! Spatial index of entity states classified by how they changed this tick.

use std::{mem, ops::BitOr};

use gridworld_core::{Bounds, EntityState};

use crate::tree::{validate, QuadError};

/// How an entity's state relates to the previous tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateType {
    /// The entity left the world; the state is its last known one.
    Removed,
    /// The entity did not exist last tick.
    New,
    /// The entity reported a visible difference since last tick.
    Changed,
    /// The entity is as it was last tick.
    Unchanged,
}

impl StateType {
    /// Every classification, in storage order.
    pub const ALL: [StateType; 4] = [
        StateType::Removed,
        StateType::New,
        StateType::Changed,
        StateType::Unchanged,
    ];

    const fn slot(self) -> usize {
        match self {
            StateType::Removed => 0,
            StateType::New => 1,
            StateType::Changed => 2,
            StateType::Unchanged => 3,
        }
    }

    /// Flag selecting only this classification.
    #[must_use]
    pub const fn flag(self) -> StateTypeFlags {
        StateTypeFlags(1 << self.slot())
    }
}

/// Set of [`StateType`]s a query should visit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StateTypeFlags(u8);

impl StateTypeFlags {
    /// Selects removed states.
    pub const REMOVED: Self = StateType::Removed.flag();
    /// Selects new states.
    pub const NEW: Self = StateType::New.flag();
    /// Selects changed states.
    pub const CHANGED: Self = StateType::Changed.flag();
    /// Selects unchanged states.
    pub const UNCHANGED: Self = StateType::Unchanged.flag();
    /// Selects every state.
    pub const ALL: Self = Self(0b1111);

    /// Reports whether `state_type` is selected.
    #[must_use]
    pub const fn contains(self, state_type: StateType) -> bool {
        self.0 & state_type.flag().0 != 0
    }
}

impl BitOr for StateTypeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Quadtree of entity states, each leaf keeping one list per [`StateType`].
///
/// The tree keeps its partitioning across [`QuadState::clear`] so the lists
/// are reused from tick to tick.
#[derive(Clone, Debug)]
pub struct QuadState<S> {
    bounds: Bounds,
    max_size: usize,
    root: StateNode<S>,
    len: usize,
}

impl<S: EntityState> QuadState<S> {
    /// Creates an empty index over `bounds`.
    pub fn new(bounds: Bounds, max_size: usize) -> Result<Self, QuadError> {
        validate(bounds, max_size)?;
        Ok(Self {
            bounds,
            max_size,
            root: StateNode::leaf(bounds),
            len: 0,
        })
    }

    /// Region covered by the index.
    #[must_use]
    pub const fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Number of stored states.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Reports whether no state is stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `state` under `state_type` at its cell.
    pub fn insert(&mut self, state: S, state_type: StateType) -> Result<(), QuadError> {
        let cell = state.cell();
        if !self.bounds.contains(cell) {
            return Err(QuadError::OutOfBounds {
                id: state.entity_id(),
                cell,
            });
        }
        self.root.insert(state, state_type, self.max_size);
        self.len += 1;
        Ok(())
    }

    /// Drops every stored state.
    pub fn clear(&mut self) {
        self.root.clear();
        self.len = 0;
    }

    /// Visits the states selected by `flags` whose cell lies in `bounds`.
    pub fn query_bounds<F>(&self, bounds: Bounds, flags: StateTypeFlags, visit: &mut F)
    where
        F: FnMut(StateType, &S),
    {
        self.root.query_bounds(bounds, flags, visit);
    }

    /// Visits every state selected by `flags`.
    pub fn accumulate_all<F>(&self, flags: StateTypeFlags, visit: &mut F)
    where
        F: FnMut(StateType, &S),
    {
        self.root.query_bounds(self.bounds, flags, visit);
    }
}

#[derive(Clone, Debug)]
enum StateNode<S> {
    Leaf {
        bounds: Bounds,
        slots: [Vec<S>; 4],
    },
    Branch {
        bounds: Bounds,
        children: Box<[StateNode<S>; 4]>,
    },
}

impl<S: EntityState> StateNode<S> {
    fn leaf(bounds: Bounds) -> Self {
        Self::Leaf {
            bounds,
            slots: Default::default(),
        }
    }

    fn bounds(&self) -> Bounds {
        match self {
            Self::Leaf { bounds, .. } | Self::Branch { bounds, .. } => *bounds,
        }
    }

    fn insert(&mut self, state: S, state_type: StateType, max_size: usize) {
        let split = match self {
            Self::Branch { children, .. } => {
                let cell = state.cell();
                if let Some(child) = children.iter_mut().find(|c| c.bounds().contains(cell)) {
                    child.insert(state, state_type, max_size);
                }
                false
            }
            Self::Leaf { bounds, slots } => {
                slots[state_type.slot()].push(state);
                let total: usize = slots.iter().map(Vec::len).sum();
                total > max_size && bounds.width() > 1 && bounds.height() > 1
            }
        };
        if split {
            self.split(max_size);
        }
    }

    fn split(&mut self, max_size: usize) {
        let Self::Leaf { bounds, slots } = self else {
            return;
        };
        let Ok(quads) = bounds.quads() else {
            return;
        };
        let bounds = *bounds;
        let slots = mem::take(slots);
        *self = Self::Branch {
            bounds,
            children: Box::new(quads.map(Self::leaf)),
        };
        for (state_type, states) in StateType::ALL.into_iter().zip(slots) {
            for state in states {
                self.insert(state, state_type, max_size);
            }
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Leaf { slots, .. } => slots.iter_mut().for_each(Vec::clear),
            Self::Branch { children, .. } => children.iter_mut().for_each(Self::clear),
        }
    }

    fn query_bounds<F>(&self, query: Bounds, flags: StateTypeFlags, visit: &mut F)
    where
        F: FnMut(StateType, &S),
    {
        let Ok(shared) = query.intersection(&self.bounds()) else {
            return;
        };
        match self {
            Self::Leaf { bounds, slots } => {
                let whole = shared == *bounds;
                for state_type in StateType::ALL {
                    if !flags.contains(state_type) {
                        continue;
                    }
                    for state in &slots[state_type.slot()] {
                        if whole || shared.contains(state.cell()) {
                            visit(state_type, state);
                        }
                    }
                }
            }
            Self::Branch { children, .. } => {
                for child in children.iter() {
                    child.query_bounds(shared, flags, visit);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use gridworld_core::{Bounds, Cell};

    use super::{QuadState, StateType, StateTypeFlags};
    use crate::tree::{tests::world_bounds, tests::Token, QuadError};

    fn filled() -> QuadState<Token> {
        let mut state = QuadState::new(world_bounds(), 2).expect("index");
        for (index, cell) in world_bounds().cells().enumerate() {
            let state_type = StateType::ALL[index % 4];
            state
                .insert(Token::at(index as u64, cell.x(), cell.y()), state_type)
                .expect("insert");
        }
        state
    }

    #[test]
    fn queries_filter_by_type_and_area() {
        let state = filled();
        assert_eq!(state.len(), 64);

        let mut counts = [0usize; 4];
        state.accumulate_all(StateTypeFlags::ALL, &mut |state_type, _| match state_type {
            StateType::Removed => counts[0] += 1,
            StateType::New => counts[1] += 1,
            StateType::Changed => counts[2] += 1,
            StateType::Unchanged => counts[3] += 1,
        });
        assert_eq!(counts, [16, 16, 16, 16]);

        let row = Bounds::new(Cell::new(-4, 4), Cell::new(3, 4));
        let mut found = Vec::new();
        state.query_bounds(row, StateTypeFlags::NEW | StateTypeFlags::CHANGED, &mut |t, s| {
            found.push((t, s.cell))
        });
        assert_eq!(found.len(), 4);
        assert!(found
            .iter()
            .all(|(t, cell)| row.contains(*cell) && matches!(t, StateType::New | StateType::Changed)));
    }

    #[test]
    fn clear_keeps_the_index_usable() {
        let mut state = filled();
        state.clear();
        assert!(state.is_empty());

        let mut visited = 0;
        state.accumulate_all(StateTypeFlags::ALL, &mut |_, _| visited += 1);
        assert_eq!(visited, 0);

        state
            .insert(Token::at(1, 0, 0), StateType::Removed)
            .expect("insert");
        let mut removed = Vec::new();
        state.accumulate_all(StateTypeFlags::REMOVED, &mut |_, s| removed.push(s.id));
        assert_eq!(removed.len(), 1);
    }

    #[test]
    fn states_outside_the_index_are_rejected() {
        let mut state = QuadState::new(world_bounds(), 2).expect("index");
        assert!(matches!(
            state.insert(Token::at(1, 9, 9), StateType::New),
            Err(QuadError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn flags_select_single_types() {
        assert!(StateTypeFlags::NEW.contains(StateType::New));
        assert!(!StateTypeFlags::NEW.contains(StateType::Changed));
        assert!(StateTypeFlags::ALL.contains(StateType::Removed));
        assert!(!StateTypeFlags::default().contains(StateType::Unchanged));
    }
}
