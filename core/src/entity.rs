//! Contracts between the engine and the domain entities it simulates.

use std::{
    fmt,
    ops::{BitOr, BitOrAssign},
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds, Cell};

/// Process-unique identifier of an entity.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Wraps a raw identifier value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic identifier source that may be shared between threads.
#[derive(Debug, Default)]
pub struct EntityIdGenerator {
    next: AtomicU64,
}

impl EntityIdGenerator {
    /// Generator whose first identifier is `first`.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocates the next identifier.
    pub fn next_id(&self) -> EntityId {
        EntityId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Bitset of per-entity markers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityFlags(u32);

impl EntityFlags {
    /// Entity appeared this tick.
    pub const NEW: Self = Self(1);
    /// Entity changed this tick.
    pub const CHANGED: Self = Self(1 << 1);
    /// Entity never takes part in collisions.
    pub const NO_COLLIDE: Self = Self(1 << 2);
    /// First bit available for domain-defined markers.
    pub const USER_DEFINED: Self = Self(1 << 3);

    /// Flags with no marker set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Domain-defined marker `index` bits above [`EntityFlags::USER_DEFINED`].
    #[must_use]
    pub const fn user_defined(index: u32) -> Self {
        Self(Self::USER_DEFINED.0 << index)
    }

    /// Raw bit representation.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Reports whether every marker of `other` is set.
    #[must_use]
    pub const fn contains(&self, other: EntityFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Flags with the markers of `other` cleared.
    #[must_use]
    pub const fn without(self, other: EntityFlags) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for EntityFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EntityFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Publishable projection of an entity, the unit streamed to actors.
pub trait EntityState: Clone + fmt::Debug + Send + Sync + 'static {
    /// Identifier of the entity the state was taken from.
    fn entity_id(&self) -> EntityId;

    /// Cell the entity occupied when the state was taken.
    fn cell(&self) -> Cell;

    /// Cells the entity could interact with when the state was taken.
    fn bounds(&self) -> Bounds;

    /// Domain-defined test deciding whether `other` must be re-published.
    fn is_different_from(&self, other: &Self) -> bool;
}

/// Simulated object owned by the world's quadtree.
pub trait Entity: Clone + fmt::Debug + Send + 'static {
    /// Publishable projection of the entity.
    type State: EntityState;

    /// Process-unique identifier.
    fn id(&self) -> EntityId;

    /// Cell the entity occupies.
    fn cell(&self) -> Cell;

    /// Every cell the entity may interact with during the current tick.
    fn bounds(&self) -> Bounds;

    /// Markers attached to the entity.
    fn flags(&self) -> EntityFlags {
        EntityFlags::empty()
    }

    /// Projects the entity into its publishable state.
    fn to_state(&self) -> Self::State;

    /// Rolls back the most recent movement applied during the input phase.
    ///
    /// Narrow phases call this to revert a move; entities that never move keep
    /// the default, which reports that nothing was undone.
    fn undo_last_apply(&mut self) -> bool {
        false
    }
}
