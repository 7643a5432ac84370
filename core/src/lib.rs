#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the grid world engine.
//!
//! This crate defines the spatial vocabulary every other crate speaks: integer
//! [`WorldTime`] and [`Span`]s, lattice [`Cell`]s and [`Bounds`], the timed
//! [`MoveAction`]s entities perform, the collision kernel that classifies how
//! two moves interact, and the [`Entity`]/[`EntityState`] traits the world is
//! generic over. Nothing here owns world state; the quadtree, world and
//! simulation crates build on these values.

pub mod action;
pub mod collision;
pub mod entity;
pub mod geometry;
pub mod motion;
pub mod time;

pub use action::{MoveAction, PartialCell, PathAction, TurnAction, TURN_DELAY};
pub use collision::{CellCollision, CollisionKind, PathCollision, OVERLAP_EPSILON};
pub use entity::{Entity, EntityFlags, EntityId, EntityIdGenerator, EntityState};
pub use geometry::{Bounds, BoundsError, Cell, CoordError, Direction};
pub use motion::{Motion, MotionError};
pub use time::{Clock, Span, WorldTime};
