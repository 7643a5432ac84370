#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Spatial indexes and the per-tick phase pipeline of the grid world.
//!
//! [`Quadtree`] owns the live entities, [`QuadState`] holds their classified
//! states for viewport queries, and [`PhaseRunner`] advances the tree one tick
//! through the input, broad and narrow phases.

pub mod phase;
pub mod state;
pub mod tree;

pub use phase::{
    Chunk, Collision, CollisionGroup, CollisionGroupPool, InputPhaseHandler, NarrowPhaseHandler,
    NarrowPhaseResult, PhaseOutcome, PhaseRunner,
};
pub use state::{QuadState, StateType, StateTypeFlags};
pub use tree::{QuadError, Quadtree};
