#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Simulation driver: the authoritative tick loop and its actor handles.
//!
//! [`Simulation`] advances the world synchronously and streams viewport
//! updates to connected [`Actor`]s. [`SimulationDef::start`] runs it on a
//! dedicated thread behind a [`RunningSimulation`] handle whose requests are
//! served between ticks.

pub mod actor;
pub mod runner;
pub mod simulation;

pub use actor::Actor;
pub use runner::RunningSimulation;
pub use simulation::{HaltedSimulation, Simulation, SimulationDef, SimulationError};
