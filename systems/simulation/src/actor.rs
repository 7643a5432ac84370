//! Participants that own an entity and receive viewport updates.

use std::sync::Arc;

use gridworld_core::{Entity, EntityId};
use gridworld_world::Update;

/// A connected participant of the simulation.
///
/// The simulation places [`Actor::entity`] in the world on connect, follows
/// it with a viewport and hands every tick's update to
/// [`Actor::write_state`]. Updates are immutable once written.
pub trait Actor<E: Entity>: Send + 'static {
    /// Identifier of the actor's entity.
    fn id(&self) -> EntityId;

    /// Entity inserted into the world when the actor connects.
    fn entity(&self) -> E;

    /// Receives the update produced for the actor's viewport.
    ///
    /// Called on the simulation thread; slow sinks delay the next tick.
    fn write_state(&self, update: Arc<Update<E::State>>);
}
