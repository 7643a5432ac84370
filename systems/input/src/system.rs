//! Input phase handler applying buffered requests to walking entities.

use gridworld_core::{Entity, EntityId, Motion, MoveAction, WorldTime};
use gridworld_quad::{Chunk, InputPhaseHandler};

use crate::{
    buffer::InputBuffers,
    channel::InputReceiver,
    planner::{plan_move, MoveTiming},
};

/// Entity that walks the grid through a [`Motion`].
pub trait Mobile: Entity {
    /// Movement state of the entity.
    fn motion(&self) -> &Motion;

    /// Mutable movement state of the entity.
    fn motion_mut(&mut self) -> &mut Motion;
}

/// Applies each actor's pending move request during the input phase.
///
/// Every entity first commits the previous tick's move and lands on the
/// destination of a finished path. Then the actor's due request is planned and
/// applied; the request is consumed once the resulting action is a path.
#[derive(Debug)]
pub struct InputSystem {
    receiver: InputReceiver,
    buffers: InputBuffers,
    timing: MoveTiming,
}

impl InputSystem {
    /// Creates a system fed by `receiver`.
    #[must_use]
    pub fn new(receiver: InputReceiver, timing: MoveTiming) -> Self {
        Self {
            receiver,
            buffers: InputBuffers::default(),
            timing,
        }
    }

    /// Buffered requests per actor.
    #[must_use]
    pub fn buffers(&self) -> &InputBuffers {
        &self.buffers
    }

    /// Drops the actor's pending request along with any command still queued
    /// for it.
    pub fn forget(&mut self, id: EntityId) {
        let _ = self.receiver.drain_into(&mut self.buffers);
        self.buffers.remove(id);
    }

    fn advance<E: Mobile>(&mut self, entity: &mut E, now: WorldTime) {
        let motion = entity.motion_mut();
        motion.commit();
        let _ = motion.complete_path(now);

        let id = entity.id();
        let Some(buffer) = self.buffers.get_mut(id) else {
            return;
        };
        let Some(request) = buffer.due(now) else {
            return;
        };
        let Some(action) = plan_move(entity.motion(), request.direction, now, self.timing) else {
            return;
        };

        match entity.motion_mut().apply(action, self.timing.turn_delay()) {
            Ok(()) => {
                if matches!(action, MoveAction::Path(_)) {
                    let _ = buffer.consume();
                }
            }
            Err(err) => log::warn!("entity {id} rejected {action:?}: {err}"),
        }
    }
}

impl<E: Mobile> InputPhaseHandler<E> for InputSystem {
    fn apply_inputs_in(&mut self, mut chunk: Chunk<E>, now: WorldTime) -> Chunk<E> {
        let _ = self.receiver.drain_into(&mut self.buffers);
        for entity in &mut chunk.entities {
            self.advance(entity, now);
        }
        chunk
    }

    fn forget(&mut self, id: EntityId) {
        InputSystem::forget(self, id);
    }
}
