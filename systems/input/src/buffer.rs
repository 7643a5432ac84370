//! Per-actor storage of the move request waiting to be applied.

use std::collections::HashMap;

use gridworld_core::{Direction, EntityId, WorldTime};

use crate::command::InputCommand;

/// Move an actor asked for but that has not been applied yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MoveRequest {
    /// Tick the request becomes active.
    pub tick: WorldTime,
    /// Requested direction.
    pub direction: Direction,
}

/// Holds at most one pending move request.
///
/// A newer move replaces the pending one. A cancellation only clears the
/// request when the directions match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MoveRequestBuffer {
    pending: Option<MoveRequest>,
}

impl MoveRequestBuffer {
    /// Records a command.
    pub fn submit(&mut self, command: InputCommand) {
        match command {
            InputCommand::Move { tick, direction } => {
                self.pending = Some(MoveRequest { tick, direction });
            }
            InputCommand::MoveCancel { direction, .. } => {
                if self.pending.map(|request| request.direction) == Some(direction) {
                    self.pending = None;
                }
            }
        }
    }

    /// Pending request, whatever its tick.
    #[must_use]
    pub const fn pending(&self) -> Option<MoveRequest> {
        self.pending
    }

    /// Pending request that is active at `now`.
    #[must_use]
    pub fn due(&self, now: WorldTime) -> Option<MoveRequest> {
        self.pending.filter(|request| request.tick <= now)
    }

    /// Drops the pending request once its move has been applied.
    pub fn consume(&mut self) -> Option<MoveRequest> {
        self.pending.take()
    }
}

/// Move request buffers of every actor.
#[derive(Clone, Debug, Default)]
pub struct InputBuffers {
    buffers: HashMap<EntityId, MoveRequestBuffer>,
}

impl InputBuffers {
    /// Records a command for the actor `id`.
    pub fn submit(&mut self, id: EntityId, command: InputCommand) {
        self.buffers.entry(id).or_default().submit(command);
    }

    /// Buffer of the actor `id`.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&MoveRequestBuffer> {
        self.buffers.get(&id)
    }

    /// Mutable buffer of the actor `id`.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut MoveRequestBuffer> {
        self.buffers.get_mut(&id)
    }

    /// Forgets the actor `id`.
    pub fn remove(&mut self, id: EntityId) {
        let _ = self.buffers.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use gridworld_core::{Direction, EntityId};

    use super::{InputBuffers, MoveRequest, MoveRequestBuffer};
    use crate::command::InputCommand;

    fn move_to(tick: i64, direction: Direction) -> InputCommand {
        InputCommand::Move { tick, direction }
    }

    #[test]
    fn later_moves_overwrite_pending_ones() {
        let mut buffer = MoveRequestBuffer::default();
        buffer.submit(move_to(4, Direction::North));
        buffer.submit(move_to(4, Direction::East));
        assert_eq!(
            buffer.pending(),
            Some(MoveRequest {
                tick: 4,
                direction: Direction::East
            })
        );
    }

    #[test]
    fn cancel_only_clears_matching_direction() {
        let mut buffer = MoveRequestBuffer::default();
        buffer.submit(move_to(1, Direction::South));
        buffer.submit(InputCommand::MoveCancel {
            tick: 1,
            direction: Direction::North,
        });
        assert!(buffer.pending().is_some());
        buffer.submit(InputCommand::MoveCancel {
            tick: 2,
            direction: Direction::South,
        });
        assert_eq!(buffer.pending(), None);
    }

    #[test]
    fn requests_wait_for_their_tick() {
        let mut buffer = MoveRequestBuffer::default();
        buffer.submit(move_to(10, Direction::West));
        assert_eq!(buffer.due(9), None);
        assert!(buffer.due(10).is_some());
        assert!(buffer.consume().is_some());
        assert_eq!(buffer.due(11), None);
    }

    #[test]
    fn buffers_are_kept_per_actor() {
        let mut buffers = InputBuffers::default();
        buffers.submit(EntityId::new(1), move_to(0, Direction::North));
        assert!(buffers.get(EntityId::new(1)).is_some());
        assert!(buffers.get(EntityId::new(2)).is_none());
        buffers.remove(EntityId::new(1));
        assert!(buffers.get(EntityId::new(1)).is_none());
    }
}
