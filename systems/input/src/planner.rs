//! Turning a requested direction into the next [`MoveAction`].

use gridworld_core::{
    Direction, Motion, MoveAction, PathAction, Span, TurnAction, WorldTime, TURN_DELAY,
};

/// Timing parameters of walking entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MoveTiming {
    ticks_per_cell: WorldTime,
    turn_delay: WorldTime,
}

impl MoveTiming {
    /// Timing with a move lasting `ticks_per_cell` and the given turn delay.
    #[must_use]
    pub const fn new(ticks_per_cell: WorldTime, turn_delay: WorldTime) -> Self {
        Self {
            ticks_per_cell,
            turn_delay,
        }
    }

    /// Ticks needed to cross one cell.
    #[must_use]
    pub const fn ticks_per_cell(&self) -> WorldTime {
        self.ticks_per_cell
    }

    /// Ticks a turn blocks the next action for.
    #[must_use]
    pub const fn turn_delay(&self) -> WorldTime {
        self.turn_delay
    }
}

impl Default for MoveTiming {
    fn default() -> Self {
        Self::new(TURN_DELAY * 2, TURN_DELAY)
    }
}

/// Next action bringing `motion` toward `direction` at `now`, if any is allowed.
///
/// An entity facing elsewhere turns first. An entity already facing the
/// direction starts a path. Nothing is planned while a path is in progress
/// or when the chaining rules forbid the action at `now`.
#[must_use]
pub fn plan_move(
    motion: &Motion,
    direction: Direction,
    now: WorldTime,
    timing: MoveTiming,
) -> Option<MoveAction> {
    if motion.is_moving() {
        return None;
    }

    let action = if motion.facing() == direction {
        MoveAction::Path(PathAction::toward(
            Span::new(now, now + timing.ticks_per_cell),
            motion.cell(),
            direction,
        ))
    } else {
        MoveAction::Turn(TurnAction {
            from: motion.facing(),
            to: direction,
            time: now,
        })
    };

    action
        .can_happen_after_with_delay(motion.last_move().as_ref(), timing.turn_delay)
        .then_some(action)
}
