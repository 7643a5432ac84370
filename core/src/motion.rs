//! Movement state carried by entities that walk the grid.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    action::{MoveAction, PathAction},
    geometry::{Bounds, Cell, Direction},
    time::WorldTime,
};

/// Reasons an action cannot be applied to a [`Motion`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MotionError {
    /// The action breaks the chaining rules with the previously applied action.
    #[error("action cannot follow the previous move")]
    Chaining,
    /// A turn started from a facing the entity does not have.
    #[error("turn starts facing {expected} but the entity faces {actual}")]
    FacingMismatch {
        /// Facing recorded by the turn.
        expected: Direction,
        /// Facing of the entity.
        actual: Direction,
    },
    /// A path was requested while another one is still in progress.
    #[error("a path action is already in progress")]
    AlreadyMoving,
    /// A path does not leave from the entity's cell.
    #[error("path leaves {orig} but the entity stands on {cell}")]
    NotAtOrigin {
        /// Origin of the rejected path.
        orig: Cell,
        /// Cell the entity occupies.
        cell: Cell,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct MotionFrame {
    cell: Cell,
    facing: Direction,
    path: Option<PathAction>,
    last_move: Option<MoveAction>,
}

/// Position, facing and in-flight movement of a walking entity.
///
/// Every successful [`Motion::apply`] captures the previous state so that a
/// narrow phase can roll the move back with [`Motion::undo_last_apply`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Motion {
    frame: MotionFrame,
    undo: Option<MotionFrame>,
}

impl Motion {
    /// Motion standing still on `cell` while facing `facing`.
    #[must_use]
    pub const fn new(cell: Cell, facing: Direction) -> Self {
        Self {
            frame: MotionFrame {
                cell,
                facing,
                path: None,
                last_move: None,
            },
            undo: None,
        }
    }

    /// Cell the entity occupies; the origin of a path until it completes.
    #[must_use]
    pub const fn cell(&self) -> Cell {
        self.frame.cell
    }

    /// Direction the entity faces.
    #[must_use]
    pub const fn facing(&self) -> Direction {
        self.frame.facing
    }

    /// Path currently being walked.
    #[must_use]
    pub const fn path(&self) -> Option<PathAction> {
        self.frame.path
    }

    /// Most recently applied action.
    #[must_use]
    pub const fn last_move(&self) -> Option<MoveAction> {
        self.frame.last_move
    }

    /// Reports whether a path is in progress.
    #[must_use]
    pub const fn is_moving(&self) -> bool {
        self.frame.path.is_some()
    }

    /// Cells the entity may touch: its cell joined with any path destination.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        match self.frame.path {
            Some(path) => path.bounds(),
            None => Bounds::of_cell(self.frame.cell),
        }
    }

    /// Applies an action after checking the chaining rules with `turn_delay`.
    pub fn apply(&mut self, action: MoveAction, turn_delay: WorldTime) -> Result<(), MotionError> {
        if !action.can_happen_after_with_delay(self.frame.last_move.as_ref(), turn_delay) {
            return Err(MotionError::Chaining);
        }

        let mut next = self.frame;
        match action {
            MoveAction::Turn(turn) => {
                if turn.from != next.facing {
                    return Err(MotionError::FacingMismatch {
                        expected: turn.from,
                        actual: next.facing,
                    });
                }
                next.facing = turn.to;
            }
            MoveAction::Path(path) => {
                if next.path.is_some() {
                    return Err(MotionError::AlreadyMoving);
                }
                if path.orig() != next.cell {
                    return Err(MotionError::NotAtOrigin {
                        orig: path.orig(),
                        cell: next.cell,
                    });
                }
                next.facing = path.direction();
                next.path = Some(path);
            }
        }
        next.last_move = Some(action);

        self.undo = Some(self.frame);
        self.frame = next;
        Ok(())
    }

    /// Restores the state captured by the most recent apply.
    ///
    /// Returns `false` when there is nothing to undo.
    pub fn undo_last_apply(&mut self) -> bool {
        match self.undo.take() {
            Some(previous) => {
                self.frame = previous;
                true
            }
            None => false,
        }
    }

    /// Drops the captured undo state, making the last apply final.
    ///
    /// Called at the start of every tick so a narrow phase only ever rolls
    /// back moves applied during that tick.
    pub fn commit(&mut self) {
        self.undo = None;
    }

    /// Moves the entity onto its destination once the active path has ended.
    ///
    /// A completed path can no longer be undone.
    pub fn complete_path(&mut self, now: WorldTime) -> Option<PathAction> {
        let path = self.frame.path?;
        if path.end() > now {
            return None;
        }
        self.frame.cell = path.dest();
        self.frame.path = None;
        self.undo = None;
        Some(path)
    }
}
