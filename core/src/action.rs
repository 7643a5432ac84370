//! Timed movement primitives and the rules that chain them.

use serde::{Deserialize, Serialize};

use crate::{
    geometry::{Bounds, Cell, CoordError, Direction},
    time::{Span, WorldTime},
};

/// Minimum number of ticks that must separate a turn from the next action.
pub const TURN_DELAY: WorldTime = 10;

/// Share of a cell occupied by a moving entity at some instant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartialCell {
    /// Cell being partially occupied.
    pub cell: Cell,
    /// Fraction of the cell occupied, within `[0, 1]`.
    pub percentage: f64,
}

/// Straight-line move between two orthogonally adjacent cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathAction {
    span: Span,
    orig: Cell,
    dest: Cell,
    direction: Direction,
}

impl PathAction {
    /// Creates a path action, failing when the cells are not orthogonal neighbors.
    pub fn new(span: Span, orig: Cell, dest: Cell) -> Result<Self, CoordError> {
        let direction = orig.direction_to(dest)?;
        Ok(Self {
            span,
            orig,
            dest,
            direction,
        })
    }

    /// Path action leaving `orig` in `direction`.
    #[must_use]
    pub const fn toward(span: Span, orig: Cell, direction: Direction) -> Self {
        Self {
            span,
            orig,
            dest: orig.neighbor(direction),
            direction,
        }
    }

    /// Time interval over which the move happens.
    #[must_use]
    pub const fn span(&self) -> Span {
        self.span
    }

    /// First tick of the move.
    #[must_use]
    pub const fn start(&self) -> WorldTime {
        self.span.start()
    }

    /// Tick at which the entity fully occupies the destination.
    #[must_use]
    pub const fn end(&self) -> WorldTime {
        self.span.end()
    }

    /// Cell the move leaves.
    #[must_use]
    pub const fn orig(&self) -> Cell {
        self.orig
    }

    /// Cell the move enters.
    #[must_use]
    pub const fn dest(&self) -> Cell {
        self.dest
    }

    /// Direction of travel.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Rectangle covering both origin and destination.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        Bounds::from_corners(self.orig, self.dest)
    }

    /// Share of the origin cell still occupied at `t`.
    #[must_use]
    pub fn orig_partial(&self, t: WorldTime) -> PartialCell {
        PartialCell {
            cell: self.orig,
            percentage: self.orig_percentage(t),
        }
    }

    /// Share of the destination cell already occupied at `t`.
    #[must_use]
    pub fn dest_partial(&self, t: WorldTime) -> PartialCell {
        PartialCell {
            cell: self.dest,
            percentage: 1.0 - self.orig_percentage(t),
        }
    }

    fn orig_percentage(&self, t: WorldTime) -> f64 {
        let duration = self.span.duration();
        if duration == 0 {
            return if t < self.span.end() { 1.0 } else { 0.0 };
        }
        let remaining = self.span.remaining(t) as f64 / duration as f64;
        remaining.clamp(0.0, 1.0)
    }
}

/// Instantaneous change of facing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnAction {
    /// Facing before the turn.
    pub from: Direction,
    /// Facing after the turn.
    pub to: Direction,
    /// Tick at which the turn happens.
    pub time: WorldTime,
}

/// Any action that changes how an entity is positioned or oriented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveAction {
    /// Change of facing.
    Turn(TurnAction),
    /// Move to a neighboring cell.
    Path(PathAction),
}

impl MoveAction {
    /// Tick at which the action begins.
    #[must_use]
    pub const fn start(&self) -> WorldTime {
        match self {
            Self::Turn(turn) => turn.time,
            Self::Path(path) => path.start(),
        }
    }

    /// Tick at which the action is complete.
    #[must_use]
    pub const fn end(&self) -> WorldTime {
        match self {
            Self::Turn(turn) => turn.time,
            Self::Path(path) => path.end(),
        }
    }

    /// Applies the chaining rules with the default [`TURN_DELAY`].
    #[must_use]
    pub fn can_happen_after(&self, prior: Option<&MoveAction>) -> bool {
        self.can_happen_after_with_delay(prior, TURN_DELAY)
    }

    /// Reports whether `self` may follow `prior` when turns need `turn_delay` ticks to settle.
    #[must_use]
    pub fn can_happen_after_with_delay(
        &self,
        prior: Option<&MoveAction>,
        turn_delay: WorldTime,
    ) -> bool {
        let Some(prior) = prior else {
            return true;
        };

        match (prior, self) {
            (Self::Turn(prior), Self::Turn(next)) => next.time - prior.time > turn_delay,
            (Self::Turn(prior), Self::Path(next)) => {
                prior.to == next.direction() && next.start() - prior.time > turn_delay
            }
            (Self::Path(_), Self::Turn(_)) => true,
            (Self::Path(prior), Self::Path(next)) => {
                prior.end() == next.start() || prior.direction() == next.direction()
            }
        }
    }
}

impl From<PathAction> for MoveAction {
    fn from(path: PathAction) -> Self {
        Self::Path(path)
    }
}

impl From<TurnAction> for MoveAction {
    fn from(turn: TurnAction) -> Self {
        Self::Turn(turn)
    }
}
