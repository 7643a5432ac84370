//! Parsing of the `verb=tick` command protocol.

use std::str::FromStr;

use gridworld_core::{Direction, WorldTime};
use thiserror::Error;

/// Failures raised while parsing or delivering an input command.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InputError {
    /// The command is not of the form `verb=tick`.
    #[error("malformed command {0:?}")]
    Malformed(String),
    /// The verb is not recognised.
    #[error("unknown verb {0:?}")]
    UnknownVerb(String),
    /// The tick is not an integer.
    #[error("invalid tick {0:?}")]
    InvalidTick(String),
    /// The parameters do not name a direction.
    #[error("unknown direction {0:?}")]
    UnknownDirection(String),
    /// The simulation stopped listening.
    #[error("input channel closed")]
    ChannelClosed,
}

/// A parsed actor command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputCommand {
    /// Request to move toward `direction` from `tick` on.
    Move {
        /// Tick the request becomes active.
        tick: WorldTime,
        /// Requested direction.
        direction: Direction,
    },
    /// Withdraws a pending move toward `direction`.
    MoveCancel {
        /// Tick the cancellation was issued for.
        tick: WorldTime,
        /// Direction of the move to cancel.
        direction: Direction,
    },
}

impl InputCommand {
    /// Parses `cmd` (`move=<tick>` or `moveCancel=<tick>`) with its parameters.
    pub fn parse(cmd: &str, params: &str) -> Result<Self, InputError> {
        let (verb, tick) = cmd
            .split_once('=')
            .ok_or_else(|| InputError::Malformed(cmd.to_owned()))?;
        let tick = WorldTime::from_str(tick.trim())
            .map_err(|_| InputError::InvalidTick(tick.to_owned()))?;
        let direction = Direction::from_str(params.trim())
            .map_err(|_| InputError::UnknownDirection(params.to_owned()))?;

        match verb.trim() {
            "move" => Ok(Self::Move { tick, direction }),
            "moveCancel" => Ok(Self::MoveCancel { tick, direction }),
            other => Err(InputError::UnknownVerb(other.to_owned())),
        }
    }

    /// Tick carried by the command.
    #[must_use]
    pub const fn tick(&self) -> WorldTime {
        match self {
            Self::Move { tick, .. } | Self::MoveCancel { tick, .. } => *tick,
        }
    }

    /// Direction carried by the command.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        match self {
            Self::Move { direction, .. } | Self::MoveCancel { direction, .. } => *direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use gridworld_core::Direction;

    use super::{InputCommand, InputError};

    #[test]
    fn parses_both_verbs() {
        assert_eq!(
            InputCommand::parse("move=12", "north"),
            Ok(InputCommand::Move {
                tick: 12,
                direction: Direction::North
            })
        );
        assert_eq!(
            InputCommand::parse("moveCancel=3", " west\n"),
            Ok(InputCommand::MoveCancel {
                tick: 3,
                direction: Direction::West
            })
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        assert_eq!(
            InputCommand::parse("move", "north"),
            Err(InputError::Malformed("move".into()))
        );
        assert_eq!(
            InputCommand::parse("jump=1", "north"),
            Err(InputError::UnknownVerb("jump".into()))
        );
        assert_eq!(
            InputCommand::parse("move=soon", "north"),
            Err(InputError::InvalidTick("soon".into()))
        );
        assert_eq!(
            InputCommand::parse("move=1", "up"),
            Err(InputError::UnknownDirection("up".into()))
        );
    }

    #[test]
    fn accessors_expose_fields() {
        let command = InputCommand::parse("moveCancel=-4", "east").expect("parse");
        assert_eq!(command.tick(), -4);
        assert_eq!(command.direction(), Direction::East);
    }
}
