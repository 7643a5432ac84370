use gridworld_core::Direction;
use gridworld_system_input::{InputCommand, InputError, MoveRequestBuffer};
use proptest::prelude::*;

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![
        Just(Direction::North),
        Just(Direction::East),
        Just(Direction::South),
        Just(Direction::West),
    ]
}

proptest! {
    #[test]
    fn well_formed_commands_parse(tick in -1_000i64..1_000, dir in direction(), cancel in any::<bool>()) {
        let verb = if cancel { "moveCancel" } else { "move" };
        let parsed = InputCommand::parse(&format!("{verb}={tick}"), dir.name())
            .expect("well-formed command");
        prop_assert_eq!(parsed.tick(), tick);
        prop_assert_eq!(parsed.direction(), dir);
        prop_assert_eq!(matches!(parsed, InputCommand::MoveCancel { .. }), cancel);
    }

    #[test]
    fn buffer_keeps_the_last_uncancelled_move(commands in prop::collection::vec((direction(), any::<bool>()), 0..20)) {
        let mut buffer = MoveRequestBuffer::default();
        let mut expected = None;
        for (dir, cancel) in commands {
            let command = if cancel {
                if expected == Some(dir) {
                    expected = None;
                }
                InputCommand::MoveCancel { tick: 0, direction: dir }
            } else {
                expected = Some(dir);
                InputCommand::Move { tick: 0, direction: dir }
            };
            buffer.submit(command);
        }
        prop_assert_eq!(buffer.pending().map(|request| request.direction), expected);
    }
}

#[test]
fn garbage_never_parses() {
    for (cmd, params) in [("", ""), ("=", "north"), ("move=", "north"), ("move=1", "")] {
        assert!(InputCommand::parse(cmd, params).is_err(), "{cmd:?} {params:?}");
    }
    assert!(matches!(
        InputCommand::parse("move=1", "North"),
        Err(InputError::UnknownDirection(_))
    ));
}
