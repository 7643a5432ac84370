#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Actor input: the command protocol, per-actor request buffers and the
//! input phase handler that turns requests into moves.

pub mod buffer;
pub mod channel;
pub mod command;
pub mod planner;
pub mod system;

pub use buffer::{InputBuffers, MoveRequest, MoveRequestBuffer};
pub use channel::{input_channel, InputReceiver, InputSender};
pub use command::{InputCommand, InputError};
pub use planner::{plan_move, MoveTiming};
pub use system::{InputSystem, Mobile};
