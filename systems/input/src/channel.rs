//! Message passing between actor-facing workers and the input phase.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use gridworld_core::EntityId;

use crate::{
    buffer::InputBuffers,
    command::{InputCommand, InputError},
};

/// Creates a connected sender/receiver pair for input commands.
#[must_use]
pub fn input_channel() -> (InputSender, InputReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (InputSender { tx }, InputReceiver { rx })
}

/// Cloneable handle workers use to forward actor commands.
#[derive(Clone, Debug)]
pub struct InputSender {
    tx: Sender<(EntityId, InputCommand)>,
}

impl InputSender {
    /// Parses a raw command for the actor `id` and forwards it.
    ///
    /// Unparseable commands are rejected and never enqueued.
    pub fn send_raw(&self, id: EntityId, cmd: &str, params: &str) -> Result<(), InputError> {
        let command = InputCommand::parse(cmd, params)?;
        self.send(id, command)
    }

    /// Forwards a parsed command for the actor `id`.
    pub fn send(&self, id: EntityId, command: InputCommand) -> Result<(), InputError> {
        self.tx
            .send((id, command))
            .map_err(|_| InputError::ChannelClosed)
    }
}

/// Receiving end drained by the simulation once per tick.
#[derive(Debug)]
pub struct InputReceiver {
    rx: Receiver<(EntityId, InputCommand)>,
}

impl InputReceiver {
    /// Moves every queued command into `buffers`, returning how many arrived.
    pub fn drain_into(&self, buffers: &mut InputBuffers) -> usize {
        let mut received = 0;
        loop {
            match self.rx.try_recv() {
                Ok((id, command)) => {
                    buffers.submit(id, command);
                    received += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::debug!("every input sender has been dropped");
                    break;
                }
            }
        }
        received
    }
}
