//! Background thread driving a [`Simulation`] at a fixed rate.

use std::{
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use gridworld_core::{Entity, EntityId};
use gridworld_quad::{InputPhaseHandler, NarrowPhaseHandler};

use crate::{
    actor::Actor,
    simulation::{HaltedSimulation, Simulation, SimulationDef, SimulationError},
};

type Reply = Sender<Result<(), SimulationError>>;

struct Channels<E: Entity> {
    halt: Receiver<Sender<HaltedSimulation<E>>>,
    connect: Receiver<(Box<dyn Actor<E>>, Reply)>,
    remove: Receiver<(EntityId, Reply)>,
}

/// Handle to a simulation running on its own thread.
///
/// Dropping the handle without halting stops the loop after the current tick.
pub struct RunningSimulation<E: Entity> {
    halt: Sender<Sender<HaltedSimulation<E>>>,
    connect: Sender<(Box<dyn Actor<E>>, Reply)>,
    remove: Sender<(EntityId, Reply)>,
    thread: JoinHandle<()>,
}

impl<E, I, N> SimulationDef<E, I, N>
where
    E: Entity,
    I: InputPhaseHandler<E> + Send + 'static,
    N: NarrowPhaseHandler<E> + Send + 'static,
{
    /// Builds the world and starts ticking it on a dedicated thread.
    pub fn start(self) -> Result<RunningSimulation<E>, SimulationError> {
        let period = self.period()?;
        let simulation = Simulation::new(self)?;

        let (halt_tx, halt_rx) = bounded(0);
        let (connect_tx, connect_rx) = bounded(0);
        let (remove_tx, remove_rx) = bounded(0);
        let channels = Channels {
            halt: halt_rx,
            connect: connect_rx,
            remove: remove_rx,
        };

        let thread = thread::Builder::new()
            .name("gridworld-sim".into())
            .spawn(move || sim_loop(simulation, channels, period))?;
        log::info!("simulation started at {period:?} per tick");

        Ok(RunningSimulation {
            halt: halt_tx,
            connect: connect_tx,
            remove: remove_tx,
            thread,
        })
    }
}

impl<E: Entity> RunningSimulation<E> {
    /// Connects an actor; its first update arrives on a later tick.
    pub fn connect_actor<A: Actor<E>>(&self, actor: A) -> Result<(), SimulationError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.connect
            .send((Box::new(actor), reply_tx))
            .map_err(|_| SimulationError::Stopped)?;
        reply_rx.recv().map_err(|_| SimulationError::Stopped)?
    }

    /// Disconnects the actor `id` and deletes its entity.
    pub fn remove_actor(&self, id: EntityId) -> Result<(), SimulationError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.remove
            .send((id, reply_tx))
            .map_err(|_| SimulationError::Stopped)?;
        reply_rx.recv().map_err(|_| SimulationError::Stopped)?
    }

    /// Stops the loop between ticks and returns the world.
    pub fn halt(self) -> Result<HaltedSimulation<E>, SimulationError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.halt
            .send(reply_tx)
            .map_err(|_| SimulationError::Stopped)?;
        let halted = reply_rx.recv().map_err(|_| SimulationError::Stopped)?;
        if self.thread.join().is_err() {
            log::error!("simulation thread panicked while halting");
        }
        Ok(halted)
    }
}

fn sim_loop<E, I, N>(mut simulation: Simulation<E, I, N>, channels: Channels<E>, period: Duration)
where
    E: Entity,
    I: InputPhaseHandler<E>,
    N: NarrowPhaseHandler<E>,
{
    let ticker = crossbeam_channel::tick(period);

    loop {
        match channels.halt.try_recv() {
            Ok(reply) => {
                log::info!("simulation halting");
                let _ = reply.send(simulation.halt());
                return;
            }
            Err(TryRecvError::Disconnected) => {
                log::info!("simulation handle dropped; stopping");
                return;
            }
            Err(TryRecvError::Empty) => {}
        }

        if let Ok((actor, reply)) = channels.connect.try_recv() {
            let _ = reply.send(simulation.connect_actor(actor));
            continue;
        }
        if let Ok((id, reply)) = channels.remove.try_recv() {
            let _ = reply.send(simulation.remove_actor(id));
            continue;
        }

        select! {
            recv(channels.halt) -> reply => {
                let Ok(reply) = reply else {
                    log::info!("simulation handle dropped; stopping");
                    return;
                };
                log::info!("simulation halting");
                let _ = reply.send(simulation.halt());
                return;
            }
            recv(channels.connect) -> request => {
                if let Ok((actor, reply)) = request {
                    let _ = reply.send(simulation.connect_actor(actor));
                }
            }
            recv(channels.remove) -> request => {
                if let Ok((id, reply)) = request {
                    let _ = reply.send(simulation.remove_actor(id));
                }
            }
            recv(ticker) -> _ => {
                let started = Instant::now();
                let _ = simulation.tick();
                let elapsed = started.elapsed();
                if elapsed > period {
                    log::warn!("tick overran its period: {elapsed:?} > {period:?}");
                }
            }
        }
    }
}
