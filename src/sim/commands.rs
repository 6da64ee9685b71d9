//! Deferred commands injected into the simulation from other threads.
//!
//! Commands are enqueued through a channel and drained once per tick before
//! the physics stages run, so configuration changes never race an in-flight
//! dispatch sequence.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};

use crate::config::{InteractionMode, SimConfig};

/// A deferred mutation applied at the start of the next tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetTheta(f32),
    SetDt(f32),
    SetSoftening(f32),
    SetElasticity(f32),
    SetInteractionMode(InteractionMode),
}

impl Command {
    /// Apply this command to the live configuration.
    pub fn apply(self, config: &mut SimConfig) {
        match self {
            Command::SetTheta(theta) => config.theta = theta,
            Command::SetDt(dt) => config.dt = dt,
            Command::SetSoftening(softening) => config.softening = softening,
            Command::SetElasticity(elasticity) => config.elasticity = elasticity,
            Command::SetInteractionMode(mode) => config.interaction_mode = mode,
        }
    }
}

/// Single-consumer command queue owned by the simulation.
pub struct CommandQueue {
    sender: Sender<Command>,
    receiver: Receiver<Command>,
}

impl CommandQueue {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self { sender, receiver }
    }

    /// Clone a thread-safe handle for producers.
    pub fn sender(&self) -> Sender<Command> {
        self.sender.clone()
    }

    /// Enqueue from the owning thread.
    pub fn enqueue(&self, command: Command) {
        // The receiver lives as long as self, so the send cannot fail.
        let _ = self.sender.send(command);
    }

    /// Drain all pending commands into the configuration. Returns how many
    /// were applied.
    pub fn drain_into(&self, config: &mut SimConfig) -> usize {
        let mut applied = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(command) => {
                    log::debug!("applying command {:?}", command);
                    command.apply(config);
                    applied += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        applied
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_apply_in_order() {
        let queue = CommandQueue::new();
        let mut config = SimConfig::default();

        queue.enqueue(Command::SetTheta(0.3));
        queue.enqueue(Command::SetTheta(0.9));
        queue.enqueue(Command::SetDt(0.5));
        assert_eq!(queue.drain_into(&mut config), 3);

        assert_eq!(config.theta, 0.9);
        assert_eq!(config.dt, 0.5);
    }

    #[test]
    fn drain_on_empty_queue_is_a_no_op() {
        let queue = CommandQueue::new();
        let mut config = SimConfig::default();
        let before = config.clone();
        assert_eq!(queue.drain_into(&mut config), 0);
        assert_eq!(config.theta, before.theta);
    }

    #[test]
    fn sender_works_across_threads() {
        let queue = CommandQueue::new();
        let sender = queue.sender();
        let handle = std::thread::spawn(move || {
            sender
                .send(Command::SetInteractionMode(InteractionMode::Collide))
                .unwrap();
        });
        handle.join().unwrap();

        let mut config = SimConfig::default();
        queue.drain_into(&mut config);
        assert_eq!(config.interaction_mode, InteractionMode::Collide);
    }
}
