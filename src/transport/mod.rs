//! Framed byte I/O over COM or UDP, used only by the Command Queue.
//!
//! The Command Queue never talks to a transport directly; it holds a
//! [`Backend`] capability instead, breaking the cyclic "queue calls back
//! into the mount commander which uses the queue" reference that a more
//! naive layering would have.

mod simulator;
mod skywatcher;

pub use simulator::SimulatorBackend;
pub use skywatcher::{SkyWatcherBackend, SkyWatcherTransport};

use crate::error::CoreResult;
use crate::queue::{CommandKind, CommandOutcome};

/// The narrow back-end capability the Command Queue worker drives. Each
/// implementation owns its transport exclusively; nothing outside the
/// worker thread touches it.
pub trait Backend: Send {
    fn execute(&mut self, payload: &CommandKind) -> CoreResult<CommandOutcome>;
}
