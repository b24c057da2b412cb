//! # desterra-queue
//!
//! Bounded per-category worker dispatcher.
//!
//! Jobs are queued per category in strict FIFO order and admitted while the
//! category has a free slot. Every admitted job runs in its own isolated
//! [`WorkerUnit`] (an OS process in production, see [`ProcessSpawner`]) and
//! settles its [`JobTicket`] exactly once: with the first success or error
//! the unit reports, or with a failure synthesised from a silent exit or a
//! timeout.

mod category;
mod dispatcher;
mod error;
mod job;
mod process;
mod unit;

pub use category::QueueStats;
pub use dispatcher::{CategorySettings, Dispatcher};
pub use error::JobError;
pub use job::JobTicket;
pub use process::{CommandSpec, ProcessSpawner};
pub use unit::{ExitReport, Signal, Spawner, UnitSpec, WorkerUnit};
