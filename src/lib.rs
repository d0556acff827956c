//! Syringe pump protocol engine and PID temperature loop.
//!
//! The pump speaks a line protocol with asynchronous one-byte status
//! prompts; [`handle::PumpHandle`] runs the link on its own thread. The
//! [`control`] module drives a [`pid::Pid`] from an acquisition collaborator.

pub mod cli;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod logging;
pub mod pid;
pub mod port;
pub mod proto;
pub mod pump;
pub mod queue;
pub mod stats;

#[cfg(test)]
mod sim;
