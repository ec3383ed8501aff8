// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capabilities layered onto results and pending handles.
//!
//! Each capability is a method set composed onto [`crate::RunningCommand`]
//! and [`crate::SpawnResult`] at construction time — the invocation engine
//! knows nothing about them. Order of composition is fixed: kill/abort,
//! timeout, pipe.

mod kill;
mod pipe;
mod timeout;

pub use pipe::PipeTarget;

pub(crate) use kill::signal_pid;
