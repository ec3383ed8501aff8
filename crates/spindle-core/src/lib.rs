// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod caps;
mod config;
mod handle;
mod invoke;
mod result;
mod signal;

pub use caps::PipeTarget;
pub use config::{Input, Shell, SpawnDefaults, SpawnOptions, StdioMode, StdioPolicy};
pub use handle::{Outcome, RunningCommand};
pub use invoke::{invoke, spawn, spawn_blocking, spawn_deferred};
pub use result::SpawnResult;
pub use signal::Signal;

pub use spindle_cancel::{AbortReason, CancelToken};
pub use spindle_error::{SpawnError, SpawnErrorKind};
pub use spindle_stream::{
    Channel, Chunk, ChunkStore, ChunkTap, EventBus, EventSubscription, Hooks, RunEvent, Settled,
};
