// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bus;
mod hooks;
mod store;

pub use bus::{EventBus, EventSubscription, RunEvent, Settled};
pub use hooks::Hooks;
pub use store::{Channel, Chunk, ChunkStore, ChunkTap, to_chunk};
