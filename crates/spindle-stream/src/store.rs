// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only, replayable collector of output chunks.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// One unit of output as delivered by the OS — not necessarily line-aligned.
pub type Chunk = Arc<[u8]>;

/// Which collected sequence to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// The child's standard output.
    Stdout,
    /// The child's standard error.
    Stderr,
    /// Both channels interleaved in arrival order.
    Stdall,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Stdall => "stdall",
        };
        f.write_str(s)
    }
}

struct TapEntry {
    channel: Channel,
    tx: mpsc::UnboundedSender<Chunk>,
}

#[derive(Default)]
struct Inner {
    stdout: Vec<Chunk>,
    stderr: Vec<Chunk>,
    stdall: Vec<Chunk>,
    taps: Vec<TapEntry>,
    closed: bool,
}

impl Inner {
    fn seq(&self, channel: Channel) -> &Vec<Chunk> {
        match channel {
            Channel::Stdout => &self.stdout,
            Channel::Stderr => &self.stderr,
            Channel::Stdall => &self.stdall,
        }
    }
}

/// Append-only chunk store owned by exactly one invocation.
///
/// Writes come from the single driving task; any number of readers may join
/// the collected text mid-flight, snapshot the chunk sequences, or
/// [`subscribe`](ChunkStore::subscribe) for replay-then-live delivery.
#[derive(Clone, Default)]
pub struct ChunkStore {
    inner: Arc<Mutex<Inner>>,
}

impl ChunkStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stdout chunk (also recorded under stdall).
    pub fn push_stdout(&self, chunk: Chunk) {
        self.push(Channel::Stdout, chunk);
    }

    /// Append a stderr chunk (also recorded under stdall).
    pub fn push_stderr(&self, chunk: Chunk) {
        self.push(Channel::Stderr, chunk);
    }

    fn push(&self, channel: Channel, chunk: Chunk) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        debug_assert!(!inner.closed, "push into closed store");
        match channel {
            Channel::Stdout => inner.stdout.push(Arc::clone(&chunk)),
            Channel::Stderr => inner.stderr.push(Arc::clone(&chunk)),
            Channel::Stdall => unreachable!("stdall is derived, never pushed directly"),
        }
        inner.stdall.push(Arc::clone(&chunk));
        inner.taps.retain(|tap| {
            if tap.channel != channel && tap.channel != Channel::Stdall {
                return true;
            }
            // A dropped receiver unregisters its tap.
            tap.tx.send(Arc::clone(&chunk)).is_ok()
        });
    }

    /// Snapshot of the chunks collected so far on `channel`.
    #[must_use]
    pub fn chunks(&self, channel: Channel) -> Vec<Chunk> {
        self.inner.lock().expect("store lock poisoned").seq(channel).clone()
    }

    /// The collected bytes of `channel`, concatenated.
    #[must_use]
    pub fn bytes(&self, channel: Channel) -> Vec<u8> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let seq = inner.seq(channel);
        let mut out = Vec::with_capacity(seq.iter().map(|c| c.len()).sum());
        for chunk in seq {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// The collected text of `channel`, lossily decoded as UTF-8.
    ///
    /// May be called at any time, including before completion for a partial
    /// read.
    #[must_use]
    pub fn text(&self, channel: Channel) -> String {
        String::from_utf8_lossy(&self.bytes(channel)).into_owned()
    }

    /// Subscribe to `channel` with replay-then-live delivery.
    ///
    /// Already-buffered chunks are delivered first, in order; chunks appended
    /// afterwards follow live. Every tap independently receives the complete
    /// stream, and the tap ends once the store is
    /// [`close`](ChunkStore::close)d and drained.
    #[must_use]
    pub fn subscribe(&self, channel: Channel) -> ChunkTap {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("store lock poisoned");
        for chunk in inner.seq(channel) {
            // Receiver is in scope; an unbounded send cannot fail here.
            let _ = tx.send(Arc::clone(chunk));
        }
        if !inner.closed {
            inner.taps.push(TapEntry { channel, tx });
        }
        ChunkTap { rx }
    }

    /// Mark the store complete, ending every live tap after its backlog.
    ///
    /// Appends after `close` are a logic error and will panic in debug
    /// builds; subscriptions taken after `close` still replay the buffered
    /// chunks.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.closed = true;
        inner.taps.clear();
    }

    /// `true` once [`close`](ChunkStore::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("store lock poisoned").closed
    }
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().expect("store lock poisoned");
        f.debug_struct("ChunkStore")
            .field("stdout_chunks", &inner.stdout.len())
            .field("stderr_chunks", &inner.stderr.len())
            .field("taps", &inner.taps.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

/// A replay-then-live subscription to one store channel.
pub struct ChunkTap {
    rx: mpsc::UnboundedReceiver<Chunk>,
}

impl ChunkTap {
    /// Receive the next chunk, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Chunk> {
        self.rx.recv().await
    }

    /// Drain whatever is immediately available without waiting.
    pub fn drain_now(&mut self) -> Vec<Chunk> {
        let mut out = Vec::new();
        while let Ok(chunk) = self.rx.try_recv() {
            out.push(chunk);
        }
        out
    }

    /// Adapt the tap into a [`tokio_stream::Stream`] of chunks.
    #[must_use]
    pub fn into_stream(self) -> UnboundedReceiverStream<Chunk> {
        UnboundedReceiverStream::new(self.rx)
    }

    /// Collect the remaining chunks into a lossily-decoded string.
    pub async fn collect_text(mut self) -> String {
        let mut bytes = Vec::new();
        while let Some(chunk) = self.next().await {
            bytes.extend_from_slice(&chunk);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl std::fmt::Debug for ChunkTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkTap").finish_non_exhaustive()
    }
}

/// Build a [`Chunk`] from raw bytes.
#[must_use]
pub fn to_chunk(data: &[u8]) -> Chunk {
    Arc::from(data)
}
