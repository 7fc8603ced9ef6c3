//! Ordered hand-off of stream chunks from the provider task to the store.
//!
//! The relay does not look inside chunks, retry, or handle backend errors;
//! it only preserves arrival order. Envelopes serialize as
//! `{"stream_id": .., "event": {"kind": .., "payload": ..}}` so the same shape
//! can cross a process boundary.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use tokio::sync::mpsc;

use crate::core::stream::StreamChunk;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum RelayEvent {
    Chunk(StreamChunk),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub stream_id: u64,
    pub event: RelayEvent,
}

impl Envelope {
    pub fn chunk(stream_id: u64, chunk: StreamChunk) -> Self {
        Self {
            stream_id,
            event: RelayEvent::Chunk(chunk),
        }
    }
}

/// The receiving side has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayClosed;

impl fmt::Display for RelayClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "relay receiver dropped")
    }
}

impl Error for RelayClosed {}

#[derive(Clone)]
pub struct Relay {
    tx: mpsc::UnboundedSender<Envelope>,
}

pub struct RelayReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Relay {
    pub fn channel() -> (Self, RelayReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, RelayReceiver { rx })
    }

    pub fn forward(&self, stream_id: u64, chunk: StreamChunk) -> Result<(), RelayClosed> {
        self.tx
            .send(Envelope::chunk(stream_id, chunk))
            .map_err(|_| RelayClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl RelayReceiver {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}
