// src/transports/mod.rs
// Peer identity and the event stream the world consumes.
//
// A peer owns two outbound queues: `primary` is reliable (responses and
// snapshots), `update` is bounded and lossy (per-tick entity updates).

pub mod https;
pub mod signaling;

use bytes::Bytes;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;
use ulid::Ulid;

/// Capacity of a peer's update queue; frames beyond this are dropped
pub const UPDATE_QUEUE_DEPTH: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub Ulid);

impl PeerId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Send side of one connection. Cheap to clone; sends never block and
/// never report failure to the caller.
#[derive(Debug, Clone)]
pub struct Peer {
    id: PeerId,
    primary: mpsc::UnboundedSender<Bytes>,
    update: mpsc::Sender<Bytes>,
}

/// Receive side of a peer's two outbound queues, drained by the socket writers
#[derive(Debug)]
pub struct PeerChannels {
    pub primary: mpsc::UnboundedReceiver<Bytes>,
    pub update: mpsc::Receiver<Bytes>,
}

impl Peer {
    pub fn new(id: PeerId) -> (Self, PeerChannels) {
        let (primary_tx, primary_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::channel(UPDATE_QUEUE_DEPTH);
        (
            Self { id, primary: primary_tx, update: update_tx },
            PeerChannels { primary: primary_rx, update: update_rx },
        )
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Queue a frame on the primary channel
    pub fn send_message(&self, data: Bytes) {
        if self.primary.send(data).is_err() {
            debug!(peer = %self.id, "Primary channel closed, message dropped");
        }
    }

    /// Queue a frame on the update channel, dropping it if the peer is behind
    pub fn send_update(&self, data: Bytes) {
        if let Err(e) = self.update.try_send(data) {
            debug!(peer = %self.id, error = %e, "Update dropped");
        }
    }
}

/// Everything the transport reports about a peer
#[derive(Debug)]
pub enum TransportEvent {
    /// Both channels are open
    Connected(Peer),
    /// Binary frame received on the primary channel
    Message { peer: PeerId, data: Bytes },
    /// Binary frame received on the update channel
    Update { peer: PeerId, data: Bytes },
    Disconnected(PeerId),
}
