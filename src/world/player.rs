// src/world/player.rs

use super::chunk::ChunkCoord;
use crate::transports::Peer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Registered but no snapshot sent yet
    Connecting,
    Active,
    Disconnected,
}

/// Server-side record of a connected peer
#[derive(Debug, Clone)]
pub struct Player {
    pub peer: Peer,
    /// Chunk whose player set contains this player
    pub chunk: ChunkCoord,
    pub state: PlayerState,
}

impl Player {
    pub fn new(peer: Peer, chunk: ChunkCoord) -> Self {
        Self { peer, chunk, state: PlayerState::Connecting }
    }
}
