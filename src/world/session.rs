// src/world/session.rs
// Player lifecycle, request dispatch and per-tick update fan-out.
//
// Lock order: chunk locks (ascending coordinate) before the player registry.
// Registry mutation happens only from the event loop in `run`.

use bytes::Bytes;
use glam::DVec3;
use prost::Message;
use rayon::prelude::*;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{ChunkCoord, Player, PlayerState, World};
use crate::assets::AssetStreamer;
use crate::proto::{self, request};
use crate::transports::{Peer, PeerId, TransportEvent};

/// Farthest a single client update may move a player, in chunks
const MAX_TRANSFER_CHUNKS: u64 = 1;

pub struct SessionManager {
    world: Arc<World>,
    assets: Arc<AssetStreamer>,
}

impl SessionManager {
    pub fn new(world: Arc<World>, assets: Arc<AssetStreamer>) -> Self {
        Self { world, assets }
    }

    /// Register a newly connected peer in the bootstrap chunk and send the snapshot
    pub fn add_player(&self, peer: Peer) {
        let id = peer.id();
        let coord = self.world.bootstrap_chunk();
        let chunk = self.world.chunks().load_chunk(coord);

        self.world.players().insert(id, Player::new(peer.clone(), coord));
        chunk.lock().players.insert(id);

        peer.send_message(chunk.snapshot());
        if let Some(mut player) = self.world.players().get_mut(&id) {
            player.state = PlayerState::Active;
        }
        info!(peer = %id, chunk = %coord, players = self.world.players().len(), "Player joined");
    }

    /// Drop a peer from its chunk and the registry; unknown peers are ignored
    pub fn remove_player(&self, id: PeerId) {
        let Some(coord) = self.world.players().get(&id).map(|p| p.chunk) else {
            debug!(peer = %id, "Disconnect for unknown peer");
            return;
        };
        if let Some(chunk) = self.world.chunks().get(coord) {
            chunk.lock().players.remove(&id);
        }
        if let Some((_, mut player)) = self.world.players().remove(&id) {
            player.state = PlayerState::Disconnected;
        }
        info!(peer = %id, chunk = %coord, players = self.world.players().len(), "Player left");
    }

    /// Move a player between chunk player sets; false when nothing moved
    pub fn transfer_player(&self, id: PeerId, to: ChunkCoord) -> bool {
        let Some(from) = self.world.players().get(&id).map(|p| p.chunk) else {
            return false;
        };
        if from == to {
            return false;
        }

        let chunks = self.world.chunks();
        let (src, dst) = (chunks.load_chunk(from), chunks.load_chunk(to));
        {
            let (mut src_state, mut dst_state) = if from < to {
                let s = src.lock();
                (s, dst.lock())
            } else {
                let d = dst.lock();
                (src.lock(), d)
            };
            src_state.players.remove(&id);
            dst_state.players.insert(id);
            if let Some(mut player) = self.world.players().get_mut(&id) {
                player.chunk = to;
            }
        }

        debug!(peer = %id, from = %from, to = %to, "Player transferred");
        true
    }

    /// Decode and answer one request on the primary channel of the sender
    pub async fn handle_request(&self, id: PeerId, data: Bytes) {
        let Some(peer) = self.world.players().get(&id).map(|p| p.peer.clone()) else {
            debug!(peer = %id, "Request from unregistered peer dropped");
            return;
        };

        let request = match proto::Request::decode(data) {
            Ok(request) => request,
            Err(e) => {
                warn!(peer = %id, error = %e, "Undecodable request dropped");
                return;
            }
        };

        match request::Type::try_from(request.r#type) {
            Ok(request::Type::Texture) => {
                for frame in self.assets.stream_texture(request.id).await {
                    peer.send_message(frame);
                }
            }
            Ok(request::Type::Material) => {
                if let Some(frame) = self.assets.stream_material(request.id) {
                    peer.send_message(frame);
                }
            }
            Ok(request::Type::Mesh) => {
                if let Some(frame) = self.assets.stream_mesh(request.id) {
                    peer.send_message(frame);
                }
            }
            Err(_) => {
                debug!(peer = %id, kind = request.r#type, "Unknown request kind ignored");
            }
        }
    }

    /// Client-reported state; crossing into a neighbouring chunk moves the
    /// player there and sends that chunk's snapshot. Non-finite positions and
    /// jumps past the neighbours are ignored.
    pub fn handle_update(&self, id: PeerId, data: Bytes) {
        let update = match proto::Update::decode(data) {
            Ok(update) => update,
            Err(e) => {
                debug!(peer = %id, error = %e, "Undecodable update dropped");
                return;
            }
        };
        let Some(position) = update.position.as_ref() else {
            return;
        };

        let position: DVec3 = position.into();
        if !position.is_finite() {
            debug!(peer = %id, "Non-finite position ignored");
            return;
        }
        let Some(from) = self.world.players().get(&id).map(|p| p.chunk) else {
            return;
        };
        let to = ChunkCoord::from_position(position, self.world.chunk_size());
        if from.distance(to) > MAX_TRANSFER_CHUNKS {
            debug!(peer = %id, from = %from, to = %to, "Transfer too far, ignored");
            return;
        }
        if !self.transfer_player(id, to) {
            return;
        }
        let peer = self.world.players().get(&id).map(|p| p.peer.clone());
        if let (Some(peer), Some(chunk)) = (peer, self.world.chunks().get(to)) {
            peer.send_message(chunk.snapshot());
        }
    }

    /// Push one UPDATE per entity to every player in the entity's chunk.
    /// Returns the number of frames queued.
    pub fn broadcast_updates(&self) -> usize {
        let registry = self.world.players();
        self.world
            .chunks()
            .loaded_chunks()
            .par_iter()
            .map(|&coord| {
                let Some(chunk) = self.world.chunks().get(coord) else {
                    return 0;
                };
                let (frames, players) = chunk.updates();
                if frames.is_empty() {
                    return 0;
                }
                let mut sent = 0;
                for id in players {
                    let Some(peer) = registry.get(&id).map(|p| p.peer.clone()) else {
                        continue;
                    };
                    for frame in &frames {
                        peer.send_update(frame.clone());
                    }
                    sent += frames.len();
                }
                sent
            })
            .sum()
    }

    /// Consume transport events until the stream ends
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        info!("Session manager started");
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Connected(peer) => self.add_player(peer),
                TransportEvent::Message { peer, data } => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.handle_request(peer, data).await;
                    });
                }
                TransportEvent::Update { peer, data } => self.handle_update(peer, data),
                TransportEvent::Disconnected(peer) => self.remove_player(peer),
            }
        }
        info!("Transport event stream ended");
    }
}
