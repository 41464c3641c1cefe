// src/world/chunk.rs
// Spatial chunk store: chunk-coordinate keyed map plus the loaded-chunk index

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use glam::DVec3;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::entity::Entity;
use crate::proto::{self, response};
use crate::transports::PeerId;

/// Chunk coordinate (not world units)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChunkCoord {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl ChunkCoord {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    pub fn from_position(position: DVec3, chunk_size: f64) -> Self {
        let c = (position / chunk_size).floor();
        Self { x: c.x as i64, y: c.y as i64, z: c.z as i64 }
    }

    /// Chessboard distance in chunks
    pub fn distance(&self, other: ChunkCoord) -> u64 {
        self.x
            .abs_diff(other.x)
            .max(self.y.abs_diff(other.y))
            .max(self.z.abs_diff(other.z))
    }
}

impl From<(i64, i64, i64)> for ChunkCoord {
    fn from((x, y, z): (i64, i64, i64)) -> Self {
        Self { x, y, z }
    }
}

impl From<ChunkCoord> for proto::AbsoluteLocation {
    fn from(c: ChunkCoord) -> Self {
        Self { x: c.x, y: c.y, z: c.z }
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Entities and present players of one chunk, guarded together
#[derive(Debug, Default)]
pub struct ChunkState {
    pub entities: Vec<Entity>,
    pub players: HashSet<PeerId>,
}

#[derive(Debug)]
pub struct Chunk {
    coord: ChunkCoord,
    state: Mutex<ChunkState>,
}

impl Chunk {
    fn new(coord: ChunkCoord) -> Self {
        Self { coord, state: Mutex::new(ChunkState::default()) }
    }

    pub fn lock(&self) -> MutexGuard<'_, ChunkState> {
        self.state.lock()
    }

    /// Append an entity; entities are never removed
    pub fn add_entity(&self, entity: Entity) {
        self.state.lock().entities.push(entity);
    }

    /// Full CHUNK response carrying every entity
    pub fn snapshot(&self) -> Bytes {
        let entities = self.state.lock().entities.iter().map(Entity::to_proto).collect();
        proto::encode(&proto::Response {
            r#type: response::Type::Chunk as i32,
            chunk: Some(proto::Chunk { location: Some(self.coord.into()), entities }),
            ..Default::default()
        })
    }

    /// One encoded UPDATE per entity, plus the players to send them to,
    /// taken under a single lock
    pub fn updates(&self) -> (Vec<Bytes>, Vec<PeerId>) {
        let state = self.state.lock();
        let frames = state.entities.iter().map(|e| proto::encode(&e.to_update())).collect();
        (frames, state.players.iter().copied().collect())
    }
}

#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: DashMap<ChunkCoord, Arc<Chunk>>,
    /// Coordinates iterated by the tick, each recorded once
    loaded: Mutex<Vec<ChunkCoord>>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing chunk, or a fresh empty one registered atomically
    pub fn load_chunk(&self, coord: ChunkCoord) -> Arc<Chunk> {
        match self.chunks.entry(coord) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(v) => {
                let chunk = Arc::new(Chunk::new(coord));
                v.insert(chunk.clone());
                self.loaded.lock().push(coord);
                chunk
            }
        }
    }

    /// Create a chunk only if none exists; `None` when the coordinate is taken
    pub fn create_chunk(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        match self.chunks.entry(coord) {
            Entry::Occupied(_) => None,
            Entry::Vacant(v) => {
                let chunk = Arc::new(Chunk::new(coord));
                v.insert(chunk.clone());
                self.loaded.lock().push(coord);
                Some(chunk)
            }
        }
    }

    pub fn get(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        self.chunks.get(&coord).map(|c| c.value().clone())
    }

    pub fn loaded_chunks(&self) -> Vec<ChunkCoord> {
        self.loaded.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn load_chunk_is_idempotent() {
        let store = ChunkStore::new();
        let a = store.load_chunk(ChunkCoord::new(1, -2, 3));
        let b = store.load_chunk(ChunkCoord::new(1, -2, 3));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.chunks.len(), 1);
        assert_eq!(store.loaded_chunks(), vec![ChunkCoord::new(1, -2, 3)]);
    }

    #[test]
    fn create_never_overwrites() {
        let store = ChunkStore::new();
        let first = store.create_chunk(ChunkCoord::default()).unwrap();
        first.add_entity(Entity::new(1, DVec3::ZERO));
        assert!(store.create_chunk(ChunkCoord::default()).is_none());
        assert_eq!(store.load_chunk(ChunkCoord::default()).lock().entities.len(), 1);
    }

    #[test]
    fn from_position_floors_negative_coordinates() {
        assert_eq!(ChunkCoord::from_position(DVec3::new(499.9, 0.0, -0.1), 500.0), ChunkCoord::new(0, 0, -1));
        assert_eq!(ChunkCoord::from_position(DVec3::new(500.0, -500.0, 1001.0), 500.0), ChunkCoord::new(1, -1, 2));
    }

    #[test]
    fn distance_is_largest_axis_gap() {
        let origin = ChunkCoord::default();
        assert_eq!(origin.distance(ChunkCoord::new(1, -1, 1)), 1);
        assert_eq!(origin.distance(ChunkCoord::new(0, 0, -3)), 3);
        assert_eq!(ChunkCoord::new(i64::MIN, 0, 0).distance(ChunkCoord::new(i64::MAX, 0, 0)), u64::MAX);
    }

    #[test]
    fn concurrent_loads_register_once() {
        let store = Arc::new(ChunkStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.load_chunk(ChunkCoord::new(i % 5, 0, 0));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.chunks.len(), 5);
        assert_eq!(store.loaded_chunks().len(), 5);
    }

    #[test]
    fn snapshot_lists_every_entity() {
        let store = ChunkStore::new();
        let chunk = store.load_chunk(ChunkCoord::new(0, 1, 0));
        chunk.add_entity(Entity::new(1, DVec3::ZERO));
        chunk.add_entity(Entity::new(2, DVec3::X));
        let res = proto::Response::decode(chunk.snapshot()).unwrap();
        assert_eq!(res.r#type, response::Type::Chunk as i32);
        let c = res.chunk.unwrap();
        assert_eq!(c.location, Some(proto::AbsoluteLocation { x: 0, y: 1, z: 0 }));
        assert_eq!(c.entities.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);
    }
}
