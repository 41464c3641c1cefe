// src/world/mod.rs
// Authoritative world state: chunks, entities, the player registry, and the
// queue that hands new entities to the simulation for body registration.

pub mod chunk;
pub mod entity;
pub mod player;
pub mod session;
pub mod simulation;

pub use chunk::{Chunk, ChunkCoord, ChunkStore};
pub use entity::{Entity, EntityId, EntityKey};
pub use player::{Player, PlayerState};
pub use session::SessionManager;
pub use simulation::Simulation;

use dashmap::DashMap;
use glam::DVec3;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::assets::catalog::{AssetCatalog, MATERIAL_STONE, MESH_CYLINDER};
use crate::config::BOOTSTRAP_CHUNK;
use crate::physics::BodyInit;
use crate::proto::{self, body, light};
use crate::transports::PeerId;

/// Body registration queued for the next simulation tick
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    pub key: EntityKey,
    pub init: BodyInit,
}

pub struct World {
    chunk_size: f64,
    chunks: ChunkStore,
    players: DashMap<PeerId, Player>,
    next_entity: AtomicU64,
    registrations: mpsc::UnboundedSender<Registration>,
}

impl World {
    pub fn new(chunk_size: f64) -> (Self, mpsc::UnboundedReceiver<Registration>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let world = Self {
            chunk_size,
            chunks: ChunkStore::new(),
            players: DashMap::new(),
            next_entity: AtomicU64::new(1),
            registrations: tx,
        };
        (world, rx)
    }

    pub fn chunk_size(&self) -> f64 {
        self.chunk_size
    }

    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    pub fn players(&self) -> &DashMap<PeerId, Player> {
        &self.players
    }

    pub fn bootstrap_chunk(&self) -> ChunkCoord {
        BOOTSTRAP_CHUNK.into()
    }

    /// Place a fresh entity in `chunk` and queue its body for the simulation
    pub fn spawn_entity(&self, chunk: ChunkCoord, build: impl FnOnce(EntityId) -> Entity) -> EntityKey {
        let id = self.next_entity.fetch_add(1, Ordering::Relaxed);
        let entity = build(id);
        let key = EntityKey { chunk, id };
        let init = entity.body_init();
        self.chunks.load_chunk(chunk).add_entity(entity);
        if self.registrations.send(Registration { key, init }).is_err() {
            warn!(entity = id, chunk = %chunk, "Simulation gone, entity has no body");
        }
        key
    }

    /// Populate the bootstrap chunk with the starting voxel
    pub fn bootstrap(&self, catalog: &AssetCatalog) -> EntityKey {
        let geometry = catalog.mesh(MESH_CYLINDER).cloned().unwrap_or_default();
        // Unit box body, so mass equals the material density
        let mass = catalog
            .physical_properties(MATERIAL_STONE)
            .map_or(1.0, |p| p.density);
        let chunk = self.bootstrap_chunk();
        let key = self.spawn_entity(chunk, |id| {
            Entity::new(id, DVec3::ZERO)
                .with_mass(mass)
                .with_body(proto::Body {
                    r#type: body::Type::Mesh as i32,
                    mesh_id: MESH_CYLINDER,
                    vertices: geometry.vertices,
                    faces: geometry.faces,
                    material: MATERIAL_STONE,
                    flat_normals: true,
                    data: Vec::new(),
                })
                .with_light(proto::Light {
                    r#type: light::Type::PointLight as i32,
                    color: "#fff".into(),
                    intensity: 1.0,
                    position: Some(proto::RelativeLocation { x: -3.0, y: 10.0, z: 10.0 }),
                })
                .with_light(proto::Light {
                    r#type: light::Type::AmbientLight as i32,
                    color: "#fff".into(),
                    intensity: 0.5,
                    position: None,
                })
        });
        info!(chunk = %chunk, entity = key.id, "World bootstrapped");
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_places_voxel_and_queues_body() {
        let (world, mut rx) = World::new(500.0);
        let key = world.bootstrap(&AssetCatalog::builtin());
        assert_eq!(key.chunk, ChunkCoord::new(0, 0, 0));

        let chunk = world.chunks().get(key.chunk).unwrap();
        let state = chunk.lock();
        assert_eq!(state.entities.len(), 1);
        let voxel = &state.entities[0];
        assert_eq!(voxel.lights.len(), 2);
        assert_eq!(voxel.bodies[0].material, MATERIAL_STONE);
        assert!(!voxel.bodies[0].vertices.is_empty());

        let reg = rx.try_recv().unwrap();
        assert_eq!(reg.key, key);
        assert_eq!(reg.init.mass, 1.0);
    }

    #[test]
    fn entity_ids_are_unique_across_chunks() {
        let (world, _rx) = World::new(500.0);
        let a = world.spawn_entity(ChunkCoord::new(0, 0, 0), |id| Entity::new(id, DVec3::ZERO));
        let b = world.spawn_entity(ChunkCoord::new(1, 0, 0), |id| Entity::new(id, DVec3::ZERO));
        assert_ne!(a.id, b.id);
        assert_eq!(world.chunks().loaded_chunks().len(), 2);
    }
}
