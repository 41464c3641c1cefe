// src/world/simulation.rs
// Fixed-rate tick: register queued bodies, step physics, write back, broadcast

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{ChunkCoord, EntityKey, Registration, SessionManager, World};
use crate::physics::{PhysicsConfig, PhysicsEngine, PhysicsError, WriteBack};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub bodies: usize,
    pub contacts: usize,
    /// Update frames queued to players
    pub frames: usize,
}

pub struct Simulation {
    engine: PhysicsEngine<EntityKey>,
    registrations: mpsc::UnboundedReceiver<Registration>,
    world: Arc<World>,
    sessions: Arc<SessionManager>,
}

impl Simulation {
    pub fn new(
        config: PhysicsConfig,
        world: Arc<World>,
        sessions: Arc<SessionManager>,
        registrations: mpsc::UnboundedReceiver<Registration>,
    ) -> Result<Self, PhysicsError> {
        Ok(Self {
            engine: PhysicsEngine::new(config)?,
            registrations,
            world,
            sessions,
        })
    }

    /// Create bodies for entities spawned since the last tick
    fn register_pending(&mut self) {
        while let Ok(Registration { key, init }) = self.registrations.try_recv() {
            let handle = self.engine.add_from_entity(key, init);
            let Some(chunk) = self.world.chunks().get(key.chunk) else {
                warn!(chunk = %key.chunk, entity = key.id, "Body registered for missing chunk");
                continue;
            };
            let mut state = chunk.lock();
            if let Some(entity) = state.entities.iter_mut().find(|e| e.id == key.id) {
                entity.body = Some(handle);
            }
        }
    }

    /// Apply every write-back, taking each chunk lock once
    fn write_back(&self, records: &[WriteBack<EntityKey>]) {
        let mut by_chunk: HashMap<ChunkCoord, Vec<&WriteBack<EntityKey>>> = HashMap::new();
        for wb in records {
            by_chunk.entry(wb.owner.chunk).or_default().push(wb);
        }

        for (coord, records) in by_chunk {
            let Some(chunk) = self.world.chunks().get(coord) else {
                continue;
            };
            let mut state = chunk.lock();
            let index: HashMap<u64, usize> =
                state.entities.iter().enumerate().map(|(i, e)| (e.id, i)).collect();
            for wb in records {
                if let Some(&i) = index.get(&wb.owner.id) {
                    state.entities[i].apply(wb);
                }
            }
        }
    }

    /// One full tick. Write-back finishes before any update is built.
    pub fn tick(&mut self) -> TickReport {
        self.register_pending();
        let outcome = self.engine.step();
        self.write_back(&outcome.write_back);
        let frames = self.sessions.broadcast_updates();

        TickReport {
            bodies: outcome.write_back.len(),
            contacts: outcome.contacts,
            frames,
        }
    }

    pub async fn run(mut self, interval: Duration) {
        info!(interval_ms = interval.as_secs_f64() * 1000.0, "Simulation started");
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let report = self.tick();
            // roughly once a minute at 60 Hz
            if self.engine.ticks() % 3600 == 0 {
                debug!(
                    ticks = self.engine.ticks(),
                    bodies = report.bodies,
                    contacts = report.contacts,
                    frames = report.frames,
                    "Simulation heartbeat"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetCache, AssetCatalog, AssetStreamer};
    use crate::world::Entity;
    use glam::DVec3;

    fn setup() -> (Arc<World>, Simulation) {
        let (world, registrations) = World::new(500.0);
        let world = Arc::new(world);
        let assets = Arc::new(AssetStreamer::new(
            AssetCache::new(Duration::from_secs(60)),
            Arc::new(AssetCatalog::builtin()),
            std::env::temp_dir(),
        ));
        let sessions = Arc::new(SessionManager::new(world.clone(), assets));
        let sim = Simulation::new(PhysicsConfig::default(), world.clone(), sessions, registrations).unwrap();
        (world, sim)
    }

    #[test]
    fn entity_state_matches_body_after_tick() {
        let (world, mut sim) = setup();
        let key = world.spawn_entity(ChunkCoord::default(), |id| {
            let mut e = Entity::new(id, DVec3::new(1.0, 0.0, 0.0));
            e.velocity = DVec3::new(0.0, 0.0, 3.0);
            e
        });
        sim.tick();

        let chunk = world.chunks().get(key.chunk).unwrap();
        let state = chunk.lock();
        let entity = &state.entities[0];
        let body = sim.engine.body(entity.body.unwrap()).unwrap();
        assert_eq!(body.owner, key);
        assert_eq!(entity.position, body.position);
        assert_eq!(entity.velocity, body.linear_velocity);
        assert_eq!(entity.rotation, body.orientation);
        assert!(entity.position.z > 0.0);
    }

    #[test]
    fn write_back_follows_owner_not_insertion_order() {
        let (world, mut sim) = setup();
        let far = ChunkCoord::new(2, 0, 0);
        let a = world.spawn_entity(far, |id| Entity::new(id, DVec3::new(1000.0, 0.0, 0.0)));
        let b = world.spawn_entity(ChunkCoord::default(), |id| Entity::new(id, DVec3::new(0.0, 5.0, 0.0)));
        sim.tick();

        let pos = |k: EntityKey| world.chunks().get(k.chunk).unwrap().lock().entities[0].position;
        assert_eq!(pos(a), DVec3::new(1000.0, 0.0, 0.0));
        assert_eq!(pos(b), DVec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn overlapping_entities_report_a_contact() {
        let (world, mut sim) = setup();
        world.spawn_entity(ChunkCoord::default(), |id| Entity::new(id, DVec3::ZERO));
        world.spawn_entity(ChunkCoord::default(), |id| Entity::new(id, DVec3::new(0.5, 0.0, 0.0)));
        let report = sim.tick();
        assert_eq!(report.bodies, 2);
        assert_eq!(report.contacts, 1);
        assert_eq!(report.frames, 0);
    }
}
