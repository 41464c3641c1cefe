// src/world/entity.rs
// World objects and their mapping to wire messages and physics bodies

use glam::{DQuat, DVec3};

use super::chunk::ChunkCoord;
use crate::physics::{BodyHandle, BodyInit, WriteBack};
use crate::proto;

pub type EntityId = u64;

/// Globally unique address of an entity; the owner key of its physics body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub chunk: ChunkCoord,
    pub id: EntityId,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub position: DVec3,
    pub rotation: DQuat,
    pub velocity: DVec3,
    pub rotational_velocity: DVec3,
    pub bodies: Vec<proto::Body>,
    pub lights: Vec<proto::Light>,
    /// Mass of the unit box body
    pub mass: f64,
    /// Set once the simulation has registered a body for this entity
    pub body: Option<BodyHandle>,
}

impl Entity {
    pub fn new(id: EntityId, position: DVec3) -> Self {
        Self {
            id,
            position,
            rotation: DQuat::IDENTITY,
            velocity: DVec3::ZERO,
            rotational_velocity: DVec3::ZERO,
            bodies: Vec::new(),
            lights: Vec::new(),
            mass: 1.0,
            body: None,
        }
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_body(mut self, body: proto::Body) -> Self {
        self.bodies.push(body);
        self
    }

    pub fn with_light(mut self, light: proto::Light) -> Self {
        self.lights.push(light);
        self
    }

    pub fn body_init(&self) -> BodyInit {
        BodyInit {
            position: self.position,
            linear_velocity: self.velocity,
            angular_velocity: self.rotational_velocity,
            mass: self.mass,
        }
    }

    /// Copy the post-step body state onto the entity
    pub fn apply(&mut self, wb: &WriteBack<EntityKey>) {
        self.position = wb.position;
        self.velocity = wb.linear_velocity;
        self.rotational_velocity = wb.angular_velocity;
        self.rotation = wb.orientation;
    }

    pub fn to_proto(&self) -> proto::Entity {
        proto::Entity {
            id: self.id,
            location: Some(self.position.into()),
            rotation: Some(self.rotation.into()),
            velocity: Some(self.velocity.into()),
            rotational_velocity: Some(self.rotational_velocity.into()),
            bodies: self.bodies.clone(),
            lights: self.lights.clone(),
        }
    }

    pub fn to_update(&self) -> proto::Update {
        proto::Update {
            entity_id: self.id,
            position: Some(self.position.into()),
            rotation: Some(self.rotation.into()),
            velocity: Some(self.velocity.into()),
            rotational_velocity: Some(self.rotational_velocity.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_copies_every_field() {
        let mut e = Entity::new(3, DVec3::ZERO);
        let wb = WriteBack {
            owner: EntityKey { chunk: ChunkCoord::default(), id: 3 },
            position: DVec3::new(1.0, 2.0, 3.0),
            linear_velocity: DVec3::new(0.5, 0.0, 0.0),
            angular_velocity: DVec3::new(0.0, 0.1, 0.0),
            orientation: DQuat::from_rotation_y(0.3),
        };
        e.apply(&wb);
        let u = e.to_update();
        assert_eq!(u.entity_id, 3);
        assert_eq!(u.position, Some(proto::RelativeLocation { x: 1.0, y: 2.0, z: 3.0 }));
        assert_eq!(u.velocity, Some(proto::Vector { x: 0.5, y: 0.0, z: 0.0 }));
        assert_eq!(u.rotation, Some(wb.orientation.into()));
    }
}
