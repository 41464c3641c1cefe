// src/physics/mod.rs
// Rigid-body world owned by the simulation tick, backed by rapier.
//
// Every body records the key of the world object it drives, so write-back
// never depends on insertion order.

use glam::{DQuat, DVec3};
use rapier3d_f64::prelude::*;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::debug;

/// Coulomb friction coefficient for every contact
pub const CONTACT_FRICTION: f64 = 0.1;
/// Half extent of the unit box collider
const HALF_EXTENT: f64 = 0.5;

#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    #[error("step size must be positive and finite, got {0:?}")]
    InvalidStep(Duration),

    #[error("solver needs at least one iteration")]
    NoSolverIterations,

    #[error("stale or unknown body handle {0:?}")]
    UnknownBody(BodyHandle),

    #[error("a body cannot be joined to itself")]
    SelfJoint,
}

/// Generation-checked reference to a body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(RigidBodyHandle);

#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    pub step: Duration,
    pub solver_iterations: u32,
    pub gravity: DVec3,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            step: Duration::from_secs_f64(1.0 / 60.0),
            solver_iterations: 20,
            gravity: DVec3::ZERO,
        }
    }
}

/// Initial state copied from a world object when its body is created
#[derive(Debug, Clone, Copy)]
pub struct BodyInit {
    pub position: DVec3,
    pub linear_velocity: DVec3,
    pub angular_velocity: DVec3,
    pub mass: f64,
}

impl Default for BodyInit {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            linear_velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
            mass: 1.0,
        }
    }
}

/// Body state after a step, addressed to the object that owns it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteBack<K> {
    pub owner: K,
    pub position: DVec3,
    pub linear_velocity: DVec3,
    pub angular_velocity: DVec3,
    pub orientation: DQuat,
}

#[derive(Debug, Clone)]
pub struct StepOutcome<K> {
    /// Colliding pairs with at least one active contact this step
    pub contacts: usize,
    pub write_back: Vec<WriteBack<K>>,
}

fn to_vector(v: DVec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

fn to_dvec(v: &Vector<Real>) -> DVec3 {
    DVec3::new(v.x, v.y, v.z)
}

pub struct PhysicsEngine<K> {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    owners: HashMap<RigidBodyHandle, K>,
    ticks: u64,
}

impl<K: Copy> PhysicsEngine<K> {
    pub fn new(config: PhysicsConfig) -> Result<Self, PhysicsError> {
        let dt = config.step.as_secs_f64();
        if !(dt.is_finite() && dt > 0.0) {
            return Err(PhysicsError::InvalidStep(config.step));
        }
        let iterations = NonZeroUsize::new(config.solver_iterations as usize)
            .ok_or(PhysicsError::NoSolverIterations)?;

        let mut params = IntegrationParameters::default();
        params.dt = dt;
        params.num_solver_iterations = iterations;

        debug!(dt, iterations = config.solver_iterations, "Physics world initialised");
        Ok(Self {
            gravity: to_vector(config.gravity),
            params,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            owners: HashMap::new(),
            ticks: 0,
        })
    }

    /// Register a dynamic body with a unit box collider for `owner`
    pub fn add_from_entity(&mut self, owner: K, init: BodyInit) -> BodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(to_vector(init.position))
            .linvel(to_vector(init.linear_velocity))
            .angvel(to_vector(init.angular_velocity))
            .build();
        let handle = self.bodies.insert(body);

        let collider = ColliderBuilder::cuboid(HALF_EXTENT, HALF_EXTENT, HALF_EXTENT)
            .mass(init.mass)
            .friction(CONTACT_FRICTION)
            .build();
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);

        self.owners.insert(handle, owner);
        BodyHandle(handle)
    }

    /// Current state of a body, `None` for stale handles
    pub fn body(&self, handle: BodyHandle) -> Option<WriteBack<K>> {
        let body = self.bodies.get(handle.0)?;
        let owner = *self.owners.get(&handle.0)?;
        Some(Self::snapshot(owner, body))
    }

    /// Tie two bodies together with a persistent fixed joint at their
    /// midpoint; the pair no longer collides
    pub fn join(&mut self, a: BodyHandle, b: BodyHandle) -> Result<(), PhysicsError> {
        if a == b {
            return Err(PhysicsError::SelfJoint);
        }
        let pa = self.bodies.get(a.0).ok_or(PhysicsError::UnknownBody(a))?.position();
        let pb = self.bodies.get(b.0).ok_or(PhysicsError::UnknownBody(b))?.position();

        let mid = Point::from((pa.translation.vector + pb.translation.vector) * 0.5);
        let mut joint: GenericJoint = FixedJointBuilder::new()
            .local_anchor1(pa.inverse_transform_point(&mid))
            .local_anchor2(pb.inverse_transform_point(&mid))
            .build()
            .into();
        joint.set_contacts_enabled(false);
        self.impulse_joints.insert(a.0, b.0, joint, true);
        Ok(())
    }

    fn snapshot(owner: K, body: &RigidBody) -> WriteBack<K> {
        let q = body.rotation().coords;
        WriteBack {
            owner,
            position: to_dvec(body.translation()),
            linear_velocity: to_dvec(body.linvel()),
            angular_velocity: to_dvec(body.angvel()),
            orientation: DQuat::from_xyzw(q.x, q.y, q.z, q.w),
        }
    }

    /// Advance one fixed step and report every body's new state.
    /// Contacts are recomputed from scratch each step; none carry over.
    pub fn step(&mut self) -> StepOutcome<K> {
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
        self.ticks += 1;

        let contacts = self
            .narrow_phase
            .contact_pairs()
            .filter(|pair| pair.has_any_active_contact)
            .count();

        let write_back = self
            .bodies
            .iter()
            .filter_map(|(handle, body)| {
                self.owners.get(&handle).map(|&owner| Self::snapshot(owner, body))
            })
            .collect();

        StepOutcome { contacts, write_back }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PhysicsEngine<u32> {
        PhysicsEngine::new(PhysicsConfig::default()).unwrap()
    }

    fn at(x: f64, vx: f64) -> BodyInit {
        BodyInit {
            position: DVec3::new(x, 0.0, 0.0),
            linear_velocity: DVec3::new(vx, 0.0, 0.0),
            ..Default::default()
        }
    }

    #[test]
    fn bad_config_is_fatal() {
        let cfg = PhysicsConfig { step: Duration::ZERO, ..Default::default() };
        assert!(matches!(PhysicsEngine::<u32>::new(cfg), Err(PhysicsError::InvalidStep(_))));
        let cfg = PhysicsConfig { solver_iterations: 0, ..Default::default() };
        assert!(matches!(PhysicsEngine::<u32>::new(cfg), Err(PhysicsError::NoSolverIterations)));
    }

    #[test]
    fn distant_bodies_get_no_contact() {
        let mut e = engine();
        e.add_from_entity(1, at(0.0, 0.0));
        e.add_from_entity(2, at(5.0, 0.0));
        assert_eq!(e.step().contacts, 0);
    }

    #[test]
    fn overlapping_bodies_get_a_contact() {
        let mut e = engine();
        e.add_from_entity(1, at(0.0, 0.0));
        e.add_from_entity(2, at(0.9, 0.0));
        assert_eq!(e.step().contacts, 1);
    }

    #[test]
    fn jointed_bodies_skip_collision() {
        let mut e = engine();
        let a = e.add_from_entity(1, at(0.0, 0.0));
        let b = e.add_from_entity(2, at(0.5, 0.0));
        e.join(a, b).unwrap();
        assert_eq!(e.step().contacts, 0);
        assert!(matches!(e.join(a, a), Err(PhysicsError::SelfJoint)));
    }

    #[test]
    fn head_on_collision_does_not_pass_through() {
        let mut e = engine();
        let a = e.add_from_entity(1, at(0.0, 1.0));
        let b = e.add_from_entity(2, at(0.95, -1.0));
        for _ in 0..30 {
            e.step();
        }
        let (a, b) = (e.body(a).unwrap(), e.body(b).unwrap());
        assert!(b.position.x > a.position.x, "bodies swapped sides");
        assert!(b.linear_velocity.x - a.linear_velocity.x > -0.5, "still closing");
    }

    #[test]
    fn write_back_matches_integrated_body() {
        let mut e = engine();
        let h = e.add_from_entity(7, BodyInit {
            position: DVec3::new(1.0, 2.0, 3.0),
            linear_velocity: DVec3::new(0.0, 6.0, 0.0),
            angular_velocity: DVec3::new(0.0, 1.0, 0.0),
            mass: 1.0,
        });
        let outcome = e.step();
        assert_eq!(outcome.write_back.len(), 1);
        let wb = outcome.write_back[0];
        assert_eq!(Some(wb), e.body(h));
        assert_eq!(wb.owner, 7);
        assert!((wb.position.y - (2.0 + 6.0 / 60.0)).abs() < 1e-6);
        assert!(wb.orientation.y > 0.0);
        assert_eq!(e.ticks(), 1);
    }
}
