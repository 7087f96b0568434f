// src/physics.rs
//
// Rigid-body world for the race: rapier3d with every car locked to the XY
// plane (Z up, yaw only). The world never decides forces itself; Race hands
// it each car's AppliedForce list before stepping and reads BodyState back.

use std::collections::HashMap;
use std::sync::Mutex;

use rapier3d::prelude::*;
use tracing::{debug, warn};

use crate::tire::AppliedForce;
use crate::vehicle::{BodyState, CarDescription, METERS_PER_UNIT};

/// Collider height; irrelevant to the planar motion.
const BODY_HALF_HEIGHT: Real = 5.0;

/// Contact impulse felt by one body during the last step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactImpulse {
    pub body: RigidBodyHandle,
    pub other: Option<RigidBodyHandle>,
    pub impulse: Real,
}

#[derive(Debug, Clone, Copy)]
struct BodyLimits {
    max_speed: Real,
    home: Isometry<Real>,
}

/// Collects contact-force events during `pipeline.step`.
#[derive(Default)]
struct ContactCollector {
    pairs: Mutex<Vec<(ColliderHandle, ColliderHandle, Real)>>,
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
    }

    fn handle_contact_force_event(
        &self,
        dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        contact_pair: &ContactPair,
        total_force_magnitude: Real,
    ) {
        if let Ok(mut pairs) = self.pairs.lock() {
            pairs.push((contact_pair.collider1, contact_pair.collider2, total_force_magnitude * dt));
        }
    }
}

fn isometry(location: Point<Real>, angle_deg: Real) -> Isometry<Real> {
    Isometry::new(vector![location.x, location.y, 0.0], vector![0.0, 0.0, angle_deg.to_radians()])
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    limits: HashMap<RigidBodyHandle, BodyLimits>,
    /// Bodies beyond this |x| or |y| are considered exploded.
    pub extent: Real,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(vector![0.0, 0.0, -9.81 / METERS_PER_UNIT])
    }
}

impl PhysicsWorld {
    pub fn new(gravity: Vector<Real>) -> Self {
        Self {
            gravity,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            limits: HashMap::new(),
            extent: 100_000.0,
        }
    }

    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    // --------------------------------------------------
    // car bodies
    // --------------------------------------------------

    pub fn create_car_body(&mut self, desc: &CarDescription, location: Point<Real>, angle_deg: Real) -> RigidBodyHandle {
        let home = isometry(location, angle_deg);
        let inertia = desc.moment_of_inertia;

        let rb = RigidBodyBuilder::dynamic()
            .position(home)
            .enabled_translations(true, true, false)
            .enabled_rotations(false, false, true)
            .angular_damping(desc.rotation_friction)
            .additional_mass_properties(MassProperties::new(
                point![0.0, 0.0, 0.0],
                desc.mass,
                vector![inertia, inertia, inertia],
            ))
            .build();
        let handle = self.bodies.insert(rb);

        let collider = ColliderBuilder::cuboid(desc.length * 0.5, desc.width * 0.5, BODY_HALF_HEIGHT)
            .density(0.0)
            .restitution(desc.restitution)
            .friction(0.5)
            .active_events(ActiveEvents::CONTACT_FORCE_EVENTS)
            .contact_force_event_threshold(0.0)
            .build();
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);

        self.limits.insert(handle, BodyLimits { max_speed: desc.max_linear_velocity, home });
        debug!(?handle, x = location.x, y = location.y, angle_deg, "car body created");
        handle
    }

    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.limits.remove(&handle);
        self.bodies.remove(
            handle,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            true,
        );
    }

    pub fn body_state(&self, handle: RigidBodyHandle) -> Option<BodyState> {
        let body = self.bodies.get(handle)?;
        let t = body.translation();
        Some(BodyState {
            location: point![t.x, t.y, 0.0],
            velocity: vector![body.linvel().x, body.linvel().y, 0.0],
            angle_deg: body.rotation().scaled_axis().z.to_degrees(),
            angular_velocity: body.angvel().z,
        })
    }

    pub fn angular_velocity(&self, handle: RigidBodyHandle) -> Option<Real> {
        self.bodies.get(handle).map(|b| b.angvel().z)
    }

    /// Replace the body's user forces with `forces` for the next step.
    pub fn apply_forces(&mut self, handle: RigidBodyHandle, forces: &[AppliedForce]) {
        let Some(body) = self.bodies.get_mut(handle) else {
            return;
        };
        body.reset_forces(true);
        for f in forces {
            if !f.force.iter().all(|c| c.is_finite()) {
                continue;
            }
            match f.at {
                Some(point) => body.add_force_at_point(f.force, point, true),
                None => body.add_force(f.force, true),
            }
        }
    }

    /// Teleport with zero velocity (stuck recovery, grid placement).
    pub fn reset_body(&mut self, handle: RigidBodyHandle, location: Point<Real>, angle_deg: Real) {
        let Some(body) = self.bodies.get_mut(handle) else {
            return;
        };
        body.set_position(isometry(location, angle_deg), true);
        body.set_linvel(Vector::zeros(), true);
        body.set_angvel(Vector::zeros(), true);
        body.reset_forces(true);
    }

    // --------------------------------------------------
    // step
    // --------------------------------------------------

    /// Integrate `dt` seconds and return the contact impulses of the step.
    pub fn step(&mut self, dt: Real) -> Vec<ContactImpulse> {
        let hooks = ();
        let events = ContactCollector::default();

        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters { dt, ..IntegrationParameters::default() },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            None,
            &hooks,
            &events,
        );

        self.enforce_limits();

        let pairs = events.pairs.into_inner().unwrap_or_default();
        let parent = |c: ColliderHandle| self.colliders.get(c).and_then(|c| c.parent());

        let mut impulses = Vec::with_capacity(pairs.len() * 2);
        for (c1, c2, impulse) in pairs {
            let (b1, b2) = (parent(c1), parent(c2));
            if let Some(body) = b1 {
                impulses.push(ContactImpulse { body, other: b2, impulse });
            }
            if let Some(body) = b2 {
                impulses.push(ContactImpulse { body, other: b1, impulse });
            }
        }
        impulses
    }

    // Safety: clamp speed, and put exploded bodies back where they were created.
    fn enforce_limits(&mut self) {
        for (handle, body) in self.bodies.iter_mut() {
            let Some(limits) = self.limits.get(&handle) else {
                continue;
            };

            let pos = *body.translation();
            let vel = *body.linvel();
            let bad = !pos.iter().all(|c| c.is_finite())
                || !vel.iter().all(|c| c.is_finite())
                || pos.x.abs() > self.extent
                || pos.y.abs() > self.extent;

            if bad {
                body.set_position(limits.home, true);
                body.set_linvel(Vector::zeros(), true);
                body.set_angvel(Vector::zeros(), true);
                body.reset_forces(true);
                warn!(?handle, home = ?limits.home.translation.vector, "reset exploding body");
                continue;
            }

            let speed = vel.norm();
            if limits.max_speed > 0.0 && speed > limits.max_speed {
                body.set_linvel(vel * (limits.max_speed / speed), true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::STANDARD_CAR;

    const DT: Real = 1.0 / 60.0;

    #[test]
    fn created_body_reports_its_pose() {
        let mut world = PhysicsWorld::default();
        let h = world.create_car_body(&STANDARD_CAR, point![100.0, 50.0, 0.0], 90.0);
        let state = world.body_state(h);
        let Some(state) = state else { panic!("body expected") };
        assert!((state.location.x - 100.0).abs() < 1e-4);
        assert!((state.angle_deg - 90.0).abs() < 1e-3);
        assert_eq!(state.velocity, Vector::zeros());
    }

    #[test]
    fn force_moves_body_in_plane_only() {
        let mut world = PhysicsWorld::default();
        let h = world.create_car_body(&STANDARD_CAR, point![0.0, 0.0, 0.0], 0.0);
        world.apply_forces(h, &[AppliedForce::at_com(vector![15_000.0, 0.0, 0.0])]);
        for _ in 0..30 {
            world.step(DT);
        }
        let Some(state) = world.body_state(h) else { panic!("body expected") };
        assert!(state.velocity.x > 1.0);
        let z = world.bodies.get(h).map(|b| b.translation().z);
        assert_eq!(z, Some(0.0));
    }

    #[test]
    fn off_centre_force_yaws_only() {
        let mut world = PhysicsWorld::default();
        let h = world.create_car_body(&STANDARD_CAR, point![0.0, 0.0, 0.0], 0.0);
        world.apply_forces(h, &[AppliedForce::at_point(vector![0.0, 5_000.0, 0.0], point![10.0, 0.0, 0.0])]);
        world.step(DT);
        let Some(spin) = world.angular_velocity(h) else { panic!("body expected") };
        assert!(spin > 0.0);
        let angvel = world.bodies.get(h).map(|b| *b.angvel()).unwrap_or_default();
        assert!(angvel.x.abs() < 1e-6 && angvel.y.abs() < 1e-6);
    }

    #[test]
    fn speed_is_clamped() {
        let mut world = PhysicsWorld::default();
        let desc = CarDescription { max_linear_velocity: 10.0, ..STANDARD_CAR };
        let h = world.create_car_body(&desc, point![0.0, 0.0, 0.0], 0.0);
        world.apply_forces(h, &[AppliedForce::at_com(vector![1.0e6, 0.0, 0.0])]);
        for _ in 0..30 {
            world.step(DT);
        }
        let speed = world.body_state(h).map(|s| s.velocity.norm()).unwrap_or_default();
        assert!(speed <= 10.0 + 1e-3);
        assert!(speed > 9.0);
    }

    #[test]
    fn exploded_body_goes_home() {
        let mut world = PhysicsWorld::default();
        world.extent = 50.0;
        let h = world.create_car_body(&STANDARD_CAR, point![10.0, 10.0, 0.0], 0.0);
        if let Some(body) = world.bodies.get_mut(h) {
            body.set_translation(vector![500.0, 10.0, 0.0], true);
        }
        world.step(DT);
        let Some(state) = world.body_state(h) else { panic!("body expected") };
        assert!((state.location.x - 10.0).abs() < 1e-3);
        assert_eq!(state.velocity, Vector::zeros());
    }

    #[test]
    fn colliding_cars_report_impulses() {
        let mut world = PhysicsWorld::default();
        let a = world.create_car_body(&STANDARD_CAR, point![0.0, 0.0, 0.0], 0.0);
        let b = world.create_car_body(&STANDARD_CAR, point![60.0, 0.0, 0.0], 0.0);
        world.apply_forces(a, &[AppliedForce::at_com(vector![200_000.0, 0.0, 0.0])]);
        world.apply_forces(b, &[AppliedForce::at_com(vector![-200_000.0, 0.0, 0.0])]);

        let mut seen = Vec::new();
        for _ in 0..120 {
            seen.extend(world.step(DT));
        }
        assert!(seen.iter().any(|c| c.body == a && c.other == Some(b) && c.impulse > 0.0));
        assert!(seen.iter().any(|c| c.body == b && c.other == Some(a)));
    }

    #[test]
    fn reset_and_remove() {
        let mut world = PhysicsWorld::default();
        let h = world.create_car_body(&STANDARD_CAR, point![0.0, 0.0, 0.0], 0.0);
        world.apply_forces(h, &[AppliedForce::at_com(vector![50_000.0, 0.0, 0.0])]);
        world.step(DT);
        world.reset_body(h, point![300.0, 200.0, 0.0], 45.0);
        let Some(state) = world.body_state(h) else { panic!("body expected") };
        assert!((state.location.y - 200.0).abs() < 1e-4);
        assert!((state.angle_deg - 45.0).abs() < 1e-3);
        assert_eq!(state.velocity, Vector::zeros());

        world.remove_body(h);
        assert_eq!(world.num_bodies(), 0);
        assert!(world.body_state(h).is_none());
    }
}
