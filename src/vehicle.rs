// ==============================================================================
// vehicle.rs — CAR BODY: INTENTS -> FORCES, WEAR, DAMAGE, ROUTE TELEMETRY
// ------------------------------------------------------------------------------
// A Car never touches the world directly. It:
// - caches kinematics from a BodyState once per step (on_step_time)
// - turns steer/accelerate/brake intents into tire angle + pending forces
// - on collect_forces(), adds resistance + the four tires' grip forces
// The world then applies the returned AppliedForce list to the rigid body.
//
// World units are track pixels (METERS_PER_UNIT metres each): positions,
// velocities and gravity all live in u, u/s and u/s^2. Only the displayed
// km/h goes back through metres.
// ==============================================================================

use rapier3d::prelude::{Point, Real, RigidBodyHandle, Vector, point, vector};
use serde::{Deserialize, Serialize};

use crate::tire::{AppliedForce, Tire, TireContext, WheelId, tire_location, unit_from_deg};

/// Max front tire angle (degrees) at control 1.0.
pub const MAX_TIRE_ANGLE: Real = 15.0;
/// Human steering: fraction of the remaining gap closed per step.
pub const HUMAN_STEER_SMOOTHING: Real = 0.15;
/// Length of one world unit (one track pixel).
pub const METERS_PER_UNIT: Real = 0.05;
/// World speed (u/s) -> displayed km/h. The 2.5 is game feel, not a unit conversion.
pub const KMH_FACTOR: Real = METERS_PER_UNIT * 3.6 * 2.5;
/// Below this (km/h) a brake request turns into reverse.
pub const REVERSE_ENTRY_KMH: Real = 1.0;
/// Reverse is driven until this (negative) speed.
pub const MAX_REVERSE_KMH: Real = -25.0;
/// Single damage amount above which a hard crash is flagged.
pub const HARD_CRASH_DAMAGE: Real = 3.5;
pub const INITIAL_DAMAGE_CAPACITY: Real = 100.0;

const WEAR_BRAKE_AND_TURN: Real = 0.05;
const WEAR_OFF_TRACK: Real = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarDescription {
    pub mass: Real,                 // kg
    pub moment_of_inertia: Real,    // kg*u^2 around Z
    pub restitution: Real,          // 0..1
    pub power: Real,                // kg*u^2/s^3 (force * speed)
    pub max_linear_velocity: Real,  // u/s, enforced by the world
    pub acceleration_friction: Real,// traction limit coefficient
    pub drag_linear: Real,
    pub drag_quadratic: Real,
    pub rolling_friction_on_track: Real,
    pub rolling_friction_off_track: Real,
    pub rotation_friction: Real,    // angular damping of the body
    pub tire_friction_on_track: Real,
    pub tire_friction_off_track: Real,
    pub wheelspin_grip: Real,       // rear lateral grip while spinning
    pub tire_wear_capacity: Real,   // 0..100

    // --- Geometry ---
    pub length: Real,               // u
    pub width: Real,                // u
}

// Top speed ~600 u/s (~270 km/h displayed), limited by drag + rolling.
pub const STANDARD_CAR: CarDescription = CarDescription {
    mass: 1500.0,
    moment_of_inertia: 1500.0 * 200.0, // solid 40 x 20 box is m * 167
    restitution: 0.05,
    power: 3.0e7,
    max_linear_velocity: 1000.0,
    acceleration_friction: 0.75,
    drag_linear: 1.0,
    drag_quadratic: 0.05,
    rolling_friction_on_track: 0.1,
    rolling_friction_off_track: 0.3,
    rotation_friction: 1.0,
    tire_friction_on_track: 0.9,
    tire_friction_off_track: 0.6,
    wheelspin_grip: 0.75,
    tire_wear_capacity: 100.0,

    length: 40.0,
    width: 20.0,
};

impl Default for CarDescription {
    fn default() -> Self {
        STANDARD_CAR
    }
}

impl CarDescription {
    /// Car-local tire mounts (+X forward, +Y left).
    pub fn tire_mount(&self, wheel: WheelId) -> Vector<Real> {
        let x = if wheel.is_front() { self.length * 0.3 } else { -self.length * 0.3 };
        let y = if wheel.is_left() { self.width * 0.4 } else { -self.width * 0.4 };
        vector![x, y, 0.0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Steer {
    #[default]
    Neutral,
    Left,
    Right,
}

/// Latest control state from a human driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverInput {
    pub throttle: f32, // 0..1
    pub brake: f32,    // 0..1
    pub steer: f32,    // -1 (full left) .. 1 (full right)
}

/// Post-integration body state read back from the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub location: Point<Real>,
    pub velocity: Vector<Real>,
    pub angle_deg: Real,
    pub angular_velocity: Real, // rad/s around +Z
}

#[derive(Debug, Clone)]
pub struct Car {
    index: usize,
    is_human: bool,
    desc: CarDescription,
    body: Option<RigidBodyHandle>,
    tires: [Tire; 4],

    // cached each step
    location: Point<Real>,
    velocity: Vector<Real>,
    angle_deg: Real,
    angular_velocity: Real,
    dx: Real,
    dy: Real,
    abs_speed: Real,
    speed_in_kmh: Real,
    gravity_z: Real,
    step_ms: u32,

    // intents
    steer: Steer,
    tire_angle: Real,
    accelerating: bool,
    braking: bool,
    reverse: bool,
    skidding: bool,
    left_side_off_track: bool,
    right_side_off_track: bool,

    damage_capacity: Real,
    tire_wear_capacity: Real,
    hard_crash: bool,

    current_target_node_index: usize,
    prev_target_node_index: usize,
    next_target_node_index: usize,
    route_progression: u32,

    pending: Vec<AppliedForce>,
}

impl Car {
    pub fn new(index: usize, desc: CarDescription, is_human: bool) -> Self {
        let tires = WheelId::ALL.map(|wheel| {
            Tire::new(
                wheel,
                desc.tire_mount(wheel),
                desc.tire_friction_on_track,
                desc.tire_friction_off_track,
            )
        });

        Self {
            index,
            is_human,
            desc,
            body: None,
            tires,
            location: point![0.0, 0.0, 0.0],
            velocity: Vector::zeros(),
            angle_deg: 0.0,
            angular_velocity: 0.0,
            dx: 1.0,
            dy: 0.0,
            abs_speed: 0.0,
            speed_in_kmh: 0.0,
            gravity_z: 0.0,
            step_ms: 0,
            steer: Steer::Neutral,
            tire_angle: 0.0,
            accelerating: false,
            braking: false,
            reverse: false,
            skidding: false,
            left_side_off_track: false,
            right_side_off_track: false,
            damage_capacity: INITIAL_DAMAGE_CAPACITY,
            tire_wear_capacity: desc.tire_wear_capacity,
            hard_crash: false,
            current_target_node_index: 0,
            prev_target_node_index: 0,
            next_target_node_index: 0,
            route_progression: 0,
            pending: Vec::new(),
        }
    }

    pub fn index(&self) -> usize { self.index }
    pub fn is_human(&self) -> bool { self.is_human }
    pub fn description(&self) -> &CarDescription { &self.desc }
    pub fn body(&self) -> Option<RigidBodyHandle> { self.body }

    /// Placed cars have a body in the world.
    pub fn is_placed(&self) -> bool {
        self.body.is_some()
    }

    /// Attach to a freshly created world body and take its initial state.
    pub fn attach(&mut self, body: RigidBodyHandle, state: &BodyState, gravity: Vector<Real>) {
        self.body = Some(body);
        self.gravity_z = gravity.z;
        self.sync_body(state);
    }

    pub fn detach(&mut self) -> Option<RigidBodyHandle> {
        self.pending.clear();
        self.body.take()
    }

    /// Refresh cached kinematics without advancing wear.
    pub fn sync_body(&mut self, state: &BodyState) {
        self.location = state.location;
        self.velocity = state.velocity;
        self.angle_deg = state.angle_deg;
        self.angular_velocity = state.angular_velocity;

        let rad = self.angle_deg.to_radians();
        self.dx = rad.cos();
        self.dy = rad.sin();

        self.abs_speed = self.velocity.norm();
        let forward = self.velocity.x * self.dx + self.velocity.y * self.dy;
        self.speed_in_kmh = forward * KMH_FACTOR;
    }

    // ==========================================================================
    // Per-step bookkeeping
    // ==========================================================================

    pub fn on_step_time(&mut self, step_ms: u32, state: &BodyState, gravity: Vector<Real>) {
        self.step_ms = step_ms;
        self.gravity_z = gravity.z;
        self.sync_body(state);

        if self.is_human {
            if self.braking && self.steer != Steer::Neutral {
                self.wear_out_tires(step_ms, WEAR_BRAKE_AND_TURN);
            }
            if self.left_side_off_track || self.right_side_off_track {
                self.wear_out_tires(step_ms, WEAR_OFF_TRACK);
            }
        }

        let (left, right) = (self.left_side_off_track, self.right_side_off_track);
        for tire in &mut self.tires {
            tire.set_is_off_track(if tire.wheel().is_left() { left } else { right });
        }
    }

    fn wear_out_tires(&mut self, step_ms: u32, factor: Real) {
        let wear = self.abs_speed * step_ms as Real * factor / 1000.0;
        self.tire_wear_capacity = (self.tire_wear_capacity - wear).clamp(0.0, self.desc.tire_wear_capacity);
    }

    pub fn clear_statuses(&mut self) {
        self.accelerating = false;
        self.braking = false;
        self.reverse = false;
        self.skidding = false;
    }

    // ==========================================================================
    // Intents
    // ==========================================================================

    pub fn steer(&mut self, direction: Steer, control: Real) {
        match direction {
            Steer::Neutral => self.tire_angle = 0.0,
            Steer::Left | Steer::Right => {
                let sign = if direction == Steer::Left { 1.0 } else { -1.0 };
                let max_angle = MAX_TIRE_ANGLE * sign;
                if self.is_human {
                    self.tire_angle += (max_angle - self.tire_angle) * HUMAN_STEER_SMOOTHING;
                } else {
                    self.tire_angle = max_angle * control;
                }
            }
        }
        self.steer = direction;
    }

    /// Engine force along the heading (or against it when `deccelerate`),
    /// limited by traction and engine power.
    pub fn accelerate(&mut self, deccelerate: bool) {
        self.accelerating = true;
        self.braking = false;
        self.reverse = deccelerate;

        let friction_limit =
            self.desc.mass * self.desc.acceleration_friction * self.gravity_z.abs() * self.damage_factor();

        let mut force = friction_limit;
        self.skidding = true;
        if self.abs_speed > 0.0 {
            let power_limit = self.desc.power / self.abs_speed;
            if power_limit < friction_limit {
                force = power_limit;
                self.skidding = false;
            }
        }

        let sign = if deccelerate { -1.0 } else { 1.0 };
        let direction = vector![self.dx, self.dy, 0.0] * sign;
        self.pending.push(AppliedForce::at_com(direction * force));
    }

    /// Brake, or drive backwards once (nearly) stopped.
    pub fn brake(&mut self) {
        self.accelerating = false;

        if self.speed_in_kmh < REVERSE_ENTRY_KMH {
            self.reverse = true;
        }

        if self.reverse && self.speed_in_kmh > MAX_REVERSE_KMH {
            self.accelerate(true);
        } else {
            self.braking = true;
        }
    }

    /// Human control mapping: steer sign picks the side, magnitude is ignored
    /// (human steering is smoothed); brake wins over throttle.
    pub fn apply_input(&mut self, input: &DriverInput) {
        self.clear_statuses();

        const DEAD: f32 = 0.05;
        if input.steer > DEAD {
            self.steer(Steer::Right, input.steer.min(1.0));
        } else if input.steer < -DEAD {
            self.steer(Steer::Left, (-input.steer).min(1.0));
        } else {
            self.steer(Steer::Neutral, 0.0);
        }

        if input.brake > 0.5 {
            self.brake();
        } else if input.throttle > 0.5 {
            self.accelerate(false);
        }
    }

    // ==========================================================================
    // Force output
    // ==========================================================================

    /// Drain this step's forces: engine (queued by intents), resistance,
    /// and every tire's grip.
    pub fn collect_forces(&mut self) -> Vec<AppliedForce> {
        let mut forces = std::mem::take(&mut self.pending);
        self.push_resistance(&mut forces);

        let spinning = self.accelerating && self.skidding;
        let wheelspin_grip = self.desc.wheelspin_grip;
        for tire in &mut self.tires {
            let coeff = if spinning && tire.wheel().is_rear() { wheelspin_grip } else { 1.0 };
            tire.set_spin_coeff(coeff);
        }

        let spin = vector![0.0, 0.0, self.angular_velocity];
        for tire in &self.tires {
            let location = tire_location(self.location, self.angle_deg, tire.mount());
            // contact point velocity: the yaw rate is what the rear tires resist
            let velocity = self.velocity + spin.cross(&(location - self.location));
            let ctx = TireContext {
                velocity,
                mass: self.desc.mass,
                gravity_z: self.gravity_z,
                facing_deg: self.tire_facing(tire.wheel()),
                location,
                braking: self.braking,
                tire_wear_factor: self.tire_wear_factor(),
                step_ms: self.step_ms,
            };
            tire.step_forces(&ctx, &mut forces);
        }
        forces
    }

    fn push_resistance(&self, out: &mut Vec<AppliedForce>) {
        let v = self.abs_speed;
        if v <= 0.0 {
            return;
        }
        let v_hat = self.velocity / v;

        let drag = self.desc.drag_linear * v + self.desc.drag_quadratic * v * v;

        let mu = if self.left_side_off_track || self.right_side_off_track {
            self.desc.rolling_friction_off_track
        } else {
            self.desc.rolling_friction_on_track
        };
        let mut rolling = mu * self.desc.mass * self.gravity_z.abs();
        if self.step_ms > 0 {
            // never reverse the car within one step
            let stop = self.desc.mass * v / (self.step_ms as Real / 1000.0);
            rolling = rolling.min(stop);
        }

        out.push(AppliedForce::at_com(-v_hat * (drag + rolling)));
    }

    fn tire_facing(&self, wheel: WheelId) -> Real {
        if wheel.is_front() { self.angle_deg + self.tire_angle } else { self.angle_deg }
    }

    // ==========================================================================
    // Damage / wear
    // ==========================================================================

    pub fn add_damage(&mut self, amount: Real) {
        if amount.is_nan() || amount <= 0.0 {
            return;
        }
        if amount > HARD_CRASH_DAMAGE {
            self.hard_crash = true;
        }
        self.damage_capacity = (self.damage_capacity - amount).clamp(0.0, INITIAL_DAMAGE_CAPACITY);
    }

    /// Edge-triggered: true once per qualifying impact.
    pub fn had_hard_crash(&mut self) -> bool {
        std::mem::take(&mut self.hard_crash)
    }

    pub fn damage_factor(&self) -> Real {
        0.7 + 0.3 * self.damage_capacity / INITIAL_DAMAGE_CAPACITY
    }

    pub fn tire_wear_factor(&self) -> Real {
        if self.desc.tire_wear_capacity <= 0.0 {
            return 0.5;
        }
        0.5 + 0.5 * self.tire_wear_capacity / self.desc.tire_wear_capacity
    }

    pub fn damage_capacity(&self) -> Real { self.damage_capacity }
    pub fn tire_wear_capacity(&self) -> Real { self.tire_wear_capacity }

    /// Remaining fraction, 1.0 = intact.
    pub fn damage_level(&self) -> Real {
        self.damage_capacity / INITIAL_DAMAGE_CAPACITY
    }

    /// Remaining fraction, 1.0 = fresh tires.
    pub fn tire_wear_level(&self) -> Real {
        if self.desc.tire_wear_capacity <= 0.0 {
            return 0.0;
        }
        self.tire_wear_capacity / self.desc.tire_wear_capacity
    }

    // ==========================================================================
    // Telemetry
    // ==========================================================================

    pub fn location(&self) -> Point<Real> { self.location }
    pub fn velocity(&self) -> Vector<Real> { self.velocity }
    pub fn angle(&self) -> Real { self.angle_deg }
    /// rad/s, counter-clockwise positive.
    pub fn angular_velocity(&self) -> Real { self.angular_velocity }
    pub fn direction(&self) -> Vector<Real> { unit_from_deg(self.angle_deg) }
    pub fn abs_speed(&self) -> Real { self.abs_speed }
    /// Signed: negative while rolling backwards.
    pub fn speed_in_kmh(&self) -> Real { self.speed_in_kmh }
    pub fn tire_angle(&self) -> Real { self.tire_angle }
    pub fn steer_direction(&self) -> Steer { self.steer }
    pub fn is_accelerating(&self) -> bool { self.accelerating }
    pub fn is_braking(&self) -> bool { self.braking }
    pub fn is_reversing(&self) -> bool { self.reverse }
    pub fn is_skidding(&self) -> bool { self.skidding }

    pub fn tire(&self, wheel: WheelId) -> &Tire {
        &self.tires[wheel.index()]
    }

    pub fn tire_world_location(&self, wheel: WheelId) -> Point<Real> {
        tire_location(self.location, self.angle_deg, self.tire(wheel).mount())
    }

    pub fn left_side_off_track(&self) -> bool { self.left_side_off_track }
    pub fn right_side_off_track(&self) -> bool { self.right_side_off_track }
    pub fn set_left_side_off_track(&mut self, flag: bool) { self.left_side_off_track = flag; }
    pub fn set_right_side_off_track(&mut self, flag: bool) { self.right_side_off_track = flag; }

    pub fn current_target_node_index(&self) -> usize { self.current_target_node_index }
    pub fn prev_target_node_index(&self) -> usize { self.prev_target_node_index }
    pub fn next_target_node_index(&self) -> usize { self.next_target_node_index }
    pub fn set_current_target_node_index(&mut self, index: usize) { self.current_target_node_index = index; }
    pub fn set_prev_target_node_index(&mut self, index: usize) { self.prev_target_node_index = index; }
    pub fn set_next_target_node_index(&mut self, index: usize) { self.next_target_node_index = index; }
    pub fn route_progression(&self) -> u32 { self.route_progression }
    pub fn set_route_progression(&mut self, progression: u32) { self.route_progression = progression; }
}
