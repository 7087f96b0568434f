// ==============================================================================
// grip.rs — PER-WHEEL GRIP MODEL (FORCE DOMAIN)
// ==============================================================================
// Every step a tire pushes two forces onto its car, both at the contact point:
//
//   lateral:  F_lat   = proj(v̂, side) * μ * spin * |g_z| * m
//   braking:  F_brake = v̂ * μ * |g_z| * m * wear * 0.25     (only while braking)
//
// and the world applies -F for each. side is the tire heading rotated by +90°,
// μ is the on-track or off-track coefficient selected by the off-track flag,
// v is the velocity of the contact point (so a yawing car is damped).
//
// This is a grip budget, not a reaction force derived from slip. The behavior
// that matters: more grip on track than off track, proportional to load.
// ==============================================================================
// Cardinal Rules
// ==============================================================================
// - Zero velocity => no force at all.
// - Braking opposes vehicle motion, not wheel heading.
// - With a known step length neither force may reverse the motion it
//   opposes within that step (each tire owns a quarter of the momentum).
// ==============================================================================

use rapier3d::prelude::{Point, Real, Vector};

use crate::tire::types::{AppliedForce, TireContext, WheelId, cap_norm, project, rotate_deg, unit_from_deg};

/// Per-wheel quarter-load share used by the braking term.
pub const BRAKE_LOAD_SHARE: Real = 0.25;

#[derive(Debug, Clone, Copy)]
pub struct Tire {
    wheel: WheelId,
    mount: Vector<Real>, // car-local offset from the car centre
    friction: Real,
    off_track_friction: Real,
    is_off_track: bool,
    spin_coeff: Real,
}

impl Tire {
    pub fn new(wheel: WheelId, mount: Vector<Real>, friction: Real, off_track_friction: Real) -> Self {
        Self {
            wheel,
            mount,
            friction,
            off_track_friction,
            is_off_track: false,
            spin_coeff: 1.0,
        }
    }

    pub fn wheel(&self) -> WheelId {
        self.wheel
    }

    pub fn mount(&self) -> Vector<Real> {
        self.mount
    }

    /// Takes effect on the next step.
    pub fn set_is_off_track(&mut self, flag: bool) {
        self.is_off_track = flag;
    }

    pub fn is_off_track(&self) -> bool {
        self.is_off_track
    }

    pub fn set_spin_coeff(&mut self, coeff: Real) {
        self.spin_coeff = coeff.clamp(0.0, 1.0);
    }

    pub fn spin_coeff(&self) -> Real {
        self.spin_coeff
    }

    /// Coefficient selected by the off-track flag.
    pub fn active_friction(&self) -> Real {
        if self.is_off_track { self.off_track_friction } else { self.friction }
    }

    /// Push this step's grip forces into `out`.
    pub fn step_forces(&self, ctx: &TireContext, out: &mut Vec<AppliedForce>) {
        let speed = ctx.velocity.norm();
        if speed <= 0.0 || !speed.is_finite() {
            return;
        }

        let side = unit_from_deg(ctx.facing_deg + 90.0);
        let v_hat = ctx.velocity / speed;
        let load = ctx.gravity_z.abs() * ctx.mass;
        let mu = self.active_friction();

        // FIXME physics: grip budget, not a true reaction force
        let lateral = project(v_hat, side) * mu * self.spin_coeff * load;
        let lateral = cap_norm(lateral, ctx.stop_limit(ctx.velocity.dot(&side)));
        out.push(AppliedForce::at_point(-lateral, ctx.location));

        if ctx.braking {
            let braking = v_hat * mu * load * ctx.tire_wear_factor * BRAKE_LOAD_SHARE;
            let braking = cap_norm(braking, ctx.stop_limit(speed));
            out.push(AppliedForce::at_point(-braking, ctx.location));
        }
    }
}

/// World-space contact point of a tire mounted at `mount` on a car at
/// `car_location` heading `car_angle_deg`.
pub fn tire_location(car_location: Point<Real>, car_angle_deg: Real, mount: Vector<Real>) -> Point<Real> {
    car_location + rotate_deg(mount, car_angle_deg)
}
