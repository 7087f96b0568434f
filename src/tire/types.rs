//! Core shared types for the tire model (engine-agnostic).
// tire/types.rs
use std::fmt;
use rapier3d::prelude::{Point, Real, Vector, vector};

/// Unit vector in the XY plane at `deg` degrees (counter-clockwise from +X).
#[inline]
pub fn unit_from_deg(deg: Real) -> Vector<Real> {
    let rad = deg.to_radians();
    vector![rad.cos(), rad.sin(), 0.0]
}

/// Rotate a planar vector by `deg` degrees around +Z.
#[inline]
pub fn rotate_deg(v: Vector<Real>, deg: Real) -> Vector<Real> {
    let (s, c) = deg.to_radians().sin_cos();
    vector![v.x * c - v.y * s, v.x * s + v.y * c, v.z]
}

/// Projection of `v` onto the unit vector `axis`.
#[inline]
pub fn project(v: Vector<Real>, axis: Vector<Real>) -> Vector<Real> {
    axis * v.dot(&axis)
}

// ============================================
// Wheel identification
// ============================================

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum WheelId { FL, FR, RL, RR }

impl WheelId {
    pub const ALL: [WheelId; 4] = [WheelId::FL, WheelId::FR, WheelId::RL, WheelId::RR];

    pub fn as_str(&self) -> &'static str {
        match self {
            WheelId::FL => "FL",
            WheelId::FR => "FR",
            WheelId::RL => "RL",
            WheelId::RR => "RR",
        }
    }

    /// Slot in the car's fixed tire array.
    pub fn index(&self) -> usize {
        match self {
            WheelId::FL => 0,
            WheelId::FR => 1,
            WheelId::RL => 2,
            WheelId::RR => 3,
        }
    }

    pub fn is_front(&self) -> bool {
        matches!(self, WheelId::FL | WheelId::FR)
    }

    pub fn is_rear(&self) -> bool {
        matches!(self, WheelId::RL | WheelId::RR)
    }

    pub fn is_left(&self) -> bool {
        matches!(self, WheelId::FL | WheelId::RL)
    }
}

impl fmt::Display for WheelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// ----- per-step inputs / outputs ------------
// ============================================

/// Everything a tire needs to know about its car for one step.
#[derive(Debug, Clone, Copy)]
pub struct TireContext {
    pub velocity: Vector<Real>, // contact point velocity (world): car velocity + yaw
    pub mass: Real,             // full car mass
    pub gravity_z: Real,        // only |g_z| is used
    pub facing_deg: Real,       // tire heading (car heading + steering)
    pub location: Point<Real>,  // tire contact point (world)
    pub braking: bool,
    pub tire_wear_factor: Real, // 0.5..1.0
    pub step_ms: u32,           // 0 => uncapped
}

impl TireContext {
    /// Largest force this tire may spend against `speed` along one axis
    /// without reversing it within the step. None when the step is unknown.
    pub fn stop_limit(&self, speed: Real) -> Option<Real> {
        if self.step_ms == 0 {
            return None;
        }
        let dt = self.step_ms as Real / 1000.0;
        Some(self.mass * speed.abs() / dt * 0.25)
    }
}

/// Shorten `force` to at most `limit`.
#[inline]
pub fn cap_norm(force: Vector<Real>, limit: Option<Real>) -> Vector<Real> {
    match limit {
        Some(limit) if force.norm() > limit => force.normalize() * limit,
        _ => force,
    }
}

/// A force for the world to apply on the car body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AppliedForce {
    /// Force in world space.
    pub force: Vector<Real>,

    /// Optional application point (world). If None => apply at COM.
    pub at: Option<Point<Real>>,
}

impl AppliedForce {
    pub fn at_com(force: Vector<Real>) -> Self {
        Self { force, at: None }
    }

    pub fn at_point(force: Vector<Real>, at: Point<Real>) -> Self {
        Self { force, at: Some(at) }
    }
}
