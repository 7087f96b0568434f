// ==============================================================================
// config.rs — SIMULATION CONFIG (JSON, EVERY FIELD DEFAULTED)
// ==============================================================================
// A partial file only overrides what it names:
//
//   { "race": { "lap_count": 5 }, "difficulty": "hard" }
//
// validate() is the single gate between file contents and the simulation.
// ==============================================================================

use std::path::Path;

use rapier3d::prelude::{Real, Vector, vector};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::track::TILE_W;
use crate::vehicle::{CarDescription, METERS_PER_UNIT, STANDARD_CAR};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: [Real; 3], // m/s^2
    pub step_ms: u32,
    /// Damage per m/s of (contact impulse / mass).
    pub collision_damage_factor: Real,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self { gravity: [0.0, 0.0, -9.81], step_ms: 16, collision_damage_factor: 0.5 }
    }
}

impl PhysicsConfig {
    /// Gravity in world units (u/s^2).
    pub fn gravity(&self) -> Vector<Real> {
        vector![self.gravity[0], self.gravity[1], self.gravity[2]] / METERS_PER_UNIT
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub lap_count: u32,
    pub num_cars: usize,
    pub num_humans: usize,
    pub ai_seed: u64,
    pub grid_spacing: Real,      // u between grid rows
    pub stuck_speed_kmh: Real,
    pub stuck_timeout_ms: u32,
    pub capture_tolerance: Real, // u added to a node's capture rect
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            lap_count: 3,
            num_cars: 6,
            num_humans: 0,
            ai_seed: 0x5eed,
            grid_spacing: 60.0,
            stuck_speed_kmh: 5.0,
            stuck_timeout_ms: 5000,
            capture_tolerance: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    // steering
    pub steer_p: Real,
    pub steer_d: Real,
    pub max_control: Real,
    pub dead_band_deg: Real,
    pub tolerance_radius: Real,

    // speed control, all |km/h|
    pub brake_hard_kmh: Real,
    pub brake_kmh: Real,
    pub corner_90_kmh: Real,
    pub corner_45_kmh: Real,
    pub finished_kmh: Real,
    pub min_kmh: Real,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            steer_p: 0.025,
            steer_d: 0.025,
            max_control: 1.5,
            dead_band_deg: 3.0,
            tolerance_radius: TILE_W / 8.0,

            brake_hard_kmh: 90.0,
            brake_kmh: 140.0,
            corner_90_kmh: 100.0,
            corner_45_kmh: 150.0,
            finished_kmh: 50.0,
            min_kmh: 25.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Engine power multiplier for computer cars.
    pub fn ai_power_scale(&self) -> Real {
        match self {
            Difficulty::Easy => 0.80,
            Difficulty::Medium => 0.90,
            Difficulty::Hard => 1.00,
        }
    }

    pub fn apply(&self, desc: &CarDescription) -> CarDescription {
        CarDescription { power: desc.power * self.ai_power_scale(), ..*desc }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub broadcast_every_ticks: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:9001".to_string(), broadcast_every_ticks: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub physics: PhysicsConfig,
    pub race: RaceConfig,
    pub human_car: CarDescription,
    pub ai_car: CarDescription,
    pub ai: AiConfig,
    pub difficulty: Difficulty,
    pub server: ServerConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            physics: PhysicsConfig::default(),
            race: RaceConfig::default(),
            human_car: STANDARD_CAR,
            ai_car: STANDARD_CAR,
            ai: AiConfig::default(),
            difficulty: Difficulty::default(),
            server: ServerConfig::default(),
        }
    }
}

fn invalid(field: &'static str, detail: impl Into<String>) -> SimError {
    SimError::InvalidConfig { field, detail: detail.into() }
}

fn check_car(prefix: &'static str, desc: &CarDescription) -> SimResult<()> {
    if !(desc.mass > 0.0) {
        return Err(invalid(prefix, format!("mass must be positive, got {}", desc.mass)));
    }
    if !(desc.power > 0.0) {
        return Err(invalid(prefix, format!("power must be positive, got {}", desc.power)));
    }
    if !(desc.tire_friction_off_track < desc.tire_friction_on_track) {
        return Err(invalid(
            prefix,
            format!(
                "off-track friction {} must be below on-track friction {}",
                desc.tire_friction_off_track, desc.tire_friction_on_track
            ),
        ));
    }
    Ok(())
}

impl SimConfig {
    pub fn from_json(text: &str) -> SimResult<Self> {
        let config: SimConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| SimError::Io { path: path.to_path_buf(), source })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.physics.step_ms == 0 {
            return Err(invalid("physics.step_ms", "must be positive"));
        }
        if self.race.lap_count == 0 {
            return Err(invalid("race.lap_count", "must be at least 1"));
        }
        if self.race.num_humans > self.race.num_cars {
            return Err(invalid(
                "race.num_humans",
                format!("{} humans but only {} cars", self.race.num_humans, self.race.num_cars),
            ));
        }
        if self.server.broadcast_every_ticks == 0 {
            return Err(invalid("server.broadcast_every_ticks", "must be at least 1"));
        }
        check_car("human_car", &self.human_car)?;
        check_car("ai_car", &self.ai_car)?;
        Ok(())
    }

    /// AI car description with the difficulty applied.
    pub fn effective_ai_car(&self) -> CarDescription {
        self.difficulty.apply(&self.ai_car)
    }
}
