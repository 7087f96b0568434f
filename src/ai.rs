// ==============================================================================
// ai.rs — COMPUTER DRIVER (STEERING PD + HINT-BASED SPEED CONTROL)
// ------------------------------------------------------------------------------
// One Ai per computer car. Every step, while the car is placed and a route
// exists:
//   1) re-draw the random aim offset when the car's current node changed
//   2) steering: PD on the bearing error towards the next node
//   3) speed: accelerate unless the tile's hint / geometry says otherwise
//
// The Ai only writes intents into its own car. The track is shared read-only.
// ==============================================================================

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rapier3d::prelude::{Real, Vector, vector};

use crate::config::AiConfig;
use crate::track::{ComputerHint, Track};
use crate::vehicle::{Car, Steer};

#[derive(Debug, Clone)]
pub struct Ai {
    car_index: usize,
    track: Option<Arc<Track>>,
    config: AiConfig,
    last_diff: Real,
    last_target_node_index: Option<usize>,
    random_tolerance: Vector<Real>,
    rng: StdRng,
}

impl Ai {
    pub fn new(car_index: usize, config: AiConfig, seed: u64) -> Self {
        Self {
            car_index,
            track: None,
            config,
            last_diff: 0.0,
            last_target_node_index: None,
            random_tolerance: Vector::zeros(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn car_index(&self) -> usize {
        self.car_index
    }

    /// Hand over a (new) track. Steering memory is reset.
    pub fn set_track(&mut self, track: Option<Arc<Track>>) {
        self.track = track;
        self.last_diff = 0.0;
        self.last_target_node_index = None;
        self.random_tolerance = Vector::zeros();
    }

    pub fn track(&self) -> Option<&Arc<Track>> {
        self.track.as_ref()
    }

    pub fn random_tolerance(&self) -> Vector<Real> {
        self.random_tolerance
    }

    fn set_random_tolerance(&mut self) {
        let r = self.config.tolerance_radius.abs();
        self.random_tolerance = if r > 0.0 {
            vector![self.rng.gen_range(-r..=r), self.rng.gen_range(-r..=r), 0.0]
        } else {
            Vector::zeros()
        };
    }

    pub fn update(&mut self, car: &mut Car, is_race_completed: bool) {
        if !car.is_placed() {
            return;
        }
        // last step's intents never outlive a step, target or not
        car.clear_statuses();
        let Some(track) = self.track.clone() else {
            return;
        };
        let route = track.route();
        let next = car.next_target_node_index();
        if route.is_empty() || next >= route.num_nodes() {
            return;
        }
        let Some(target) = route.get(next) else {
            return;
        };

        let current = car.current_target_node_index();
        if self.last_target_node_index != Some(current) {
            self.set_random_tolerance();
        }
        self.last_target_node_index = Some(current);

        self.steer_control(car, target.location().coords);
        self.speed_control(car, &track, is_race_completed);
    }

    fn steer_control(&mut self, car: &mut Car, target: Vector<Real>) {
        let to_target = target - (car.location().coords + self.random_tolerance);
        let bearing = to_target.y.atan2(to_target.x).to_degrees();
        let heading = (car.angle() as i32 % 360) as Real;

        let mut diff = bearing - heading;
        while diff > 180.0 {
            diff -= 360.0;
        }
        while diff < -180.0 {
            diff += 360.0;
        }

        let control = (diff * self.config.steer_p + (diff - self.last_diff) * self.config.steer_d)
            .abs()
            .min(self.config.max_control);
        self.last_diff = diff;

        let dead_band = self.config.dead_band_deg;
        if diff < -dead_band {
            car.steer(Steer::Right, control);
        } else if diff > dead_band {
            car.steer(Steer::Left, control);
        } else {
            car.steer(Steer::Neutral, 0.0);
        }
    }

    fn speed_control(&self, car: &mut Car, track: &Track, is_race_completed: bool) {
        let cfg = &self.config;
        let abs_kmh = car.speed_in_kmh().abs();
        let mut accelerate = true;
        let mut brake = false;

        if let Some(tile) = track.tile_at_location(car.location()) {
            match tile.computer_hint {
                ComputerHint::BrakeHard if abs_kmh > cfg.brake_hard_kmh => brake = true,
                ComputerHint::Brake if abs_kmh > cfg.brake_kmh => brake = true,
                _ => {}
            }
            if tile.tile_type.is_corner_90() && abs_kmh > cfg.corner_90_kmh {
                accelerate = false;
            }
            if tile.tile_type.is_corner_45() && abs_kmh > cfg.corner_45_kmh {
                accelerate = false;
            }
        }

        if is_race_completed {
            if abs_kmh > cfg.finished_kmh {
                accelerate = false;
            }
        } else if abs_kmh < cfg.min_kmh {
            accelerate = true;
            brake = false;
        }

        if brake {
            car.brake();
        } else if accelerate {
            car.accelerate(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{TileMatrix, TileType};
    use crate::vehicle::{BodyState, METERS_PER_UNIT, STANDARD_CAR};
    use rapier3d::prelude::{RigidBodyHandle, point};

    fn g() -> Vector<Real> {
        vector![0.0, 0.0, -9.81 / METERS_PER_UNIT]
    }

    /// Row 0 is an 8-tile straight, route indices 0..8 left to right.
    fn straight() -> Arc<Track> {
        let mut map = TileMatrix::new(8, 8);
        for c in 0..8 {
            if let Some(tile) = map.get_mut(c, 0) {
                tile.tile_type = TileType::Straight;
                tile.route_index = c as i32;
            }
        }
        Arc::new(Track::new("straight", map))
    }

    fn placed_car(x: Real, y: Real, angle_deg: Real, vx: Real) -> Car {
        let mut car = Car::new(0, STANDARD_CAR, false);
        let state = BodyState {
            location: point![x, y, 0.0],
            velocity: vector![vx, 0.0, 0.0],
            angle_deg,
            angular_velocity: 0.0,
        };
        car.attach(RigidBodyHandle::from_raw_parts(0, 0), &state, g());
        car.on_step_time(16, &state, g());
        car
    }

    fn ai(track: Option<Arc<Track>>) -> Ai {
        let mut ai = Ai::new(0, AiConfig::default(), 7);
        ai.set_track(track);
        ai
    }

    fn assert_untouched(car: &Car) {
        assert_eq!(car.steer_direction(), Steer::Neutral);
        assert_eq!(car.tire_angle(), 0.0);
        assert!(!car.is_accelerating());
        assert!(!car.is_braking());
    }

    #[test]
    fn empty_route_is_a_no_op() {
        let mut ai = ai(Some(Arc::new(Track::new("empty", TileMatrix::new(3, 3)))));
        let mut car = placed_car(100.0, 100.0, 0.0, 0.0);
        ai.update(&mut car, false);
        assert_untouched(&car);
    }

    #[test]
    fn missing_track_or_body_is_a_no_op() {
        let mut car = placed_car(100.0, 100.0, 0.0, 0.0);
        ai(None).update(&mut car, false);
        assert_untouched(&car);

        let mut unplaced = Car::new(1, STANDARD_CAR, false);
        ai(Some(straight())).update(&mut unplaced, false);
        assert_untouched(&unplaced);
    }

    #[test]
    fn stale_target_index_is_a_no_op() {
        let mut car = placed_car(100.0, 100.0, 0.0, 0.0);
        car.set_next_target_node_index(99);
        ai(Some(straight())).update(&mut car, false);
        assert_untouched(&car);
    }

    #[test]
    fn stale_target_releases_the_brake() {
        let mut car = placed_car(100.0, 100.0, 0.0, 200.0);
        car.brake();
        assert!(car.is_braking());

        car.set_next_target_node_index(99);
        ai(Some(straight())).update(&mut car, false);
        assert!(!car.is_braking());
        assert!(!car.is_accelerating());
    }

    #[test]
    fn steers_towards_the_target_side() {
        let track = straight();

        // node 7 is straight "up" the screen (-Y) from here: a right turn
        let mut car = placed_car(7.5 * 256.0, 1500.0, 0.0, 0.0);
        car.set_next_target_node_index(7);
        ai(Some(track.clone())).update(&mut car, false);
        assert_eq!(car.steer_direction(), Steer::Right);
        // PD saturates on a 90 degree error
        assert!((car.tire_angle() + 15.0 * 1.5).abs() < 1e-4);

        // facing -X, the same target is to the left
        let mut car = placed_car(7.5 * 256.0, 1500.0, 180.0, 0.0);
        car.set_next_target_node_index(7);
        ai(Some(track)).update(&mut car, false);
        assert_eq!(car.steer_direction(), Steer::Left);
        assert!(car.tire_angle() > 0.0);
    }

    #[test]
    fn target_ahead_stays_in_dead_band() {
        let mut car = placed_car(128.0, 128.0, 0.0, 0.0);
        car.set_next_target_node_index(7);
        ai(Some(straight())).update(&mut car, false);
        assert_eq!(car.steer_direction(), Steer::Neutral);
        assert!(car.is_accelerating());
    }

    #[test]
    fn brakes_on_hinted_tile_at_speed() {
        let mut map = TileMatrix::new(8, 1);
        for c in 0..8 {
            if let Some(tile) = map.get_mut(c, 0) {
                tile.tile_type = TileType::Straight;
                tile.route_index = c as i32;
                tile.computer_hint = ComputerHint::BrakeHard;
            }
        }
        let track = Arc::new(Track::new("hinted", map));

        // 400 u/s = 180 km/h
        let mut car = placed_car(128.0, 128.0, 0.0, 400.0);
        car.set_next_target_node_index(7);
        ai(Some(track.clone())).update(&mut car, false);
        assert!(car.is_braking());

        // crawling: minimum speed wins over the hint
        let mut car = placed_car(128.0, 128.0, 0.0, 1.0);
        car.set_next_target_node_index(7);
        ai(Some(track)).update(&mut car, false);
        assert!(car.is_accelerating());
        assert!(!car.is_braking());
    }

    #[test]
    fn coasts_after_finishing() {
        // 90 km/h
        let mut car = placed_car(128.0, 128.0, 0.0, 200.0);
        car.set_next_target_node_index(7);
        ai(Some(straight())).update(&mut car, true);
        assert!(!car.is_accelerating());
        assert!(!car.is_braking());
    }

    #[test]
    fn tolerance_redrawn_only_on_node_change() {
        let mut ai = ai(Some(straight()));
        let mut car = placed_car(128.0, 128.0, 0.0, 0.0);
        car.set_next_target_node_index(3);

        ai.update(&mut car, false);
        let first = ai.random_tolerance();
        assert!(first.x.abs() <= 32.0 && first.y.abs() <= 32.0);
        ai.update(&mut car, false);
        assert_eq!(ai.random_tolerance(), first);

        car.set_current_target_node_index(3);
        ai.update(&mut car, false);
        assert_ne!(ai.random_tolerance(), first);
    }

    #[test]
    fn same_seed_same_line() {
        let mut a = ai(Some(straight()));
        let mut b = ai(Some(straight()));
        let mut car = placed_car(128.0, 128.0, 0.0, 0.0);
        car.set_next_target_node_index(3);
        a.update(&mut car.clone(), false);
        b.update(&mut car, false);
        assert_eq!(a.random_tolerance(), b.random_tolerance());
    }
}
