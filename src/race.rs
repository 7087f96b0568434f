// ==============================================================================
// race.rs — ONE RACE: CARS, AI DRIVERS, WORLD, TIMING
// ==============================================================================
// Step order (all cars see the same snapshot at every stage):
//
//   1) intents    human input / Ai::update for every car
//   2) forces     Car::collect_forces -> PhysicsWorld::apply_forces
//   3) integrate  PhysicsWorld::step
//   4) read back  off-track sides, then Car::on_step_time, from the
//                 post-step BodyState
//   5) damage     contact impulses -> Car::add_damage
//   6) progress   node capture, laps, stuck recovery
//   7) timing     clock advance
//
// Intents and progress only run after start().
// ==============================================================================

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rapier3d::prelude::{Real, RigidBodyHandle};
use serde::Serialize;
use tracing::{debug, info};

use crate::ai::Ai;
use crate::config::SimConfig;
use crate::grid::StartGrid;
use crate::physics::{ContactImpulse, PhysicsWorld};
use crate::tire::{WheelId, tire_location};
use crate::timing::Timing;
use crate::track::Track;
use crate::vehicle::{BodyState, Car, DriverInput, METERS_PER_UNIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RaceEvent {
    LapCompleted { car: usize, lap: u32, lap_time_ms: u64 },
    Finished { car: usize, position: usize },
    HardCrash { car: usize },
    Recovered { car: usize },
}

pub struct Race {
    config: SimConfig,
    track: Arc<Track>,
    world: PhysicsWorld,
    cars: Vec<Car>,
    ais: Vec<Ai>,
    inputs: Vec<DriverInput>,
    stuck_ms: Vec<u32>,
    timing: Timing,
    started: bool,
    tick: u64,
}

impl Race {
    pub fn new(config: SimConfig, track: Arc<Track>) -> Self {
        let num_cars = config.race.num_cars;
        let mut seeds = StdRng::seed_from_u64(config.race.ai_seed);

        let ais = (config.race.num_humans..num_cars)
            .map(|i| {
                let mut ai = Ai::new(i, config.ai.clone(), seeds.next_u64());
                ai.set_track(Some(track.clone()));
                ai
            })
            .collect();

        let mut race = Self {
            world: PhysicsWorld::new(config.physics.gravity()),
            cars: Vec::new(),
            ais,
            inputs: vec![DriverInput::default(); num_cars],
            stuck_ms: vec![0; num_cars],
            timing: Timing::new(num_cars, config.race.lap_count),
            started: false,
            tick: 0,
            config,
            track,
        };
        race.place_cars();
        race
    }

    fn build_cars(&mut self) {
        let race = &self.config.race;
        let ai_car = self.config.effective_ai_car();
        self.cars = (0..race.num_cars)
            .map(|i| {
                let is_human = i < race.num_humans;
                let desc = if is_human { self.config.human_car } else { ai_car };
                Car::new(i, desc, is_human)
            })
            .collect();
    }

    /// Fresh cars on the start grid. Computer cars take the front rows.
    pub fn place_cars(&mut self) {
        for car in &mut self.cars {
            if let Some(handle) = car.detach() {
                self.world.remove_body(handle);
            }
        }
        self.build_cars();
        self.stuck_ms.iter_mut().for_each(|s| *s = 0);

        let route = self.track.route();
        let Some(grid) = StartGrid::new(route, self.config.race.grid_spacing) else {
            debug!(track = self.track.name(), "no route, cars left unplaced");
            return;
        };

        let n = route.num_nodes();
        let gravity = self.world.gravity;
        let order = self.cars.iter().filter(|c| !c.is_human()).chain(self.cars.iter().filter(|c| c.is_human()));
        let grid_positions: Vec<usize> = order.map(|c| c.index()).collect();

        for (position, &i) in grid_positions.iter().enumerate() {
            let slot = grid.slot(position);
            let car = &mut self.cars[i];
            let handle = self.world.create_car_body(car.description(), slot.location, slot.angle_deg);
            if let Some(state) = self.world.body_state(handle) {
                car.attach(handle, &state, gravity);
            }
            car.set_next_target_node_index(0);
            car.set_current_target_node_index(route.wrap_prev(0));
            car.set_prev_target_node_index(route.wrap_prev(route.wrap_prev(0)));
            car.set_route_progression(0);
        }
        debug!(cars = self.cars.len(), nodes = n, "cars placed on grid");
    }

    pub fn start(&mut self) {
        self.started = true;
        self.timing.start();
        info!(track = self.track.name(), cars = self.cars.len(), laps = self.timing.lap_count(), "race started");
    }

    /// Replace the track: every body is removed, cars are rebuilt on the new
    /// grid and every driver forgets its old line.
    pub fn load_track(&mut self, track: Arc<Track>) {
        self.track = track;
        for ai in &mut self.ais {
            ai.set_track(Some(self.track.clone()));
        }
        self.timing.reset();
        self.started = false;
        self.tick = 0;
        self.inputs.iter_mut().for_each(|i| *i = DriverInput::default());
        self.place_cars();
        info!(track = self.track.name(), nodes = self.track.route().num_nodes(), "track loaded");
    }

    /// Latest input for a human car; ignored for computer cars.
    pub fn set_human_input(&mut self, car: usize, input: DriverInput) -> bool {
        match (self.cars.get(car), self.inputs.get_mut(car)) {
            (Some(c), Some(slot)) if c.is_human() => {
                *slot = input;
                true
            }
            _ => false,
        }
    }

    pub fn step(&mut self, step_ms: u32) -> Vec<RaceEvent> {
        let mut events = Vec::new();
        let gravity = self.world.gravity;

        // 1) intents
        if self.started {
            for car in self.cars.iter_mut().filter(|c| c.is_human() && c.is_placed()) {
                car.apply_input(&self.inputs[car.index()]);
            }
            for ai in &mut self.ais {
                let i = ai.car_index();
                let completed = self.timing.race_completed(i);
                if let Some(car) = self.cars.get_mut(i) {
                    ai.update(car, completed);
                }
            }
        }

        // 2) forces
        for car in &mut self.cars {
            if let Some(handle) = car.body() {
                let forces = car.collect_forces();
                self.world.apply_forces(handle, &forces);
            }
        }

        // 3) integrate
        let impulses = self.world.step(step_ms as Real / 1000.0);

        // 4) read back
        for i in 0..self.cars.len() {
            let Some(state) = self.cars[i].body().and_then(|h| self.world.body_state(h)) else {
                continue;
            };
            self.update_off_track(i, &state);
            self.cars[i].on_step_time(step_ms, &state, gravity);
        }

        // 5) damage
        self.apply_damage(&impulses, &mut events);

        // 6) progress
        if self.started {
            for i in 0..self.cars.len() {
                self.update_progress(i, &mut events);
                self.recover_if_stuck(i, step_ms, &mut events);
            }
        }

        // 7) timing
        self.timing.tick(step_ms);
        self.tick += 1;
        events
    }

    fn car_by_body(&self, body: RigidBodyHandle) -> Option<usize> {
        self.cars.iter().position(|c| c.body() == Some(body))
    }

    fn apply_damage(&mut self, impulses: &[ContactImpulse], events: &mut Vec<RaceEvent>) {
        let factor = self.config.physics.collision_damage_factor;
        for contact in impulses {
            let Some(i) = self.car_by_body(contact.body) else {
                continue;
            };
            let car = &mut self.cars[i];
            let mass = car.description().mass;
            if mass > 0.0 {
                car.add_damage(contact.impulse / mass * METERS_PER_UNIT * factor);
            }
        }

        for car in &mut self.cars {
            if car.had_hard_crash() {
                info!(car = car.index(), damage = car.damage_level(), "hard crash");
                events.push(RaceEvent::HardCrash { car: car.index() });
            }
        }
    }

    /// Side flags from where the tires are now, so rolling resistance and
    /// tire grip of the next step agree on the surface.
    fn update_off_track(&mut self, i: usize, state: &BodyState) {
        let car = &self.cars[i];
        let off = |wheel: WheelId| {
            let at = tire_location(state.location, state.angle_deg, car.tire(wheel).mount());
            self.track.is_off_track(at)
        };
        let left = off(WheelId::FL) || off(WheelId::RL);
        let right = off(WheelId::FR) || off(WheelId::RR);

        let car = &mut self.cars[i];
        car.set_left_side_off_track(left);
        car.set_right_side_off_track(right);
    }

    fn update_progress(&mut self, i: usize, events: &mut Vec<RaceEvent>) {
        let route = self.track.route();
        let n = route.num_nodes();
        let car = &mut self.cars[i];
        // a single node is captured again every step: no progress to make
        if n < 2 || !car.is_placed() {
            return;
        }

        let next = car.next_target_node_index();
        let Some(node) = route.nodes().get(next) else {
            return;
        };
        if !node.captures(car.location(), self.config.race.capture_tolerance) {
            return;
        }

        let progression = car.route_progression();
        let lap = next == 0 && progression > 0 && progression % n as u32 == 0;

        car.set_prev_target_node_index(car.current_target_node_index());
        car.set_current_target_node_index(next);
        car.set_next_target_node_index(route.wrap_next(next));
        car.set_route_progression(progression + 1);

        if !lap {
            return;
        }
        if let Some(event) = self.timing.lap_completed(i) {
            info!(car = i, lap = event.lap, lap_time_ms = event.lap_time_ms, best = event.new_best, "lap completed");
            events.push(RaceEvent::LapCompleted { car: i, lap: event.lap, lap_time_ms: event.lap_time_ms });
            if let Some(position) = event.finished {
                info!(car = i, position = position + 1, time_ms = self.timing.time_ms(), "race completed");
                events.push(RaceEvent::Finished { car: i, position });
            }
        }
    }

    fn recover_if_stuck(&mut self, i: usize, step_ms: u32, events: &mut Vec<RaceEvent>) {
        let car = &self.cars[i];
        if car.is_human() || self.timing.race_completed(i) {
            return;
        }
        let Some(handle) = car.body() else {
            return;
        };

        if car.speed_in_kmh().abs() >= self.config.race.stuck_speed_kmh {
            self.stuck_ms[i] = 0;
            return;
        }
        self.stuck_ms[i] += step_ms;
        if self.stuck_ms[i] <= self.config.race.stuck_timeout_ms {
            return;
        }

        let route = self.track.route();
        let (Some(current), Some(next)) = (
            route.nodes().get(car.current_target_node_index()),
            route.nodes().get(car.next_target_node_index()),
        ) else {
            return;
        };
        let to_next = next.location() - current.location();
        let angle_deg = to_next.y.atan2(to_next.x).to_degrees();
        let location = current.location();

        self.world.reset_body(handle, location, angle_deg);
        if let Some(state) = self.world.body_state(handle) {
            self.cars[i].sync_body(&state);
        }
        self.stuck_ms[i] = 0;
        info!(car = i, x = location.x, y = location.y, "stuck car recovered");
        events.push(RaceEvent::Recovered { car: i });
    }

    // ==========================================================================
    // Queries
    // ==========================================================================

    /// Finished cars in finish order, then the rest by route progression.
    pub fn standings(&self) -> Vec<usize> {
        let mut order = self.timing.finish_order().to_vec();
        let mut rest: Vec<usize> = (0..self.cars.len()).filter(|&i| !self.timing.race_completed(i)).collect();
        rest.sort_by_key(|&i| std::cmp::Reverse(self.cars[i].route_progression()));
        order.extend(rest);
        order
    }

    /// Every human finished, or every car when nobody is human.
    pub fn is_race_completed(&self) -> bool {
        let humans: Vec<usize> = self.cars.iter().filter(|c| c.is_human()).map(|c| c.index()).collect();
        if humans.is_empty() {
            !self.cars.is_empty() && (0..self.cars.len()).all(|i| self.timing.race_completed(i))
        } else {
            humans.iter().all(|&i| self.timing.race_completed(i))
        }
    }

    pub fn cars(&self) -> &[Car] {
        &self.cars
    }

    pub fn car(&self, index: usize) -> Option<&Car> {
        self.cars.get(index)
    }

    pub fn track(&self) -> &Arc<Track> {
        &self.track
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }
}
