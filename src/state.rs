use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;
use uuid::Uuid;

use crate::race::{Race, RaceEvent};
use crate::vehicle::DriverInput;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CarSnapshot {
    pub index: usize,
    pub human: bool,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub speed_kmh: f32,
    pub lap: u32,
    pub lap_time_ms: u64,
    pub position: usize, // 1-based standing
    pub damage: f32,     // remaining fraction
    pub tire_wear: f32,  // remaining fraction
    pub braking: bool,
    pub skidding: bool,
    pub off_track: bool,
    pub finished: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RaceSnapshot {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub tick: u64,
    pub time_ms: u64,
    pub track: String,
    pub completed: bool,
    pub cars: Vec<CarSnapshot>,
    pub events: Vec<RaceEvent>,
}

impl RaceSnapshot {
    pub fn capture(race: &Race, events: Vec<RaceEvent>) -> Self {
        let standings = race.standings();
        let timing = race.timing();

        let cars = race
            .cars()
            .iter()
            .map(|car| {
                let i = car.index();
                let position = standings.iter().position(|&s| s == i).map_or(0, |p| p + 1);
                CarSnapshot {
                    index: i,
                    human: car.is_human(),
                    x: car.location().x,
                    y: car.location().y,
                    angle: car.angle(),
                    speed_kmh: car.speed_in_kmh(),
                    lap: timing.lap(i),
                    lap_time_ms: timing.current_lap_time_ms(i),
                    position,
                    damage: car.damage_level(),
                    tire_wear: car.tire_wear_level(),
                    braking: car.is_braking(),
                    skidding: car.is_skidding(),
                    off_track: car.left_side_off_track() || car.right_side_off_track(),
                    finished: timing.race_completed(i),
                }
            })
            .collect();

        Self {
            kind: "snapshot",
            tick: race.tick(),
            time_ms: timing.time_ms(),
            track: race.track().name().to_string(),
            completed: race.is_race_completed(),
            cars,
            events,
        }
    }
}

/// Everything the network side shares with the simulation loop.
pub struct SharedRaceState {
    clients: HashMap<Uuid, UnboundedSender<String>>,
    seats: HashMap<Uuid, usize>,  // session -> human car index
    num_seats: usize,
    inputs: HashMap<usize, DriverInput>,
}

impl SharedRaceState {
    pub fn new(num_seats: usize) -> Self {
        Self {
            clients: HashMap::new(),
            seats: HashMap::new(),
            num_seats,
            inputs: HashMap::new(),
        }
    }

    pub fn register_client(&mut self, id: Uuid, tx: UnboundedSender<String>) {
        self.clients.insert(id, tx);
    }

    pub fn num_clients(&self) -> usize {
        self.clients.len()
    }

    /// Lowest free human car, if any.
    pub fn claim_seat(&mut self, id: Uuid) -> Option<usize> {
        if let Some(&seat) = self.seats.get(&id) {
            return Some(seat);
        }
        let seat = (0..self.num_seats).find(|s| !self.seats.values().any(|taken| taken == s))?;
        self.seats.insert(id, seat);
        Some(seat)
    }

    pub fn seat_of(&self, id: &Uuid) -> Option<usize> {
        self.seats.get(id).copied()
    }

    /// Forget the client; its car gets neutral input.
    pub fn remove_client(&mut self, id: &Uuid) {
        self.clients.remove(id);
        if let Some(seat) = self.seats.remove(id) {
            self.inputs.insert(seat, DriverInput::default());
        }
    }

    pub fn update_input(&mut self, id: &Uuid, input: DriverInput) -> bool {
        match self.seats.get(id) {
            Some(&seat) => {
                self.inputs.insert(seat, input);
                true
            }
            None => false,
        }
    }

    /// Hand the latest inputs to the race.
    pub fn drain_inputs_into(&mut self, race: &mut Race) {
        for (seat, input) in self.inputs.drain() {
            race.set_human_input(seat, input);
        }
    }

    /// Serialize once, send to every client, drop clients whose channel closed.
    pub fn broadcast_snapshot(&mut self, snapshot: &RaceSnapshot) {
        let json = match serde_json::to_string(snapshot) {
            Ok(json) => json,
            Err(err) => {
                warn!(%err, "snapshot serialization failed");
                return;
            }
        };
        self.clients.retain(|_, tx| tx.send(json.clone()).is_ok());
    }
}
