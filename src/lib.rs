//! race-sim - top-down racing core: tire grip, car bodies, route graph,
//! computer drivers, and the race loop that ties them to a rapier world.

pub mod ai;
pub mod config;
pub mod error;
pub mod grid;
pub mod net;
pub mod physics;
pub mod race;
pub mod route;
pub mod state;
pub mod timing;
pub mod tire;
pub mod track;
pub mod vehicle;

pub use config::SimConfig;
pub use error::{SimError, SimResult};
pub use race::{Race, RaceEvent};
pub use track::Track;
