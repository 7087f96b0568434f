//! tire - engine-agnostic per-wheel grip model (pure types + force output)

pub mod types;
pub mod grip;

pub use types::*;
pub use grip::{Tire, tire_location};
