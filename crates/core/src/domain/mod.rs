//! Domain traits and contracts

pub mod repositories;

pub use repositories::{HealthStore, SessionStore, TitleResolver};
