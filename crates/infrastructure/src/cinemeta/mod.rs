//! Metadata resolver integration

pub mod client;

pub use client::CinemetaClient;
