//! # belt-core
//!
//! Core types, traits, configuration, and error handling for the Belt agent.

pub mod action;
pub mod config;
pub mod context;
pub mod error;
pub mod intent;
pub mod message;
pub mod session;
pub mod traits;

pub use config::shellexpand;
