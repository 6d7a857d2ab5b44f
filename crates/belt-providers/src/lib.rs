//! # belt-providers
//!
//! Language model backends implementing `belt_core::traits::Provider`.

pub mod anthropic;
