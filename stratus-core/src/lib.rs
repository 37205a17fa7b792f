//! Stratus Core
//!
//! Resource model and provider abstraction shared by the Stratus provisioning crates

pub mod provider;
pub mod resource;
