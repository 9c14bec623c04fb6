//! Data models for the VRChat platform API.
//!
//! This module contains the wire types the proxy needs to understand:
//!
//! - `CurrentUser`, `LoginOutcome`, `TwoFactorMethod`: bot identity and login results
//! - `WorldQuery`: world search filter forwarded to the platform
//!
//! World and friend payloads are passed through as raw JSON.

pub mod user;
pub mod world;

pub use user::{CurrentUser, LoginOutcome, TwoFactorMethod};
pub use world::WorldQuery;
