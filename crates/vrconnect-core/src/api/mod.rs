//! REST API client module for the VRChat platform.
//!
//! This module provides the `PlatformApi` seam the session guard and proxy
//! gateway talk to, and `ApiClient`, its reqwest implementation.
//!
//! The platform keeps the bot's session in cookies; logins use HTTP Basic
//! credentials against `/auth/user`.

pub mod client;
pub mod error;
pub mod platform;

pub use client::ApiClient;
pub use error::ApiError;
pub use platform::PlatformApi;
