//! Core library for the VRConnect platform proxy.
//!
//! - `api`: VRChat REST client behind the `PlatformApi` trait
//! - `auth`: the shared bot `SessionGuard` and bot credentials
//! - `proxy`: `ProxyGateway`, which turns app requests into authenticated
//!   platform calls
//! - `models`: wire types
//! - `config`: file and environment configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod proxy;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError, PlatformApi};
pub use auth::{
    CredentialStore, Credentials, GuardSettings, SessionError, SessionGuard, SessionPhase,
    SessionResult, SessionStatus,
};
pub use config::Config;
pub use models::{CurrentUser, LoginOutcome, TwoFactorMethod, WorldQuery};
pub use proxy::{GatewayOptions, ProxyError, ProxyGateway};
