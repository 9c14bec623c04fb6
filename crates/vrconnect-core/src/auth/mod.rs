//! Authentication module for the shared bot session.
//!
//! This module provides:
//! - `SessionGuard`: single-flight session establishment, short positive
//!   cache and rate-limit cool-down for the bot account
//! - `Credentials` / `CredentialStore`: bot credentials and OS-level
//!   storage for the password via keyring
//!
//! A verified session is trusted for 5 minutes; a rate limit blocks all
//! session checks for 2 minutes.

pub mod credentials;
pub mod session;

pub use credentials::{CredentialStore, Credentials};
pub use session::{
    GuardSettings, SessionError, SessionGuard, SessionPhase, SessionResult, SessionStatus,
};
