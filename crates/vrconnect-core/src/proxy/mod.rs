//! Proxy gateway between app requests and the platform API.
//!
//! Every authenticated call goes through `SessionGuard::ensure_session`
//! first; downstream failures are translated into `ProxyError` and, for rate
//! limits, into a guard cool-down.

pub mod error;
pub mod gateway;

pub use error::ProxyError;
pub use gateway::{GatewayOptions, ProxyGateway};
