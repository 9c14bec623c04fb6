//! HTTP surface of the VRConnect proxy.
//!
//! The app talks to `/proxy/*`; every route is a thin shell over
//! `ProxyGateway`.

pub mod routes;

pub use routes::{router, ErrorResponse};
