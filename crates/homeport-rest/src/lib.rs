//! `homeport-rest` exposes the HomePort registry over HTTP.
//!
//! The [`server::Server`] runs as a future spawned onto the daemon event
//! loop. Each connection carries a single request, parsed incrementally and
//! dispatched to the registry on the loop thread:
//!
//! - `GET /devices` describes every attached adapter, device, service and
//!   parameter as JSON
//! - `GET /{adapter}/{device}/{service}` reads the state of a service
//! - `PUT /{adapter}/{device}/{service}` writes it
//! - `OPTIONS` lists the methods of a path
//!
//! States are exchanged as `{"value": "<state>"}` or, for `text/plain`
//! clients, as the raw state.
//!
//! The [`module::RestModule`] plugs the server into the daemon lifecycle.

#![deny(unsafe_code)]
#![deny(missing_docs)]

/// Error management.
pub mod error;
/// Request handling.
pub mod handler;
/// JSON representations.
pub mod json;
/// The daemon module.
pub mod module;
/// HTTP responses.
pub mod response;
/// Path resolution.
pub mod routes;
/// The REST server.
pub mod server;
