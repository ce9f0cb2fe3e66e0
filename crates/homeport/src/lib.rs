//! `homeport` is the core of the HomePort home-automation daemon.
//!
//! The daemon keeps a registry of the adapters attached to it. An adapter
//! groups the devices of one integration, such as a Z-Wave bus or a set of
//! USB sensors, and each device exposes services which can be read with
//! `GET` and written with `PUT`.
//!
//! Everything in the registry is addressed by identifier paths made of an
//! adapter, a device, a service and a parameter identifier. Applications
//! send requests to services and receive exactly one response for each of
//! them. They can also subscribe listeners to be notified when a service
//! value changes or when devices come and go.
//!
//! The registry is owned by a single-threaded event loop. Modules run on
//! the loop thread, while other threads reach the registry through a bridge
//! pausing the loop for the duration of the call.
//!
//! Adapters and applications are packaged as modules and hosted by the
//! daemon, which drives them through a create, start, stop and destroy
//! lifecycle.

#![deny(unsafe_code)]
#![deny(missing_docs)]

mod macros;
mod node;

/// Adapters.
pub mod adapter;
/// Well-known attribute keys and attribute maps.
pub mod attributes;
/// Synchronous registry access from other threads.
pub mod bridge;
/// The daemon hosting modules.
pub mod daemon;
/// Devices.
pub mod device;
/// Error management.
pub mod error;
/// The event loop owning the registry.
pub mod event_loop;
/// Identifier paths.
pub mod id;
/// Listeners and their scopes.
pub mod listener;
/// The module lifecycle.
pub mod module;
/// Service parameters.
pub mod parameter;
/// The registry of attached nodes.
pub mod registry;
/// Requests, responses and status codes.
pub mod request;
/// Services and their actions.
pub mod service;
/// Values carried by requests, responses and notifications.
pub mod value;
