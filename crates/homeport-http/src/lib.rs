//! `homeport-http` provides the incremental parsers used by the HomePort
//! REST surface.
//!
//! Both parsers are restartable state machines consuming bytes as they
//! arrive from a socket, so a request may be split at any position across
//! reads. They perform no I/O.
//!
//! The [`url::UrlParser`] reports the parts of a URL to a handler as soon as
//! they are delimited, while the [`request::HttpParser`] turns a request
//! line, its headers and a `Content-Length` body into an
//! [`request::HttpRequest`].

#![deny(unsafe_code)]
#![deny(missing_docs)]

/// Error management.
pub mod error;
/// The incremental HTTP request parser.
pub mod request;
/// The incremental URL parser.
pub mod url;
