use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::id::ServiceId;
use crate::value::Value;

/// The method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// `GET` request.
    Get,
    /// `PUT` request.
    Put,
}

impl Method {
    /// All supported methods.
    pub const ALL: [Self; 2] = [Self::Get, Self::Put];

    /// Returns the method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

impl std::str::FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GET" => Ok(Self::Get),
            "PUT" => Ok(Self::Put),
            _ => Err(Error::new(
                ErrorKind::MethodNotAllowed,
                format!("Unsupported method `{s}`."),
            )),
        }
    }
}

macro_rules! status_codes {
    ($($variant:ident = $code:literal, $reason:literal;)+) => {
        /// The status of a response.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Status {
            $(
                #[doc = concat!("`", $code, " ", $reason, "`")]
                $variant,
            )+
        }

        impl Status {
            /// Returns the numeric status code.
            #[must_use]
            pub const fn code(self) -> u16 {
                match self {
                    $(Self::$variant => $code,)+
                }
            }

            /// Returns the reason phrase.
            #[must_use]
            pub const fn reason(self) -> &'static str {
                match self {
                    $(Self::$variant => $reason,)+
                }
            }

            /// Returns the [`Status`] associated with a numeric code.
            #[must_use]
            pub const fn from_code(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

status_codes! {
    Continue = 100, "Continue";
    SwitchingProtocols = 101, "Switching Protocols";
    Ok = 200, "OK";
    Created = 201, "Created";
    Accepted = 202, "Accepted";
    NonAuthoritativeInformation = 203, "Non-Authoritative Information";
    NoContent = 204, "No Content";
    ResetContent = 205, "Reset Content";
    PartialContent = 206, "Partial Content";
    MultipleChoices = 300, "Multiple Choices";
    MovedPermanently = 301, "Moved Permanently";
    Found = 302, "Found";
    SeeOther = 303, "See Other";
    NotModified = 304, "Not Modified";
    UseProxy = 305, "Use Proxy";
    TemporaryRedirect = 307, "Temporary Redirect";
    BadRequest = 400, "Bad Request";
    Unauthorized = 401, "Unauthorized";
    PaymentRequired = 402, "Payment Required";
    Forbidden = 403, "Forbidden";
    NotFound = 404, "Not Found";
    MethodNotAllowed = 405, "Method Not Allowed";
    NotAcceptable = 406, "Not Acceptable";
    ProxyAuthenticationRequired = 407, "Proxy Authentication Required";
    RequestTimeout = 408, "Request Timeout";
    Conflict = 409, "Conflict";
    Gone = 410, "Gone";
    LengthRequired = 411, "Length Required";
    PreconditionFailed = 412, "Precondition Failed";
    RequestEntityTooLarge = 413, "Request Entity Too Large";
    RequestUriTooLong = 414, "Request-URI Too Long";
    UnsupportedMediaType = 415, "Unsupported Media Type";
    RequestedRangeNotSatisfiable = 416, "Requested Range Not Satisfiable";
    ExpectationFailed = 417, "Expectation Failed";
    InternalServerError = 500, "Internal Server Error";
    NotImplemented = 501, "Not Implemented";
    BadGateway = 502, "Bad Gateway";
    ServiceUnavailable = 503, "Service Unavailable";
    GatewayTimeout = 504, "Gateway Timeout";
    HttpVersionNotSupported = 505, "HTTP Version Not Supported";
}

impl Status {
    /// Checks whether the status is in the `2xx` range.
    #[must_use]
    #[inline]
    pub const fn is_success(self) -> bool {
        matches!(self.code(), 200..=299)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

impl From<ErrorKind> for Status {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Null | ErrorKind::Argument => Self::BadRequest,
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::MethodNotAllowed => Self::MethodNotAllowed,
            ErrorKind::Timeout => Self::GatewayTimeout,
            ErrorKind::Alloc
            | ErrorKind::DuplicateId
            | ErrorKind::InvalidState
            | ErrorKind::ProtocolViolation
            | ErrorKind::Unknown => Self::InternalServerError,
        }
    }
}

/// The answer to a [`Request`].
#[derive(Debug, PartialEq, Eq)]
pub struct Response {
    // Service the request was addressed to.
    service: ServiceId,
    // Request method.
    method: Method,
    // Status.
    status: Status,
    // Optional payload.
    value: Option<Value>,
}

impl Response {
    /// Returns the [`ServiceId`] the request was addressed to.
    #[must_use]
    #[inline]
    pub const fn service(&self) -> &ServiceId {
        &self.service
    }

    /// Returns the request [`Method`].
    #[must_use]
    #[inline]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Returns the [`Status`].
    #[must_use]
    #[inline]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Returns the payload.
    #[must_use]
    #[inline]
    pub const fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Consumes the response, returning its payload.
    #[must_use]
    #[inline]
    pub fn into_value(self) -> Option<Value> {
        self.value
    }
}

type Responder = Box<dyn FnOnce(Response) + Send>;

struct Inner {
    service: ServiceId,
    method: Method,
    value: Option<Value>,
    responder: Mutex<Option<Responder>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let responder = self
            .responder
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(responder) = responder {
            warn!(
                "{} request to `{}` freed without a response",
                self.method, self.service
            );
            responder(Response {
                service: self.service.clone(),
                method: self.method,
                status: Status::InternalServerError,
                value: None,
            });
        }
    }
}

/// A request addressed to a service.
///
/// A request is a cheap handle: an action may keep a clone and respond later,
/// from another turn of the event loop or from another thread. Exactly one
/// response is delivered for every request. When the last handle is dropped
/// without a response, an `Internal Server Error` is delivered instead.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("service", &self.inner.service)
            .field("method", &self.inner.method)
            .field("value", &self.inner.value)
            .field("responded", &self.is_responded())
            .finish()
    }
}

impl Request {
    /// Creates a [`Request`] whose response is delivered to `on_response`.
    pub fn new<F>(service: ServiceId, method: Method, value: Option<Value>, on_response: F) -> Self
    where
        F: FnOnce(Response) + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                service,
                method,
                value,
                responder: Mutex::new(Some(Box::new(on_response))),
            }),
        }
    }

    /// Returns the [`ServiceId`] the request is addressed to.
    #[must_use]
    #[inline]
    pub fn service(&self) -> &ServiceId {
        &self.inner.service
    }

    /// Returns the request [`Method`].
    #[must_use]
    #[inline]
    pub fn method(&self) -> Method {
        self.inner.method
    }

    /// Returns the input payload.
    #[must_use]
    #[inline]
    pub fn value(&self) -> Option<&Value> {
        self.inner.value.as_ref()
    }

    /// Checks whether a response has already been delivered.
    #[must_use]
    pub fn is_responded(&self) -> bool {
        self.inner
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Delivers the response.
    ///
    /// # Errors
    ///
    /// Responding more than once is a
    /// [`ErrorKind::ProtocolViolation`]. The first response stays delivered.
    pub fn respond(&self, status: Status, value: Option<Value>) -> Result<()> {
        // The lock is released before running the responder.
        let responder = self
            .inner
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(responder) = responder else {
            return Err(Error::new(
                ErrorKind::ProtocolViolation,
                format!(
                    "{} request to `{}` has already been answered.",
                    self.inner.method, self.inner.service
                ),
            ));
        };

        debug!(
            "{} request to `{}` answered with `{status}`",
            self.inner.method, self.inner.service
        );

        responder(Response {
            service: self.inner.service.clone(),
            method: self.inner.method,
            status,
            value,
        });

        Ok(())
    }
}

/// An action run by a service when it receives a request.
///
/// Each action owns its context: a closure captures it, a struct carries it
/// in its fields. The action must eventually respond to the request, either
/// before returning or later through a kept clone.
///
/// Actions run while the registry is held, so they cannot reach it through
/// [`Context::with_registry`]. An action broadcasting the new value of its
/// service schedules the broadcast with [`LoopHandle::spawn`]:
///
/// ```ignore
/// let service = request.service().clone();
/// handle.spawn(move |registry| {
///     let _ = registry.changed(&service, &value);
/// })?;
/// ```
///
/// [`Context::with_registry`]: crate::event_loop::Context::with_registry
/// [`LoopHandle::spawn`]: crate::event_loop::LoopHandle::spawn
pub trait Action: Send {
    /// Handles the request.
    ///
    /// # Errors
    ///
    /// When an error is returned and the request has not been answered yet,
    /// the request is answered with the [`Status`] matching the error kind.
    fn call(&mut self, request: Request) -> Result<()>;
}

impl<F> Action for F
where
    F: FnMut(Request) -> Result<()> + Send,
{
    fn call(&mut self, request: Request) -> Result<()> {
        self(request)
    }
}
