use std::io::Write;

use homeport::request::Status;

/// `application/json` content type.
pub const APPLICATION_JSON: &str = "application/json";
/// `text/plain` content type.
pub const TEXT_PLAIN: &str = "text/plain";

/// An HTTP response written back to a REST client.
///
/// Every response closes the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    // Status.
    status: Status,
    // Headers, in writing order.
    headers: Vec<(&'static str, String)>,
    // Content type of the body.
    content_type: Option<&'static str>,
    // Body.
    body: Vec<u8>,
}

impl HttpResponse {
    /// Creates an [`HttpResponse`] with an empty body.
    #[must_use]
    #[inline]
    pub const fn new(status: Status) -> Self {
        Self {
            status,
            headers: Vec::new(),
            content_type: None,
            body: Vec::new(),
        }
    }

    /// Creates an [`HttpResponse`] carrying the reason phrase of its status
    /// as a `text/plain` body.
    #[must_use]
    pub fn reason(status: Status) -> Self {
        Self::new(status).body(TEXT_PLAIN, status.reason())
    }

    /// Adds a header.
    #[must_use]
    #[inline]
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Sets the body along with its content type.
    #[must_use]
    #[inline]
    pub fn body(mut self, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        self.content_type = Some(content_type);
        self.body = body.into();
        self
    }

    /// Returns the [`Status`].
    #[must_use]
    #[inline]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Returns the value of the first header with the given name.
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the content type of the body.
    #[must_use]
    #[inline]
    pub const fn content_type(&self) -> Option<&'static str> {
        self.content_type
    }

    /// Returns the body.
    #[must_use]
    #[inline]
    pub fn get_body(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the response as HTTP/1.1 bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(128 + self.body.len());

        // Writing into a vector cannot fail.
        let _ = write!(
            bytes,
            "HTTP/1.1 {} {}\r\n",
            self.status.code(),
            self.status.reason()
        );
        for (name, value) in &self.headers {
            let _ = write!(bytes, "{name}: {value}\r\n");
        }
        if let Some(content_type) = self.content_type {
            let _ = write!(bytes, "Content-Type: {content_type}\r\n");
        }
        let _ = write!(
            bytes,
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            self.body.len()
        );
        bytes.extend_from_slice(&self.body);

        bytes
    }
}
