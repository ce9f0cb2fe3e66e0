use bytes::Bytes;

use crate::macros::string_map;

string_map! {
    /// Ordered header pairs carried by a [`Value`].
    pub struct Headers;
}

/// An immutable payload exchanged in requests, responses and change
/// notifications.
///
/// A value is a body plus an ordered set of headers. Crossing a thread or
/// ownership boundary takes an explicit [`Value::copy`].
#[derive(Debug, PartialEq, Eq)]
pub struct Value {
    // Body.
    body: Bytes,
    // Headers.
    headers: Headers,
}

impl Value {
    /// Creates a [`Value`] from a body.
    #[must_use]
    #[inline]
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            headers: Headers::new(),
        }
    }

    /// Creates a [`Value`] copying the given bytes.
    #[must_use]
    #[inline]
    pub fn from_slice(body: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(body))
    }

    /// Adds a header.
    #[must_use]
    #[inline]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(key, value);
        self
    }

    /// Returns the body.
    #[must_use]
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the body as text, if it is valid `UTF-8`.
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Returns the headers.
    #[must_use]
    #[inline]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns an independent copy of body and headers.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            body: Bytes::copy_from_slice(&self.body),
            headers: self.headers.clone(),
        }
    }

    /// Consumes the value, returning its body.
    #[must_use]
    #[inline]
    pub fn into_body(self) -> Bytes {
        self.body
    }
}

impl From<&str> for Value {
    fn from(body: &str) -> Self {
        Self::from_slice(body.as_bytes())
    }
}

impl From<String> for Value {
    fn from(body: String) -> Self {
        Self::new(body)
    }
}
