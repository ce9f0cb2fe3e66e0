use hashbrown::DefaultHashBuilder;

use indexmap::IndexMap;

use log::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::url::{UrlParser, UrlParts};

// Default maximum size of the request line and headers.
const MAX_HEAD: usize = 8 * 1024;
// Default maximum size of the body.
const MAX_BODY: usize = 1024 * 1024;

/// Size limits enforced by the [`HttpParser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    // Maximum size of the request line and headers.
    head: usize,
    // Maximum size of the body.
    body: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}

impl Limits {
    /// Creates [`Limits`] of 8 KiB for the head and 1 MiB for the body.
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: MAX_HEAD,
            body: MAX_BODY,
        }
    }

    /// Sets the maximum size of the request line and headers.
    #[must_use]
    #[inline]
    pub const fn head(mut self, head: usize) -> Self {
        self.head = head;
        self
    }

    /// Sets the maximum size of the body.
    #[must_use]
    #[inline]
    pub const fn body(mut self, body: usize) -> Self {
        self.body = body;
        self
    }

    /// Returns the maximum size of the request line and headers.
    #[must_use]
    #[inline]
    pub const fn max_head(&self) -> usize {
        self.head
    }

    /// Returns the maximum size of the body.
    #[must_use]
    #[inline]
    pub const fn max_body(&self) -> usize {
        self.body
    }
}

/// Request headers, with lowercase names in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(IndexMap<String, String, DefaultHashBuilder>);

impl Headers {
    /// Returns the value of a header, whatever the case of its name.
    #[must_use]
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name.to_ascii_lowercase().as_str())
            .map(String::as_str)
    }

    /// Checks whether a header is present.
    #[must_use]
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over the headers.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns the number of distinct headers.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks whether there are no headers.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // Repeated headers are joined with a comma.
    fn append(&mut self, name: String, value: &str) {
        self.0
            .entry(name)
            .and_modify(|current| {
                current.push_str(", ");
                current.push_str(value);
            })
            .or_insert_with(|| value.to_owned());
    }
}

/// A parsed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    // Method, as sent.
    method: String,
    // Request target.
    url: UrlParts,
    // Protocol version.
    version: String,
    // Headers.
    headers: Headers,
    // Body.
    body: Vec<u8>,
}

impl HttpRequest {
    /// Returns the method.
    #[must_use]
    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the parts of the request target.
    #[must_use]
    #[inline]
    pub const fn url(&self) -> &UrlParts {
        &self.url
    }

    /// Returns the path of the request target.
    #[must_use]
    #[inline]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Returns the protocol version, such as `HTTP/1.1`.
    #[must_use]
    #[inline]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the value of a header.
    #[must_use]
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns the [`Headers`].
    #[must_use]
    #[inline]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body.
    #[must_use]
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consumes the request, returning its body.
    #[must_use]
    #[inline]
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Method,
    Target,
    Version,
    Header,
    Body,
    Done,
    Error,
}

/// An incremental HTTP/1.x request parser.
///
/// Bytes are fed as they arrive, split anywhere. The request target is fed
/// to a [`UrlParser`] as it is received. The body is delimited by
/// `Content-Length`; chunked transfer coding is not supported.
#[derive(Debug)]
pub struct HttpParser {
    // Size limits.
    limits: Limits,
    // Current state.
    state: State,
    // Pending line.
    line: Vec<u8>,
    // Bytes of the head consumed so far.
    head: usize,
    // Method.
    method: String,
    // Target parser.
    url: UrlParser<UrlParts>,
    // Protocol version.
    version: String,
    // Headers.
    headers: Headers,
    // Body.
    body: Vec<u8>,
    // Body bytes still expected.
    remaining: usize,
}

impl Default for HttpParser {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

impl HttpParser {
    /// Creates an [`HttpParser`].
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            state: State::Method,
            line: Vec::new(),
            head: 0,
            method: String::new(),
            url: UrlParser::new(UrlParts::default()),
            version: String::new(),
            headers: Headers::default(),
            body: Vec::new(),
            remaining: 0,
        }
    }

    /// Feeds a chunk, returning the request once it is complete.
    ///
    /// Bytes following a complete request are ignored.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Syntax`] on malformed input
    /// - [`ErrorKind::Limit`] when the head or the body is too large
    /// - [`ErrorKind::Unsupported`] on unknown versions and transfer codings
    /// - [`ErrorKind::InvalidState`] when the parser has completed or failed
    ///
    /// All but the last one fail the parser.
    pub fn parse(&mut self, chunk: &[u8]) -> Result<Option<HttpRequest>> {
        match self.state {
            State::Done => {
                return Err(Error::new(
                    ErrorKind::InvalidState,
                    "The request is already complete.",
                ));
            }
            State::Error => {
                return Err(Error::new(
                    ErrorKind::InvalidState,
                    "The request parser has failed.",
                ));
            }
            _ => {}
        }

        match self.feed(chunk) {
            Ok(()) if self.state == State::Done => Ok(Some(self.take())),
            Ok(()) => Ok(None),
            Err(e) => {
                self.state = State::Error;
                Err(e)
            }
        }
    }

    /// Checks whether the parser has failed.
    #[must_use]
    #[inline]
    pub fn has_failed(&self) -> bool {
        self.state == State::Error
    }

    fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        let mut index = 0;

        while index < chunk.len() && self.state != State::Done {
            if self.state == State::Body {
                let count = self.remaining.min(chunk.len() - index);
                self.body.extend_from_slice(&chunk[index..index + count]);
                self.remaining -= count;
                index += count;
                if self.remaining == 0 {
                    self.state = State::Done;
                }
                continue;
            }

            self.head += 1;
            if self.head > self.limits.head {
                return Err(Error::new(
                    ErrorKind::Limit,
                    format!("Request head exceeds {} bytes.", self.limits.head),
                ));
            }

            self.step(chunk[index])?;
            index += 1;
        }

        Ok(())
    }

    fn step(&mut self, byte: u8) -> Result<()> {
        match self.state {
            State::Method => match byte {
                b' ' if !self.method.is_empty() => self.state = State::Target,
                b'A'..=b'Z' | b'a'..=b'z' | b'-' | b'_' => self.method.push(char::from(byte)),
                _ => return Err(unexpected(byte, "method")),
            },
            State::Target => {
                if byte == b' ' {
                    self.url.complete()?;
                    self.state = State::Version;
                } else {
                    self.url.add_chunk(&[byte])?;
                }
            }
            State::Version => {
                if byte == b'\n' {
                    let version = line(&mut self.line)?;
                    if version != "HTTP/1.1" && version != "HTTP/1.0" {
                        return Err(Error::new(
                            ErrorKind::Unsupported,
                            format!("Unsupported protocol version `{version}`."),
                        ));
                    }
                    self.version = version;
                    self.state = State::Header;
                } else {
                    self.line.push(byte);
                }
            }
            State::Header => {
                if byte == b'\n' {
                    let header = line(&mut self.line)?;
                    if header.is_empty() {
                        self.end_of_head()?;
                    } else {
                        self.header(&header)?;
                    }
                } else {
                    self.line.push(byte);
                }
            }
            State::Body | State::Done | State::Error => {}
        }

        Ok(())
    }

    fn header(&mut self, header: &str) -> Result<()> {
        let (name, value) = header.split_once(':').ok_or_else(|| {
            Error::new(ErrorKind::Syntax, format!("Malformed header `{header}`."))
        })?;

        if name.is_empty() || !name.bytes().all(|byte| byte.is_ascii_graphic()) {
            return Err(Error::new(
                ErrorKind::Syntax,
                format!("Malformed header name `{name}`."),
            ));
        }

        self.headers
            .append(name.to_ascii_lowercase(), value.trim());
        Ok(())
    }

    fn end_of_head(&mut self) -> Result<()> {
        if self.headers.contains("transfer-encoding") {
            return Err(Error::new(
                ErrorKind::Unsupported,
                "Transfer codings are not supported.",
            ));
        }

        let length = match self.headers.get("content-length") {
            Some(value) => content_length(value)?,
            None => 0,
        };
        if length > self.limits.body {
            return Err(Error::new(
                ErrorKind::Limit,
                format!("Request body exceeds {} bytes.", self.limits.body),
            ));
        }

        debug!("{} {} with a body of {length} bytes", self.method, self.url.as_str());
        self.remaining = length;
        self.body.reserve_exact(length);
        self.state = if length == 0 { State::Done } else { State::Body };
        Ok(())
    }

    fn take(&mut self) -> HttpRequest {
        let url = std::mem::replace(&mut self.url, UrlParser::new(UrlParts::default()));
        HttpRequest {
            method: std::mem::take(&mut self.method),
            url: url.into_handler(),
            version: std::mem::take(&mut self.version),
            headers: std::mem::take(&mut self.headers),
            body: std::mem::take(&mut self.body),
        }
    }
}

fn unexpected(byte: u8, part: &str) -> Error {
    Error::new(
        ErrorKind::Syntax,
        format!("Unexpected character `{}` in {part}.", byte.escape_ascii()),
    )
}

// Takes the pending line without its carriage return.
fn line(pending: &mut Vec<u8>) -> Result<String> {
    let mut bytes = std::mem::take(pending);
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8(bytes)
        .map_err(|_| Error::new(ErrorKind::Syntax, "Request head is not UTF-8."))
}

// Repeated lengths have been joined and must agree.
fn content_length(value: &str) -> Result<usize> {
    let mut lengths = value.split(',').map(|length| {
        length.trim().parse::<usize>().map_err(|_| {
            Error::new(
                ErrorKind::Syntax,
                format!("Invalid Content-Length `{value}`."),
            )
        })
    });

    let first = lengths.next().unwrap_or(Ok(0))?;
    for length in lengths {
        if length? != first {
            return Err(Error::new(
                ErrorKind::Syntax,
                format!("Conflicting Content-Length `{value}`."),
            ));
        }
    }

    Ok(first)
}
