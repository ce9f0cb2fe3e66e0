use std::fmt::Write;
use std::ops::Range;

use hashbrown::DefaultHashBuilder;

use indexmap::IndexMap;

use log::debug;

use crate::error::{Error, ErrorKind, Result};

// Characters allowed anywhere in a URL.
const fn is_legal(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'-' | b'.'
                | b'_'
                | b'~'
                | b':'
                | b'/'
                | b'?'
                | b'#'
                | b'['
                | b']'
                | b'@'
                | b'!'
                | b'$'
                | b'&'
                | b'\''
                | b'('
                | b')'
                | b'*'
                | b'+'
                | b','
                | b';'
                | b'='
                | b'%'
        )
}

fn unexpected(byte: u8, index: usize) -> Error {
    Error::new(
        ErrorKind::Syntax,
        format!("Unexpected character `{}` at {index}.", byte.escape_ascii()),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Protocol,
    Slash1,
    Slash2,
    Host,
    PrePort,
    Port,
    Segment,
    Key,
    Value,
    Complete,
    Error,
}

/// A part of the URL, borrowed from the parser buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span<'a> {
    offset: usize,
    text: &'a str,
}

impl<'a> Span<'a> {
    fn new(buffer: &'a str, range: Range<usize>) -> Self {
        Self {
            offset: range.start,
            text: &buffer[range],
        }
    }

    /// Returns the byte offset of the span within the URL.
    #[must_use]
    #[inline]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the span length in bytes.
    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.text.len()
    }

    /// Checks whether the span is empty.
    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Returns the span text.
    #[must_use]
    #[inline]
    pub const fn as_str(&self) -> &'a str {
        self.text
    }
}

impl std::fmt::Display for Span<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.text.fmt(f)
    }
}

/// Receives the parts of a URL as the [`UrlParser`] recognizes them.
///
/// Spans borrow the parser buffer and are only valid during the callback.
pub trait UrlHandler {
    /// The first character has been accepted.
    fn on_begin(&mut self) {}

    /// The scheme, such as `http`.
    fn on_protocol(&mut self, _protocol: Span<'_>) {}

    /// The host.
    fn on_host(&mut self, _host: Span<'_>) {}

    /// The port, made of digits only.
    fn on_port(&mut self, _port: Span<'_>) {}

    /// A path segment, without slashes.
    fn on_path_segment(&mut self, _segment: Span<'_>) {}

    /// The whole path, with slashes.
    fn on_path_complete(&mut self, _path: Span<'_>) {}

    /// A query pair. The value is empty for keys without `=`.
    fn on_key_value(&mut self, _key: Span<'_>, _value: Span<'_>) {}

    /// The whole URL.
    fn on_complete(&mut self, _url: Span<'_>) {}
}

/// How a URL ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The URL ended in the path or in the query.
    Complete,
    /// The URL ended within the host or the port. The part being read when
    /// the URL ended is not reported: a host followed by a port has been
    /// reported at the `:`, the port has not.
    Incomplete,
}

/// An incremental URL parser.
///
/// Chunks are appended with [`UrlParser::add_chunk`] as they arrive and
/// parts are reported to the [`UrlHandler`] as soon as they are delimited,
/// independently of where chunks are split. [`UrlParser::complete`] reports
/// the last pending part.
///
/// Both absolute URLs (`http://host:port/path?query`) and absolute paths
/// (`/path?query`) are accepted. Errors are terminal: a failed parser
/// rejects any further input.
#[derive(Debug)]
pub struct UrlParser<H: UrlHandler> {
    // Handler.
    handler: H,
    // Current state.
    state: State,
    // Accepted characters.
    buffer: String,
    // Start of the pending part.
    mark: usize,
    // Pending query key.
    key: (usize, usize),
    // Start of the path.
    path: usize,
}

impl<H: UrlHandler> UrlParser<H> {
    /// Creates a [`UrlParser`].
    #[must_use]
    #[inline]
    pub const fn new(handler: H) -> Self {
        Self {
            handler,
            state: State::Start,
            buffer: String::new(),
            mark: 0,
            key: (0, 0),
            path: 0,
        }
    }

    /// Appends a chunk.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Syntax`] when the chunk breaks the URL grammar, which
    ///   fails the parser
    /// - [`ErrorKind::InvalidState`] when the parser has completed or failed
    pub fn add_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.ensure_open()?;

        for &byte in chunk {
            if let Err(e) = self.step(byte) {
                self.state = State::Error;
                return Err(e);
            }
        }

        Ok(())
    }

    /// Ends the URL, reporting the pending path segment or query pair.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Syntax`] when the URL ends before a host or a path,
    ///   which fails the parser
    /// - [`ErrorKind::InvalidState`] when the parser has completed or failed
    pub fn complete(&mut self) -> Result<Completion> {
        self.ensure_open()?;
        let end = self.buffer.len();

        let completion = match self.state {
            State::Segment => {
                if self.mark < end {
                    self.handler
                        .on_path_segment(Span::new(&self.buffer, self.mark..end));
                }
                self.handler
                    .on_path_complete(Span::new(&self.buffer, self.path..end));
                Completion::Complete
            }
            State::Key => {
                if self.mark < end {
                    self.handler.on_key_value(
                        Span::new(&self.buffer, self.mark..end),
                        Span::new(&self.buffer, end..end),
                    );
                }
                Completion::Complete
            }
            State::Value => {
                self.handler.on_key_value(
                    Span::new(&self.buffer, self.key.0..self.key.1),
                    Span::new(&self.buffer, self.mark..end),
                );
                Completion::Complete
            }
            State::Host | State::Port => {
                debug!("URL `{}` ends before its path", self.buffer);
                Completion::Incomplete
            }
            _ => {
                self.state = State::Error;
                return Err(Error::new(
                    ErrorKind::Syntax,
                    format!("URL `{}` ends unexpectedly.", self.buffer),
                ));
            }
        };

        self.state = State::Complete;
        self.handler.on_complete(Span::new(&self.buffer, 0..end));

        Ok(completion)
    }

    /// Checks whether the parser has completed.
    #[must_use]
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// Checks whether the parser has failed.
    #[must_use]
    #[inline]
    pub fn has_failed(&self) -> bool {
        self.state == State::Error
    }

    /// Returns the accepted characters.
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Returns the [`UrlHandler`].
    #[must_use]
    #[inline]
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// Consumes the parser, returning its [`UrlHandler`].
    #[must_use]
    #[inline]
    pub fn into_handler(self) -> H {
        self.handler
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            State::Complete => Err(Error::new(
                ErrorKind::InvalidState,
                "The URL is already complete.",
            )),
            State::Error => Err(Error::new(
                ErrorKind::InvalidState,
                "The URL parser has failed.",
            )),
            _ => Ok(()),
        }
    }

    fn step(&mut self, byte: u8) -> Result<()> {
        let index = self.buffer.len();
        if !is_legal(byte) {
            return Err(unexpected(byte, index));
        }
        self.buffer.push(char::from(byte));

        match (self.state, byte) {
            (State::Start, b'/') => {
                self.handler.on_begin();
                self.enter_path(index);
            }
            (State::Start, _) if byte.is_ascii_alphabetic() => {
                self.handler.on_begin();
                self.state = State::Protocol;
                self.mark = index;
            }
            (State::Protocol, b':') => {
                self.handler
                    .on_protocol(Span::new(&self.buffer, self.mark..index));
                self.state = State::Slash1;
            }
            (State::Protocol, _)
                if byte.is_ascii_alphanumeric() || matches!(byte, b'+' | b'-' | b'.') => {}
            (State::Slash1, b'/') => self.state = State::Slash2,
            (State::Slash2, b'/') => {
                self.state = State::Host;
                self.mark = index + 1;
            }
            (State::Host, b':') => {
                self.emit_host(index)?;
                self.state = State::PrePort;
                self.mark = index + 1;
            }
            (State::Host, b'/') => {
                self.emit_host(index)?;
                self.enter_path(index);
            }
            (State::Host, b'?') => {
                self.emit_host(index)?;
                self.path = index;
                self.enter_query(index);
            }
            (State::Host, _) => {}
            (State::PrePort, b'0'..=b'9') => self.state = State::Port,
            (State::Port, b'0'..=b'9') => {}
            (State::Port, b'/') => {
                self.emit_port(index);
                self.enter_path(index);
            }
            (State::Port, b'?') => {
                self.emit_port(index);
                self.path = index;
                self.enter_query(index);
            }
            (State::Segment, b'/') => {
                self.handler
                    .on_path_segment(Span::new(&self.buffer, self.mark..index));
                self.mark = index + 1;
            }
            (State::Segment, b'?') => {
                if self.mark < index {
                    self.handler
                        .on_path_segment(Span::new(&self.buffer, self.mark..index));
                }
                self.enter_query(index);
            }
            (State::Key, b'=') => {
                self.key = (self.mark, index);
                self.mark = index + 1;
                self.state = State::Value;
            }
            (State::Key, b'&') => {
                if self.mark < index {
                    self.handler.on_key_value(
                        Span::new(&self.buffer, self.mark..index),
                        Span::new(&self.buffer, index..index),
                    );
                }
                self.mark = index + 1;
            }
            (State::Value, b'&') => {
                self.handler.on_key_value(
                    Span::new(&self.buffer, self.key.0..self.key.1),
                    Span::new(&self.buffer, self.mark..index),
                );
                self.mark = index + 1;
                self.state = State::Key;
            }
            (State::Segment | State::Key | State::Value, _) => {}
            _ => return Err(unexpected(byte, index)),
        }

        Ok(())
    }

    fn emit_host(&mut self, index: usize) -> Result<()> {
        if self.mark == index {
            return Err(Error::new(
                ErrorKind::Syntax,
                format!("Empty host in `{}`.", self.buffer),
            ));
        }
        self.handler
            .on_host(Span::new(&self.buffer, self.mark..index));
        Ok(())
    }

    fn emit_port(&mut self, index: usize) {
        self.handler
            .on_port(Span::new(&self.buffer, self.mark..index));
    }

    fn enter_path(&mut self, index: usize) {
        self.path = index;
        self.mark = index + 1;
        self.state = State::Segment;
    }

    // Reports the path ending at the question mark.
    fn enter_query(&mut self, index: usize) {
        self.handler
            .on_path_complete(Span::new(&self.buffer, self.path..index));
        self.mark = index + 1;
        self.state = State::Key;
    }
}

/// The parts of a URL, collected by a [`UrlParser`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParts {
    // Scheme.
    protocol: Option<String>,
    // Host.
    host: Option<String>,
    // Port.
    port: Option<String>,
    // Path, with slashes.
    path: String,
    // Path segments.
    segments: Vec<String>,
    // Query pairs.
    query: IndexMap<String, String, DefaultHashBuilder>,
    // Whole URL.
    url: String,
}

impl UrlHandler for UrlParts {
    fn on_protocol(&mut self, protocol: Span<'_>) {
        self.protocol = Some(protocol.as_str().into());
    }

    fn on_host(&mut self, host: Span<'_>) {
        self.host = Some(host.as_str().into());
    }

    fn on_port(&mut self, port: Span<'_>) {
        self.port = Some(port.as_str().into());
    }

    fn on_path_segment(&mut self, segment: Span<'_>) {
        self.segments.push(segment.as_str().into());
    }

    fn on_path_complete(&mut self, path: Span<'_>) {
        self.path = path.as_str().into();
    }

    fn on_key_value(&mut self, key: Span<'_>, value: Span<'_>) {
        self.query.insert(key.as_str().into(), value.as_str().into());
    }

    fn on_complete(&mut self, url: Span<'_>) {
        self.url = url.as_str().into();
    }
}

impl UrlParts {
    /// Parses a whole URL.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::Syntax`] when the URL is malformed.
    pub fn parse(url: &str) -> Result<Self> {
        let mut parser = UrlParser::new(Self::default());
        parser.add_chunk(url.as_bytes())?;
        parser.complete()?;
        Ok(parser.into_handler())
    }

    /// Returns the scheme.
    #[must_use]
    #[inline]
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Returns the host.
    #[must_use]
    #[inline]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Returns the port.
    #[must_use]
    #[inline]
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Returns the path, or an empty string when the URL has none.
    #[must_use]
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the path segments, still percent-encoded.
    #[must_use]
    #[inline]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the value of a query key, still percent-encoded.
    #[must_use]
    #[inline]
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Iterates over the query pairs in URL order.
    #[inline]
    pub fn query_pairs(&self) -> impl ExactSizeIterator<Item = (&str, &str)> {
        self.query
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Returns the whole URL.
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

/// Decodes `%XX` escapes.
///
/// # Errors
///
/// Fails with [`ErrorKind::Syntax`] on truncated or non-hexadecimal escapes
/// and when the decoded bytes are not UTF-8.
pub fn percent_decode(input: &str) -> Result<String> {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'%' {
            let escape = bytes
                .get(index + 1..index + 3)
                .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::Syntax,
                        format!("Invalid escape at {index} in `{input}`."),
                    )
                })?;
            decoded.push(escape);
            index += 3;
        } else {
            decoded.push(bytes[index]);
            index += 1;
        }
    }

    String::from_utf8(decoded).map_err(|_| {
        Error::new(
            ErrorKind::Syntax,
            format!("`{input}` does not decode to UTF-8."),
        )
    })
}

/// Encodes every byte but unreserved characters as `%XX`.
#[must_use]
pub fn percent_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}
