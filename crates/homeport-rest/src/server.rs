use std::future::Future;
use std::net::Ipv4Addr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use tracing::{debug, info, warn};

use homeport::event_loop::Context;
use homeport::request::Status;

use homeport_http::error::ErrorKind as HttpErrorKind;
use homeport_http::request::{HttpParser, Limits};

use crate::error::Result;
use crate::handler::handle;
use crate::response::HttpResponse;

// Default HTTP address.
//
// The entire local network is considered, so the Ipv4 unspecified address is
// used.
const DEFAULT_HTTP_ADDRESS: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8888;

// Size of a socket read.
const READ_BUFFER_SIZE: usize = 1024;

#[derive(Debug)]
struct ServerData {
    // HTTP address.
    http_address: Ipv4Addr,
    // Server port.
    port: u16,
    // Request size limits.
    limits: Limits,
    // Event loop context.
    context: Context,
}

/// A REST server exposing the registry of an event loop.
///
/// The server runs as a future spawned onto the event loop, so requests are
/// dispatched on the loop thread.
#[derive(Debug)]
pub struct Server {
    data: ServerData,
}

impl Server {
    /// Creates a [`Server`] serving the registry of the given [`Context`].
    #[must_use]
    pub const fn new(context: Context) -> Self {
        Self {
            data: ServerData {
                http_address: DEFAULT_HTTP_ADDRESS,
                port: DEFAULT_SERVER_PORT,
                limits: Limits::new(),
                context,
            },
        }
    }

    /// Sets the server `IPv4` address.
    #[must_use]
    pub const fn address(mut self, http_address: Ipv4Addr) -> Self {
        self.data.http_address = http_address;
        self
    }

    /// Sets the server port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.data.port = port;
        self
    }

    /// Sets the request size limits.
    #[must_use]
    pub const fn limits(mut self, limits: Limits) -> Self {
        self.data.limits = limits;
        self
    }

    /// Transforms the server into a [`GracefulShutdownServer`].
    ///
    /// The [`Future`] passed as input manages the graceful shutdown of
    /// the server.
    #[must_use]
    #[inline]
    pub fn with_graceful_shutdown<F>(self, signal: F) -> GracefulShutdownServer<F>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        GracefulShutdownServer {
            data: self.data,
            signal,
        }
    }

    /// Runs the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to start.
    pub async fn run(self) -> Result<()> {
        self.with_graceful_shutdown(std::future::pending())
            .run()
            .await
    }
}

/// A server with graceful shutdown.
///
/// Aside from the graceful shutdown functionality, it behaves the same as
/// [`Server`].
#[derive(Debug)]
pub struct GracefulShutdownServer<F> {
    // Server data.
    data: ServerData,
    // Graceful shutdown signal.
    signal: F,
}

impl<F> GracefulShutdownServer<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    /// Runs the server with graceful shutdown.
    ///
    /// Connections already accepted when the signal fires are served to
    /// completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to start.
    pub async fn run(self) -> Result<()> {
        let Self { data, signal } = self;

        // Create a new TCP socket which responds to the specified HTTP address
        // and port.
        let listener = TcpListener::bind((data.http_address, data.port)).await?;

        info!("REST server reachable at {}", listener.local_addr()?);

        let mut signal = std::pin::pin!(signal);
        loop {
            tokio::select! {
                () = &mut signal => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Connection from {peer}");
                        tokio::spawn(serve(data.context.clone(), stream, data.limits));
                    }
                    Err(e) => warn!("Cannot accept a connection: {e}"),
                },
            }
        }

        info!("REST server stopped");

        Ok(())
    }
}

async fn serve(context: Context, stream: TcpStream, limits: Limits) {
    if let Err(e) = connection(&context, stream, limits).await {
        debug!("Connection closed: {e}");
    }
}

// Reads one request, answers it and closes the connection.
async fn connection(context: &Context, mut stream: TcpStream, limits: Limits) -> Result<()> {
    let mut parser = HttpParser::new(limits);
    let mut buffer = [0; READ_BUFFER_SIZE];

    let response = loop {
        let read = stream.read(&mut buffer).await?;
        if read == 0 {
            debug!("Connection closed before a complete request");
            return Ok(());
        }

        match parser.parse(&buffer[..read]) {
            Ok(Some(request)) => break handle(context, &request).await,
            Ok(None) => {}
            Err(e) => break HttpResponse::reason(parse_status(e.kind())),
        }
    };

    stream.write_all(&response.to_bytes()).await?;
    stream.shutdown().await?;

    Ok(())
}

const fn parse_status(kind: HttpErrorKind) -> Status {
    match kind {
        HttpErrorKind::Limit => Status::RequestEntityTooLarge,
        HttpErrorKind::Unsupported => Status::NotImplemented,
        HttpErrorKind::Syntax | HttpErrorKind::InvalidState => Status::BadRequest,
    }
}
