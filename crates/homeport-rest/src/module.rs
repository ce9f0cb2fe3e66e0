use std::net::Ipv4Addr;

use tokio_util::sync::CancellationToken;

use tracing::{error, info};

use homeport::error::{Error, ErrorKind, Result};
use homeport::event_loop::Context;
use homeport::module::{Module, ModuleOption};

use homeport_http::request::Limits;

use crate::server::{DEFAULT_SERVER_PORT, Server};

// Name of the port option.
const PORT: &str = "port";

const OPTIONS: [ModuleOption; 1] = [ModuleOption::with_argument(
    PORT,
    "port",
    "Listener port for rest server.",
)];

/// The module plugging a REST [`Server`] into the daemon lifecycle.
///
/// The server is spawned onto the event loop when the module starts and shut
/// down when it stops. The port can be set from the command line with
/// `--<module-id>-port <port>`.
#[derive(Debug)]
pub struct RestModule {
    // HTTP address.
    http_address: Ipv4Addr,
    // Server port.
    port: u16,
    // Request size limits.
    limits: Limits,
    // Shutdown signal of the running server.
    shutdown: Option<CancellationToken>,
}

impl Default for RestModule {
    fn default() -> Self {
        Self::new()
    }
}

impl RestModule {
    /// Creates a [`RestModule`] listening on all interfaces.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            http_address: Ipv4Addr::UNSPECIFIED,
            port: DEFAULT_SERVER_PORT,
            limits: Limits::new(),
            shutdown: None,
        }
    }

    /// Sets the server `IPv4` address.
    #[must_use]
    pub const fn address(mut self, http_address: Ipv4Addr) -> Self {
        self.http_address = http_address;
        self
    }

    /// Sets the server port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the request size limits.
    #[must_use]
    pub const fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Returns the server port.
    #[must_use]
    #[inline]
    pub const fn server_port(&self) -> u16 {
        self.port
    }
}

impl Module for RestModule {
    fn options(&self) -> &[ModuleOption] {
        &OPTIONS
    }

    fn on_parse_opt(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        match (name, value) {
            (PORT, Some(value)) => {
                self.port = value.parse().map_err(|_| {
                    Error::new(ErrorKind::Argument, format!("Invalid port `{value}`."))
                })?;
                Ok(())
            }
            _ => Err(Error::new(
                ErrorKind::Argument,
                format!("Option `{name}` not recognized."),
            )),
        }
    }

    fn on_start(&mut self, context: &Context) -> Result<()> {
        let shutdown = CancellationToken::new();

        let server = Server::new(context.clone())
            .address(self.http_address)
            .port(self.port)
            .limits(self.limits)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned());

        context.handle().spawn_future(async move {
            if let Err(e) = server.run().await {
                error!("REST server failed: {e}");
            }
        })?;

        info!("REST module started on port {}", self.port);
        self.shutdown = Some(shutdown);

        Ok(())
    }

    fn on_stop(&mut self, _context: &Context) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.cancel();
            info!("REST module stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serial_test::serial;

    use homeport::adapter::Adapter;
    use homeport::attributes::TYPE;
    use homeport::daemon::Daemon;
    use homeport::device::Device;
    use homeport::error::{ErrorKind, Result};
    use homeport::event_loop::Context;
    use homeport::id::AdapterId;
    use homeport::module::Module;
    use homeport::request::{Method, Request, Status};
    use homeport::service::Service;
    use homeport::value::Value;

    use crate::server::tests::exchange;

    use super::RestModule;

    const PORT: u16 = 18_888;

    // Attaches a lamp whose power state can be read and written, and whose
    // energy meter can only be read.
    struct Lamps;

    impl Module for Lamps {
        fn on_start(&mut self, context: &Context) -> Result<()> {
            let state = Arc::new(Mutex::new(String::from("0")));
            let written = Arc::clone(&state);

            let power = Service::new("power")
                .attribute(TYPE, "switch")
                .action(Method::Get, move |request: Request| {
                    let value = state.lock().unwrap().clone();
                    request.respond(Status::Ok, Some(Value::from(value)))
                })
                .action(Method::Put, move |request: Request| {
                    let Some(value) = request.value().and_then(Value::as_str) else {
                        return request.respond(Status::BadRequest, None);
                    };
                    *written.lock().unwrap() = value.to_owned();
                    let value = request.value().map(Value::copy);
                    request.respond(Status::Ok, value)
                });

            let meter = Service::new("meter")
                .attribute(TYPE, "energy")
                .action(Method::Get, |request: Request| {
                    request.respond(Status::Ok, Some(Value::from("42")))
                });

            let adapter = Adapter::new("zwave").device(
                Device::new("lamp 1")
                    .service(power)?
                    .service(meter)?,
            )?;
            context.with_registry(|registry| registry.attach_adapter(adapter))??;

            Ok(())
        }

        fn on_stop(&mut self, context: &Context) -> Result<()> {
            context.with_registry(|registry| registry.detach_adapter(&AdapterId::new("zwave")))??;
            Ok(())
        }
    }

    #[test]
    fn port_option() {
        let mut module = RestModule::new();

        module.on_parse_opt("port", Some("9000")).unwrap();
        assert_eq!(module.server_port(), 9000);

        assert_eq!(
            module.on_parse_opt("port", Some("http")).unwrap_err().kind(),
            ErrorKind::Argument
        );
        assert_eq!(
            module.on_parse_opt("host", Some("localhost")).unwrap_err().kind(),
            ErrorKind::Argument
        );
        assert_eq!(module.server_port(), 9000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn rest_surface() {
        let daemon = Daemon::new()
            .module("lamps", Lamps)
            .unwrap()
            .module("rest", RestModule::new())
            .unwrap()
            .args(["--rest-port=18888"])
            .unwrap();

        let handle = daemon.handle();
        let daemon = std::thread::spawn(move || daemon.run());

        // Configuration.
        let response = exchange(PORT, "GET /devices HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Type: application/json\r\n"));
        assert!(response.contains("Connection: close\r\n"));
        assert!(response.contains(r#""_uri":"/zwave/lamp%201/power""#));

        // Read the state in both representations.
        let response = exchange(PORT, "GET /zwave/lamp%201/power HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with(r#"{"value":"0"}"#));

        let response = exchange(
            PORT,
            "GET /zwave/lamp%201/power HTTP/1.1\r\nAccept: text/plain\r\n\r\n",
        )
        .await;
        assert!(response.ends_with("\r\n\r\n0"));

        // Write the state.
        let body = r#"{"value":"1"}"#;
        let request = format!(
            "PUT /zwave/lamp%201/power HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let response = exchange(PORT, &request).await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with(body));

        let response = exchange(
            PORT,
            "GET /zwave/lamp%201/power HTTP/1.1\r\nAccept: text/plain\r\n\r\n",
        )
        .await;
        assert!(response.ends_with("\r\n\r\n1"));

        let response = exchange(
            PORT,
            "PUT /zwave/lamp%201/power HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 1\r\n\r\n0",
        )
        .await;
        assert!(response.ends_with(r#"{"value":"0"}"#));

        let response = exchange(
            PORT,
            "PUT /zwave/lamp%201/power HTTP/1.1\r\nContent-Length: 5\r\n\r\nvalue",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));

        // Failures.
        let response = exchange(PORT, "GET /zwave/lamp%201/color HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));

        let response = exchange(PORT, "GET /zwave HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));

        let response = exchange(PORT, "DELETE /zwave/lamp%201/power HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));

        // The meter has no PUT action.
        let response = exchange(
            PORT,
            "PUT /zwave/lamp%201/meter HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 1\r\n\r\n0",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));

        let response = exchange(PORT, "GET /zwave/lamp%201/meter HTTP/1.1\r\n\r\n").await;
        assert!(response.ends_with(r#"{"value":"42"}"#));

        let response = exchange(
            PORT,
            "GET /zwave/lamp%201/power HTTP/1.1\r\nAccept: text/html\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 415 Unsupported Media Type\r\n"));

        let response = exchange(PORT, "GET /devices HTTP/2.0\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 501 Not Implemented\r\n"));

        // Methods.
        let response = exchange(PORT, "OPTIONS /zwave/lamp%201/power HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Access-Control-Allow-Methods: GET, PUT\r\n"));
        assert!(response.contains("Access-Control-Allow-Origin: *\r\n"));

        let response = exchange(PORT, "OPTIONS /zwave/lamp%201/meter HTTP/1.1\r\n\r\n").await;
        assert!(response.contains("Access-Control-Allow-Methods: GET\r\n"));

        handle.stop().unwrap();
        daemon.join().unwrap().unwrap();
    }
}
