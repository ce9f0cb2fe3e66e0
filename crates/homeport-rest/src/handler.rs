use tokio::sync::oneshot;

use tracing::{debug, error};

use homeport::event_loop::Context;
use homeport::id::ServiceId;
use homeport::request::{Method, Request, Response, Status};
use homeport::value::Value;

use homeport_http::request::HttpRequest;

use crate::json::{Configuration, State};
use crate::response::{APPLICATION_JSON, HttpResponse, TEXT_PLAIN};
use crate::routes::Route;

/// A media type understood by the REST surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// `application/json`, the state wrapped in a `{"value": ...}` object.
    Json,
    /// `text/plain`, the raw state.
    Text,
}

impl MediaType {
    /// Picks the representation matching an `Accept` header.
    ///
    /// A missing header accepts JSON. Returns [`None`] when no range of the
    /// header is supported.
    #[must_use]
    pub fn accepted(accept: Option<&str>) -> Option<Self> {
        let Some(accept) = accept else {
            return Some(Self::Json);
        };

        let mut ranges = accept
            .split(',')
            .map(essence)
            .filter(|range| !range.is_empty())
            .peekable();
        if ranges.peek().is_none() {
            return Some(Self::Json);
        }

        ranges.find_map(|range| match range.to_ascii_lowercase().as_str() {
            "application/json" | "application/*" | "*/*" => Some(Self::Json),
            "text/plain" | "text/*" => Some(Self::Text),
            _ => None,
        })
    }

    /// Identifies the representation of a request body from its
    /// `Content-Type` header.
    ///
    /// A missing header means JSON.
    #[must_use]
    pub fn content(content_type: Option<&str>) -> Option<Self> {
        let Some(content_type) = content_type else {
            return Some(Self::Json);
        };

        match essence(content_type).to_ascii_lowercase().as_str() {
            APPLICATION_JSON => Some(Self::Json),
            TEXT_PLAIN => Some(Self::Text),
            _ => None,
        }
    }
}

// Strips the parameters of a media type.
fn essence(media_type: &str) -> &str {
    media_type
        .split_once(';')
        .map_or(media_type, |(essence, _)| essence)
        .trim()
}

/// Handles a REST request, returning the response to write back.
///
/// Must run on the loop thread, as a future spawned onto the event loop.
pub async fn handle(context: &Context, request: &HttpRequest) -> HttpResponse {
    debug!("{} {}", request.method(), request.path());

    let route = match Route::resolve(request.url().segments()) {
        Ok(route) => route,
        Err(status) => return HttpResponse::reason(status),
    };

    if request.method() == "OPTIONS" {
        return options(context, &route);
    }

    let Some(media) = MediaType::accepted(request.header("accept")) else {
        return HttpResponse::reason(Status::UnsupportedMediaType);
    };

    match (request.method(), route) {
        ("GET", Route::Devices) => configuration(context, media),
        ("GET", Route::Service(service)) => {
            dispatch(context, service, Method::Get, None, media).await
        }
        ("PUT", Route::Service(service)) => match state(request) {
            Ok(value) => dispatch(context, service, Method::Put, value, media).await,
            Err(status) => HttpResponse::reason(status),
        },
        _ => HttpResponse::reason(Status::MethodNotAllowed),
    }
}

fn configuration(context: &Context, media: MediaType) -> HttpResponse {
    if media != MediaType::Json {
        return HttpResponse::reason(Status::UnsupportedMediaType);
    }

    match context.with_registry(|registry| serde_json::to_vec(&Configuration::new(registry))) {
        Ok(Ok(body)) => HttpResponse::new(Status::Ok).body(APPLICATION_JSON, body),
        Ok(Err(e)) => {
            error!("Cannot serialize the configuration: {e}");
            HttpResponse::reason(Status::InternalServerError)
        }
        Err(_) => HttpResponse::reason(Status::InternalServerError),
    }
}

fn options(context: &Context, route: &Route) -> HttpResponse {
    let methods = match route {
        Route::Devices => Ok(Some(String::from("GET"))),
        Route::Service(service) => context.with_registry(|registry| {
            registry.service(service).map(|service| {
                service
                    .methods()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
        }),
    };

    match methods {
        Ok(Some(methods)) => HttpResponse::reason(Status::Ok)
            .header("Access-Control-Allow-Methods", methods)
            .header("Access-Control-Allow-Origin", "*"),
        Ok(None) => HttpResponse::reason(Status::NotFound),
        Err(_) => HttpResponse::reason(Status::InternalServerError),
    }
}

// Decodes the state carried by a PUT body.
fn state(request: &HttpRequest) -> Result<Option<Value>, Status> {
    let media = MediaType::content(request.header("content-type"))
        .ok_or(Status::UnsupportedMediaType)?;

    let body = request.body();
    if body.is_empty() {
        return Ok(None);
    }

    match media {
        MediaType::Json => serde_json::from_slice::<State>(body)
            .map(|state| Some(Value::from(state.into_value())))
            .map_err(|e| {
                debug!("Malformed state body: {e}");
                Status::BadRequest
            }),
        MediaType::Text => Ok(Some(Value::from_slice(body))),
    }
}

async fn dispatch(
    context: &Context,
    service: ServiceId,
    method: Method,
    value: Option<Value>,
    media: MediaType,
) -> HttpResponse {
    let (sender, receiver) = oneshot::channel();
    let request = Request::new(service, method, value, move |response| {
        // The receiver is gone when the connection was dropped.
        let _ = sender.send(response);
    });

    if context
        .with_registry(|registry| registry.request(request))
        .is_err()
    {
        return HttpResponse::reason(Status::InternalServerError);
    }

    match receiver.await {
        Ok(response) => render(response, media),
        Err(_) => HttpResponse::reason(Status::InternalServerError),
    }
}

// Turns the answer of a service into an HTTP response.
fn render(response: Response, media: MediaType) -> HttpResponse {
    let status = response.status();
    let Some(value) = response.into_value() else {
        return HttpResponse::reason(status);
    };

    match media {
        MediaType::Text => HttpResponse::new(status).body(TEXT_PLAIN, value.into_body().to_vec()),
        MediaType::Json => {
            let Some(text) = value.as_str() else {
                error!("Service answered with a non UTF-8 value");
                return HttpResponse::reason(Status::InternalServerError);
            };
            match serde_json::to_vec(&State::new(text)) {
                Ok(body) => HttpResponse::new(status).body(APPLICATION_JSON, body),
                Err(e) => {
                    error!("Cannot serialize the state: {e}");
                    HttpResponse::reason(Status::InternalServerError)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use homeport::id::ServiceId;
    use homeport::request::{Method, Request, Response, Status};
    use homeport::value::Value;

    use crate::response::{APPLICATION_JSON, TEXT_PLAIN};

    use super::{MediaType, render};

    #[test]
    fn accepted() {
        assert_eq!(MediaType::accepted(None), Some(MediaType::Json));
        assert_eq!(MediaType::accepted(Some("")), Some(MediaType::Json));
        assert_eq!(
            MediaType::accepted(Some("application/json")),
            Some(MediaType::Json)
        );
        assert_eq!(MediaType::accepted(Some("*/*")), Some(MediaType::Json));
        assert_eq!(
            MediaType::accepted(Some("text/plain; charset=utf-8")),
            Some(MediaType::Text)
        );
        assert_eq!(
            MediaType::accepted(Some("text/html, text/plain;q=0.9")),
            Some(MediaType::Text)
        );
        assert_eq!(
            MediaType::accepted(Some("Application/JSON, text/plain")),
            Some(MediaType::Json)
        );
        assert_eq!(MediaType::accepted(Some("text/html")), None);
        assert_eq!(MediaType::accepted(Some("image/png, text/xml")), None);
    }

    #[test]
    fn content() {
        assert_eq!(MediaType::content(None), Some(MediaType::Json));
        assert_eq!(
            MediaType::content(Some("application/json; charset=UTF-8")),
            Some(MediaType::Json)
        );
        assert_eq!(MediaType::content(Some("text/plain")), Some(MediaType::Text));
        assert_eq!(MediaType::content(Some("application/xml")), None);
    }

    fn answer(status: Status, value: Option<&str>) -> Response {
        let (sender, receiver) = std::sync::mpsc::channel();
        let request = Request::new(
            ServiceId::new("zwave", "lamp", "power"),
            Method::Get,
            None,
            move |response| sender.send(response).unwrap(),
        );
        request.respond(status, value.map(Value::from)).unwrap();
        receiver.recv().unwrap()
    }

    #[test]
    fn rendering() {
        let response = render(answer(Status::Ok, Some("1")), MediaType::Json);
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.content_type(), Some(APPLICATION_JSON));
        assert_eq!(response.get_body(), br#"{"value":"1"}"#);

        let response = render(answer(Status::Ok, Some("1")), MediaType::Text);
        assert_eq!(response.content_type(), Some(TEXT_PLAIN));
        assert_eq!(response.get_body(), b"1");

        let response = render(answer(Status::GatewayTimeout, None), MediaType::Json);
        assert_eq!(response.status(), Status::GatewayTimeout);
        assert_eq!(response.get_body(), b"Gateway Timeout");
    }
}
