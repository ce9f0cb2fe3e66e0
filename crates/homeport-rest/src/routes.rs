use homeport::id::ServiceId;
use homeport::request::Status;

use homeport_http::url::{percent_decode, percent_encode};

/// Path segment listing the whole configuration.
pub const DEVICES: &str = "devices";

/// A resolved REST path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/devices`
    Devices,
    /// `/{adapter}/{device}/{service}`
    Service(ServiceId),
}

impl Route {
    /// Resolves the segments of a request path.
    ///
    /// Service segments are percent-decoded.
    ///
    /// # Errors
    ///
    /// - [`Status::NotFound`] when the path matches no route
    /// - [`Status::BadRequest`] when a segment holds a malformed escape
    pub fn resolve(segments: &[String]) -> Result<Self, Status> {
        match segments {
            [devices] if devices == DEVICES => Ok(Self::Devices),
            [adapter, device, service] => {
                let decode =
                    |segment: &str| percent_decode(segment).map_err(|_| Status::BadRequest);
                Ok(Self::Service(ServiceId::new(
                    decode(adapter)?,
                    decode(device)?,
                    decode(service)?,
                )))
            }
            _ => Err(Status::NotFound),
        }
    }
}

/// Builds the path under which a service is reachable.
#[must_use]
pub fn service_uri(service: &ServiceId) -> String {
    format!(
        "/{}/{}/{}",
        percent_encode(service.adapter().id()),
        percent_encode(service.device().id()),
        percent_encode(service.id())
    )
}

#[cfg(test)]
mod tests {
    use homeport::id::ServiceId;
    use homeport::request::Status;

    use super::{Route, service_uri};

    fn segments(path: &[&str]) -> Vec<String> {
        path.iter().map(|segment| (*segment).to_owned()).collect()
    }

    #[test]
    fn resolve() {
        assert_eq!(Route::resolve(&segments(&["devices"])), Ok(Route::Devices));

        assert_eq!(
            Route::resolve(&segments(&["zwave", "lamp%200", "power"])),
            Ok(Route::Service(ServiceId::new("zwave", "lamp 0", "power")))
        );

        assert_eq!(Route::resolve(&[]), Err(Status::NotFound));
        assert_eq!(
            Route::resolve(&segments(&["zwave", "lamp0"])),
            Err(Status::NotFound)
        );
        assert_eq!(
            Route::resolve(&segments(&["devices", "lamp0", "power", "extra"])),
            Err(Status::NotFound)
        );

        assert_eq!(
            Route::resolve(&segments(&["zwave", "lamp%2", "power"])),
            Err(Status::BadRequest)
        );
    }

    #[test]
    fn uri() {
        let service = ServiceId::new("zwave", "lamp 0", "power/main");

        let uri = service_uri(&service);
        assert_eq!(uri, "/zwave/lamp%200/power%2Fmain");

        let segments = uri[1..]
            .split('/')
            .map(str::to_owned)
            .collect::<Vec<_>>();
        assert_eq!(Route::resolve(&segments), Ok(Route::Service(service)));
    }
}
