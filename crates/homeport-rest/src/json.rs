use serde::{Deserialize, Serialize};

use homeport::adapter::Adapter;
use homeport::attributes::Attributes;
use homeport::device::Device;
use homeport::id::{AdapterId, DeviceId};
use homeport::parameter::Parameter;
use homeport::registry::Registry;
use homeport::request::Method;
use homeport::service::Service;

use crate::routes::service_uri;

// Charset of the percent-encoded service paths.
const URL_ENCODED_CHARSET: &str = "UTF-8";

// Value of a set method flag.
const METHOD_FLAG: &str = "1";

/// The JSON description of the whole registry, served at `/devices`.
#[derive(Debug, Serialize)]
pub struct Configuration<'a> {
    #[serde(rename = "urlEncodedCharset")]
    charset: &'static str,
    adapter: Vec<AdapterJson<'a>>,
}

impl<'a> Configuration<'a> {
    /// Describes every node attached to the registry.
    #[must_use]
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            charset: URL_ENCODED_CHARSET,
            adapter: registry.adapters().map(AdapterJson::new).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AdapterJson<'a> {
    #[serde(rename = "_id")]
    id: &'a str,
    #[serde(flatten)]
    attributes: &'a Attributes,
    device: Vec<DeviceJson<'a>>,
}

impl<'a> AdapterJson<'a> {
    fn new(adapter: &'a Adapter) -> Self {
        let id = AdapterId::new(adapter.id());
        Self {
            id: adapter.id(),
            attributes: adapter.attributes(),
            device: adapter
                .devices()
                .map(|device| DeviceJson::new(&id, device))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DeviceJson<'a> {
    #[serde(rename = "_id")]
    id: &'a str,
    #[serde(flatten)]
    attributes: &'a Attributes,
    service: Vec<ServiceJson<'a>>,
}

impl<'a> DeviceJson<'a> {
    fn new(adapter: &AdapterId, device: &'a Device) -> Self {
        let id = adapter.device(device.id());
        Self {
            id: device.id(),
            attributes: device.attributes(),
            service: device
                .services()
                .map(|service| ServiceJson::new(&id, service))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ServiceJson<'a> {
    #[serde(rename = "_id")]
    id: &'a str,
    #[serde(rename = "_uri")]
    uri: String,
    #[serde(rename = "_get", skip_serializing_if = "Option::is_none")]
    get: Option<&'static str>,
    #[serde(rename = "_put", skip_serializing_if = "Option::is_none")]
    put: Option<&'static str>,
    #[serde(flatten)]
    attributes: &'a Attributes,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parameter: Vec<ParameterJson<'a>>,
}

impl<'a> ServiceJson<'a> {
    fn new(device: &DeviceId, service: &'a Service) -> Self {
        let flag = |method| service.has_action(method).then_some(METHOD_FLAG);
        Self {
            id: service.id(),
            uri: service_uri(&device.service(service.id())),
            get: flag(Method::Get),
            put: flag(Method::Put),
            attributes: service.attributes(),
            parameter: service.parameters().map(ParameterJson::new).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ParameterJson<'a> {
    #[serde(rename = "_id")]
    id: &'a str,
    #[serde(flatten)]
    attributes: &'a Attributes,
}

impl<'a> ParameterJson<'a> {
    fn new(parameter: &'a Parameter) -> Self {
        Self {
            id: parameter.id(),
            attributes: parameter.attributes(),
        }
    }
}

/// The JSON representation of a service state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    value: String,
}

impl State {
    /// Creates a [`State`].
    #[must_use]
    #[inline]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Returns the state value.
    #[must_use]
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Consumes the state, returning its value.
    #[must_use]
    #[inline]
    pub fn into_value(self) -> String {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use homeport::adapter::Adapter;
    use homeport::attributes::{DESCRIPTION, TYPE, UNIT};
    use homeport::device::Device;
    use homeport::parameter::Parameter;
    use homeport::registry::Registry;
    use homeport::request::{Method, Request, Status};
    use homeport::service::Service;
    use homeport::value::Value;

    use super::{Configuration, State};

    fn registry() -> Registry {
        let thermometer = Service::new("temperature")
            .attribute(UNIT, "celsius")
            .action(Method::Get, |request: Request| {
                request.respond(Status::Ok, Some(Value::from("21")))
            })
            .parameter(Parameter::new("offset").attribute(UNIT, "kelvin"))
            .unwrap();

        let lamp = Service::new("power")
            .attribute(TYPE, "switch")
            .action(Method::Get, |request: Request| {
                request.respond(Status::Ok, Some(Value::from("0")))
            })
            .action(Method::Put, |request: Request| {
                let value = request.value().map(Value::copy);
                request.respond(Status::Ok, value)
            });

        let adapter = Adapter::new("zwave")
            .attribute(DESCRIPTION, "Z-Wave network")
            .device(Device::new("sensor 1").service(thermometer).unwrap())
            .unwrap()
            .device(Device::new("lamp").service(lamp).unwrap())
            .unwrap();

        let mut registry = Registry::new();
        registry.attach_adapter(adapter).unwrap();
        registry
    }

    #[test]
    fn configuration() {
        let registry = registry();

        assert_eq!(
            serde_json::to_value(Configuration::new(&registry)).unwrap(),
            json!({
                "urlEncodedCharset": "UTF-8",
                "adapter": [{
                    "_id": "zwave",
                    "description": "Z-Wave network",
                    "device": [
                        {
                            "_id": "sensor 1",
                            "service": [{
                                "_id": "temperature",
                                "_uri": "/zwave/sensor%201/temperature",
                                "_get": "1",
                                "unit": "celsius",
                                "parameter": [{
                                    "_id": "offset",
                                    "unit": "kelvin"
                                }]
                            }]
                        },
                        {
                            "_id": "lamp",
                            "service": [{
                                "_id": "power",
                                "_uri": "/zwave/lamp/power",
                                "_get": "1",
                                "_put": "1",
                                "type": "switch"
                            }]
                        }
                    ]
                }]
            })
        );
    }

    #[test]
    fn empty_configuration() {
        let registry = Registry::new();

        assert_eq!(
            serde_json::to_string(&Configuration::new(&registry)).unwrap(),
            r#"{"urlEncodedCharset":"UTF-8","adapter":[]}"#
        );
    }

    #[test]
    fn state() {
        assert_eq!(
            serde_json::to_string(&State::new("1")).unwrap(),
            r#"{"value":"1"}"#
        );

        let state: State = serde_json::from_str(r#"{ "value": "on" }"#).unwrap();
        assert_eq!(state.value(), "on");

        assert!(serde_json::from_str::<State>(r#"{ "state": "on" }"#).is_err());
        assert!(serde_json::from_str::<State>(r#"{ "value": 1 "#).is_err());
    }
}
