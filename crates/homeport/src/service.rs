use hashbrown::DefaultHashBuilder;

use indexmap::IndexMap;

use crate::attributes::Attributes;
use crate::error::{Error, ErrorKind, Result};
use crate::node::{Children, Node};
use crate::parameter::Parameter;
use crate::request::{Action, Method, Request};

/// A service exposing one controllable or observable facet of a device.
///
/// A service maps each supported [`Method`] to an [`Action`]. Requests for a
/// method without an action are rejected as
/// [`ErrorKind::MethodNotAllowed`] and never reach user code.
pub struct Service {
    // Identifier, unique within its device.
    id: String,
    // Attributes.
    attributes: Attributes,
    // Actions by method.
    actions: IndexMap<Method, Box<dyn Action>, DefaultHashBuilder>,
    // Parameters.
    parameters: Children<Parameter>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("methods", &self.actions.keys().collect::<Vec<_>>())
            .field("parameters", &self.parameters)
            .finish()
    }
}

// Actions are compared by the methods they serve.
impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.attributes == other.attributes
            && self.actions.keys().eq(other.actions.keys())
            && self.parameters == other.parameters
    }
}

impl Node for Service {
    const KIND: &'static str = "Service";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Service {
    /// Creates a [`Service`] without actions.
    #[must_use]
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
            actions: IndexMap::with_hasher(DefaultHashBuilder::default()),
            parameters: Children::default(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    #[inline]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.set(key, value);
        self
    }

    /// Adds the [`Action`] run for the given method.
    #[must_use]
    #[inline]
    pub fn action(mut self, method: Method, action: impl Action + 'static) -> Self {
        self.set_action(method, action);
        self
    }

    /// Adds a [`Parameter`].
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::DuplicateId`] when a parameter with the same
    /// identifier already exists.
    #[inline]
    pub fn parameter(mut self, parameter: Parameter) -> Result<Self> {
        self.attach_parameter(parameter)?;
        Ok(self)
    }

    /// Sets the [`Action`] run for the given method, replacing the previous
    /// one.
    pub fn set_action(&mut self, method: Method, action: impl Action + 'static) {
        self.actions.insert(method, Box::new(action));
    }

    /// Removes the [`Action`] run for the given method.
    pub fn remove_action(&mut self, method: Method) -> Option<Box<dyn Action>> {
        self.actions.shift_remove(&method)
    }

    /// Checks whether an [`Action`] is registered for the given method.
    #[must_use]
    #[inline]
    pub fn has_action(&self, method: Method) -> bool {
        self.actions.contains_key(&method)
    }

    /// Returns the methods served by this service.
    #[inline]
    pub fn methods(&self) -> impl Iterator<Item = Method> + '_ {
        self.actions.keys().copied()
    }

    /// Attaches a [`Parameter`].
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::DuplicateId`] when a parameter with the same
    /// identifier already exists.
    #[inline]
    pub fn attach_parameter(&mut self, parameter: Parameter) -> Result<()> {
        self.parameters.attach(parameter)
    }

    /// Detaches a [`Parameter`], returning it.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotFound`] when no such parameter exists.
    #[inline]
    pub fn detach_parameter(&mut self, id: &str) -> Result<Parameter> {
        self.parameters.detach(id)
    }

    /// Returns the service identifier.
    #[must_use]
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the attributes.
    #[must_use]
    #[inline]
    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Returns the mutable attributes.
    #[inline]
    pub const fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    /// Returns the [`Parameter`] with the given identifier.
    #[must_use]
    #[inline]
    pub fn get_parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.get(id)
    }

    pub(crate) fn get_parameter_mut(&mut self, id: &str) -> Option<&mut Parameter> {
        self.parameters.get_mut(id)
    }

    /// Iterates over the parameters in insertion order.
    #[inline]
    pub fn parameters(&self) -> impl ExactSizeIterator<Item = &Parameter> {
        self.parameters.iter()
    }

    // Runs the action registered for the request method.
    pub(crate) fn dispatch(&mut self, request: Request) -> Result<()> {
        let Some(action) = self.actions.get_mut(&request.method()) else {
            return Err(Error::new(
                ErrorKind::MethodNotAllowed,
                format!(
                    "Service `{}` has no {} action.",
                    request.service(),
                    request.method()
                ),
            ));
        };
        action.call(request)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::attributes::{MAX, MIN, TYPE, UNIT};
    use crate::error::ErrorKind;
    use crate::id::ServiceId;
    use crate::parameter::Parameter;
    use crate::request::tests::collector;
    use crate::request::{Method, Request, Status};
    use crate::value::Value;

    use super::Service;

    // A service reading a fixed value, without a `PUT` action.
    pub(crate) fn create_thermometer() -> Service {
        Service::new("temperature")
            .attribute(TYPE, "temperature")
            .attribute(UNIT, "celsius")
            .action(Method::Get, |request: Request| {
                request.respond(Status::Ok, Some(Value::from("21.5")))
            })
            .parameter(
                Parameter::new("celsius")
                    .attribute(MIN, "-40")
                    .attribute(MAX, "80"),
            )
            .unwrap()
    }

    #[test]
    fn dispatch() {
        let mut service = create_thermometer();
        let id = ServiceId::new("zwave", "thermo0", "temperature");

        let (responses, on_response) = collector();
        service
            .dispatch(Request::new(id.clone(), Method::Get, None, on_response))
            .unwrap();
        assert_eq!(responses.lock().unwrap()[0].status(), Status::Ok);

        let (responses, on_response) = collector();
        let request = Request::new(id, Method::Put, Some(Value::from("30")), on_response);
        let error = service.dispatch(request.clone()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MethodNotAllowed);

        // Nothing has been answered yet: the caller decides the status.
        assert!(responses.lock().unwrap().is_empty());
        assert!(!request.is_responded());
    }

    #[test]
    fn duplicate_parameter() {
        let service = create_thermometer();
        let error = service.parameter(Parameter::new("celsius")).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::DuplicateId);
    }

    #[test]
    fn methods() {
        let mut service = create_thermometer()
            .action(Method::Put, |_: Request| -> crate::error::Result<()> { Ok(()) });

        assert_eq!(
            service.methods().collect::<Vec<_>>(),
            vec![Method::Get, Method::Put]
        );

        assert!(service.remove_action(Method::Get).is_some());
        assert!(!service.has_action(Method::Get));
        assert_eq!(service.parameters().len(), 1);
    }
}
