use crate::attributes::Attributes;
use crate::error::Result;
use crate::node::{Children, Node};
use crate::service::Service;

/// A device grouping the services of one physical or virtual appliance.
///
/// A device is built completely before being attached to the registry, so
/// subscribers never observe a partially published device.
#[derive(Debug, PartialEq)]
pub struct Device {
    // Identifier, unique within its adapter.
    id: String,
    // Attributes.
    attributes: Attributes,
    // Services.
    services: Children<Service>,
}

impl Node for Device {
    const KIND: &'static str = "Device";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Device {
    /// Creates a [`Device`] without services.
    #[must_use]
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
            services: Children::default(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    #[inline]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.set(key, value);
        self
    }

    /// Adds a [`Service`].
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::DuplicateId`](crate::error::ErrorKind::DuplicateId)
    /// when a service with the same identifier already exists.
    #[inline]
    pub fn service(mut self, service: Service) -> Result<Self> {
        self.attach_service(service)?;
        Ok(self)
    }

    /// Attaches a [`Service`].
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::DuplicateId`](crate::error::ErrorKind::DuplicateId)
    /// when a service with the same identifier already exists.
    #[inline]
    pub fn attach_service(&mut self, service: Service) -> Result<()> {
        self.services.attach(service)
    }

    /// Detaches a [`Service`], returning it.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotFound`](crate::error::ErrorKind::NotFound)
    /// when no such service exists.
    #[inline]
    pub fn detach_service(&mut self, id: &str) -> Result<Service> {
        self.services.detach(id)
    }

    /// Returns the device identifier.
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

    /// Returns the [`Service`] with the given identifier.
    #[must_use]
    #[inline]
    pub fn get_service(&self, id: &str) -> Option<&Service> {
        self.services.get(id)
    }

    pub(crate) fn get_service_mut(&mut self, id: &str) -> Option<&mut Service> {
        self.services.get_mut(id)
    }

    /// Iterates over the services in insertion order.
    #[inline]
    pub fn services(&self) -> impl ExactSizeIterator<Item = &Service> {
        self.services.iter()
    }
}
