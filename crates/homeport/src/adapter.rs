use crate::attributes::Attributes;
use crate::device::Device;
use crate::error::Result;
use crate::node::{Children, Node};

/// An adapter grouping the devices of one physical or logical integration.
#[derive(Debug, PartialEq)]
pub struct Adapter {
    // Identifier, unique within the registry.
    id: String,
    // Attributes.
    attributes: Attributes,
    // Devices.
    devices: Children<Device>,
}

impl Node for Adapter {
    const KIND: &'static str = "Adapter";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Adapter {
    /// Creates an [`Adapter`] without devices.
    #[must_use]
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
            devices: Children::default(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    #[inline]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.set(key, value);
        self
    }

    /// Adds a [`Device`].
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::DuplicateId`](crate::error::ErrorKind::DuplicateId)
    /// when a device with the same identifier already exists.
    #[inline]
    pub fn device(mut self, device: Device) -> Result<Self> {
        self.devices.attach(device)?;
        Ok(self)
    }

    /// Returns the adapter identifier.
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

    /// Returns the [`Device`] with the given identifier.
    #[must_use]
    #[inline]
    pub fn get_device(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    /// Iterates over the devices in insertion order.
    #[inline]
    pub fn devices(&self) -> impl ExactSizeIterator<Item = &Device> {
        self.devices.iter()
    }

    pub(crate) fn get_device_mut(&mut self, id: &str) -> Option<&mut Device> {
        self.devices.get_mut(id)
    }

    pub(crate) fn has_device(&self, id: &str) -> bool {
        self.devices.contains(id)
    }

    pub(crate) fn attach_device(&mut self, device: Device) -> Result<()> {
        self.devices.attach(device)
    }

    pub(crate) fn detach_device(&mut self, id: &str) -> Result<Device> {
        self.devices.detach(id)
    }
}
