use std::sync::Arc;

use serde::Serialize;

/// Identifier of an adapter.
///
/// Identifiers are plain paths: they never borrow a live node, so they stay
/// valid across detach and can be freely cloned and sent between threads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AdapterId(Arc<str>);

impl AdapterId {
    /// Creates an [`AdapterId`].
    #[must_use]
    #[inline]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Returns the adapter identifier.
    #[must_use]
    #[inline]
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Creates the [`DeviceId`] of a device belonging to this adapter.
    #[must_use]
    #[inline]
    pub fn device(&self, id: impl AsRef<str>) -> DeviceId {
        DeviceId {
            adapter: self.clone(),
            id: Arc::from(id.as_ref()),
        }
    }
}

impl std::fmt::Display for AdapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceId {
    adapter: AdapterId,
    id: Arc<str>,
}

impl DeviceId {
    /// Creates a [`DeviceId`] from its path.
    #[must_use]
    #[inline]
    pub fn new(adapter: impl AsRef<str>, device: impl AsRef<str>) -> Self {
        AdapterId::new(adapter).device(device)
    }

    /// Returns the owning [`AdapterId`].
    #[must_use]
    #[inline]
    pub const fn adapter(&self) -> &AdapterId {
        &self.adapter
    }

    /// Returns the device identifier.
    #[must_use]
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creates the [`ServiceId`] of a service belonging to this device.
    #[must_use]
    #[inline]
    pub fn service(&self, id: impl AsRef<str>) -> ServiceId {
        ServiceId {
            device: self.clone(),
            id: Arc::from(id.as_ref()),
        }
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.adapter, self.id)
    }
}

/// Identifier of a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ServiceId {
    device: DeviceId,
    id: Arc<str>,
}

impl ServiceId {
    /// Creates a [`ServiceId`] from its path.
    #[must_use]
    #[inline]
    pub fn new(adapter: impl AsRef<str>, device: impl AsRef<str>, service: impl AsRef<str>) -> Self {
        DeviceId::new(adapter, device).service(service)
    }

    /// Returns the owning [`AdapterId`].
    #[must_use]
    #[inline]
    pub const fn adapter(&self) -> &AdapterId {
        self.device.adapter()
    }

    /// Returns the owning [`DeviceId`].
    #[must_use]
    #[inline]
    pub const fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Returns the service identifier.
    #[must_use]
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creates the [`ParameterId`] of a parameter belonging to this service.
    #[must_use]
    #[inline]
    pub fn parameter(&self, id: impl AsRef<str>) -> ParameterId {
        ParameterId {
            service: self.clone(),
            id: Arc::from(id.as_ref()),
        }
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.device, self.id)
    }
}

/// Identifier of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ParameterId {
    service: ServiceId,
    id: Arc<str>,
}

impl ParameterId {
    /// Returns the owning [`ServiceId`].
    #[must_use]
    #[inline]
    pub const fn service(&self) -> &ServiceId {
        &self.service
    }

    /// Returns the parameter identifier.
    #[must_use]
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for ParameterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.service, self.id)
    }
}

/// Identifier of any node of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeId {
    /// An adapter.
    Adapter(AdapterId),
    /// A device.
    Device(DeviceId),
    /// A service.
    Service(ServiceId),
    /// A parameter.
    Parameter(ParameterId),
}

macro_rules! node_id_from {
    ($($variant:ident => $id:ty),+ $(,)?) => {
        $(
            impl From<$id> for NodeId {
                fn from(id: $id) -> Self {
                    Self::$variant(id)
                }
            }

            impl From<&$id> for NodeId {
                fn from(id: &$id) -> Self {
                    Self::$variant(id.clone())
                }
            }
        )+
    };
}

node_id_from! {
    Adapter => AdapterId,
    Device => DeviceId,
    Service => ServiceId,
    Parameter => ParameterId,
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Adapter(id) => id.fmt(f),
            Self::Device(id) => id.fmt(f),
            Self::Service(id) => id.fmt(f),
            Self::Parameter(id) => id.fmt(f),
        }
    }
}
