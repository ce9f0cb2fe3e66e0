use hashbrown::DefaultHashBuilder;

use indexmap::IndexMap;

use crate::error::{Error, ErrorKind, Result};
use crate::id::{AdapterId, DeviceId, ServiceId};
use crate::value::Value;

type ValueCallback = Box<dyn FnMut(&ServiceId, &Value) + Send>;
type DeviceCallback = Box<dyn FnMut(&DeviceId) + Send>;

/// The part of the registry observed by a [`Listener`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The whole registry.
    Registry,
    /// All devices and services of an adapter.
    Adapter(AdapterId),
    /// A device and its services.
    Device(DeviceId),
    /// A single service.
    ///
    /// Attach and detach notifications of the owning device are delivered
    /// too, since a service appears and disappears with its device.
    Service(ServiceId),
}

impl Scope {
    /// Checks whether the scope covers the given device.
    #[must_use]
    pub fn covers_device(&self, device: &DeviceId) -> bool {
        match self {
            Self::Registry => true,
            Self::Adapter(adapter) => device.adapter() == adapter,
            Self::Device(id) => id == device,
            Self::Service(service) => service.device() == device,
        }
    }

    /// Checks whether the scope covers the given service.
    #[must_use]
    pub fn covers_service(&self, service: &ServiceId) -> bool {
        match self {
            Self::Registry => true,
            Self::Adapter(adapter) => service.adapter() == adapter,
            Self::Device(device) => service.device() == device,
            Self::Service(id) => id == service,
        }
    }
}

/// A registered interest in the events of a [`Scope`].
///
/// A listener owns its callbacks together with the data they capture, which
/// is dropped with the listener.
pub struct Listener {
    // Observed scope.
    scope: Scope,
    // Value-change callback.
    on_change: Option<ValueCallback>,
    // Device attach callback.
    on_attach: Option<DeviceCallback>,
    // Device detach callback.
    on_detach: Option<DeviceCallback>,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("scope", &self.scope)
            .field("on_change", &self.on_change.is_some())
            .field("on_attach", &self.on_attach.is_some())
            .field("on_detach", &self.on_detach.is_some())
            .finish()
    }
}

impl Listener {
    /// Creates a [`Listener`] without callbacks.
    #[must_use]
    #[inline]
    pub const fn new(scope: Scope) -> Self {
        Self {
            scope,
            on_change: None,
            on_attach: None,
            on_detach: None,
        }
    }

    /// Sets the callback invoked when a service value changes.
    #[must_use]
    #[inline]
    pub fn on_change<F>(mut self, on_change: F) -> Self
    where
        F: FnMut(&ServiceId, &Value) + Send + 'static,
    {
        self.on_change = Some(Box::new(on_change));
        self
    }

    /// Sets the callback invoked when a device is attached.
    #[must_use]
    #[inline]
    pub fn on_attach<F>(mut self, on_attach: F) -> Self
    where
        F: FnMut(&DeviceId) + Send + 'static,
    {
        self.on_attach = Some(Box::new(on_attach));
        self
    }

    /// Sets the callback invoked when a device is detached.
    #[must_use]
    #[inline]
    pub fn on_detach<F>(mut self, on_detach: F) -> Self
    where
        F: FnMut(&DeviceId) + Send + 'static,
    {
        self.on_detach = Some(Box::new(on_detach));
        self
    }

    /// Returns the observed [`Scope`].
    #[must_use]
    #[inline]
    pub const fn scope(&self) -> &Scope {
        &self.scope
    }

    pub(crate) fn deliver(&mut self, notification: &Notification<'_>) {
        match notification {
            Notification::Changed { service, value } => {
                if let Some(on_change) = self.on_change.as_mut()
                    && self.scope.covers_service(service)
                {
                    on_change(service, value);
                }
            }
            Notification::Attached(device) => {
                if let Some(on_attach) = self.on_attach.as_mut()
                    && self.scope.covers_device(device)
                {
                    on_attach(device);
                }
            }
            Notification::Detached(device) => {
                if let Some(on_detach) = self.on_detach.as_mut()
                    && self.scope.covers_device(device)
                {
                    on_detach(device);
                }
            }
        }
    }
}

/// Identifier of a subscribed [`Listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

// An event delivered to listeners.
#[derive(Debug)]
pub(crate) enum Notification<'a> {
    Changed {
        service: &'a ServiceId,
        value: &'a Value,
    },
    Attached(&'a DeviceId),
    Detached(&'a DeviceId),
}

// Subscribed listeners in subscription order.
pub(crate) struct Listeners {
    next: u64,
    entries: IndexMap<ListenerId, Listener, DefaultHashBuilder>,
}

impl Default for Listeners {
    fn default() -> Self {
        Self {
            next: 0,
            entries: IndexMap::with_hasher(DefaultHashBuilder::default()),
        }
    }
}

impl Listeners {
    pub(crate) fn subscribe(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.entries.insert(id, listener);
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: ListenerId) -> Result<Listener> {
        self.entries
            .shift_remove(&id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("{id} is not subscribed.")))
    }

    pub(crate) fn get_mut(&mut self, id: ListenerId) -> Result<&mut Listener> {
        self.entries
            .get_mut(&id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("{id} is not subscribed.")))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    // Delivers to the listeners subscribed when the broadcast starts.
    pub(crate) fn notify(&mut self, notification: &Notification<'_>) {
        let snapshot: Vec<ListenerId> = self.entries.keys().copied().collect();
        for id in snapshot {
            if let Some(listener) = self.entries.get_mut(&id) {
                listener.deliver(notification);
            }
        }
    }
}
