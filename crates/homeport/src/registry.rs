use tracing::{debug, info};

use crate::adapter::Adapter;
use crate::attributes::Attributes;
use crate::device::Device;
use crate::error::{Error, ErrorKind, Result};
use crate::id::{AdapterId, DeviceId, NodeId, ParameterId, ServiceId};
use crate::listener::{Listener, ListenerId, Listeners, Notification};
use crate::node::Children;
use crate::parameter::Parameter;
use crate::request::{Request, Status};
use crate::service::Service;
use crate::value::Value;

fn not_found(node: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::NotFound, format!("`{node}` is not attached."))
}

/// The registry of attached adapters, devices, services and parameters.
///
/// The registry owns the whole tree: children are stored by value in their
/// parent and are addressed through identifier paths, so detaching a node
/// hands its ownership back to the caller and leaves no dangling reference.
///
/// The registry has a single writer. It lives on the event loop thread and
/// other threads reach it through the [`Bridge`](crate::bridge::Bridge).
#[derive(Default)]
pub struct Registry {
    // Attached adapters.
    adapters: Children<Adapter>,
    // Subscribed listeners.
    listeners: Listeners,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("adapters", &self.adapters)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Registry {
    /// Creates an empty [`Registry`].
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an [`Adapter`] along with all its devices.
    ///
    /// An attach notification is delivered for every device of the adapter.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::DuplicateId`] when an adapter with the same
    /// identifier is already attached. The registry is left untouched.
    pub fn attach_adapter(&mut self, adapter: Adapter) -> Result<AdapterId> {
        let id = AdapterId::new(adapter.id());
        let devices: Vec<DeviceId> = adapter.devices().map(|d| id.device(d.id())).collect();

        self.adapters.attach(adapter)?;
        info!("Adapter `{id}` attached with {} devices", devices.len());

        for device in &devices {
            self.listeners.notify(&Notification::Attached(device));
        }

        Ok(id)
    }

    /// Detaches an [`Adapter`] along with all its devices, returning it.
    ///
    /// A detach notification is delivered for every device of the adapter
    /// before returning.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotFound`] when the adapter is not attached.
    pub fn detach_adapter(&mut self, id: &AdapterId) -> Result<Adapter> {
        let adapter = self.adapters.detach(id.id())?;
        info!("Adapter `{id}` detached");

        for device in adapter.devices() {
            self.listeners
                .notify(&Notification::Detached(&id.device(device.id())));
        }

        Ok(adapter)
    }

    /// Attaches a [`Device`] to an attached adapter.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotFound`] when the adapter is not attached and
    /// with [`ErrorKind::DuplicateId`] when the adapter already has a device
    /// with the same identifier. The registry is left untouched.
    pub fn attach_device(&mut self, adapter: &AdapterId, device: Device) -> Result<DeviceId> {
        let parent = self
            .adapters
            .get_mut(adapter.id())
            .ok_or_else(|| not_found(adapter))?;

        let id = adapter.device(device.id());
        parent.attach_device(device)?;
        info!("Device `{id}` attached");

        self.listeners.notify(&Notification::Attached(&id));

        Ok(id)
    }

    /// Detaches a [`Device`], returning it.
    ///
    /// The detach notification reaches the listeners of the device, of its
    /// services, of its adapter and of the whole registry before returning.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotFound`] when the device is not attached.
    pub fn detach_device(&mut self, id: &DeviceId) -> Result<Device> {
        let device = self
            .adapters
            .get_mut(id.adapter().id())
            .ok_or_else(|| not_found(id))?
            .detach_device(id.id())?;
        info!("Device `{id}` detached");

        self.listeners.notify(&Notification::Detached(id));

        Ok(device)
    }

    /// Returns the attached [`Adapter`] with the given identifier.
    #[must_use]
    #[inline]
    pub fn adapter(&self, id: &AdapterId) -> Option<&Adapter> {
        self.adapters.get(id.id())
    }

    /// Returns the attached [`Device`] with the given identifier.
    #[must_use]
    pub fn device(&self, id: &DeviceId) -> Option<&Device> {
        self.adapter(id.adapter())?.get_device(id.id())
    }

    /// Returns the attached [`Service`] with the given identifier.
    #[must_use]
    pub fn service(&self, id: &ServiceId) -> Option<&Service> {
        self.device(id.device())?.get_service(id.id())
    }

    /// Returns the attached [`Parameter`] with the given identifier.
    #[must_use]
    pub fn parameter(&self, id: &ParameterId) -> Option<&Parameter> {
        self.service(id.service())?.get_parameter(id.id())
    }

    /// Iterates over the attached adapters in attach order.
    #[inline]
    pub fn adapters(&self) -> impl ExactSizeIterator<Item = &Adapter> {
        self.adapters.iter()
    }

    /// Checks whether a device is attached.
    #[must_use]
    #[inline]
    pub fn has_device(&self, id: &DeviceId) -> bool {
        self.adapter(id.adapter())
            .is_some_and(|adapter| adapter.has_device(id.id()))
    }

    /// Iterates over the identifiers of all attached devices.
    pub fn device_ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.adapters.iter().flat_map(|adapter| {
            let id = AdapterId::new(adapter.id());
            adapter.devices().map(move |device| id.device(device.id()))
        })
    }

    /// Returns a copy of an attribute of an attached node.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotFound`] when the node is not attached.
    pub fn attribute(&self, node: impl Into<NodeId>, key: &str) -> Result<Option<String>> {
        self.attributes_of(&node.into()).map(|attributes| attributes.get(key))
    }

    /// Returns a copy of all attributes of an attached node.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotFound`] when the node is not attached.
    pub fn attributes(&self, node: impl Into<NodeId>) -> Result<Attributes> {
        self.attributes_of(&node.into()).cloned()
    }

    /// Sets an attribute of an attached node, returning the previous value.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotFound`] when the node is not attached.
    pub fn set_attribute(
        &mut self,
        node: impl Into<NodeId>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Option<String>> {
        let node = node.into();
        let attributes = self.attributes_of_mut(&node).ok_or_else(|| not_found(&node))?;
        Ok(attributes.set(key, value))
    }

    /// Subscribes a [`Listener`].
    ///
    /// The listener receives the notifications raised from now on. Use
    /// [`Registry::foreach_attached`] to replay the devices already attached.
    pub fn subscribe(&mut self, listener: Listener) -> ListenerId {
        let id = self.listeners.subscribe(listener);
        debug!("{id} subscribed");
        id
    }

    /// Unsubscribes a [`Listener`], returning it.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotFound`] when the listener is not subscribed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> Result<Listener> {
        let listener = self.listeners.unsubscribe(id)?;
        debug!("{id} unsubscribed");
        Ok(listener)
    }

    /// Delivers an attach notification to a subscribed listener for every
    /// device currently attached within its scope.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotFound`] when the listener is not subscribed.
    pub fn foreach_attached(&mut self, id: ListenerId) -> Result<()> {
        let devices: Vec<DeviceId> = self.device_ids().collect();
        let listener = self.listeners.get_mut(id)?;
        for device in &devices {
            listener.deliver(&Notification::Attached(device));
        }
        Ok(())
    }

    /// Broadcasts a new value of an attached service.
    ///
    /// Every listener subscribed when the broadcast starts and whose scope
    /// covers the service receives the value. Nothing is acknowledged.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::NotFound`] when the service is not attached.
    pub fn changed(&mut self, service: &ServiceId, value: &Value) -> Result<()> {
        if self.service(service).is_none() {
            return Err(not_found(service));
        }

        debug!("Value of `{service}` changed");
        self.listeners
            .notify(&Notification::Changed { service, value });

        Ok(())
    }

    /// Dispatches a [`Request`] to the action of its service.
    ///
    /// The request is answered with [`Status::NotFound`] when the service is
    /// not attached and with [`Status::MethodNotAllowed`] when the service
    /// has no action for the method, in both cases without running user code.
    /// When the action fails before answering, the request is answered with
    /// the status matching the error.
    pub fn request(&mut self, request: Request) {
        let service = request.service().clone();
        debug!("{} request to `{service}`", request.method());

        let outcome = match self.service_mut(&service) {
            Some(target) => target.dispatch(request.clone()),
            None => Err(not_found(&service)),
        };

        if let Err(e) = outcome
            && !request.is_responded()
        {
            // The request has not been answered, so this cannot fail.
            let _ = request.respond(Status::from(e.kind()), None);
        }
    }

    fn service_mut(&mut self, id: &ServiceId) -> Option<&mut Service> {
        self.adapters
            .get_mut(id.adapter().id())?
            .get_device_mut(id.device().id())?
            .get_service_mut(id.id())
    }

    fn attributes_of(&self, node: &NodeId) -> Result<&Attributes> {
        match node {
            NodeId::Adapter(id) => self.adapter(id).map(Adapter::attributes),
            NodeId::Device(id) => self.device(id).map(Device::attributes),
            NodeId::Service(id) => self.service(id).map(Service::attributes),
            NodeId::Parameter(id) => self.parameter(id).map(Parameter::attributes),
        }
        .ok_or_else(|| not_found(node))
    }

    fn attributes_of_mut(&mut self, node: &NodeId) -> Option<&mut Attributes> {
        match node {
            NodeId::Adapter(id) => self
                .adapters
                .get_mut(id.id())
                .map(Adapter::attributes_mut),
            NodeId::Device(id) => self
                .adapters
                .get_mut(id.adapter().id())?
                .get_device_mut(id.id())
                .map(Device::attributes_mut),
            NodeId::Service(id) => self.service_mut(id).map(Service::attributes_mut),
            NodeId::Parameter(id) => self
                .service_mut(id.service())?
                .get_parameter_mut(id.id())
                .map(Parameter::attributes_mut),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use crate::adapter::Adapter;
    use crate::attributes::{LOCATION, MAX, VENDOR};
    use crate::device::Device;
    use crate::device::tests::{create_lamp, create_thermometer_device};
    use crate::error::ErrorKind;
    use crate::id::{AdapterId, DeviceId, ServiceId};
    use crate::listener::{Listener, Scope};
    use crate::request::tests::collector;
    use crate::request::{Method, Request, Status};
    use crate::value::Value;

    use super::Registry;

    type Events = Arc<Mutex<Vec<String>>>;

    // Records attach, detach and change events as readable strings.
    fn recorder(scope: Scope, events: &Events, tag: &'static str) -> Listener {
        let (attach, detach, change) = (Arc::clone(events), Arc::clone(events), Arc::clone(events));
        Listener::new(scope)
            .on_attach(move |device| attach.lock().unwrap().push(format!("{tag} +{device}")))
            .on_detach(move |device| detach.lock().unwrap().push(format!("{tag} -{device}")))
            .on_change(move |service, value| {
                change.lock().unwrap().push(format!(
                    "{tag} {service}={}",
                    value.as_str().unwrap_or_default()
                ));
            })
    }

    fn create_registry() -> (Registry, AdapterId) {
        let mut registry = Registry::new();
        let adapter = registry
            .attach_adapter(
                Adapter::new("zwave")
                    .attribute(VENDOR, "acme")
                    .device(create_lamp("lamp0"))
                    .unwrap(),
            )
            .unwrap();
        (registry, adapter)
    }

    fn assert_unique_siblings(registry: &Registry) {
        let adapters: HashSet<_> = registry.adapters().map(Adapter::id).collect();
        assert_eq!(adapters.len(), registry.adapters().len());

        for adapter in registry.adapters() {
            let devices: HashSet<_> = adapter.devices().map(Device::id).collect();
            assert_eq!(devices.len(), adapter.devices().len());
            for device in adapter.devices() {
                let services: HashSet<_> = device.services().map(|s| s.id()).collect();
                assert_eq!(services.len(), device.services().len());
            }
        }
    }

    #[test]
    fn attach_and_lookup() {
        let (mut registry, adapter) = create_registry();

        let thermo = registry
            .attach_device(&adapter, create_thermometer_device("thermo0"))
            .unwrap();

        assert!(registry.has_device(&thermo));
        assert!(registry.service(&thermo.service("temperature")).is_some());
        assert!(
            registry
                .parameter(&thermo.service("temperature").parameter("celsius"))
                .is_some()
        );
        assert_eq!(
            registry.device_ids().collect::<Vec<_>>(),
            vec![adapter.device("lamp0"), thermo]
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let (mut registry, adapter) = create_registry();

        let error = registry.attach_adapter(Adapter::new("zwave")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DuplicateId);

        let error = registry
            .attach_device(&adapter, create_lamp("lamp0"))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DuplicateId);

        let error = registry
            .attach_device(&AdapterId::new("missing"), create_lamp("lamp1"))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);

        // Nothing changed.
        assert_eq!(registry.device_ids().count(), 1);
        assert_unique_siblings(&registry);
    }

    #[test]
    fn detach_round_trip() {
        let (mut registry, adapter) = create_registry();
        let id = registry
            .attach_device(&adapter, create_thermometer_device("thermo0"))
            .unwrap();

        let detached = registry.detach_device(&id).unwrap();
        assert_eq!(detached, create_thermometer_device("thermo0"));
        assert!(!registry.has_device(&id));
        assert!(registry.service(&id.service("temperature")).is_none());

        // Detaching twice fails without side effects.
        assert_eq!(
            registry.detach_device(&id).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        // Reattaching appends the device after its siblings.
        registry.attach_device(&adapter, detached).unwrap();
        registry.attach_device(&adapter, create_lamp("lamp1")).unwrap();
        assert_eq!(
            registry
                .adapter(&adapter)
                .unwrap()
                .devices()
                .map(Device::id)
                .collect::<Vec<_>>(),
            vec!["lamp0", "thermo0", "lamp1"]
        );
    }

    #[test]
    fn unique_siblings_after_every_mutation() {
        // A small linear congruential generator keeps the sequence
        // reproducible.
        let mut seed: u64 = 0x5eed;
        let mut next = move |bound: u64| {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (seed >> 33) % bound
        };

        let mut registry = Registry::new();
        let mut detached: Vec<(AdapterId, Device)> = Vec::new();

        for _ in 0..500 {
            let adapter = AdapterId::new(format!("adapter{}", next(3)));
            let device = adapter.device(format!("device{}", next(4)));

            match next(5) {
                0 => {
                    let _ = registry.attach_adapter(Adapter::new(adapter.id()));
                }
                1 => {
                    let _ = registry.detach_adapter(&adapter);
                }
                2 | 3 => {
                    let outcome = registry.attach_device(&adapter, create_lamp(device.id()));
                    if let Err(e) = outcome {
                        assert!(matches!(
                            e.kind(),
                            ErrorKind::NotFound | ErrorKind::DuplicateId
                        ));
                    }
                }
                _ => {
                    if let Ok(d) = registry.detach_device(&device) {
                        detached.push((adapter, d));
                    } else if let Some((parent, d)) = detached.pop() {
                        let _ = registry.attach_device(&parent, d);
                    }
                }
            }

            assert_unique_siblings(&registry);
        }
    }

    #[test]
    fn attributes_copy_in_copy_out() {
        let (mut registry, adapter) = create_registry();
        let lamp = adapter.device("lamp0");

        assert_eq!(
            registry.attribute(&adapter, VENDOR).unwrap().as_deref(),
            Some("acme")
        );

        let mut copy = registry.attributes(&lamp).unwrap();
        copy.set(LOCATION, "kitchen");
        assert_eq!(registry.attribute(&lamp, LOCATION).unwrap(), None);

        assert_eq!(
            registry.set_attribute(&lamp, LOCATION, "hall").unwrap(),
            None
        );
        assert_eq!(
            registry.attribute(&lamp, LOCATION).unwrap().as_deref(),
            Some("hall")
        );

        let parameter = ServiceId::new("zwave", "lamp0", "power").parameter("level");
        assert_eq!(
            registry.set_attribute(&parameter, MAX, "100").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn attach_and_detach_notifications() {
        let events = Events::default();
        let mut registry = Registry::new();

        registry.subscribe(recorder(Scope::Registry, &events, "all"));
        registry.subscribe(recorder(
            Scope::Adapter(AdapterId::new("phidget")),
            &events,
            "phidget",
        ));

        let adapter = registry
            .attach_adapter(
                Adapter::new("zwave")
                    .device(create_lamp("lamp0"))
                    .unwrap()
                    .device(create_lamp("lamp1"))
                    .unwrap(),
            )
            .unwrap();
        registry.detach_adapter(&adapter).unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "all +zwave/lamp0",
                "all +zwave/lamp1",
                "all -zwave/lamp0",
                "all -zwave/lamp1",
            ]
        );
    }

    #[test]
    fn device_detach_reaches_service_listeners() {
        let events = Events::default();
        let (mut registry, adapter) = create_registry();
        let lamp = adapter.device("lamp0");

        registry.subscribe(recorder(Scope::Service(lamp.service("power")), &events, "service"));
        registry.subscribe(recorder(Scope::Device(lamp.clone()), &events, "device"));
        registry.subscribe(recorder(Scope::Adapter(adapter.clone()), &events, "adapter"));

        registry.detach_device(&lamp).unwrap();

        // Delivered synchronously, before `detach_device` returned.
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "service -zwave/lamp0",
                "device -zwave/lamp0",
                "adapter -zwave/lamp0",
            ]
        );
    }

    #[test]
    fn snapshot_timing() {
        let events = Events::default();
        let (mut registry, adapter) = create_registry();
        let lamp = adapter.device("lamp0");

        // Subscribed after attach and before detach.
        registry.subscribe(recorder(Scope::Device(lamp.clone()), &events, "before"));

        let device = registry.detach_device(&lamp).unwrap();

        // Subscribed after detach.
        registry.subscribe(recorder(Scope::Device(lamp.clone()), &events, "after"));
        assert_eq!(
            registry
                .changed(&lamp.service("power"), &Value::from("1"))
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );

        assert_eq!(*events.lock().unwrap(), vec!["before -zwave/lamp0"]);
        drop(device);
    }

    #[test]
    fn value_changes() {
        let events = Events::default();
        let (mut registry, adapter) = create_registry();
        let power = adapter.device("lamp0").service("power");

        registry.subscribe(recorder(Scope::Service(power.clone()), &events, "service"));
        let id = registry.subscribe(recorder(Scope::Registry, &events, "all"));
        registry.subscribe(recorder(
            Scope::Device(DeviceId::new("zwave", "lamp1")),
            &events,
            "other",
        ));

        registry.changed(&power, &Value::from("1")).unwrap();
        registry.unsubscribe(id).unwrap();
        registry.changed(&power, &Value::from("0")).unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "service zwave/lamp0/power=1",
                "all zwave/lamp0/power=1",
                "service zwave/lamp0/power=0",
            ]
        );
    }

    #[test]
    fn replay_attached_devices() {
        let events = Events::default();
        let (mut registry, adapter) = create_registry();
        registry
            .attach_device(&adapter, create_thermometer_device("thermo0"))
            .unwrap();

        let id = registry.subscribe(recorder(
            Scope::Device(adapter.device("thermo0")),
            &events,
            "replay",
        ));
        registry.foreach_attached(id).unwrap();

        assert_eq!(*events.lock().unwrap(), vec!["replay +zwave/thermo0"]);
    }

    #[test]
    fn requests() {
        let (mut registry, adapter) = create_registry();
        let thermo = registry
            .attach_device(&adapter, create_thermometer_device("thermo0"))
            .unwrap()
            .service("temperature");

        let (responses, on_response) = collector();
        registry.request(Request::new(thermo.clone(), Method::Get, None, on_response));

        let (rejected, on_response) = collector();
        registry.request(Request::new(
            thermo.clone(),
            Method::Put,
            Some(Value::from("30")),
            on_response,
        ));

        let (missing, on_response) = collector();
        registry.request(Request::new(
            adapter.device("thermo1").service("temperature"),
            Method::Get,
            None,
            on_response,
        ));

        let responses = responses.lock().unwrap();
        assert_eq!(responses[0].status(), Status::Ok);
        assert_eq!(responses[0].value().and_then(Value::as_str), Some("21.5"));
        assert_eq!(rejected.lock().unwrap()[0].status(), Status::MethodNotAllowed);
        assert_eq!(missing.lock().unwrap()[0].status(), Status::NotFound);
    }

    #[test]
    fn failing_action() {
        let (mut registry, adapter) = create_registry();
        let mut device = Device::new("broken");
        device
            .attach_service(crate::service::Service::new("state").action(
                Method::Get,
                |_: Request| -> crate::error::Result<()> {
                    Err(crate::error::Error::new(ErrorKind::Timeout, "No answer from the bus."))
                },
            ))
            .unwrap();
        let state = registry
            .attach_device(&adapter, device)
            .unwrap()
            .service("state");

        let (responses, on_response) = collector();
        registry.request(Request::new(state, Method::Get, None, on_response));

        let responses = responses.lock().unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status(), Status::GatewayTimeout);
    }
}
