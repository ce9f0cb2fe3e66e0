use std::cell::Cell;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::event_loop::{LoopHandle, Shared};
use crate::id::ServiceId;
use crate::registry::Registry;
use crate::request::{Method, Request, Response};
use crate::value::Value;

thread_local! {
    static INSIDE: Cell<bool> = const { Cell::new(false) };
}

struct Inner {
    // Serializes bridge holders.
    gate: Mutex<()>,
    // Registry and loop thread.
    shared: Arc<Shared>,
    // Wakes the loop up.
    handle: LoopHandle,
    // Posted by the loop once parked.
    work: flume::Receiver<()>,
    // Releases the parked loop.
    resume: flume::Sender<()>,
}

// Marks the current thread as holding the bridge.
struct InsideGuard;

impl InsideGuard {
    fn enter() -> Self {
        INSIDE.set(true);
        Self
    }
}

impl Drop for InsideGuard {
    fn drop(&mut self) {
        INSIDE.set(false);
    }
}

// Releases the parked loop, on unwinding too.
struct ResumeGuard<'a>(&'a flume::Sender<()>);

impl Drop for ResumeGuard<'_> {
    fn drop(&mut self) {
        if self.0.send(()).is_err() {
            debug!("Event loop gone before being resumed");
        }
    }
}

/// Synchronous access to the [`Registry`] from threads other than the loop
/// thread.
///
/// A bridge call pauses the event loop, runs the closure against the
/// registry on the calling thread, then lets the loop continue. Concurrent
/// callers are served one at a time.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge").finish_non_exhaustive()
    }
}

impl Bridge {
    pub(crate) fn new(
        shared: Arc<Shared>,
        handle: LoopHandle,
        work: flume::Receiver<()>,
        resume: flume::Sender<()>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                gate: Mutex::new(()),
                shared,
                handle,
                work,
                resume,
            }),
        }
    }

    /// Runs a closure with exclusive access to the [`Registry`] while the
    /// event loop is paused.
    ///
    /// The call blocks until the loop reaches the wakeup. If the loop has
    /// not been started yet, it blocks until it is.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::ProtocolViolation`] when invoked from the loop thread
    ///   or from within another bridge call
    /// - [`ErrorKind::InvalidState`] when the loop is not running
    pub fn call<T>(&self, f: impl FnOnce(&mut Registry) -> T) -> Result<T> {
        if self.inner.shared.is_loop_thread() {
            return Err(Error::new(
                ErrorKind::ProtocolViolation,
                "The bridge cannot be used from the loop thread.",
            ));
        }
        if INSIDE.get() {
            return Err(Error::new(
                ErrorKind::ProtocolViolation,
                "Nested bridge calls are not allowed.",
            ));
        }

        let _gate = self
            .inner
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _inside = InsideGuard::enter();

        self.inner.handle.wakeup()?;
        self.inner.work.recv().map_err(|_| {
            Error::new(
                ErrorKind::InvalidState,
                "The event loop stopped before the bridge was served.",
            )
        })?;
        let _resume = ResumeGuard(&self.inner.resume);

        let mut registry = self.inner.shared.lock()?;
        Ok(f(&mut *registry))
    }

    /// Sends a [`Request`] and waits for its [`Response`].
    ///
    /// # Errors
    ///
    /// Fails as [`Bridge::call`] does.
    pub fn request(
        &self,
        service: ServiceId,
        method: Method,
        value: Option<Value>,
    ) -> Result<Response> {
        let receiver = self.send(service, method, value)?;
        receiver.recv().map_err(Error::from)
    }

    /// Sends a [`Request`] and waits for its [`Response`] at most `timeout`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::Timeout`] when no response arrives in time,
    /// and otherwise as [`Bridge::call`] does.
    pub fn request_timeout(
        &self,
        service: ServiceId,
        method: Method,
        value: Option<Value>,
        timeout: Duration,
    ) -> Result<Response> {
        let receiver = self.send(service.clone(), method, value)?;
        receiver.recv_timeout(timeout).map_err(|error| match error {
            flume::RecvTimeoutError::Timeout => Error::new(
                ErrorKind::Timeout,
                format!("No response from `{service}` within {timeout:?}."),
            ),
            flume::RecvTimeoutError::Disconnected => Error::from(flume::RecvError::Disconnected),
        })
    }

    fn send(
        &self,
        service: ServiceId,
        method: Method,
        value: Option<Value>,
    ) -> Result<flume::Receiver<Response>> {
        let (sender, receiver) = flume::bounded(1);
        self.call(move |registry| {
            registry.request(Request::new(service, method, value, move |response| {
                // The caller may have given up waiting.
                let _ = sender.send(response);
            }));
        })?;
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use crate::adapter::Adapter;
    use crate::device::Device;
    use crate::device::tests::create_lamp;
    use crate::error::{ErrorKind, Result};
    use crate::event_loop::{EventLoop, LoopHandle};
    use crate::id::{AdapterId, ServiceId};
    use crate::request::{Method, Request, Status};
    use crate::service::Service;

    use super::Bridge;

    fn spawn_loop() -> (Bridge, LoopHandle, JoinHandle<Result<()>>) {
        let event_loop = EventLoop::new();
        let bridge = event_loop.bridge();
        let handle = event_loop.handle();
        let thread = thread::spawn(move || event_loop.run());
        (bridge, handle, thread)
    }

    fn stop(handle: &LoopHandle, thread: JoinHandle<Result<()>>) {
        handle.stop().unwrap();
        thread.join().unwrap().unwrap();
    }

    #[test]
    fn serialized_callers() {
        let (bridge, handle, thread) = spawn_loop();
        let adapter = AdapterId::new("counter");

        bridge
            .call(|registry| registry.attach_adapter(Adapter::new("counter").attribute("count", "0")))
            .unwrap()
            .unwrap();

        thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        bridge
                            .call(|registry| {
                                let count: u32 = registry
                                    .attribute(&adapter, "count")
                                    .unwrap()
                                    .unwrap()
                                    .parse()
                                    .unwrap();
                                registry
                                    .set_attribute(&adapter, "count", (count + 1).to_string())
                                    .unwrap();
                            })
                            .unwrap();
                    }
                });
            }
        });

        let count = bridge
            .call(|registry| registry.attribute(&adapter, "count"))
            .unwrap()
            .unwrap();
        assert_eq!(count.as_deref(), Some("200"));

        stop(&handle, thread);
    }

    #[test]
    fn nested_call() {
        let (bridge, handle, thread) = spawn_loop();

        let nested = bridge.call(|_| bridge.call(|_| ())).unwrap();
        assert_eq!(nested.unwrap_err().kind(), ErrorKind::ProtocolViolation);

        // The bridge is usable once the outer call returned.
        assert!(bridge.call(|registry| registry.adapters().len()).is_ok());

        stop(&handle, thread);
    }

    #[test]
    fn call_from_loop_thread() {
        let (bridge, handle, thread) = spawn_loop();
        let (sender, receiver) = mpsc::channel();

        let inner = bridge.clone();
        handle
            .spawn(move |_| {
                sender.send(inner.call(|_| ()).unwrap_err().kind()).unwrap();
            })
            .unwrap();

        assert_eq!(receiver.recv().unwrap(), ErrorKind::ProtocolViolation);

        stop(&handle, thread);
    }

    #[test]
    fn panic_inside_call() {
        let (bridge, handle, thread) = spawn_loop();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            bridge
                .call(|registry| assert_ne!(registry.adapters().len(), 0, "no adapters"))
                .unwrap();
        }));
        assert!(outcome.is_err());

        // Neither the loop nor the registry are stuck.
        bridge
            .call(|registry| registry.attach_adapter(Adapter::new("zwave")))
            .unwrap()
            .unwrap();
        let (sender, receiver) = mpsc::channel();
        handle
            .spawn(move |registry| sender.send(registry.adapters().len()).unwrap())
            .unwrap();
        assert_eq!(receiver.recv().unwrap(), 1);

        stop(&handle, thread);
    }

    #[test]
    fn requests() {
        let (bridge, handle, thread) = spawn_loop();
        let held = Arc::new(Mutex::new(Vec::new()));

        let pending = Arc::clone(&held);
        let bus = Device::new("bus")
            .service(Service::new("state").action(Method::Get, move |request: Request| {
                pending.lock().unwrap().push(request);
                Ok(())
            }))
            .unwrap();

        bridge
            .call(|registry| {
                registry.attach_adapter(
                    Adapter::new("zwave")
                        .device(create_lamp("lamp0"))
                        .unwrap()
                        .device(bus)
                        .unwrap(),
                )
            })
            .unwrap()
            .unwrap();

        let response = bridge
            .request(ServiceId::new("zwave", "lamp0", "power"), Method::Get, None)
            .unwrap();
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.value().and_then(|value| value.as_str()), Some("0"));

        let response = bridge
            .request(ServiceId::new("zwave", "lamp9", "power"), Method::Get, None)
            .unwrap();
        assert_eq!(response.status(), Status::NotFound);

        let error = bridge
            .request_timeout(
                ServiceId::new("zwave", "bus", "state"),
                Method::Get,
                None,
                Duration::from_millis(50),
            )
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Timeout);
        assert_eq!(held.lock().unwrap().len(), 1);

        stop(&handle, thread);
    }

    #[test]
    fn stopped_loop() {
        let (bridge, handle, thread) = spawn_loop();
        stop(&handle, thread);

        assert_eq!(bridge.call(|_| ()).unwrap_err().kind(), ErrorKind::InvalidState);
    }
}
