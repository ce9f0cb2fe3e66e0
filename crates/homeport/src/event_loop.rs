use std::cell::Cell;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::{error, info};

use crate::bridge::Bridge;
use crate::error::{Error, ErrorKind, Result};
use crate::registry::Registry;

thread_local! {
    static HELD: Cell<bool> = const { Cell::new(false) };
}

type Task = Box<dyn FnOnce(&mut Registry) + Send>;
type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

// Events consumed by the loop, in submission order.
pub(crate) enum Event {
    // Runs a closure with exclusive access to the registry.
    Task(Task),
    // Spawns a future onto the loop runtime.
    Future(BoxFuture),
    // Parks the loop on behalf of the bridge.
    Wakeup,
    // Stops the loop.
    Stop,
}

// State shared by the loop, its handles and the bridge.
pub(crate) struct Shared {
    registry: Mutex<Registry>,
    loop_thread: OnceLock<ThreadId>,
}

// Exclusive access to the registry, marking the current thread as its
// holder until dropped.
pub(crate) struct RegistryGuard<'a> {
    guard: MutexGuard<'a, Registry>,
}

impl Deref for RegistryGuard<'_> {
    type Target = Registry;

    fn deref(&self) -> &Registry {
        &self.guard
    }
}

impl DerefMut for RegistryGuard<'_> {
    fn deref_mut(&mut self) -> &mut Registry {
        &mut self.guard
    }
}

impl Drop for RegistryGuard<'_> {
    fn drop(&mut self) {
        HELD.set(false);
    }
}

impl Shared {
    // A panic while holding the registry does not make it unusable.
    //
    // The registry mutex is not reentrant: a thread already holding it, for
    // instance from an action or a listener callback, gets an error instead
    // of locking itself out.
    pub(crate) fn lock(&self) -> Result<RegistryGuard<'_>> {
        if HELD.get() {
            return Err(Error::new(
                ErrorKind::ProtocolViolation,
                "The registry is already held by this thread.",
            ));
        }
        let guard = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        HELD.set(true);
        Ok(RegistryGuard { guard })
    }

    pub(crate) fn is_loop_thread(&self) -> bool {
        self.loop_thread
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }
}

/// A handle submitting work to the [`EventLoop`] from any thread.
#[derive(Clone)]
pub struct LoopHandle {
    sender: flume::Sender<Event>,
}

impl std::fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHandle")
            .field("pending", &self.sender.len())
            .finish()
    }
}

impl LoopHandle {
    /// Runs a closure on the loop thread with exclusive access to the
    /// [`Registry`].
    ///
    /// Actions and listener callbacks run while the registry is held, so
    /// they use this to act on the registry once they have returned, for
    /// instance to broadcast a value change with [`Registry::changed`].
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::InvalidState`] when the loop is not running.
    pub fn spawn<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(&mut Registry) + Send + 'static,
    {
        self.sender.send(Event::Task(Box::new(task)))?;
        Ok(())
    }

    /// Runs a closure on the loop thread once the delay has elapsed.
    ///
    /// Adapters use it to time out the requests they are holding.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::InvalidState`] when the loop is not running.
    pub fn spawn_after<F>(&self, delay: Duration, task: F) -> Result<()>
    where
        F: FnOnce(&mut Registry) + Send + 'static,
    {
        let sender = self.sender.clone();
        self.spawn_future(async move {
            tokio::time::sleep(delay).await;
            // The loop may have stopped in the meantime.
            let _ = sender.send(Event::Task(Box::new(task)));
        })
    }

    /// Spawns a future onto the loop runtime.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::InvalidState`] when the loop is not running.
    pub fn spawn_future<F>(&self, future: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.sender.send(Event::Future(Box::pin(future)))?;
        Ok(())
    }

    /// Asks the loop to stop once the pending events have been processed.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::InvalidState`] when the loop is not running.
    pub fn stop(&self) -> Result<()> {
        self.sender.send(Event::Stop)?;
        Ok(())
    }

    pub(crate) fn wakeup(&self) -> Result<()> {
        self.sender.send(Event::Wakeup)?;
        Ok(())
    }
}

/// Access to the running daemon, shared by modules and adapters.
#[derive(Clone)]
pub struct Context {
    shared: Arc<Shared>,
    handle: LoopHandle,
    bridge: Bridge,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Returns the [`LoopHandle`].
    #[must_use]
    #[inline]
    pub const fn handle(&self) -> &LoopHandle {
        &self.handle
    }

    /// Returns the [`Bridge`] used by threads other than the loop thread.
    #[must_use]
    #[inline]
    pub const fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Runs a closure with exclusive access to the [`Registry`].
    ///
    /// Only code running on the loop thread, such as module hooks and
    /// futures spawned onto the loop, may access the registry directly.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::ProtocolViolation`] when invoked from another
    /// thread, which must go through the [`Bridge`] instead, or while the
    /// registry is already held, as from within an [`Action`] or a listener
    /// callback. Those defer their work with [`LoopHandle::spawn`].
    ///
    /// [`Action`]: crate::request::Action
    pub fn with_registry<T>(&self, f: impl FnOnce(&mut Registry) -> T) -> Result<T> {
        if !self.shared.is_loop_thread() {
            return Err(Error::new(
                ErrorKind::ProtocolViolation,
                "The registry is only accessible from the loop thread.",
            ));
        }
        let mut registry = self.shared.lock()?;
        Ok(f(&mut *registry))
    }
}

/// The single-threaded event loop owning the [`Registry`].
///
/// The loop runs on the thread calling [`EventLoop::run`]. Tasks, futures
/// and bridge wakeups are processed in submission order.
pub struct EventLoop {
    // Shared context.
    context: Context,
    // Event receiver.
    receiver: flume::Receiver<Event>,
    // Posted when the loop has parked for the bridge.
    work: flume::Sender<()>,
    // Awaited while the loop is parked.
    resume: flume::Receiver<()>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Creates an [`EventLoop`] with an empty [`Registry`].
    #[must_use]
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            registry: Mutex::new(Registry::new()),
            loop_thread: OnceLock::new(),
        });
        let (sender, receiver) = flume::unbounded();
        let (work, work_receiver) = flume::unbounded();
        let (resume_sender, resume) = flume::unbounded();

        let handle = LoopHandle { sender };
        let bridge = Bridge::new(
            Arc::clone(&shared),
            handle.clone(),
            work_receiver,
            resume_sender,
        );

        Self {
            context: Context {
                shared,
                handle,
                bridge,
            },
            receiver,
            work,
            resume,
        }
    }

    /// Returns the [`Context`].
    #[must_use]
    #[inline]
    pub const fn context(&self) -> &Context {
        &self.context
    }

    /// Returns the [`LoopHandle`].
    #[must_use]
    #[inline]
    pub fn handle(&self) -> LoopHandle {
        self.context.handle.clone()
    }

    /// Returns the [`Bridge`].
    #[must_use]
    #[inline]
    pub fn bridge(&self) -> Bridge {
        self.context.bridge.clone()
    }

    /// Runs the loop on the current thread until [`LoopHandle::stop`] is
    /// called.
    ///
    /// # Errors
    ///
    /// Fails when the runtime cannot be built.
    pub fn run(self) -> Result<()> {
        self.run_with(|_| Ok(()), |_| ())
    }

    /// Runs the loop, calling `startup` on the loop thread before the first
    /// event and `shutdown` after the loop has stopped.
    ///
    /// # Errors
    ///
    /// Fails when the runtime cannot be built or `startup` fails. In the
    /// latter case no event is processed and `shutdown` is not called.
    pub fn run_with<S, T>(self, startup: S, shutdown: T) -> Result<()>
    where
        S: FnOnce(&Context) -> Result<()>,
        T: FnOnce(&Context),
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        if self
            .context
            .shared
            .loop_thread
            .set(thread::current().id())
            .is_err()
        {
            return Err(Error::new(
                ErrorKind::InvalidState,
                "The event loop has already run.",
            ));
        }

        runtime.block_on(async {
            startup(&self.context)?;
            info!("Event loop started");

            while let Ok(event) = self.receiver.recv_async().await {
                match event {
                    Event::Task(task) => match self.context.shared.lock() {
                        Ok(mut registry) => task(&mut *registry),
                        Err(e) => error!("Task dropped: {e}"),
                    },
                    Event::Future(future) => {
                        tokio::spawn(future);
                    }
                    Event::Wakeup => self.park(),
                    Event::Stop => break,
                }
            }

            shutdown(&self.context);
            info!("Event loop stopped");
            Ok(())
        })
    }

    // Hands the registry to the bridge holder and blocks the whole runtime
    // until it is released.
    fn park(&self) {
        if self.work.send(()).is_err() {
            error!("Bridge released before the loop parked");
            return;
        }
        if self.resume.recv().is_err() {
            error!("Bridge dropped while the loop was parked");
        }
    }
}
