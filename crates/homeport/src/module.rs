use tracing::{debug, info};

use crate::error::{Error, ErrorKind, Result};
use crate::event_loop::Context;

/// A command-line option declared by a [`Module`].
///
/// On the command line, the option is prefixed by the module identifier,
/// so the `port` option of the `rest` module reads `--rest-port=8080`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleOption {
    // Option name.
    name: &'static str,
    // Argument name, if the option takes a value.
    argument: Option<&'static str>,
    // Help text.
    doc: &'static str,
}

impl ModuleOption {
    /// Creates a [`ModuleOption`] without a value.
    #[must_use]
    #[inline]
    pub const fn flag(name: &'static str, doc: &'static str) -> Self {
        Self {
            name,
            argument: None,
            doc,
        }
    }

    /// Creates a [`ModuleOption`] taking a value.
    #[must_use]
    #[inline]
    pub const fn with_argument(
        name: &'static str,
        argument: &'static str,
        doc: &'static str,
    ) -> Self {
        Self {
            name,
            argument: Some(argument),
            doc,
        }
    }

    /// Returns the option name.
    #[must_use]
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the argument name, if the option takes a value.
    #[must_use]
    #[inline]
    pub const fn argument(&self) -> Option<&'static str> {
        self.argument
    }

    /// Returns the help text.
    #[must_use]
    #[inline]
    pub const fn doc(&self) -> &'static str {
        self.doc
    }
}

/// A pluggable part of the daemon, such as an adapter or an application.
///
/// The daemon drives every module through the same lifecycle:
///
/// 1. [`Module::on_create`], once
/// 2. [`Module::on_parse_opt`], for each of its options on the command line
/// 3. [`Module::on_start`], on the loop thread before the first event
/// 4. [`Module::on_stop`], on the loop thread after the loop has stopped
/// 5. [`Module::on_destroy`], once
///
/// All hooks run on the loop thread, so they can access the registry through
/// [`Context::with_registry`].
pub trait Module: Send {
    /// Returns the options understood by [`Module::on_parse_opt`].
    fn options(&self) -> &[ModuleOption] {
        &[]
    }

    /// Allocates the module resources.
    ///
    /// # Errors
    ///
    /// A failure aborts the daemon before any module is started.
    fn on_create(&mut self, _context: &Context) -> Result<()> {
        Ok(())
    }

    /// Receives one of the options declared by [`Module::options`].
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Argument`] for options the module does not
    /// recognize, which is the default.
    fn on_parse_opt(&mut self, name: &str, _value: Option<&str>) -> Result<()> {
        Err(Error::new(
            ErrorKind::Argument,
            format!("Option `{name}` not recognized."),
        ))
    }

    /// Starts the module, attaching its adapters and devices.
    ///
    /// # Errors
    ///
    /// A failure stops the modules already started and aborts the daemon.
    fn on_start(&mut self, _context: &Context) -> Result<()> {
        Ok(())
    }

    /// Stops the module, detaching what it attached.
    ///
    /// # Errors
    ///
    /// Failures are logged.
    fn on_stop(&mut self, _context: &Context) -> Result<()> {
        Ok(())
    }

    /// Releases the module resources.
    ///
    /// # Errors
    ///
    /// Failures are logged.
    fn on_destroy(&mut self, _context: &Context) -> Result<()> {
        Ok(())
    }
}

/// The lifecycle state of a [`Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Registered with the daemon.
    Registered,
    /// Created and accepting options.
    Created,
    /// Started.
    Started,
    /// Stopped.
    Stopped,
    /// Destroyed.
    Destroyed,
}

// A module together with its identifier and lifecycle state.
pub(crate) struct ModuleEntry {
    id: String,
    module: Box<dyn Module>,
    state: ModuleState,
}

impl ModuleEntry {
    pub(crate) fn new(id: String, module: Box<dyn Module>) -> Self {
        Self {
            id,
            module,
            state: ModuleState::Registered,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) const fn state(&self) -> ModuleState {
        self.state
    }

    pub(crate) fn options(&self) -> &[ModuleOption] {
        self.module.options()
    }

    pub(crate) fn option(&self, name: &str) -> Option<ModuleOption> {
        self.module
            .options()
            .iter()
            .find(|option| option.name == name)
            .copied()
    }

    pub(crate) fn create(&mut self, context: &Context) -> Result<()> {
        self.ensure_state(&[ModuleState::Registered], "create")?;
        self.module.on_create(context)?;
        self.state = ModuleState::Created;
        debug!("Module `{}` created", self.id);
        Ok(())
    }

    pub(crate) fn parse_opt(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        self.ensure_state(&[ModuleState::Created], "configure")?;
        self.module.on_parse_opt(name, value).map_err(|e| {
            if e.kind() == ErrorKind::Argument {
                Error::new(
                    ErrorKind::Argument,
                    format!("Module `{}` did not recognize the option `{name}`.", self.id),
                )
            } else {
                e
            }
        })
    }

    pub(crate) fn start(&mut self, context: &Context) -> Result<()> {
        self.ensure_state(&[ModuleState::Created], "start")?;
        self.module.on_start(context)?;
        self.state = ModuleState::Started;
        info!("Module `{}` started", self.id);
        Ok(())
    }

    pub(crate) fn stop(&mut self, context: &Context) -> Result<()> {
        self.ensure_state(&[ModuleState::Started], "stop")?;
        // A module failing to stop is stopped anyway.
        self.state = ModuleState::Stopped;
        self.module.on_stop(context)?;
        info!("Module `{}` stopped", self.id);
        Ok(())
    }

    pub(crate) fn destroy(&mut self, context: &Context) -> Result<()> {
        self.ensure_state(&[ModuleState::Created, ModuleState::Stopped], "destroy")?;
        self.state = ModuleState::Destroyed;
        self.module.on_destroy(context)?;
        debug!("Module `{}` destroyed", self.id);
        Ok(())
    }

    fn ensure_state(&self, states: &[ModuleState], operation: &str) -> Result<()> {
        if states.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::InvalidState,
                format!(
                    "Cannot {operation} module `{}` in state {:?}.",
                    self.id, self.state
                ),
            ))
        }
    }
}
