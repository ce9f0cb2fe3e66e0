use std::cell::RefCell;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::parser::MatchesError;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};

use tracing::level_filters::LevelFilter;
use tracing::{debug, info};

use crate::bridge::Bridge;
use crate::error::{Error, ErrorKind, Result};
use crate::event_loop::{Context, EventLoop, LoopHandle};
use crate::module::{Module, ModuleEntry, ModuleState};

// Name of the daemon binary.
const NAME: &str = "homeport";

// Global options.
const QUIET: &str = "quiet";
const VERBOSE: &str = "verbose";
const CONF: &str = "conf";

// A module option waiting for its module to be created.
#[derive(Debug)]
struct PendingOption {
    module: usize,
    name: String,
    value: Option<String>,
}

/// The daemon hosting modules around an [`EventLoop`].
///
/// ```no_run
/// use homeport::daemon::Daemon;
///
/// # fn main() -> homeport::error::Result<()> {
/// let daemon = Daemon::new().args(std::env::args().skip(1))?;
/// daemon.run()
/// # }
/// ```
pub struct Daemon {
    // Event loop.
    event_loop: EventLoop,
    // Modules in registration order.
    modules: Vec<ModuleEntry>,
    // Module options in command-line order.
    pending: Vec<PendingOption>,
    // Log level requested on the command line.
    log_level: LevelFilter,
    // Configuration file given on the command line.
    conf: Option<PathBuf>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field(
                "modules",
                &self.modules.iter().map(ModuleEntry::id).collect::<Vec<_>>(),
            )
            .field("log_level", &self.log_level)
            .field("conf", &self.conf)
            .finish_non_exhaustive()
    }
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Creates a [`Daemon`] without modules.
    #[must_use]
    pub fn new() -> Self {
        Self {
            event_loop: EventLoop::new(),
            modules: Vec::new(),
            pending: Vec::new(),
            log_level: LevelFilter::INFO,
            conf: None,
        }
    }

    /// Registers a [`Module`].
    ///
    /// Modules are created and started in registration order, and stopped
    /// and destroyed in reverse order.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Argument`] when the identifier is empty or contains a
    ///   dash or a whitespace
    /// - [`ErrorKind::DuplicateId`] when the identifier is already taken
    pub fn module(mut self, id: impl Into<String>, module: impl Module + 'static) -> Result<Self> {
        let id = id.into();

        if id.is_empty() || id.contains(|c: char| c == '-' || c.is_whitespace()) {
            return Err(Error::new(
                ErrorKind::Argument,
                format!("`{id}` is not a valid module identifier."),
            ));
        }
        if self.modules.iter().any(|entry| entry.id() == id) {
            return Err(Error::new(
                ErrorKind::DuplicateId,
                format!("Module `{id}` is already registered."),
            ));
        }

        self.modules.push(ModuleEntry::new(id, Box::new(module)));
        Ok(self)
    }

    /// Parses command-line arguments, without the program name.
    ///
    /// Global options apply immediately:
    ///
    /// - `-q`, `--quiet` turns logging off
    /// - `-v`, `--verbose` turns verbose logging on
    /// - `-c FILE`, `--conf FILE` records a configuration file, which is
    ///   handed to the binary wrapper and never read by the daemon
    ///
    /// Module options, in the form `--<module>-<option>[=value]`, are
    /// validated against the options declared by registered modules and
    /// delivered once the modules are created.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::Argument`] on unknown options, missing or
    /// unexpected values and positional arguments. A help request fails the
    /// same way, carrying the help text.
    pub fn args<I, S>(self, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args = std::iter::once(OsString::from(NAME)).chain(args.into_iter().map(Into::into));
        let matches = self.command().try_get_matches_from(args)?;
        self.matches(&matches)
    }

    /// Applies arguments parsed with the [`Command`] returned by
    /// [`Daemon::command`].
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::Argument`] when the matches were not produced
    /// by this daemon's command.
    pub fn matches(mut self, matches: &ArgMatches) -> Result<Self> {
        let invalid = |e: MatchesError| Error::new(ErrorKind::Argument, e.to_string());

        if matches.try_get_one::<bool>(QUIET).map_err(invalid)? == Some(&true) {
            self.log_level = LevelFilter::OFF;
        }
        if matches.try_get_one::<bool>(VERBOSE).map_err(invalid)? == Some(&true) {
            self.log_level = LevelFilter::TRACE;
        }
        if let Some(conf) = matches.try_get_one::<PathBuf>(CONF).map_err(invalid)? {
            self.conf = Some(conf.clone());
        }

        for (module, entry) in self.modules.iter().enumerate() {
            for option in entry.options() {
                let id = option_id(entry.id(), option.name());
                let values: Vec<Option<String>> = if option.argument().is_some() {
                    matches
                        .try_get_many::<String>(&id)
                        .map_err(invalid)?
                        .into_iter()
                        .flatten()
                        .cloned()
                        .map(Some)
                        .collect()
                } else {
                    let count = matches.try_get_one::<u8>(&id).map_err(invalid)?;
                    vec![None; usize::from(count.copied().unwrap_or_default())]
                };

                self.pending
                    .extend(values.into_iter().map(|value| PendingOption {
                        module,
                        name: option.name().to_owned(),
                        value,
                    }));
            }
        }

        Ok(self)
    }

    /// Builds the command-line interface: the global options followed by
    /// the options of every registered module.
    #[must_use]
    pub fn command(&self) -> Command {
        let command = Command::new(NAME)
            .about("A home-automation daemon serving its devices over REST.")
            .arg(
                Arg::new(QUIET)
                    .short('q')
                    .long(QUIET)
                    .action(ArgAction::SetTrue)
                    .overrides_with(VERBOSE)
                    .help("Do not log anything."),
            )
            .arg(
                Arg::new(VERBOSE)
                    .short('v')
                    .long(VERBOSE)
                    .action(ArgAction::SetTrue)
                    .overrides_with(QUIET)
                    .help("Log everything."),
            )
            .arg(
                Arg::new(CONF)
                    .short('c')
                    .long(CONF)
                    .value_name("FILE")
                    .value_parser(value_parser!(PathBuf))
                    .help("Use the configuration FILE."),
            );

        self.modules.iter().fold(command, |command, entry| {
            entry.options().iter().fold(command, |command, option| {
                let id = option_id(entry.id(), option.name());
                let arg = Arg::new(id.clone()).long(id).help(option.doc());
                command.arg(match option.argument() {
                    Some(argument) => arg
                        .value_name(argument.to_uppercase())
                        .action(ArgAction::Append),
                    None => arg.action(ArgAction::Count),
                })
            })
        })
    }

    /// Returns the log level requested on the command line.
    #[must_use]
    #[inline]
    pub const fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    /// Returns the configuration file given on the command line.
    #[must_use]
    #[inline]
    pub fn conf(&self) -> Option<&Path> {
        self.conf.as_deref()
    }

    /// Returns the [`Context`].
    #[must_use]
    #[inline]
    pub const fn context(&self) -> &Context {
        self.event_loop.context()
    }

    /// Returns the [`LoopHandle`].
    #[must_use]
    #[inline]
    pub fn handle(&self) -> LoopHandle {
        self.event_loop.handle()
    }

    /// Returns the [`Bridge`].
    #[must_use]
    #[inline]
    pub fn bridge(&self) -> Bridge {
        self.event_loop.bridge()
    }

    /// Describes the global options and the options of every registered
    /// module.
    #[must_use]
    pub fn usage(&self) -> String {
        self.command().render_help().to_string()
    }

    /// Runs the daemon on the current thread until [`LoopHandle::stop`] is
    /// called.
    ///
    /// Modules are created, receive their options and are started before
    /// the first event is processed. Once the loop stops, they are stopped
    /// and destroyed in reverse order.
    ///
    /// # Errors
    ///
    /// Fails when a module cannot be created, configured or started. The
    /// modules already started are stopped and the modules already created
    /// are destroyed before returning.
    pub fn run(self) -> Result<()> {
        let Self {
            event_loop,
            modules,
            pending,
            ..
        } = self;
        let modules = RefCell::new(modules);

        event_loop.run_with(
            |context| {
                let mut modules = modules.borrow_mut();
                create(&mut modules, context)?;

                let started = configure(&mut modules, &pending)
                    .and_then(|()| start(&mut modules, context));
                if let Err(e) = started {
                    destroy(&mut modules, context);
                    return Err(e);
                }

                info!("Daemon running with {} modules", modules.len());
                Ok(())
            },
            |context| {
                let mut modules = modules.borrow_mut();
                stop(&mut modules, context);
                destroy(&mut modules, context);
            },
        )
    }
}

// Long name and identifier of a module option.
fn option_id(module: &str, option: &str) -> String {
    format!("{module}-{option}")
}

// Creates every module, destroying the created ones in reverse order on
// failure.
fn create(modules: &mut [ModuleEntry], context: &Context) -> Result<()> {
    for index in 0..modules.len() {
        if let Err(e) = modules[index].create(context) {
            destroy(&mut modules[..index], context);
            return Err(e);
        }
    }
    Ok(())
}

fn configure(modules: &mut [ModuleEntry], pending: &[PendingOption]) -> Result<()> {
    for option in pending {
        modules[option.module].parse_opt(&option.name, option.value.as_deref())?;
    }
    Ok(())
}

// Starts every module, stopping the started ones in reverse order on
// failure.
fn start(modules: &mut [ModuleEntry], context: &Context) -> Result<()> {
    for index in 0..modules.len() {
        if let Err(e) = modules[index].start(context) {
            stop(&mut modules[..index], context);
            return Err(e);
        }
    }
    Ok(())
}

fn stop(modules: &mut [ModuleEntry], context: &Context) {
    for entry in modules.iter_mut().rev() {
        if entry.state() == ModuleState::Started
            && let Err(e) = entry.stop(context)
        {
            debug!("Module `{}` failed to stop: {e}", entry.id());
        }
    }
}

fn destroy(modules: &mut [ModuleEntry], context: &Context) {
    for entry in modules.iter_mut().rev() {
        if matches!(entry.state(), ModuleState::Created | ModuleState::Stopped)
            && let Err(e) = entry.destroy(context)
        {
            debug!("Module `{}` failed to be destroyed: {e}", entry.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use tracing::level_filters::LevelFilter;

    use crate::error::ErrorKind;
    use crate::module::tests::Recorder;

    use super::Daemon;

    fn daemon(events: &Arc<Mutex<Vec<String>>>, failing: Option<(&str, &'static str)>) -> Daemon {
        let mut daemon = Daemon::new();
        for name in ["a", "b", "c"] {
            let mut recorder = Recorder::new(name, events);
            if let Some((module, hook)) = failing
                && module == name
            {
                recorder = recorder.failing(hook);
            }
            daemon = daemon.module(name, recorder).unwrap();
        }
        daemon
    }

    fn recorded(events: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        events.lock().unwrap().clone()
    }

    #[test]
    fn module_ids() {
        let events = Arc::new(Mutex::new(Vec::new()));

        let error = Daemon::new()
            .module("z-wave", Recorder::new("a", &events))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Argument);

        let error = Daemon::new()
            .module("zwave", Recorder::new("a", &events))
            .unwrap()
            .module("zwave", Recorder::new("b", &events))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DuplicateId);
    }

    #[test]
    fn global_options() {
        let events = Arc::new(Mutex::new(Vec::new()));

        assert_eq!(daemon(&events, None).log_level(), LevelFilter::INFO);
        assert_eq!(
            daemon(&events, None).args(["-v"]).unwrap().log_level(),
            LevelFilter::TRACE
        );
        assert_eq!(
            daemon(&events, None)
                .args(["--verbose", "--quiet"])
                .unwrap()
                .log_level(),
            LevelFilter::OFF
        );
    }

    #[test]
    fn module_options() {
        let events = Arc::new(Mutex::new(Vec::new()));

        for args in [
            vec!["--d-level=1"],
            vec!["--a-volume=1"],
            vec!["--a"],
            vec!["--a-level"],
            vec!["--a-loud=yes"],
            vec!["positional"],
            vec!["-c"],
        ] {
            let error = daemon(&events, None).args(args).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::Argument);
        }

        let daemon = daemon(&events, None)
            .args(["--a-level=1", "--b-level", "2", "--c-loud"])
            .unwrap();
        assert_eq!(daemon.pending.len(), 3);
        assert_eq!(daemon.pending[1].value.as_deref(), Some("2"));
        assert_eq!(daemon.pending[2].value, None);

        let usage = daemon.usage();
        assert!(usage.contains("--a-level <LEVEL>"));
        assert!(usage.contains("--c-loud"));
        assert!(usage.contains("Record loudly."));
    }

    #[test]
    fn repeated_module_options() {
        let events = Arc::new(Mutex::new(Vec::new()));

        let daemon = daemon(&events, None)
            .args(["--a-level", "1", "--a-loud", "--a-level=2", "--a-loud"])
            .unwrap();
        let pending = daemon
            .pending
            .iter()
            .map(|option| format!("{}={:?}", option.name, option.value))
            .collect::<Vec<_>>();
        assert_eq!(
            pending,
            vec![
                r#"level=Some("1")"#,
                r#"level=Some("2")"#,
                "loud=None",
                "loud=None"
            ]
        );
    }

    #[test]
    fn help() {
        let events = Arc::new(Mutex::new(Vec::new()));

        let error = daemon(&events, None).args(["--help"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Argument);
        assert!(error.description().contains("--b-level <LEVEL>"));
        assert!(error.description().contains("--quiet"));
    }

    #[test]
    fn configuration_file() {
        let events = Arc::new(Mutex::new(Vec::new()));

        let daemon = daemon(&events, None)
            .args(["--conf", "/etc/homeport.conf", "--a-level=1"])
            .unwrap();
        assert_eq!(daemon.conf(), Some(Path::new("/etc/homeport.conf")));

        let daemon = daemon.args(["-c", "/nonexistent/homeport.conf"]).unwrap();
        assert_eq!(daemon.conf(), Some(Path::new("/nonexistent/homeport.conf")));
        assert_eq!(daemon.pending.len(), 1);
    }

    #[test]
    fn lifecycle() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let daemon = daemon(&events, None).args(["--b-level=2"]).unwrap();

        // Processed once every module has started.
        daemon.handle().stop().unwrap();
        daemon.run().unwrap();

        assert_eq!(
            recorded(&events),
            vec![
                "a create", "b create", "c create", "b level=2", "a start", "b start", "c start",
                "c stop", "b stop", "a stop", "c destroy", "b destroy", "a destroy",
            ]
        );
    }

    #[test]
    fn failed_create() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let daemon = daemon(&events, Some(("b", "create")));

        daemon.handle().stop().unwrap();
        assert_eq!(daemon.run().unwrap_err().kind(), ErrorKind::Unknown);

        assert_eq!(recorded(&events), vec!["a create", "b create", "a destroy"]);
    }

    #[test]
    fn failed_start() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let daemon = daemon(&events, Some(("b", "start")));

        daemon.handle().stop().unwrap();
        assert_eq!(daemon.run().unwrap_err().kind(), ErrorKind::Unknown);

        assert_eq!(
            recorded(&events),
            vec![
                "a create", "b create", "c create", "a start", "b start", "a stop", "c destroy",
                "b destroy", "a destroy",
            ]
        );
    }

    #[test]
    fn rejected_option() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let daemon = daemon(&events, None).args(["--a-loud"]).unwrap();

        assert_eq!(daemon.run().unwrap_err().kind(), ErrorKind::Argument);
        assert_eq!(
            recorded(&events),
            vec![
                "a create", "b create", "c create", "c destroy", "b destroy", "a destroy"
            ]
        );
    }
}
