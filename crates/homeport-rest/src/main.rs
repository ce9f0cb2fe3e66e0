//! The HomePort daemon serving its registry over REST.

use std::process::ExitCode;

use tracing::info;

use homeport::daemon::Daemon;
use homeport::error::Result;

use homeport_rest::module::RestModule;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let daemon = Daemon::new().module("rest", RestModule::new())?;

    // Help and malformed options exit here.
    let matches = daemon.command().get_matches();
    let daemon = daemon.matches(&matches)?;

    tracing_subscriber::fmt()
        .with_max_level(daemon.log_level())
        .init();

    if let Some(conf) = daemon.conf() {
        info!("Configuration file: {}", conf.display());
    }

    // Stop the loop on Ctrl-C.
    let handle = daemon.handle();
    daemon.handle().spawn_future(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            let _ = handle.stop();
        }
    })?;

    daemon.run()
}
