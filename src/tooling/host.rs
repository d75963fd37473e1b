//! Process host: runs one role and maps OS signals onto its lifecycle.
//!
//! SIGUSR1 stops the role, reloads the configuration and starts it again.
//! SIGINT, SIGTERM and SIGQUIT stop it and exit with `128 + signo`.

use crate::config::{ConfigLoader, FilewatchConfig};
use crate::service::Role;
use std::path::Path;
use tracing::{error, info, warn};

/// Exit code for a failed startup
pub const EXIT_STARTUP_FAILURE: i32 = 1;

/// What the host was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    Reload,
    Terminate(i32),
}

impl HostSignal {
    /// Process exit code for a terminating signal
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            HostSignal::Reload => None,
            HostSignal::Terminate(signo) => Some(128 + signo),
        }
    }
}

#[cfg(unix)]
pub struct Signals {
    reload: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            reload: signal(SignalKind::user_defined1())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    pub async fn next(&mut self) -> HostSignal {
        tokio::select! {
            _ = self.reload.recv() => HostSignal::Reload,
            _ = self.interrupt.recv() => HostSignal::Terminate(2),
            _ = self.terminate.recv() => HostSignal::Terminate(15),
            _ = self.quit.recv() => HostSignal::Terminate(3),
        }
    }
}

#[cfg(not(unix))]
pub struct Signals;

#[cfg(not(unix))]
impl Signals {
    pub fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    pub async fn next(&mut self) -> HostSignal {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to wait for Ctrl-C");
        }
        HostSignal::Terminate(2)
    }
}

/// Host `role` until a terminating signal; returns the process exit code.
pub async fn run_role(role: Role, mut config: FilewatchConfig, config_path: &Path) -> i32 {
    let mut signals = match Signals::install() {
        Ok(signals) => signals,
        Err(e) => {
            error!(error = %e, "Failed to install signal handlers");
            return EXIT_STARTUP_FAILURE;
        }
    };

    loop {
        let mut service = role.build(&config);
        if let Err(e) = service.run().await {
            error!(role = %role, error = %e, "Startup failed");
            service.stop().await;
            return EXIT_STARTUP_FAILURE;
        }
        info!(role = %role, "Started {}", service.name());

        let signal = signals.next().await;
        info!(role = %role, ?signal, "Signal received, stopping");
        service.stop().await;

        if let Some(code) = signal.exit_code() {
            return code;
        }

        match ConfigLoader::load(config_path) {
            Ok(reloaded) => {
                config = reloaded;
                info!(path = %config_path.display(), "Configuration reloaded");
            }
            Err(e) => warn!(
                path = %config_path.display(),
                error = %e,
                "Reload failed, keeping previous configuration"
            ),
        }
    }
}
