//! Debug-session lifecycle supervision.
//!
//! Owns the at-most-one-live-session invariant. A previous instance is
//! discovered through the OS process table by NAME — never through a
//! remembered handle — so [`SessionSupervisor::stop`] also cleans up
//! sessions left behind by an earlier orchestrator incarnation that crashed
//! and lost its state.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::DebugConfig;
use crate::process::ProcessTable;
use crate::{AppError, Result};

/// Grace period after spawn before the launch is considered confirmed.
///
/// A debug server that cannot bind its listen port exits within this
/// window, which turns an occupied port into a diagnosable launch error
/// instead of a silently dead session.
const STARTUP_GRACE: Duration = Duration::from_millis(250);

/// A live debug-server process launched by [`SessionSupervisor::start`].
#[derive(Debug, Clone)]
pub struct DebugSession {
    /// OS process id of the debug server.
    pub pid: u32,
    /// `host:port` the server accepts debugger connections on.
    pub listen_address: String,
    /// Executable the session is debugging.
    pub target_artifact: PathBuf,
}

/// Supervises the single background debug-session process.
#[derive(Debug)]
pub struct SessionSupervisor {
    config: DebugConfig,
    table: ProcessTable,
    current: Option<DebugSession>,
}

impl SessionSupervisor {
    /// Create a supervisor for the configured debug server.
    #[must_use]
    pub fn new(config: DebugConfig) -> Self {
        Self {
            config,
            table: ProcessTable::new(),
            current: None,
        }
    }

    /// The session started by the most recent successful [`start`](Self::start),
    /// if any. Cleared by [`stop`](Self::stop).
    #[must_use]
    pub fn current_session(&self) -> Option<&DebugSession> {
        self.current.as_ref()
    }

    /// Stop any running debug server discovered by process name.
    ///
    /// Finding nothing is the expected first-run case and succeeds silently.
    /// For each discovered instance a graceful termination signal is sent,
    /// then the exit is awaited so a following [`start`](Self::start) never
    /// races a not-yet-released listen port. Signal-delivery failures and
    /// exit-wait timeouts are logged as warnings and do not fail the stop:
    /// the relaunch is still attempted and will surface its own error if the
    /// port is in fact still held.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; the `Result` covers future
    /// platform-specific discovery failures.
    pub async fn stop(&mut self) -> Result<()> {
        self.current = None;

        let pids = self.table.pids_by_name(&self.config.process_name);
        if pids.is_empty() {
            debug!(
                process = %self.config.process_name,
                "no debug server running; nothing to stop"
            );
            return Ok(());
        }

        let stop_wait = Duration::from_millis(self.config.stop_wait_ms);
        for pid in pids {
            info!(pid, process = %self.config.process_name, "stopping debug server");
            if let Err(err) = self.table.terminate(pid) {
                warn!(
                    pid,
                    %err,
                    "could not deliver termination signal; attempting relaunch anyway"
                );
                continue;
            }
            if self.table.wait_for_exit(pid, stop_wait).await {
                info!(pid, "debug server stopped");
            } else {
                warn!(
                    pid,
                    waited = ?stop_wait,
                    "debug server did not exit in time; relaunch may fail to bind its port"
                );
            }
        }

        Ok(())
    }

    /// Launch a fresh debug server bound to the configured listen address,
    /// targeting `artifact`.
    ///
    /// Returns once the spawn is confirmed; the long-lived child is not
    /// waited on. The process is deliberately left running if this
    /// orchestrator exits — recovery goes through the name-based discovery
    /// in [`stop`](Self::stop).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the binary cannot be spawned (missing
    /// executable, permissions) or if the server exits within the startup
    /// grace period (typically an occupied listen port).
    pub async fn start(&mut self, artifact: PathBuf) -> Result<DebugSession> {
        let flags = resolved_flags(&self.config, &artifact);

        let mut child = Command::new(&self.config.program)
            .args(&flags)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|err| {
                AppError::Launch(format!(
                    "failed to launch debug server '{}': {err}",
                    self.config.program
                ))
            })?;

        let Some(pid) = child.id() else {
            return Err(AppError::Launch(
                "debug server exited before it could be supervised".into(),
            ));
        };

        // Confirm the launch: a server that cannot bind its port dies here.
        tokio::time::sleep(STARTUP_GRACE).await;
        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(AppError::Launch(format!(
                    "debug server exited immediately ({status}); is {} already in use?",
                    self.config.listen_address
                )));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(pid, %err, "could not poll debug server status after launch");
            }
        }

        // Reap the child in the background so it never lingers as a zombie
        // in the process table after a stop.
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!(pid, %status, "debug server process exited"),
                Err(err) => warn!(pid, %err, "error waiting on debug server process"),
            }
        });

        let session = DebugSession {
            pid,
            listen_address: self.config.listen_address.clone(),
            target_artifact: artifact,
        };
        info!(
            pid,
            listen = %session.listen_address,
            artifact = %session.target_artifact.display(),
            "debug server started"
        );
        self.current = Some(session.clone());
        Ok(session)
    }
}

/// Launch flags with `{listen}` and `{artifact}` tokens expanded.
fn resolved_flags(config: &DebugConfig, artifact: &Path) -> Vec<String> {
    let artifact_text = artifact.to_string_lossy();
    config
        .flags
        .iter()
        .map(|flag| {
            flag.replace("{listen}", &config.listen_address)
                .replace("{artifact}", &artifact_text)
        })
        .collect()
}
