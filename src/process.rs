//! OS process-table queries and signal delivery.
//!
//! [`ProcessTable`] is the capability the session supervisor uses to find a
//! running debug server by name, terminate it, and confirm its exit. Lookup
//! is always by process name rather than a remembered handle, so supervision
//! recovers cleanly after an orchestrator restart that lost all in-memory
//! state.

use std::ffi::OsStr;
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::Result;

/// Poll interval used while waiting for a signalled process to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Snapshot-based view of the OS process table.
///
/// Every query refreshes the relevant slice of the table first, so results
/// reflect the current state rather than the state at construction time.
#[derive(Debug)]
pub struct ProcessTable {
    system: System,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    /// Create an empty table. No processes are read until the first query.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// All PIDs whose process name matches `name` exactly.
    ///
    /// Note that on Linux the reported name is the kernel `comm` value,
    /// which is truncated to 15 characters.
    pub fn pids_by_name(&mut self, name: &str) -> Vec<u32> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        self.system
            .processes_by_exact_name(OsStr::new(name))
            .map(|process| process.pid().as_u32())
            .collect()
    }

    /// Whether the process is still present in the process table.
    pub fn is_alive(&mut self, pid: u32) -> bool {
        let target = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[target]), true);
        self.system.process(target).is_some()
    }

    /// Deliver a graceful termination signal (`SIGTERM` on unix).
    ///
    /// Returns as soon as the signal is delivered; callers that need the
    /// process gone must follow up with [`wait_for_exit`](Self::wait_for_exit).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Signal` if the signal cannot be delivered (process
    /// already gone, insufficient permissions).
    #[cfg(unix)]
    pub fn terminate(&mut self, pid: u32) -> Result<()> {
        use crate::AppError;
        use nix::sys::signal::{kill, Signal};

        let raw = i32::try_from(pid)
            .map_err(|_| AppError::Signal(format!("pid {pid} does not fit a signed pid")))?;
        kill(nix::unistd::Pid::from_raw(raw), Signal::SIGTERM)
            .map_err(|err| AppError::Signal(format!("failed to signal pid {pid}: {err}")))
    }

    /// Deliver a termination request via the process table.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Signal` if the process cannot be found or the
    /// platform rejects the kill request.
    #[cfg(not(unix))]
    pub fn terminate(&mut self, pid: u32) -> Result<()> {
        use crate::AppError;

        let target = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[target]), true);
        let process = self
            .system
            .process(target)
            .ok_or_else(|| AppError::Signal(format!("pid {pid} not found")))?;
        if process.kill() {
            Ok(())
        } else {
            Err(AppError::Signal(format!("failed to kill pid {pid}")))
        }
    }

    /// Poll until the process has left the process table or `timeout`
    /// elapses. Returns `true` if the process is confirmed gone.
    pub async fn wait_for_exit(&mut self, pid: u32, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.is_alive(pid) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }
}
