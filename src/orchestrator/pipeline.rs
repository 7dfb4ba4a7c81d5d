//! Serialized build → stop → start pipeline runs.
//!
//! One coordinator task owns all pipeline state and consumes triggers from
//! a bounded queue of depth one. That construction gives both invariants at
//! once: runs can never overlap (a single task executes them in sequence),
//! and a trigger arriving mid-run queues at most one follow-up — further
//! triggers merge into the queued one instead of piling up.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::build::Builder;
use crate::orchestrator::supervisor::SessionSupervisor;

/// Create the trigger channel linking the debouncer to the coordinator.
///
/// Capacity is fixed at one: while a run is in flight, exactly one
/// follow-up trigger can wait in the queue.
#[must_use]
pub fn trigger_channel() -> (TriggerHandle, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (TriggerHandle { tx }, rx)
}

/// Cheap, cloneable handle used to request a pipeline run.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<()>,
}

impl TriggerHandle {
    /// Request a pipeline run.
    ///
    /// Returns `true` if the trigger was queued, `false` if it was merged
    /// into an already-pending run (or the coordinator is gone). A merged
    /// trigger is not lost: the pending run will see every change the burst
    /// contained, because the build always reads the current tree.
    pub fn fire(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => false,
            Err(TrySendError::Closed(())) => {
                debug!("pipeline coordinator gone; trigger dropped");
                false
            }
        }
    }
}

/// Phase of the pipeline run state machine.
///
/// `Idle → Building → (Idle on build failure | Stopping → Starting → Idle)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// No run in flight.
    Idle,
    /// Compiler subprocess running.
    Building,
    /// Terminating the previous debug session.
    Stopping,
    /// Launching the new debug session.
    Starting,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Build succeeded and a fresh debug session is live.
    Completed,
    /// Build failed; the previous session was left untouched.
    BuildFailed,
    /// The previous session could not be stopped.
    StopFailed,
    /// The new debug session could not be launched; no session is live
    /// until the next successful run.
    LaunchFailed,
}

/// Sequences builder and supervisor for each trigger, one run at a time.
#[derive(Debug)]
pub struct PipelineCoordinator {
    builder: Builder,
    supervisor: SessionSupervisor,
    phase: RunPhase,
}

impl PipelineCoordinator {
    /// Create a coordinator over the given builder and supervisor.
    #[must_use]
    pub fn new(builder: Builder, supervisor: SessionSupervisor) -> Self {
        Self {
            builder,
            supervisor,
            phase: RunPhase::Idle,
        }
    }

    /// Current phase of the run state machine.
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// The supervised session state, for inspection.
    #[must_use]
    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    /// Execute one full build → stop → start run.
    ///
    /// Strictly ordered and short-circuiting: a failed build aborts the run
    /// before the previous session is touched, and a failed stop aborts the
    /// launch. No failure propagates out — the coordinator must stay ready
    /// for the next trigger — so the outcome is reported as a value.
    pub async fn run(&mut self) -> RunOutcome {
        self.set_phase(RunPhase::Building);
        let result = match self.builder.build().await {
            Ok(result) => result,
            Err(err) => {
                error!(%err, "build could not run");
                self.set_phase(RunPhase::Idle);
                return RunOutcome::BuildFailed;
            }
        };
        if !result.succeeded {
            error!(
                diagnostics = %result.diagnostic_output.trim(),
                "build failed; leaving previous debug session untouched"
            );
            self.set_phase(RunPhase::Idle);
            return RunOutcome::BuildFailed;
        }

        self.set_phase(RunPhase::Stopping);
        if let Err(err) = self.supervisor.stop().await {
            error!(%err, "failed to stop previous debug session");
            self.set_phase(RunPhase::Idle);
            return RunOutcome::StopFailed;
        }

        self.set_phase(RunPhase::Starting);
        let artifact = self.builder.request().output_path.clone();
        let outcome = match self.supervisor.start(artifact).await {
            Ok(session) => {
                info!(
                    pid = session.pid,
                    listen = %session.listen_address,
                    "pipeline run complete"
                );
                RunOutcome::Completed
            }
            Err(err) => {
                error!(%err, "failed to launch debug session");
                RunOutcome::LaunchFailed
            }
        };
        self.set_phase(RunPhase::Idle);
        outcome
    }

    /// Spawn the coordinator task draining `triggers` until cancellation.
    #[must_use]
    pub fn spawn(
        mut self,
        mut triggers: mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            info!("pipeline coordinator shutting down");
                            return;
                        }
                        trigger = triggers.recv() => {
                            if trigger.is_none() {
                                return;
                            }
                            let outcome = self.run().await;
                            debug!(?outcome, "pipeline run finished");
                        }
                    }
                }
            }
            .instrument(info_span!("pipeline")),
        )
    }

    fn set_phase(&mut self, phase: RunPhase) {
        self.phase = phase;
        debug!(?phase, "pipeline phase");
    }
}
