//! Recursive source watching with burst debouncing.
//!
//! Editors and version-control checkouts touch many files nearly at once.
//! [`ChangeWatcher`] bridges raw `notify` events onto a channel, and
//! [`Debouncer`] collapses each burst into a single pipeline trigger: every
//! incoming event resets the quiet-period timer, and the trigger fires
//! exactly once when the window elapses with no further events.
//!
//! Two watch backends sit behind the same surface: the platform-native
//! notifier and a polling scanner for filesystems that cannot deliver
//! native change notifications. Polling trades detection latency for
//! portability; it is a configuration choice, not a correctness one.

use std::path::Path;
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, EventKind, PollWatcher, RecommendedWatcher};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::orchestrator::pipeline::TriggerHandle;
use crate::Result;

/// Returns `true` for events that represent a source-tree change (create,
/// modify, remove). Access and metadata-only events are ignored.
fn is_source_change(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Watcher backend selection and debounce timing.
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    /// Quiet period after the last event before the trigger fires.
    pub debounce_window: Duration,
    /// Use the polling backend instead of the native notifier.
    pub polling: bool,
    /// Scan interval for the polling backend.
    pub poll_interval: Duration,
}

impl WatcherSettings {
    /// Extract watcher settings from validated configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            debounce_window: config.debounce_window(),
            polling: config.watch.polling,
            poll_interval: config.poll_interval(),
        }
    }
}

/// Recursive filesystem watcher feeding the debounced pipeline trigger.
///
/// Holds the underlying `notify` watcher alive for its own lifetime;
/// dropping a `ChangeWatcher` stops the OS watch.
pub struct ChangeWatcher {
    /// Underlying notify watcher — kept alive by owning it here.
    _watcher: Box<dyn Watcher + Send>,
}

impl ChangeWatcher {
    /// Start watching `root` recursively and spawn the debounce task.
    ///
    /// Raw events are forwarded from the notify callback thread onto an
    /// unbounded channel; the returned [`JoinHandle`] belongs to the
    /// [`Debouncer`] task that drains it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Watch` if the backend cannot be created or the
    /// root cannot be watched.
    pub fn spawn(
        root: &Path,
        settings: &WatcherSettings,
        trigger: TriggerHandle,
        cancel: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>)> {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<()>();

        let handler = move |result: std::result::Result<Event, notify::Error>| match result {
            Ok(event) if is_source_change(&event) => {
                // Receiver gone means shutdown; nothing to do about it here.
                let _ = event_tx.send(());
            }
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "filesystem watcher error");
            }
        };

        let mut watcher: Box<dyn Watcher + Send> = if settings.polling {
            let poll_config = NotifyConfig::default().with_poll_interval(settings.poll_interval);
            Box::new(PollWatcher::new(handler, poll_config)?)
        } else {
            Box::new(RecommendedWatcher::new(handler, NotifyConfig::default())?)
        };

        watcher.watch(root, RecursiveMode::Recursive)?;

        info!(
            root = %root.display(),
            polling = settings.polling,
            debounce = ?settings.debounce_window,
            "source watcher started"
        );

        let task = Debouncer::new(settings.debounce_window, event_rx, trigger, cancel).spawn();

        Ok((Self { _watcher: watcher }, task))
    }
}

/// Reset-on-event, fire-on-timeout debounce state machine.
///
/// Independent of the watch backend: it only sees the event channel, which
/// makes the single-fire property directly testable without a filesystem.
pub struct Debouncer {
    window: Duration,
    events: mpsc::UnboundedReceiver<()>,
    trigger: TriggerHandle,
    cancel: CancellationToken,
}

impl Debouncer {
    /// Create a debouncer draining `events` into `trigger`.
    #[must_use]
    pub fn new(
        window: Duration,
        events: mpsc::UnboundedReceiver<()>,
        trigger: TriggerHandle,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            window,
            events,
            trigger,
            cancel,
        }
    }

    /// Spawn the background debounce task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run().instrument(info_span!("debouncer")))
    }

    async fn run(mut self) {
        loop {
            // ── Wait for the first event of a burst ──────────
            tokio::select! {
                () = self.cancel.cancelled() => return,
                first = self.events.recv() => {
                    if first.is_none() {
                        return;
                    }
                }
            }

            // ── Coalesce until the window elapses quietly ────
            let mut coalesced: u64 = 1;
            let mut source_closed = false;
            loop {
                tokio::select! {
                    () = self.cancel.cancelled() => return,
                    more = self.events.recv() => {
                        if more.is_none() {
                            // Event source gone mid-burst; fire what we
                            // have so the last change is not lost.
                            source_closed = true;
                            break;
                        }
                        coalesced += 1;
                    }
                    // A fresh sleep each iteration: every event resets the
                    // window.
                    () = tokio::time::sleep(self.window) => break,
                }
            }

            debug!(events = coalesced, "change burst settled");
            if self.trigger.fire() {
                debug!("pipeline trigger queued");
            } else {
                debug!("pipeline run already pending; burst merged");
            }

            if source_closed {
                return;
            }
        }
    }
}
