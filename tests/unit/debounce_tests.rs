//! Unit tests for burst debouncing.
//!
//! Drives the debouncer through its event channel directly, independent of
//! any filesystem backend, and observes the trigger side of the channel the
//! pipeline coordinator would normally consume.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use devloop::orchestrator::pipeline::trigger_channel;
use devloop::watcher::Debouncer;

type Harness = (
    mpsc::UnboundedSender<()>,
    mpsc::Receiver<()>,
    CancellationToken,
    tokio::task::JoinHandle<()>,
);

fn test_debouncer(window_ms: u64) -> Harness {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (trigger, trigger_rx) = trigger_channel();
    let ct = CancellationToken::new();
    let handle = Debouncer::new(
        Duration::from_millis(window_ms),
        event_rx,
        trigger,
        ct.clone(),
    )
    .spawn();
    (event_tx, trigger_rx, ct, handle)
}

#[tokio::test]
async fn burst_collapses_to_single_trigger() {
    let (events, mut triggers, ct, _handle) = test_debouncer(200);

    // Five events, each well inside the previous event's window.
    for _ in 0..5 {
        events.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
    }

    let fired = tokio::time::timeout(Duration::from_secs(2), triggers.recv())
        .await
        .expect("trigger should fire after the burst settles");
    assert!(fired.is_some());

    // The settled burst must not produce a second trigger.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(triggers.try_recv().is_err(), "burst fired more than once");

    ct.cancel();
}

#[tokio::test]
async fn events_separated_by_quiet_periods_fire_separately() {
    let (events, mut triggers, ct, _handle) = test_debouncer(100);

    events.send(()).unwrap();
    let first = tokio::time::timeout(Duration::from_secs(2), triggers.recv())
        .await
        .expect("first trigger");
    assert!(first.is_some());

    events.send(()).unwrap();
    let second = tokio::time::timeout(Duration::from_secs(2), triggers.recv())
        .await
        .expect("second trigger");
    assert!(second.is_some());

    ct.cancel();
}

#[tokio::test]
async fn quiet_channel_never_fires() {
    let (_events, mut triggers, ct, _handle) = test_debouncer(50);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(triggers.try_recv().is_err(), "no events, no trigger");

    ct.cancel();
}

#[tokio::test]
async fn cancellation_stops_debouncer_without_firing() {
    let (events, mut triggers, ct, handle) = test_debouncer(200);

    events.send(()).unwrap();
    ct.cancel();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("debouncer should exit after cancellation")
        .unwrap();
    assert!(triggers.try_recv().is_err(), "cancelled burst must not fire");
}

#[tokio::test]
async fn closed_event_source_flushes_pending_burst() {
    let (events, mut triggers, _ct, handle) = test_debouncer(200);

    events.send(()).unwrap();
    events.send(()).unwrap();
    drop(events);

    let fired = tokio::time::timeout(Duration::from_secs(2), triggers.recv())
        .await
        .expect("pending burst should flush when the source closes");
    assert!(fired.is_some());

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("debouncer should exit after the source closes")
        .unwrap();
}
