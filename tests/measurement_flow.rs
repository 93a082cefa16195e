//! End-to-end measurement flows against an in-memory ring.
//!
//! All tests run under a paused tokio clock: buffered notification frames
//! drain first, then auto-advance fires whichever deadline comes next, so
//! the 30-second acquisition timer and the 2-second ack budget both resolve
//! instantly and deterministically.

mod common;

use std::sync::Arc;

use tokio::sync::mpsc;

use common::FakeRing;
use smartring::{
    GattConfig, GattSession, MeasurementCommand, MeasurementConfig, MeasurementEvent,
    MeasurementSession, run_measurement,
};

struct Rig {
    ring: Arc<FakeRing>,
    frames: mpsc::UnboundedReceiver<smartring::GattEvent>,
    session: MeasurementSession,
}

async fn rig() -> Rig {
    let ring = Arc::new(FakeRing::new());
    let mut gatt = GattSession::new(ring.clone(), GattConfig::default());
    gatt.bind().await.unwrap();
    let frames = gatt.subscribe().await.unwrap();
    let session = MeasurementSession::new(gatt.sender(), MeasurementConfig::default());
    Rig {
        ring,
        frames,
        session,
    }
}

fn drain(mut events: mpsc::UnboundedReceiver<MeasurementEvent>) -> Vec<MeasurementEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

#[tokio::test(start_paused = true)]
async fn measurement_runs_to_completion_on_the_acquisition_timer() {
    let rig = rig().await;

    // The ring reports twice, with progress in between; the later result wins.
    rig.ring.notify(vec![0x00, 0x21, 0x31, 0x00, 0x01, 70]);
    rig.ring.notify(vec![0x00, 0x22, 0x31, 0xFF, 10]);
    rig.ring.notify(vec![0x00, 0x23, 0x31, 0x00, 0x01, 72]);
    rig.ring.notify(vec![0x00, 0x24, 0x31, 0xFF, 100]);

    let (_command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let outcome = run_measurement(rig.session, rig.frames, command_rx, event_tx)
        .await
        .unwrap();

    assert!(outcome.complete);
    assert_eq!(outcome.heart_rate, Some(72));

    let events = drain(event_rx);
    assert!(events.contains(&MeasurementEvent::Progress(10)));
    assert!(events.contains(&MeasurementEvent::Progress(100)));
    assert!(matches!(
        events.last(),
        Some(MeasurementEvent::Completed(o)) if o.heart_rate == Some(72)
    ));

    // Exactly one outbound frame: the start command. No pushes, no acks.
    let writes = rig.ring.written_frames();
    assert_eq!(writes.len(), 1);
    assert_eq!(&writes[0][2..], &[0x31, 0x00, 30, 50, 1, 1, 1]);
}

#[tokio::test(start_paused = true)]
async fn push_is_acknowledged_with_the_pushed_frame_id() {
    let rig = rig().await;

    // Push with frame id 0x09 demands an ack echoing that id.
    rig.ring.notify(vec![0x00, 0x09, 0x31, 0x03, 0x01, 68]);

    let (_command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let outcome = run_measurement(rig.session, rig.frames, command_rx, event_tx)
        .await
        .unwrap();

    assert!(outcome.complete);
    assert_eq!(outcome.heart_rate, Some(68));

    let writes = rig.ring.written_frames();
    assert_eq!(writes.len(), 2, "start command plus one ack");
    assert_eq!(writes[1], vec![0x00, 0x09, 0x31, 0x03]);

    // The ack went out inside its budget, so no deadline miss surfaced.
    let events = drain(event_rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, MeasurementEvent::AckDeadlineMissed { .. })));
}

#[tokio::test(start_paused = true)]
async fn waveform_and_rr_frames_accumulate() {
    let rig = rig().await;

    rig.ring.notify(vec![0x00, 0x30, 0x31, 0x01, 0, 3, 10, 20, 30]);
    rig.ring.notify(vec![0x00, 0x31, 0x31, 0x01, 1, 2, 40, 50]);
    // Two RR intervals, little-endian milliseconds: 800 and 810.
    rig.ring
        .notify(vec![0x00, 0x32, 0x31, 0x02, 0, 2, 0x20, 0x03, 0x2A, 0x03]);
    rig.ring.notify(vec![0x00, 0x33, 0x31, 0x00, 0x01, 75]);

    let (_command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, _event_rx) = mpsc::unbounded_channel();
    let outcome = run_measurement(rig.session, rig.frames, command_rx, event_tx)
        .await
        .unwrap();

    assert_eq!(outcome.waveform, vec![10, 20, 30, 40, 50]);
    assert_eq!(outcome.rr_intervals, vec![800, 810]);
    assert_eq!(outcome.heart_rate, Some(75));
}

#[tokio::test(start_paused = true)]
async fn undecodable_notification_is_reported_not_fatal() {
    let rig = rig().await;

    rig.ring.notify(vec![0x00]);
    rig.ring.notify(vec![0x00, 0x23, 0x31, 0x00, 0x01, 72]);

    let (_command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let outcome = run_measurement(rig.session, rig.frames, command_rx, event_tx)
        .await
        .unwrap();

    assert!(outcome.complete);
    assert_eq!(outcome.heart_rate, Some(72));
    assert!(drain(event_rx)
        .iter()
        .any(|e| matches!(e, MeasurementEvent::Undecodable { len: 1 })));
}

#[tokio::test(start_paused = true)]
async fn cancel_aborts_and_discards_data() {
    let rig = rig().await;

    rig.ring.notify(vec![0x00, 0x23, 0x31, 0x00, 0x01, 72]);

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, _event_rx) = mpsc::unbounded_channel();
    command_tx.send(MeasurementCommand::Cancel).unwrap();

    let outcome = run_measurement(rig.session, rig.frames, command_rx, event_tx)
        .await
        .unwrap();

    assert!(!outcome.complete);
    assert_eq!(outcome.heart_rate, None);
    assert!(outcome.waveform.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_completes_early_with_partial_data() {
    let rig = rig().await;

    rig.ring.notify(vec![0x00, 0x23, 0x31, 0x00, 0x01, 72]);

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    command_tx.send(MeasurementCommand::Stop).unwrap();

    let outcome = run_measurement(rig.session, rig.frames, command_rx, event_tx)
        .await
        .unwrap();

    assert!(outcome.complete);

    let events = drain(event_rx);
    assert!(matches!(
        events.last(),
        Some(MeasurementEvent::Completed(_))
    ));
}
