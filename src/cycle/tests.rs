use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::sleep;
use tokio_test::assert_ok;

use super::*;
use crate::classify::ClassifyError;
use crate::testing::{FakeDevice, ScriptedClassifier};

const PERIOD: Duration = Duration::from_secs(5);

struct Harness {
    cycle: AnalysisCycle,
    device: Arc<FakeDevice>,
    classifier: Arc<ScriptedClassifier>,
    lexicon: Arc<RwLock<TriggerLexicon>>,
    signals: mpsc::Receiver<CycleSignal>,
}

fn harness(device: Arc<FakeDevice>, classifier: Arc<ScriptedClassifier>) -> Harness {
    harness_with_timeout(device, classifier, Duration::from_secs(2))
}

fn harness_with_timeout(
    device: Arc<FakeDevice>,
    classifier: Arc<ScriptedClassifier>,
    classify_timeout: Duration,
) -> Harness {
    let lexicon = Arc::new(RwLock::new(TriggerLexicon::from_words(["help", "sos"])));
    let (event_tx, _) = broadcast::channel(64);
    let (signal_tx, signals) = mpsc::channel(16);
    let cycle = AnalysisCycle::new(
        device.clone(),
        classifier.clone(),
        Arc::clone(&lexicon),
        CycleTiming {
            period: PERIOD,
            classify_timeout,
        },
        event_tx,
        signal_tx,
    );
    Harness {
        cycle,
        device,
        classifier,
        lexicon,
        signals,
    }
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

#[tokio::test(start_paused = true)]
async fn test_first_tick_within_one_period() {
    let mut h = harness(FakeDevice::granting(), ScriptedClassifier::always("all quiet"));

    assert_ok!(h.cycle.start().await);
    assert_eq!(h.cycle.state(), CycleState::Capturing);
    assert_eq!(h.device.open_count(), 1);

    sleep(PERIOD + millis(100)).await;
    assert_eq!(h.classifier.calls(), 1);
    assert_eq!(h.device.started(), 2);
    assert_eq!(h.device.open_count(), 1);
    assert_eq!(h.cycle.state(), CycleState::Capturing);

    h.cycle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent() {
    let mut h = harness(FakeDevice::granting(), ScriptedClassifier::always(""));

    let first = assert_ok!(h.cycle.start().await);
    let second = assert_ok!(h.cycle.start().await);
    assert_eq!(first, second);
    assert_eq!(h.device.started(), 1);

    h.cycle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_leaves_idle_with_nothing_open() {
    let mut h = harness(FakeDevice::granting(), ScriptedClassifier::always(""));

    h.cycle.start().await.unwrap();
    sleep(PERIOD * 2 + millis(100)).await;
    h.cycle.stop().await;

    assert_eq!(h.cycle.state(), CycleState::Idle);
    assert!(!h.cycle.is_running());
    assert_eq!(h.device.open_count(), 0);
    assert_eq!(h.device.max_open(), 1);

    // Stopping again is harmless
    h.cycle.stop().await;
    assert_eq!(h.cycle.state(), CycleState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop_gets_new_run() {
    let mut h = harness(FakeDevice::granting(), ScriptedClassifier::always(""));

    let first = h.cycle.start().await.unwrap();
    h.cycle.stop().await;
    let second = h.cycle.start().await.unwrap();

    assert_ne!(first, second);
    assert_eq!(h.cycle.run_id(), Some(second));
    assert_eq!(h.device.max_open(), 1);
    h.cycle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_trigger_suspends_without_recapture() {
    let mut h = harness(
        FakeDevice::granting(),
        ScriptedClassifier::sequence(vec![Ok("just talking".to_string())], "please HELP me"),
    );

    let run_id = h.cycle.start().await.unwrap();
    let signal = h.signals.recv().await.expect("signal");

    match signal {
        CycleSignal::Triggered {
            run_id: got,
            trigger,
            ..
        } => {
            assert_eq!(got, run_id);
            assert_eq!(trigger.as_str(), "help");
        }
        other => panic!("unexpected signal {other:?}"),
    }
    assert_eq!(h.classifier.calls(), 2);
    assert_eq!(h.cycle.state(), CycleState::Suspended);
    assert_eq!(h.device.open_count(), 0);

    // Nothing else happens while suspended
    sleep(PERIOD * 3).await;
    assert_eq!(h.classifier.calls(), 2);
    assert_eq!(h.device.open_count(), 0);

    h.cycle.stop().await;
    assert_eq!(h.cycle.state(), CycleState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_classification_failure_continues() {
    let mut h = harness(FakeDevice::granting(), ScriptedClassifier::failing());

    h.cycle.start().await.unwrap();
    sleep(PERIOD * 3 + millis(100)).await;

    assert_eq!(h.classifier.calls(), 3);
    assert_eq!(h.classifier.max_in_flight(), 1);
    assert_eq!(h.cycle.state(), CycleState::Capturing);
    assert!(h.signals.try_recv().is_err());

    h.cycle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_timeout_never_overlaps_ticks() {
    let mut h = harness_with_timeout(
        FakeDevice::granting(),
        ScriptedClassifier::hanging(),
        Duration::from_secs(2),
    );

    h.cycle.start().await.unwrap();
    // Tick at 5s times out at 7s; next tick waits a full period, until 12s
    sleep(Duration::from_secs(11)).await;
    assert_eq!(h.classifier.calls(), 1);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(h.classifier.calls(), 2);
    assert_eq!(h.classifier.max_in_flight(), 1);
    assert_eq!(h.device.max_open(), 1);

    h.cycle.stop().await;
    assert_eq!(h.device.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_classification_discards_result() {
    let mut h = harness(
        FakeDevice::granting(),
        ScriptedClassifier::slow("help", Duration::from_secs(1)),
    );

    h.cycle.start().await.unwrap();
    sleep(PERIOD + millis(500)).await;
    assert_eq!(h.cycle.state(), CycleState::Classifying);
    assert_eq!(h.device.open_count(), 0);

    h.cycle.stop().await;
    assert_eq!(h.cycle.state(), CycleState::Idle);
    assert_eq!(h.classifier.calls(), 1);
    assert!(h.signals.try_recv().is_err());
    assert_eq!(h.device.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_recapture_failure_aborts_run() {
    let mut h = harness(FakeDevice::failing_after(1), ScriptedClassifier::always("quiet"));

    let run_id = h.cycle.start().await.unwrap();
    match h.signals.recv().await.expect("signal") {
        CycleSignal::Aborted { run_id: got, error } => {
            assert_eq!(got, run_id);
            assert!(matches!(error, CaptureError::Device(_)));
        }
        other => panic!("unexpected signal {other:?}"),
    }

    h.cycle.stop().await;
    assert_eq!(h.cycle.state(), CycleState::Idle);
    assert_eq!(h.device.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_start_stays_idle() {
    let mut h = harness(FakeDevice::denying(), ScriptedClassifier::always(""));

    assert_eq!(h.cycle.start().await, Err(CaptureError::PermissionDenied));
    assert!(!h.cycle.is_running());
    assert_eq!(h.cycle.state(), CycleState::Idle);
    assert_eq!(h.device.started(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_lexicon_changes_apply_to_running_cycle() {
    let mut h = harness(FakeDevice::granting(), ScriptedClassifier::always("the house is on fire"));

    h.cycle.start().await.unwrap();
    sleep(PERIOD + millis(100)).await;
    assert!(h.signals.try_recv().is_err());

    h.lexicon.write().await.add("Fire").unwrap();
    match h.signals.recv().await.expect("signal") {
        CycleSignal::Triggered { trigger, .. } => assert_eq!(trigger.as_str(), "fire"),
        other => panic!("unexpected signal {other:?}"),
    }
    h.cycle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_then_match() {
    let mut h = harness(
        FakeDevice::granting(),
        ScriptedClassifier::sequence(
            vec![Err(ClassifyError::Timeout(Duration::from_secs(2)))],
            "sos sos",
        ),
    );

    h.cycle.start().await.unwrap();
    let signal = h.signals.recv().await.expect("signal");
    assert!(matches!(signal, CycleSignal::Triggered { .. }));
    assert_eq!(h.classifier.calls(), 2);
    h.cycle.stop().await;
}
