use padbridge::bridge::{channel_source, BridgeError, WorkerSettings};
use padbridge::link::{LinkCommand, LinkError};
use padbridge::{
    run_guarded, ButtonFlags, ControllerColor, ControllerLink, GuardError, GuardSettings,
    RecordingLink, StickPosition,
};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

fn fast_settings(pairing_timeout: Duration) -> GuardSettings {
    GuardSettings {
        pairing_timeout,
        pairing_poll: Duration::from_millis(5),
        settle_delay: Duration::ZERO,
        colors: ControllerColor::default(),
        worker: WorkerSettings::default(),
    }
}

/// Link whose native teardown kills the worker thread.
struct PanickingTeardownLink;

/// Link that crashes on the first report.
struct PanickingSendLink;

/// Link that cannot start advertising.
struct DeadRadioLink;

impl ControllerLink for PanickingTeardownLink {
    fn begin_pairing(&mut self, _colors: &ControllerColor) -> Result<(), LinkError> {
        Ok(())
    }
    fn is_paired(&self) -> bool {
        true
    }
    fn send_buttons(&mut self, _buttons: ButtonFlags) -> Result<(), LinkError> {
        Ok(())
    }
    fn send_left_stick(&mut self, _position: StickPosition) -> Result<(), LinkError> {
        Ok(())
    }
    fn send_right_stick(&mut self, _position: StickPosition) -> Result<(), LinkError> {
        Ok(())
    }
    fn shutdown(&mut self) -> Result<(), LinkError> {
        panic!("native stack torn down twice")
    }
}

impl ControllerLink for PanickingSendLink {
    fn begin_pairing(&mut self, _colors: &ControllerColor) -> Result<(), LinkError> {
        Ok(())
    }
    fn is_paired(&self) -> bool {
        true
    }
    fn send_buttons(&mut self, _buttons: ButtonFlags) -> Result<(), LinkError> {
        panic!("report buffer overflow")
    }
    fn send_left_stick(&mut self, _position: StickPosition) -> Result<(), LinkError> {
        Ok(())
    }
    fn send_right_stick(&mut self, _position: StickPosition) -> Result<(), LinkError> {
        Ok(())
    }
    fn shutdown(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

impl ControllerLink for DeadRadioLink {
    fn begin_pairing(&mut self, _colors: &ControllerColor) -> Result<(), LinkError> {
        Err(LinkError::PairingStart("no adapter".into()))
    }
    fn is_paired(&self) -> bool {
        false
    }
    fn send_buttons(&mut self, _buttons: ButtonFlags) -> Result<(), LinkError> {
        Err(LinkError::Closed)
    }
    fn send_left_stick(&mut self, _position: StickPosition) -> Result<(), LinkError> {
        Err(LinkError::Closed)
    }
    fn send_right_stick(&mut self, _position: StickPosition) -> Result<(), LinkError> {
        Err(LinkError::Closed)
    }
    fn shutdown(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_host_action_runs_once_when_paired() {
    let link = RecordingLink::new();
    let log = link.log();
    let (sender, source) = channel_source();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let result = run_guarded(
        source,
        link,
        fast_settings(Duration::from_secs(1)),
        CancellationToken::new(),
        || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            sender.send(b"0x0010 8\r\n".to_vec()).unwrap();
            sender.send(b"end\r\n".to_vec()).unwrap();
            sleep(Duration::from_millis(100)).await;
            Ok::<_, io::Error>(42)
        },
    )
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        log.commands()[1..],
        [
            LinkCommand::Buttons(ButtonFlags::A),
            LinkCommand::Buttons(ButtonFlags::empty()),
            LinkCommand::LeftStick(StickPosition::centered()),
            LinkCommand::RightStick(StickPosition::centered()),
            LinkCommand::Shutdown,
        ]
    );
}

#[tokio::test]
async fn test_host_action_runs_after_pairing_timeout() {
    let link = RecordingLink::unpaired();
    let log = link.log();
    let (_sender, source) = channel_source();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let started = Instant::now();

    let result = run_guarded(
        source,
        link,
        fast_settings(Duration::from_millis(80)),
        CancellationToken::new(),
        || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, io::Error>(())
        },
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert_eq!(log.commands().last(), Some(&LinkCommand::Shutdown));
}

#[tokio::test]
async fn test_host_error_takes_priority() {
    let link = RecordingLink::new().failing_sends();
    let (sender, source) = channel_source();
    sender.send(b"0x0010 8".to_vec()).unwrap();

    let result: Result<(), GuardError> = run_guarded(
        source,
        link,
        fast_settings(Duration::from_secs(1)),
        CancellationToken::new(),
        || async move {
            sleep(Duration::from_millis(50)).await;
            Err(io::Error::new(io::ErrorKind::Other, "automation step failed"))
        },
    )
    .await;

    match result {
        Err(GuardError::HostAction(e)) => assert_eq!(e.to_string(), "automation step failed"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_link_failure_reaches_caller() {
    let link = RecordingLink::new().failing_sends();
    let log = link.log();
    let (sender, source) = channel_source();

    let result = run_guarded(
        source,
        link,
        fast_settings(Duration::from_secs(1)),
        CancellationToken::new(),
        || async move {
            sender.send(b"end".to_vec()).unwrap();
            sleep(Duration::from_millis(50)).await;
            Ok::<_, io::Error>(())
        },
    )
    .await;

    assert!(matches!(
        result,
        Err(GuardError::Worker(BridgeError::Link(LinkError::Send { .. })))
    ));
    assert_eq!(log.commands().last(), Some(&LinkCommand::Shutdown));
}

#[tokio::test]
async fn test_teardown_race_is_absorbed() {
    let (_sender, source) = channel_source();

    let result = run_guarded(
        source,
        PanickingTeardownLink,
        fast_settings(Duration::from_secs(1)),
        CancellationToken::new(),
        || async { Ok::<_, io::Error>("done") },
    )
    .await;

    assert_eq!(result.unwrap(), "done");
}

#[tokio::test]
async fn test_crash_outside_teardown_propagates() {
    let (sender, source) = channel_source();

    let result = run_guarded(
        source,
        PanickingSendLink,
        fast_settings(Duration::from_secs(1)),
        CancellationToken::new(),
        || async move {
            sender.send(b"0x0010 8".to_vec()).unwrap();
            sleep(Duration::from_millis(50)).await;
            Ok::<_, io::Error>(())
        },
    )
    .await;

    match result {
        Err(GuardError::WorkerCrashed(message)) => assert_eq!(message, "report buffer overflow"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_host_stop_skips_action() {
    let link = RecordingLink::unpaired();
    let log = link.log();
    let (_sender, source) = channel_source();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let settings = fast_settings(Duration::from_secs(5));

    let host_stop = CancellationToken::new();
    let stopper = host_stop.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(20)).await;
        stopper.cancel();
    });

    let started = Instant::now();
    let result = run_guarded(source, link, settings, host_stop, || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, io::Error>(())
    })
    .await;

    assert!(matches!(result, Err(GuardError::HostStopped)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(log.commands().last(), Some(&LinkCommand::Shutdown));
}

#[tokio::test]
async fn test_host_runs_even_if_worker_cannot_start() {
    let (_sender, source) = channel_source();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let result = run_guarded(
        source,
        DeadRadioLink,
        fast_settings(Duration::from_secs(1)),
        CancellationToken::new(),
        || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, io::Error>(())
        },
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(
        result,
        Err(GuardError::Worker(BridgeError::Link(LinkError::PairingStart(_))))
    ));
}
