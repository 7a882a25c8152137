use servo_mask::core::config_store::DEFAULT_NAMESPACE;
use servo_mask::core::{NUM_POSES, NUM_SERVOS};
use servo_mask::{
    mpsc_channel, ConfigSnapshot, EngineSettings, MemoryStore, RecordingServoDriver,
    ServoMaskEngine,
};
use std::time::Duration;

/// Keys written by one full save: currentPose plus a name and every channel per slot.
const PUTS_PER_SAVE: usize = 1 + NUM_POSES * (1 + NUM_SERVOS);

fn engine(
    store: &MemoryStore,
    driver: &RecordingServoDriver,
) -> ServoMaskEngine<MemoryStore, RecordingServoDriver> {
    ServoMaskEngine::new(store.clone(), driver.clone(), EngineSettings::default())
}

#[tokio::test(start_paused = true)]
async fn test_get_config_notification_after_pose() {
    let store = MemoryStore::new();
    let driver = RecordingServoDriver::new();
    let mut engine = engine(&store, &driver);
    let (mut device, mut central) = mpsc_channel(16);

    let script = async {
        central.connect().await.unwrap();
        central
            .write("POSE:2:10:20:30:40:50:60:70:80")
            .await
            .unwrap();
        central.write("SERVO:7:200").await.unwrap();
        central.write("GET_CONFIG").await.unwrap();

        let payload = central.next_notification().await.unwrap();
        central.close().await.unwrap();
        payload
    };

    let ((), payload) = tokio::join!(
        engine.run(&mut device, std::future::pending::<()>()),
        script
    );

    let snapshot: ConfigSnapshot = serde_json::from_slice(&payload).unwrap();
    assert_eq!(snapshot.current_pose, 2);
    assert_eq!(snapshot.poses.len(), NUM_POSES);
    assert_eq!(
        snapshot.poses[2].positions(),
        [10, 20, 30, 40, 50, 60, 70, 180]
    );
    assert_eq!(snapshot, engine.configuration().snapshot());
    assert_eq!(driver.angle(7), Some(180));
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_changes_is_written_once() {
    let store = MemoryStore::new();
    let driver = RecordingServoDriver::new();
    let mut engine = engine(&store, &driver);
    let (mut device, central) = mpsc_channel(64);

    let script = async {
        for angle in 0..30 {
            central
                .write(&format!("SERVO:{}:{}", angle % NUM_SERVOS, angle * 6))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let before_interval = store.put_count();

        tokio::time::sleep(Duration::from_millis(4500)).await;
        let after_interval = store.put_count();

        tokio::time::sleep(Duration::from_millis(6000)).await;
        let later = store.put_count();

        central.close().await.unwrap();
        (before_interval, after_interval, later)
    };

    let ((), (before_interval, after_interval, later)) = tokio::join!(
        engine.run(&mut device, std::future::pending::<()>()),
        script
    );

    assert_eq!(before_interval, 0);
    assert_eq!(after_interval, PUTS_PER_SAVE);
    assert_eq!(later, PUTS_PER_SAVE);
    assert_eq!(store.put_count(), PUTS_PER_SAVE);
    assert_eq!(store.get_i32(DEFAULT_NAMESPACE, "pose_0_servo_5"), Some(174));
}

#[tokio::test(start_paused = true)]
async fn test_close_flushes_pending_change() {
    let store = MemoryStore::new();
    let driver = RecordingServoDriver::new();
    let mut engine = engine(&store, &driver);
    let (mut device, central) = mpsc_channel(8);

    let script = async {
        central.write("SERVO:3:12").await.unwrap();
        central.close().await.unwrap();
    };

    let ((), ()) = tokio::join!(
        engine.run(&mut device, std::future::pending::<()>()),
        script
    );

    assert_eq!(store.put_count(), PUTS_PER_SAVE);
    assert_eq!(store.get_i32(DEFAULT_NAMESPACE, "pose_0_servo_3"), Some(12));
    assert!(!engine.scheduler().is_dirty());
    assert_eq!(store.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_signal_stops_loop_and_flushes() {
    let store = MemoryStore::new();
    let driver = RecordingServoDriver::new();
    let mut engine = engine(&store, &driver);
    let (mut device, central) = mpsc_channel(8);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown = async {
        let _ = stop_rx.await;
    };

    let script = async {
        central.write("POSE:5:1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = stop_tx.send(());
    };

    let ((), ()) = tokio::join!(engine.run(&mut device, shutdown), script);

    assert_eq!(store.get_i32(DEFAULT_NAMESPACE, "currentPose"), Some(5));
    assert_eq!(store.get_i32(DEFAULT_NAMESPACE, "pose_5_servo_0"), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_link_loss_restarts_advertising() {
    let store = MemoryStore::new();
    let driver = RecordingServoDriver::new();
    let mut engine = engine(&store, &driver);
    let (mut device, central) = mpsc_channel(8);

    let script = async {
        central.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let while_connected = central.advertisement_count();

        central.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let during_delay = central.advertisement_count();

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let after_delay = central.advertisement_count();

        central.close().await.unwrap();
        (while_connected, during_delay, after_delay)
    };

    let ((), (while_connected, during_delay, after_delay)) = tokio::join!(
        engine.run(&mut device, std::future::pending::<()>()),
        script
    );

    assert_eq!(while_connected, 1);
    assert_eq!(during_delay, 1);
    assert_eq!(after_delay, 2);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_commands_produce_no_side_effects() {
    let store = MemoryStore::new();
    let driver = RecordingServoDriver::new();
    let mut engine = engine(&store, &driver);
    let before = engine.configuration().clone();
    driver.clear();
    let (mut device, mut central) = mpsc_channel(16);

    let script = async {
        for line in ["POSE", "FOO:1:2", "POSE:8:90", "SERVO:-1:90", "SERVO:3", "get_config"] {
            central.write(line).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(6000)).await;
        central.close().await.unwrap();
    };

    let ((), ()) = tokio::join!(
        engine.run(&mut device, std::future::pending::<()>()),
        script
    );

    assert_eq!(engine.configuration(), &before);
    assert!(driver.writes().is_empty());
    assert_eq!(store.put_count(), 0);
    assert!(central.try_notification().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_readvertise_delay_is_not_held_up() {
    let store = MemoryStore::new();
    let driver = RecordingServoDriver::new();
    let mut engine = engine(&store, &driver);
    let (mut device, central) = mpsc_channel(8);
    let start = tokio::time::Instant::now();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown = async {
        let _ = stop_rx.await;
    };

    let script = async {
        central.connect().await.unwrap();
        central.write("SERVO:2:33").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        central.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = stop_tx.send(());
    };

    let ((), ()) = tokio::join!(engine.run(&mut device, shutdown), script);

    assert!(start.elapsed() < EngineSettings::default().readvertise_delay);
    assert_eq!(central.advertisement_count(), 1);
    assert_eq!(store.get_i32(DEFAULT_NAMESPACE, "pose_0_servo_2"), Some(33));
}

#[tokio::test(start_paused = true)]
async fn test_advertising_failure_does_not_stop_loop() {
    let store = MemoryStore::new();
    let driver = RecordingServoDriver::new();
    let mut engine = engine(&store, &driver);
    let (mut device, mut central) = mpsc_channel(8);
    central.fail_advertising(true);

    let script = async {
        central.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        central.write("GET_CONFIG").await.unwrap();
        let payload = central.next_notification().await;

        central.fail_advertising(false);
        central.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let advertised = central.advertisement_count();

        central.close().await.unwrap();
        (payload, advertised)
    };

    let ((), (payload, advertised)) = tokio::join!(
        engine.run(&mut device, std::future::pending::<()>()),
        script
    );

    assert!(payload.is_some());
    assert_eq!(advertised, 1);
}
