//! # Integration Tests
//!
//! Cross-crate end-to-end tests.
//!
//! Covers:
//! - Mock link through decode, buffering and the local store
//! - Detection over decoded motion samples
//! - Reconnect behavior under an unexpected drop
//! - Sync atomicity against an injected mid-attempt failure

#[cfg(test)]
mod helpers {
    use contracts::{DeviceConfig, ReconnectConfig, SessionMode};

    pub fn device(mode: SessionMode) -> DeviceConfig {
        DeviceConfig {
            name_filter: "Sense".to_string(),
            mode,
            ppi_enabled: false,
            scan_timeout_ms: 10,
            mtu: 232,
            stop_settle_ms: 1,
        }
    }

    pub fn fast_reconnect() -> ReconnectConfig {
        ReconnectConfig {
            base_delay_ms: 5,
            multiplier: 1.5,
            max_delay_ms: 50,
        }
    }
}

#[cfg(test)]
mod pipeline_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{
        AxisTriple, BufferConfig, DecodedSample, DeviceId, RowStore, SessionMode, SyncConfig,
    };
    use link::{ConnectionManager, MockLink};
    use storage::{spawn_writer, MemoryRowStore};
    use sync_engine::{MockRemoteStore, SessionInfo, SyncEngine};

    use crate::helpers::{device, fast_reconnect};

    fn session_info() -> SessionInfo {
        SessionInfo {
            device_name: "Sense A".to_string(),
            mode: SessionMode::Raw,
            ppi_enabled: false,
        }
    }

    /// Mock link -> decode -> merge buffer -> store -> sync.
    #[tokio::test]
    async fn test_mock_link_through_store_and_sync() {
        let link = MockLink::with_peripherals(vec![("id-1", "Sense A")]).topology(true, true);
        let manager = ConnectionManager::new(
            link.clone(),
            device(SessionMode::Raw),
            fast_reconnect(),
            512,
        );
        manager.connect(&DeviceId::new("id-1")).await.unwrap();

        let store = Arc::new(MemoryRowStore::new());
        let writer = spawn_writer(
            manager.samples(),
            store.clone(),
            BufferConfig {
                flush_interval_ms: 200,
                ..BufferConfig::default()
            },
        );
        writer.start_recording();

        // Near-simultaneous motion channels merge into one row; the optical
        // sample lands outside the merge window.
        link.emit(MockLink::acc_frame(&[AxisTriple::new(10, 20, 30)]));
        link.emit(MockLink::gyro_frame(&[AxisTriple::new(1, 2, 3)]));
        tokio::time::sleep(Duration::from_millis(100)).await;
        link.emit(MockLink::ppg_frame(&[500_000]));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(store.row_count(), 2);
        let rows = store.fetch_unsynced(10).unwrap();
        assert_eq!(rows[0].reading.acc, Some(AxisTriple::new(10, 20, 30)));
        assert_eq!(rows[0].reading.gyro, Some(AxisTriple::new(1, 2, 3)));
        assert_eq!(rows[1].reading.ppg, Some(500_000));

        // Sync the recorded rows; recording must stop first.
        writer.stop_recording();
        let engine = SyncEngine::new(&SyncConfig { batch_size: 1 }, writer.recording_flag());
        let remote = MockRemoteStore::new();
        let report = engine
            .sync(store.as_ref(), &remote, &session_info(), None)
            .await
            .unwrap();

        assert_eq!(report.rows_synced, 2);
        assert_eq!(store.unsynced_count().unwrap(), 0);
        assert_eq!(remote.total_rows(), 2);
    }

    /// Delta-compressed frames reconstruct absolute samples end to end.
    #[tokio::test]
    async fn test_delta_frames_decode_through_pipeline() {
        let link = MockLink::with_peripherals(vec![("id-1", "Sense A")]).topology(true, true);
        let manager = ConnectionManager::new(
            link.clone(),
            device(SessionMode::Raw),
            fast_reconnect(),
            64,
        );
        manager.connect(&DeviceId::new("id-1")).await.unwrap();
        let samples = manager.samples();

        link.emit(MockLink::acc_delta_frame(
            AxisTriple::new(100, 200, 300),
            &[[1, -1, 0], [2, 2, 2]],
        ));

        let mut decoded = Vec::new();
        for _ in 0..3 {
            let event = tokio::time::timeout(Duration::from_millis(500), samples.recv())
                .await
                .expect("sample not delivered")
                .unwrap();
            decoded.push(event.sample);
        }

        assert_eq!(
            decoded,
            vec![
                DecodedSample::Accel {
                    raw: AxisTriple::new(100, 200, 300)
                },
                DecodedSample::Accel {
                    raw: AxisTriple::new(101, 199, 300)
                },
                DecodedSample::Accel {
                    raw: AxisTriple::new(103, 201, 302)
                },
            ]
        );
    }

    /// Standard-mode heart-rate frames produce rate and interval samples.
    #[tokio::test]
    async fn test_heart_rate_channel_decodes() {
        let link = MockLink::with_peripherals(vec![("id-1", "Sense A")]).topology(true, false);
        let manager = ConnectionManager::new(
            link.clone(),
            device(SessionMode::Standard),
            fast_reconnect(),
            64,
        );
        manager.connect(&DeviceId::new("id-1")).await.unwrap();
        let samples = manager.samples();

        link.emit(MockLink::hr_frame(72, Some(820)));

        let first = tokio::time::timeout(Duration::from_millis(500), samples.recv())
            .await
            .expect("sample not delivered")
            .unwrap();
        let second = tokio::time::timeout(Duration::from_millis(500), samples.recv())
            .await
            .expect("sample not delivered")
            .unwrap();

        assert_eq!(first.sample, DecodedSample::HeartRate { bpm: 72 });
        // 820 raw 1/1024ths of a second rounds to 801 ms.
        assert_eq!(second.sample, DecodedSample::RrInterval { ms: 801 });

        let mut arbiter = decoder::HeartRateArbiter::new(false);
        arbiter.observe(&first.sample);
        arbiter.observe(&second.sample);
        assert_eq!(arbiter.displayed(), Some(72));
    }

    /// A mid-attempt upload failure leaves no partial state behind, and a
    /// retry after the fault clears succeeds.
    #[tokio::test]
    async fn test_sync_failure_then_retry() {
        let store = MemoryRowStore::new();
        let rows: Vec<contracts::BufferedReading> =
            (0..6).map(|i| contracts::BufferedReading::at(1_000 + i)).collect();
        store.insert_batch(&rows).unwrap();

        let recording = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let engine = SyncEngine::new(&SyncConfig { batch_size: 2 }, recording);
        let remote = MockRemoteStore::new();
        remote.fail_upload_at(2);

        let err = engine
            .sync(&store, &remote, &session_info(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, contracts::TelemetryError::SyncRolledBack { .. }));
        assert_eq!(store.unsynced_count().unwrap(), 6);
        assert_eq!(store.synced_count(), 0);
        assert_eq!(remote.session_count(), 0);
        assert_eq!(remote.total_rows(), 0);

        let report = engine
            .sync(&store, &remote, &session_info(), None)
            .await
            .unwrap();
        assert_eq!(report.rows_synced, 6);
        assert_eq!(remote.total_rows(), 6);
    }

    /// Events arriving while recording is off are not persisted.
    #[tokio::test]
    async fn test_recording_gate() {
        let link = MockLink::with_peripherals(vec![("id-1", "Sense A")]).topology(true, true);
        let manager = ConnectionManager::new(
            link.clone(),
            device(SessionMode::Raw),
            fast_reconnect(),
            64,
        );
        manager.connect(&DeviceId::new("id-1")).await.unwrap();

        let store = Arc::new(MemoryRowStore::new());
        let writer = spawn_writer(
            manager.samples(),
            store.clone(),
            BufferConfig {
                flush_interval_ms: 10,
                ..BufferConfig::default()
            },
        );

        link.emit(MockLink::gyro_frame(&[AxisTriple::new(1, 2, 3)]));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.row_count(), 0);

        writer.start_recording();
        link.emit(MockLink::gyro_frame(&[AxisTriple::new(4, 5, 6)]));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.row_count(), 1);
    }
}

#[cfg(test)]
mod reconnect_tests {
    use std::time::Duration;

    use contracts::{DeviceId, LinkState, SessionMode};
    use link::{ConnectionManager, MockLink};

    use crate::helpers::{device, fast_reconnect};

    /// Unexpected drop triggers backoff reconnect until the link recovers.
    #[tokio::test]
    async fn test_unexpected_drop_reconnects() {
        let link = MockLink::with_peripherals(vec![("id-1", "Sense A")]).topology(true, true);
        let manager = ConnectionManager::new(
            link.clone(),
            device(SessionMode::Raw),
            fast_reconnect(),
            64,
        );
        manager.connect(&DeviceId::new("id-1")).await.unwrap();
        assert_eq!(manager.state(), LinkState::Connected);

        link.fail_next_connects(2);
        link.drop_link(false);

        let mut watch = manager.state_watch();
        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        loop {
            tokio::select! {
                changed = watch.changed() => {
                    changed.unwrap();
                    if *watch.borrow() == LinkState::Connected {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    panic!("link did not recover in time");
                }
            }
        }

        let counters = manager.counters();
        assert_eq!(counters.disconnections, 1);
        assert_eq!(counters.reconnect_successes, 1);
        assert!(counters.reconnect_attempts >= 3);
        assert_eq!(counters.reconnect_failures, 2);
    }
}

#[cfg(test)]
mod detection_tests {
    use std::time::Duration;

    use contracts::{DetectionConfig, DeviceId, SessionMode};
    use detection::DetectionEngine;
    use link::{ConnectionManager, MockLink};

    use crate::helpers::{device, fast_reconnect};

    /// Synthetic cadence through the full decode path confirms walking and
    /// accumulates steps.
    #[tokio::test]
    async fn test_walking_detected_from_decoded_stream() {
        let link = MockLink::with_peripherals(vec![("id-1", "Sense A")]).topology(true, true);
        let manager = ConnectionManager::new(
            link.clone(),
            device(SessionMode::Raw),
            fast_reconnect(),
            512,
        );
        manager.connect(&DeviceId::new("id-1")).await.unwrap();
        let samples = manager.samples();

        let config = DetectionConfig::default();
        let mut engine = DetectionEngine::new(&config);

        // 300 gyroscope samples of a 2 Hz swing at 52 Hz, x-axis dominant.
        let total = 300usize;
        let mut emitted = 0usize;
        while emitted < total {
            let batch: Vec<contracts::AxisTriple> = (emitted..(emitted + 10).min(total))
                .map(|i| {
                    let t = i as f32 / config.sample_rate_hz;
                    let x = (1_000.0
                        * (2.0 * std::f32::consts::PI * 2.0 * t).sin())
                        as i16;
                    contracts::AxisTriple::new(x, 3, -2)
                })
                .collect();
            emitted += batch.len();
            link.emit(MockLink::gyro_frame(&batch));
        }

        for _ in 0..total {
            let event = tokio::time::timeout(Duration::from_millis(500), samples.recv())
                .await
                .expect("sample not delivered")
                .unwrap();
            engine.observe(&event);
        }

        let interval = config.analysis_interval_ms as i64;
        let mut now = 1_000_000;
        for _ in 0..4 {
            engine.analyze(now);
            now += interval;
        }

        let snapshot = engine.snapshot();
        assert!(snapshot.is_confirmed_walking);
        assert!((snapshot.cadence_hz - 2.0).abs() < 0.3);
        assert!(snapshot.step_count > 0);
    }
}

#[cfg(test)]
mod config_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use detection::DetectionEngine;

    /// A parsed configuration drives engine construction directly.
    #[test]
    fn test_config_builds_engine() {
        let cfg = ConfigLoader::load_from_str(
            r#"
[device]
name_filter = "Sense"

[detection]
sample_rate_hz = 52.0
window_seconds = 4.0
analysis_interval_ms = 2000
strategy = "spectral_peak"
frames_to_confirm = 3
min_cadence_hz = 0.8
max_cadence_hz = 3.5
band_low_hz = 0.5
band_high_hz = 4.0
"#,
            ConfigFormat::Toml,
        )
        .unwrap();

        let engine = DetectionEngine::new(&cfg.detection);
        let snapshot = engine.snapshot();
        assert!(!snapshot.is_walking);
        assert_eq!(snapshot.step_count, 0);
    }
}
