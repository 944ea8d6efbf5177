//! Pipeline orchestrator.
//!
//! Wires a recorded frame stream through the connection manager, fans the
//! decoded samples out to the detection engine and the durable-buffer
//! writer, pushes a status line every second, and runs the sync stage once
//! the stream ends.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{epoch_ms, DeviceId, LinkState, PipelineConfig, RowStore, SyncProgressCallback};
use decoder::HeartRateArbiter;
use detection::DetectionEngine;
use link::{ConnectionManager, ReplayLink};
use observability::{
    record_buffer_depth, record_detection_window, record_heart_rate, record_link_state,
    SessionMetricsAggregator,
};
use storage::{spawn_writer, SqliteRowStore};
use sync_engine::{MockRemoteStore, SessionInfo, SyncEngine};
use tokio::sync::watch;
use tracing::{info, warn};

use super::SessionStats;
use crate::error::CliError;

/// Pipeline options assembled from configuration and CLI arguments
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Loaded pipeline configuration
    pub config: PipelineConfig,

    /// Recording that drives the session
    pub replay_path: Option<PathBuf>,

    /// Pacing between replayed frames
    pub replay_gap: Duration,

    /// Session timeout (None = run until the stream ends)
    pub timeout: Option<Duration>,

    /// Skip the sync stage
    pub skip_sync: bool,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self { options }
    }

    /// Run one session to completion
    pub async fn run(self) -> Result<SessionStats, CliError> {
        let start = Instant::now();
        let config = &self.options.config;

        let replay_path = self.options.replay_path.as_ref().ok_or_else(|| {
            CliError::pipeline_execution(
                "no transport configured; provide --replay <recording.jsonl>",
            )
        })?;

        let store = open_store(&config.storage.db_path)?;

        let replay = ReplayLink::from_path(replay_path)?;
        let frames_replayed = replay.frame_count() as u64;
        info!(
            frames = frames_replayed,
            path = %replay_path.display(),
            "recording loaded"
        );

        let manager = ConnectionManager::new(
            replay.clone(),
            config.device.clone(),
            config.reconnect.clone(),
            config.buffer.channel_capacity,
        );

        // The replay link exposes a single fixed peripheral; connect to it
        // directly instead of scanning against the device name filter.
        manager.connect(&DeviceId::new("replay")).await?;
        record_link_state(state_label(LinkState::Connected));

        // Fan the decoded sample stream out to detection and storage. Each
        // consumer gets its own bounded channel; closing them is what lets
        // the downstream tasks finish.
        let samples = manager.samples();
        let (det_tx, det_rx) = async_channel::bounded(config.buffer.channel_capacity);
        let (sto_tx, sto_rx) = async_channel::bounded(config.buffer.channel_capacity);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let fanout = tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = samples.recv() => match received {
                        Ok(event) => {
                            if det_tx.send(event.clone()).await.is_err() {
                                break;
                            }
                            if sto_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    },
                    _ = stop_rx.changed() => break,
                }
            }
        });

        let writer = spawn_writer(sto_rx, store.clone(), config.buffer.clone());
        writer.start_recording();

        // Detection task: feed samples, analyze on the configured cadence,
        // publish snapshots for the status loop.
        let mut engine = DetectionEngine::new(&config.detection);
        let mut arbiter = HeartRateArbiter::new(config.device.ppi_enabled);
        let (snapshot_tx, snapshot_rx) = watch::channel((engine.snapshot(), None::<u16>));
        let analysis_interval = Duration::from_millis(config.detection.analysis_interval_ms);
        let detection = tokio::spawn(async move {
            let mut timer = tokio::time::interval(analysis_interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    received = det_rx.recv() => match received {
                        Ok(event) => {
                            arbiter.observe(&event.sample);
                            engine.observe(&event);
                        }
                        Err(_) => break,
                    },
                    _ = timer.tick() => {
                        engine.analyze(epoch_ms());
                        let snapshot = engine.snapshot();
                        record_detection_window(snapshot.cadence_hz, snapshot.is_walking);
                        let _ = snapshot_tx.send((snapshot, arbiter.displayed()));
                    }
                }
            }
            engine.analyze(epoch_ms());
            let _ = snapshot_tx.send((engine.snapshot(), arbiter.displayed()));
        });

        let play = replay.play(self.options.replay_gap);

        // Status loop, once per second until the stream ends or the timeout
        // fires.
        let mut aggregator = SessionMetricsAggregator::new();
        let mut state_watch = manager.state_watch();
        let mut status_timer = tokio::time::interval(Duration::from_secs(1));
        status_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let deadline = self.options.timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            tokio::select! {
                _ = status_timer.tick() => {
                    let (snapshot, heart_rate) = *snapshot_rx.borrow();
                    let counters = manager.counters();
                    let writer_stats = writer.stats();
                    if let Some(bpm) = heart_rate {
                        record_heart_rate(bpm);
                    }
                    record_buffer_depth(writer_stats.buffered);
                    aggregator.update(
                        snapshot.is_confirmed_walking,
                        snapshot.cadence_hz,
                        heart_rate,
                        snapshot.step_count,
                    );
                    aggregator.update_totals(
                        writer_stats.rows_flushed,
                        writer_stats.flush_failures,
                        counters.packets_total,
                        counters.disconnections,
                    );
                    info!(
                        elapsed_s = start.elapsed().as_secs(),
                        device = %config.device.name_filter,
                        heart_rate = ?heart_rate,
                        steps = snapshot.step_count,
                        walking = snapshot.is_confirmed_walking,
                        buffered = writer_stats.buffered,
                        "session status"
                    );
                }
                changed = state_watch.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *state_watch.borrow();
                    record_link_state(state_label(state));
                    if state == LinkState::Disconnected {
                        info!("stream ended");
                        break;
                    }
                }
                _ = sleep_until_deadline(deadline) => {
                    warn!("session timeout reached, stopping");
                    break;
                }
            }
        }

        // Tear down in dependency order: link, fan-out, detection, writer.
        if manager.state() != LinkState::Disconnected {
            if let Err(e) = manager.disconnect().await {
                warn!(error = %e, "disconnect failed");
            }
        }
        let _ = play.await;
        let _ = stop_tx.send(true);
        let _ = fanout.await;
        let _ = detection.await;

        writer.stop_recording();
        let recording_flag = writer.recording_flag();
        let writer_stats = writer.join().await;

        let counters = manager.counters();
        let (detection_snapshot, heart_rate) = *snapshot_rx.borrow();
        aggregator.update_totals(
            writer_stats.rows_flushed,
            writer_stats.flush_failures,
            counters.packets_total,
            counters.disconnections,
        );

        // Sync stage. No remote backend is wired up yet, so the upload goes
        // to an in-memory remote; the paging, marking and rollback paths are
        // the same ones a real backend would exercise.
        let mut session_id = None;
        let mut rows_synced = None;
        if self.options.skip_sync {
            info!("sync stage skipped");
        } else {
            info!("starting sync against in-memory remote");
            let sync = SyncEngine::new(&config.sync, recording_flag);
            let remote = MockRemoteStore::new();
            let session = SessionInfo {
                device_name: config.device.name_filter.clone(),
                mode: config.device.mode,
                ppi_enabled: config.device.ppi_enabled,
            };
            let progress: SyncProgressCallback =
                Arc::new(|p| info!(progress = ?p, "sync progress"));
            match sync
                .sync(store.as_ref(), &remote, &session, Some(progress))
                .await
            {
                Ok(report) => {
                    session_id = report.session_id;
                    rows_synced = Some(report.rows_synced);
                }
                Err(e) => warn!(error = %e, "sync failed"),
            }
        }

        Ok(SessionStats {
            duration: start.elapsed(),
            frames_replayed,
            link: counters,
            writer: writer_stats,
            detection: detection_snapshot,
            heart_rate,
            session_id,
            rows_synced,
            metrics: aggregator,
        })
    }
}

async fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn open_store(db_path: &str) -> Result<Arc<dyn RowStore>, CliError> {
    let store = if db_path == ":memory:" {
        SqliteRowStore::open_in_memory()?
    } else {
        SqliteRowStore::open(db_path)?
    };
    Ok(Arc::new(store))
}

fn state_label(state: LinkState) -> &'static str {
    match state {
        LinkState::Disconnected => "disconnected",
        LinkState::Scanning => "scanning",
        LinkState::Connecting => "connecting",
        LinkState::Connected => "connected",
        LinkState::Reconnecting => "reconnecting",
    }
}
