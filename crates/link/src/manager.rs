//! Connection manager: owns the peripheral link and its state machine.
//!
//! Raw notifications arrive on the link callback, cross a bounded channel
//! into the event pump, get decoded, and fan out as sample events. Unexpected
//! disconnects start the backoff reconnect loop; manual disconnects never do.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::{bounded, Receiver, Sender};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use contracts::{
    epoch_ms, ControlCommand, DeviceConfig, DeviceId, DiscoveredPeripheral, LinkEvent, LinkState,
    NotifyChannel, PeripheralLink, ReconnectConfig, SampleEvent, SessionMode, StreamKind,
    TelemetryError,
};

use crate::{LinkCounters, LinkCountersSnapshot, ReconnectPolicy};

pub struct ConnectionManager<L: PeripheralLink + Send + Sync + 'static> {
    inner: Arc<Inner<L>>,
}

impl<L: PeripheralLink + Send + Sync + 'static> Clone for ConnectionManager<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<L> {
    link: L,
    device: DeviceConfig,
    reconnect: ReconnectConfig,
    state_tx: watch::Sender<LinkState>,
    target: Mutex<Option<DeviceId>>,
    started_streams: Mutex<Vec<StreamKind>>,
    manual_disconnect: AtomicBool,
    counters: LinkCounters,
    samples_tx: Sender<SampleEvent>,
    samples_rx: Receiver<SampleEvent>,
}

impl<L> Inner<L> {
    fn set_state(&self, state: LinkState) {
        self.state_tx.send_replace(state);
    }

    fn state(&self) -> LinkState {
        *self.state_tx.borrow()
    }
}

impl<L: PeripheralLink + Send + Sync + 'static> ConnectionManager<L> {
    /// Create the manager and start the event pump.
    pub fn new(
        link: L,
        device: DeviceConfig,
        reconnect: ReconnectConfig,
        channel_capacity: usize,
    ) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Disconnected);
        let (samples_tx, samples_rx) = bounded(channel_capacity);
        let inner = Arc::new(Inner {
            link,
            device,
            reconnect,
            state_tx,
            target: Mutex::new(None),
            started_streams: Mutex::new(Vec::new()),
            manual_disconnect: AtomicBool::new(false),
            counters: LinkCounters::new(),
            samples_tx,
            samples_rx,
        });

        // Bridge the link callback into an ordered event stream the pump
        // consumes; the callback itself must never block.
        let (events_tx, events_rx) = bounded::<LinkEvent>(channel_capacity);
        let cb_inner = inner.clone();
        inner.link.listen(Arc::new(move |event| {
            if events_tx.try_send(event).is_err() {
                cb_inner.counters.record_sample_dropped();
                warn!("link event channel full, notification dropped");
            }
        }));

        let pump_inner = inner.clone();
        tokio::spawn(async move {
            run_events(pump_inner, events_rx).await;
        });

        Self { inner }
    }

    /// Scan for peripherals matching the configured name filter, with
    /// duplicate ids suppressed.
    #[instrument(skip(self))]
    pub async fn scan(&self) -> Result<Vec<DiscoveredPeripheral>, TelemetryError> {
        self.inner.set_state(LinkState::Scanning);
        let result = self.inner.link.scan(self.inner.device.scan_timeout_ms).await;
        self.inner.set_state(if self.inner.link.is_connected() {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        });

        let discovered = result?;
        let filter = self.inner.device.name_filter.as_str();
        let mut seen = HashSet::new();
        let matches: Vec<DiscoveredPeripheral> = discovered
            .into_iter()
            .filter(|p| p.name.contains(filter))
            .filter(|p| seen.insert(p.id.clone()))
            .collect();
        info!(count = matches.len(), filter, "scan finished");
        Ok(matches)
    }

    /// Connect and bring up the streams for the configured mode.
    #[instrument(skip(self), fields(peripheral = %peripheral_id))]
    pub async fn connect(&self, peripheral_id: &DeviceId) -> Result<(), TelemetryError> {
        self.inner.manual_disconnect.store(false, Ordering::SeqCst);
        self.inner.set_state(LinkState::Connecting);

        match establish(&self.inner, peripheral_id).await {
            Ok(()) => {
                *self.inner.target.lock().await = Some(peripheral_id.clone());
                self.inner.set_state(LinkState::Connected);
                info!("peripheral connected");
                Ok(())
            }
            Err(e) => {
                self.inner.set_state(LinkState::Disconnected);
                Err(e)
            }
        }
    }

    /// Manual disconnect: stop every started stream (fixed order, settling
    /// delay between commands), disable the measurement mode, then tear the
    /// link down. Each stop is independent and best-effort.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<(), TelemetryError> {
        self.inner.manual_disconnect.store(true, Ordering::SeqCst);

        let started = std::mem::take(&mut *self.inner.started_streams.lock().await);
        let settle = Duration::from_millis(self.inner.device.stop_settle_ms);
        for kind in [StreamKind::Ppg, StreamKind::Acc, StreamKind::Gyro, StreamKind::Ppi] {
            if !started.contains(&kind) {
                continue;
            }
            let command = ControlCommand::StopStream(kind);
            if let Err(e) = self.inner.link.write_control(command).await {
                warn!(command = command.as_str(), error = %e, "stop command failed, continuing");
            }
            // Firmware needs settling time; it never acknowledges.
            tokio::time::sleep(settle).await;
        }
        if !started.is_empty() {
            if let Err(e) = self.inner.link.write_control(ControlCommand::DisableMode).await {
                warn!(error = %e, "mode disable failed, continuing");
            }
        }

        let result = self.inner.link.disconnect().await;
        self.inner.set_state(LinkState::Disconnected);
        info!("peripheral disconnected");
        result
    }

    pub fn state(&self) -> LinkState {
        self.inner.state()
    }

    /// Watch handle for state transitions.
    pub fn state_watch(&self) -> watch::Receiver<LinkState> {
        self.inner.state_tx.subscribe()
    }

    pub fn counters(&self) -> LinkCountersSnapshot {
        self.inner.counters.snapshot()
    }

    /// Decoded sample stream. The channel is multi-consumer; each event goes
    /// to exactly one receiver, so clone before fan-out only if that is what
    /// you want.
    pub fn samples(&self) -> Receiver<SampleEvent> {
        self.inner.samples_rx.clone()
    }
}

/// Connect sequence shared by first connect and every reconnect attempt.
async fn establish<L: PeripheralLink + Send + Sync>(
    inner: &Inner<L>,
    peripheral_id: &DeviceId,
) -> Result<(), TelemetryError> {
    inner.link.connect(peripheral_id).await?;

    match inner.link.negotiate_mtu(inner.device.mtu).await {
        Ok(granted) => debug!(requested = inner.device.mtu, granted, "mtu negotiated"),
        Err(e) => warn!(error = %e, "mtu negotiation failed, continuing"),
    }
    if let Err(e) = inner.link.request_high_priority().await {
        warn!(error = %e, "high-priority request failed, continuing");
    }

    let topology = inner.link.discover_topology().await?;
    let mut started = Vec::new();

    match inner.device.mode {
        SessionMode::Standard => {
            if !topology.has_heart_rate {
                return Err(TelemetryError::link_connection(
                    peripheral_id.as_ref(),
                    "peripheral lacks the heart-rate characteristic",
                ));
            }
            inner.link.subscribe(NotifyChannel::HeartRate).await?;
            if inner.device.ppi_enabled {
                if !topology.has_measurement_data {
                    return Err(TelemetryError::link_connection(
                        peripheral_id.as_ref(),
                        "peripheral lacks the measurement-data characteristic",
                    ));
                }
                inner.link.subscribe(NotifyChannel::MeasurementData).await?;
                inner
                    .link
                    .write_control(ControlCommand::StartStream(StreamKind::Ppi))
                    .await?;
                started.push(StreamKind::Ppi);
            }
        }
        SessionMode::Raw => {
            if !topology.has_measurement_data {
                return Err(TelemetryError::link_connection(
                    peripheral_id.as_ref(),
                    "peripheral lacks the measurement-data characteristic",
                ));
            }
            inner.link.subscribe(NotifyChannel::MeasurementData).await?;
            for kind in [StreamKind::Ppg, StreamKind::Acc, StreamKind::Gyro] {
                inner
                    .link
                    .write_control(ControlCommand::StartStream(kind))
                    .await?;
                started.push(kind);
            }
            if inner.device.ppi_enabled {
                inner
                    .link
                    .write_control(ControlCommand::StartStream(StreamKind::Ppi))
                    .await?;
                started.push(StreamKind::Ppi);
            }
        }
    }

    *inner.started_streams.lock().await = started;
    Ok(())
}

/// Event pump: decodes notifications and routes disconnects.
async fn run_events<L: PeripheralLink + Send + Sync + 'static>(
    inner: Arc<Inner<L>>,
    events: Receiver<LinkEvent>,
) {
    while let Ok(event) = events.recv().await {
        match event {
            LinkEvent::Notification(frame) => {
                inner.counters.record_packet();
                for sample in decoder::decode(&frame, epoch_ms()) {
                    if inner.samples_tx.send(sample).await.is_err() {
                        return;
                    }
                }
            }
            LinkEvent::Disconnected { expected } => {
                if expected || inner.manual_disconnect.load(Ordering::SeqCst) {
                    inner.set_state(LinkState::Disconnected);
                    continue;
                }
                inner.counters.record_disconnection();
                inner.set_state(LinkState::Reconnecting);
                let reconnect_inner = inner.clone();
                tokio::spawn(async move {
                    run_reconnect(reconnect_inner).await;
                });
            }
        }
    }
}

/// Backoff reconnect loop. Abandoned only by the manual-disconnect flag.
async fn run_reconnect<L: PeripheralLink + Send + Sync>(inner: Arc<Inner<L>>) {
    let target = inner.target.lock().await.clone();
    let Some(peripheral_id) = target else {
        inner.set_state(LinkState::Disconnected);
        return;
    };

    let mut policy = ReconnectPolicy::new(inner.reconnect.clone());
    loop {
        let delay = policy.next_delay();
        info!(
            attempt = policy.attempt(),
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        tokio::time::sleep(delay).await;

        if inner.manual_disconnect.load(Ordering::SeqCst) {
            inner.set_state(LinkState::Disconnected);
            return;
        }

        inner.counters.record_reconnect_attempt();
        match establish(&inner, &peripheral_id).await {
            Ok(()) => {
                inner.counters.record_reconnect_success();
                inner.set_state(LinkState::Connected);
                info!(attempt = policy.attempt(), "reconnected");
                return;
            }
            Err(e) => {
                inner.counters.record_reconnect_failure();
                warn!(attempt = policy.attempt(), error = %e, "reconnect attempt failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockLink;
    use contracts::AxisTriple;

    fn device_config(mode: SessionMode) -> DeviceConfig {
        DeviceConfig {
            name_filter: "Sense".to_string(),
            mode,
            ppi_enabled: false,
            scan_timeout_ms: 10,
            mtu: 232,
            stop_settle_ms: 1,
        }
    }

    fn fast_reconnect() -> ReconnectConfig {
        ReconnectConfig {
            base_delay_ms: 5,
            multiplier: 1.5,
            max_delay_ms: 50,
        }
    }

    fn manager(link: MockLink, mode: SessionMode) -> ConnectionManager<MockLink> {
        ConnectionManager::new(link, device_config(mode), fast_reconnect(), 64)
    }

    #[tokio::test]
    async fn test_scan_filters_and_dedupes() {
        let link = MockLink::with_peripherals(vec![
            ("dev-1", "Sense A"),
            ("dev-2", "OtherBand"),
            ("dev-1", "Sense A"),
            ("dev-3", "Sense B"),
        ]);
        let mgr = manager(link, SessionMode::Raw);

        let found = mgr.scan().await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id.as_ref(), "dev-1");
        assert_eq!(found[1].id.as_ref(), "dev-3");
        assert_eq!(mgr.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_raw_mode_starts_streams() {
        let link = MockLink::with_peripherals(vec![("dev-1", "Sense A")]);
        let mgr = manager(link.clone(), SessionMode::Raw);

        mgr.connect(&DeviceId::new("dev-1")).await.unwrap();
        assert_eq!(mgr.state(), LinkState::Connected);
        assert_eq!(
            link.control_log(),
            vec!["start_ppg", "start_acc", "start_gyro"]
        );
    }

    #[tokio::test]
    async fn test_notifications_decode_and_fan_out() {
        let link = MockLink::with_peripherals(vec![("dev-1", "Sense A")]);
        let mgr = manager(link.clone(), SessionMode::Raw);
        mgr.connect(&DeviceId::new("dev-1")).await.unwrap();

        let samples = mgr.samples();
        link.emit(MockLink::gyro_frame(&[
            AxisTriple::new(1, 2, 3),
            AxisTriple::new(4, 5, 6),
        ]));

        let first = samples.recv().await.unwrap();
        let second = samples.recv().await.unwrap();
        assert!(matches!(
            first.sample,
            contracts::DecodedSample::Gyro { raw } if raw == AxisTriple::new(1, 2, 3)
        ));
        assert!(matches!(
            second.sample,
            contracts::DecodedSample::Gyro { raw } if raw == AxisTriple::new(4, 5, 6)
        ));
        assert_eq!(mgr.counters().packets_total, 1);
    }

    #[tokio::test]
    async fn test_unexpected_drop_triggers_reconnect() {
        let link = MockLink::with_peripherals(vec![("dev-1", "Sense A")]);
        let mgr = manager(link.clone(), SessionMode::Raw);
        mgr.connect(&DeviceId::new("dev-1")).await.unwrap();

        let mut state = mgr.state_watch();
        link.fail_next_connects(2);
        link.drop_link(false);

        // The drop is delivered asynchronously, so the watch still holds the
        // stale Connected from the initial connect. Step through Reconnecting
        // first; only then does Connected mean the loop recovered.
        while *state.borrow_and_update() != LinkState::Reconnecting {
            state.changed().await.unwrap();
        }
        while *state.borrow_and_update() != LinkState::Connected {
            state.changed().await.unwrap();
        }

        let counters = mgr.counters();
        assert_eq!(counters.disconnections, 1);
        assert_eq!(counters.reconnect_failures, 2);
        assert_eq!(counters.reconnect_successes, 1);
        assert!(counters.reconnect_attempts >= 3);
    }

    #[tokio::test]
    async fn test_manual_disconnect_stops_streams_in_order() {
        let link = MockLink::with_peripherals(vec![("dev-1", "Sense A")]);
        let mgr = manager(link.clone(), SessionMode::Raw);
        mgr.connect(&DeviceId::new("dev-1")).await.unwrap();

        link.clear_control_log();
        mgr.disconnect().await.unwrap();
        assert_eq!(
            link.control_log(),
            vec!["stop_ppg", "stop_acc", "stop_gyro", "disable_mode"]
        );
        assert_eq!(mgr.state(), LinkState::Disconnected);

        // A manual drop never schedules reconnects.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(mgr.counters().reconnect_attempts, 0);
    }

    #[tokio::test]
    async fn test_standard_mode_requires_heart_rate() {
        let link = MockLink::with_peripherals(vec![("dev-1", "Sense A")])
            .topology(false, true);
        let mgr = manager(link, SessionMode::Standard);
        let err = mgr.connect(&DeviceId::new("dev-1")).await.unwrap_err();
        assert!(matches!(err, TelemetryError::LinkConnection { .. }));
        assert_eq!(mgr.state(), LinkState::Disconnected);
    }
}
