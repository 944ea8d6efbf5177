//! Mock peripheral link.
//!
//! Deterministic test double: scripted scan results, injectable connect
//! failures, and manual frame emission. Frame builders synthesize real
//! wire-format payloads so the full decode path is exercised.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::trace;

use contracts::{
    AxisTriple, ControlCommand, DeviceId, DiscoveredPeripheral, LinkEvent, LinkEventCallback,
    LinkTopology, NotifyChannel, PeripheralLink, RawFrame, TelemetryError,
};

#[derive(Clone)]
pub struct MockLink {
    inner: Arc<MockInner>,
}

struct MockInner {
    peripherals: Vec<DiscoveredPeripheral>,
    topology: Mutex<LinkTopology>,
    connected: AtomicBool,
    fail_connects: AtomicU32,
    callback: Mutex<Option<LinkEventCallback>>,
    subscriptions: Mutex<Vec<NotifyChannel>>,
    control_log: Mutex<Vec<&'static str>>,
}

impl MockLink {
    pub fn with_peripherals(peripherals: Vec<(&str, &str)>) -> Self {
        let peripherals = peripherals
            .into_iter()
            .map(|(id, name)| DiscoveredPeripheral {
                id: DeviceId::new(id),
                name: name.to_string(),
                rssi: Some(-60),
            })
            .collect();
        Self {
            inner: Arc::new(MockInner {
                peripherals,
                topology: Mutex::new(LinkTopology {
                    has_heart_rate: true,
                    has_measurement_data: true,
                }),
                connected: AtomicBool::new(false),
                fail_connects: AtomicU32::new(0),
                callback: Mutex::new(None),
                subscriptions: Mutex::new(Vec::new()),
                control_log: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Override the discovered topology.
    pub fn topology(self, has_heart_rate: bool, has_measurement_data: bool) -> Self {
        if let Ok(mut t) = self.inner.topology.lock() {
            *t = LinkTopology {
                has_heart_rate,
                has_measurement_data,
            };
        }
        self
    }

    /// The next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.inner.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Deliver one notification frame to the registered callback.
    pub fn emit(&self, frame: RawFrame) {
        if let Ok(guard) = self.inner.callback.lock() {
            if let Some(cb) = guard.as_ref() {
                cb(LinkEvent::Notification(frame));
            }
        }
    }

    /// Simulate a link drop.
    pub fn drop_link(&self, expected: bool) {
        self.inner.connected.store(false, Ordering::SeqCst);
        if let Ok(guard) = self.inner.callback.lock() {
            if let Some(cb) = guard.as_ref() {
                cb(LinkEvent::Disconnected { expected });
            }
        }
    }

    /// Control commands written so far, in order.
    pub fn control_log(&self) -> Vec<&'static str> {
        self.inner
            .control_log
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    pub fn clear_control_log(&self) {
        if let Ok(mut g) = self.inner.control_log.lock() {
            g.clear();
        }
    }

    pub fn subscriptions(&self) -> Vec<NotifyChannel> {
        self.inner
            .subscriptions
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    fn pmd_frame(tag: u8, frame_type: u8, body: Vec<u8>) -> RawFrame {
        let mut payload = vec![0u8; decoder::PMD_HEADER_LEN];
        payload[0] = tag;
        payload[9] = frame_type;
        payload.extend(body);
        RawFrame::new(NotifyChannel::MeasurementData, Bytes::from(payload))
    }

    /// Raw (uncompressed) gyroscope frame.
    pub fn gyro_frame(samples: &[AxisTriple]) -> RawFrame {
        Self::pmd_frame(0x05, 0x00, triple_bytes(samples))
    }

    /// Raw (uncompressed) accelerometer frame.
    pub fn acc_frame(samples: &[AxisTriple]) -> RawFrame {
        Self::pmd_frame(0x02, 0x00, triple_bytes(samples))
    }

    /// Delta-compressed accelerometer frame: full anchor plus i8 deltas.
    pub fn acc_delta_frame(anchor: AxisTriple, deltas: &[[i8; 3]]) -> RawFrame {
        let mut body = triple_bytes(&[anchor]);
        for d in deltas {
            body.extend(d.iter().map(|&v| v as u8));
        }
        Self::pmd_frame(0x02, decoder::FRAME_TYPE_DELTA, body)
    }

    /// Optical frame of 3-byte little-endian samples.
    pub fn ppg_frame(values: &[u32]) -> RawFrame {
        let mut body = Vec::with_capacity(values.len() * 3);
        for &v in values {
            let b = v.to_le_bytes();
            body.extend_from_slice(&b[..3]);
        }
        Self::pmd_frame(0x01, 0x00, body)
    }

    /// Standard heart-rate frame, optionally with one beat interval in
    /// 1/1024-second units.
    pub fn hr_frame(bpm: u8, rr_raw: Option<u16>) -> RawFrame {
        let mut payload = vec![0u8, bpm];
        if let Some(rr) = rr_raw {
            payload[0] |= 0x10;
            payload.extend_from_slice(&rr.to_le_bytes());
        }
        RawFrame::new(NotifyChannel::HeartRate, Bytes::from(payload))
    }
}

fn triple_bytes(samples: &[AxisTriple]) -> Vec<u8> {
    let mut body = Vec::with_capacity(samples.len() * 6);
    for s in samples {
        body.extend_from_slice(&s.x.to_le_bytes());
        body.extend_from_slice(&s.y.to_le_bytes());
        body.extend_from_slice(&s.z.to_le_bytes());
    }
    body
}

impl PeripheralLink for MockLink {
    async fn scan(&self, _timeout_ms: u64) -> Result<Vec<DiscoveredPeripheral>, TelemetryError> {
        Ok(self.inner.peripherals.clone())
    }

    async fn connect(&self, peripheral_id: &DeviceId) -> Result<(), TelemetryError> {
        let remaining = self.inner.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.inner.fail_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(TelemetryError::link_connection(
                peripheral_id.as_ref(),
                "injected connect failure",
            ));
        }
        self.inner.connected.store(true, Ordering::SeqCst);
        trace!(peripheral = %peripheral_id, "mock link connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TelemetryError> {
        self.inner.connected.store(false, Ordering::SeqCst);
        if let Ok(guard) = self.inner.callback.lock() {
            if let Some(cb) = guard.as_ref() {
                cb(LinkEvent::Disconnected { expected: true });
            }
        }
        Ok(())
    }

    async fn negotiate_mtu(&self, requested: u16) -> Result<u16, TelemetryError> {
        Ok(requested)
    }

    async fn request_high_priority(&self) -> Result<(), TelemetryError> {
        Ok(())
    }

    async fn discover_topology(&self) -> Result<LinkTopology, TelemetryError> {
        self.inner
            .topology
            .lock()
            .map(|t| *t)
            .map_err(|_| TelemetryError::Other("mock topology poisoned".to_string()))
    }

    async fn subscribe(&self, channel: NotifyChannel) -> Result<(), TelemetryError> {
        if !self.is_connected() {
            return Err(TelemetryError::NotConnected);
        }
        if let Ok(mut subs) = self.inner.subscriptions.lock() {
            subs.push(channel);
        }
        Ok(())
    }

    async fn write_control(&self, command: ControlCommand) -> Result<(), TelemetryError> {
        if !self.is_connected() {
            return Err(TelemetryError::NotConnected);
        }
        if let Ok(mut log) = self.inner.control_log.lock() {
            log.push(command.as_str());
        }
        Ok(())
    }

    fn listen(&self, callback: LinkEventCallback) {
        if let Ok(mut guard) = self.inner.callback.lock() {
            *guard = Some(callback);
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}
