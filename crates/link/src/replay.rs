//! Replay link: feeds recorded notification frames back through the
//! pipeline.
//!
//! Recordings are JSON-lines files, one frame per line. Useful for decoding
//! regressions against captured device traffic without hardware.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use contracts::{
    ControlCommand, DeviceId, DiscoveredPeripheral, LinkEvent, LinkEventCallback, LinkTopology,
    NotifyChannel, PeripheralLink, RawFrame, TelemetryError,
};

/// One recorded notification frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub channel: NotifyChannel,
    pub payload: Vec<u8>,
}

impl From<&RawFrame> for ReplayRecord {
    fn from(frame: &RawFrame) -> Self {
        Self {
            channel: frame.channel,
            payload: frame.payload.to_vec(),
        }
    }
}

impl From<ReplayRecord> for RawFrame {
    fn from(record: ReplayRecord) -> Self {
        RawFrame::new(record.channel, Bytes::from(record.payload))
    }
}

/// Append frames to a JSON-lines recording.
pub fn write_recording<W: Write>(writer: &mut W, frames: &[RawFrame]) -> Result<(), TelemetryError> {
    for frame in frames {
        let line = serde_json::to_string(&ReplayRecord::from(frame))
            .map_err(|e| TelemetryError::Other(format!("recording serialize failed: {e}")))?;
        writeln!(writer, "{line}")?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct ReplayLink {
    inner: Arc<ReplayInner>,
}

struct ReplayInner {
    frames: Vec<RawFrame>,
    connected: AtomicBool,
    callback: Mutex<Option<LinkEventCallback>>,
}

impl ReplayLink {
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, TelemetryError> {
        let mut frames = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ReplayRecord = serde_json::from_str(&line).map_err(|e| {
                TelemetryError::decode("replay", format!("line {}: {e}", idx + 1))
            })?;
            frames.push(record.into());
        }
        debug!(frames = frames.len(), "replay recording loaded");
        Ok(Self {
            inner: Arc::new(ReplayInner {
                frames,
                connected: AtomicBool::new(false),
                callback: Mutex::new(None),
            }),
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn frame_count(&self) -> usize {
        self.inner.frames.len()
    }

    /// Play every recorded frame through the callback at a fixed pace, then
    /// signal an expected disconnect.
    pub fn play(&self, frame_interval: Duration) -> tokio::task::JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            info!(frames = inner.frames.len(), "replay started");
            for frame in &inner.frames {
                if !inner.connected.load(Ordering::SeqCst) {
                    break;
                }
                if let Ok(guard) = inner.callback.lock() {
                    if let Some(cb) = guard.as_ref() {
                        cb(LinkEvent::Notification(frame.clone()));
                    }
                }
                tokio::time::sleep(frame_interval).await;
            }
            inner.connected.store(false, Ordering::SeqCst);
            if let Ok(guard) = inner.callback.lock() {
                if let Some(cb) = guard.as_ref() {
                    cb(LinkEvent::Disconnected { expected: true });
                }
            }
            info!("replay finished");
        })
    }
}

impl PeripheralLink for ReplayLink {
    async fn scan(&self, _timeout_ms: u64) -> Result<Vec<DiscoveredPeripheral>, TelemetryError> {
        Ok(vec![DiscoveredPeripheral {
            id: DeviceId::new("replay"),
            name: "Replay".to_string(),
            rssi: None,
        }])
    }

    async fn connect(&self, _peripheral_id: &DeviceId) -> Result<(), TelemetryError> {
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TelemetryError> {
        self.inner.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn negotiate_mtu(&self, requested: u16) -> Result<u16, TelemetryError> {
        Ok(requested)
    }

    async fn request_high_priority(&self) -> Result<(), TelemetryError> {
        Ok(())
    }

    async fn discover_topology(&self) -> Result<LinkTopology, TelemetryError> {
        Ok(LinkTopology {
            has_heart_rate: true,
            has_measurement_data: true,
        })
    }

    async fn subscribe(&self, _channel: NotifyChannel) -> Result<(), TelemetryError> {
        Ok(())
    }

    async fn write_control(&self, _command: ControlCommand) -> Result<(), TelemetryError> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockLink;
    use contracts::AxisTriple;
    use std::io::Cursor;

    #[test]
    fn test_round_trip_through_recording() {
        let frames = vec![
            MockLink::gyro_frame(&[AxisTriple::new(1, 2, 3)]),
            MockLink::hr_frame(65, None),
        ];
        let mut buf = Vec::new();
        write_recording(&mut buf, &frames).unwrap();

        let link = ReplayLink::from_reader(Cursor::new(buf)).unwrap();
        assert_eq!(link.frame_count(), 2);
    }

    #[test]
    fn test_malformed_line_rejected() {
        let result = ReplayLink::from_reader(Cursor::new(b"not json\n".to_vec()));
        assert!(matches!(result, Err(TelemetryError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_play_delivers_frames_then_disconnects() {
        let frames = vec![MockLink::hr_frame(60, None), MockLink::hr_frame(61, None)];
        let mut buf = Vec::new();
        write_recording(&mut buf, &frames).unwrap();
        let link = ReplayLink::from_reader(Cursor::new(buf)).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        link.listen(Arc::new(move |event| {
            let _ = tx.send(event);
        }));
        link.connect(&DeviceId::new("replay")).await.unwrap();
        link.play(Duration::from_millis(1)).await.unwrap();

        let mut notifications = 0;
        let mut disconnected = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                LinkEvent::Notification(_) => notifications += 1,
                LinkEvent::Disconnected { expected } => {
                    assert!(expected);
                    disconnected = true;
                }
            }
        }
        assert_eq!(notifications, 2);
        assert!(disconnected);
    }
}
