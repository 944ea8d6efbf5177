//! PeripheralLink trait - wireless link abstraction
//!
//! Defines a unified interface for the wireless transport, decoupling the
//! connection manager from concrete link implementations (hardware backends,
//! mock links, file replay).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{DeviceId, NotifyChannel, RawFrame, TelemetryError};

/// Link state machine.
///
/// At most one Connecting/Connected link exists at a time; transitions happen
/// only inside the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Disconnected,
    Scanning,
    Connecting,
    Connected,
    Reconnecting,
}

/// A peripheral seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeripheral {
    /// Stable peripheral identifier
    pub id: DeviceId,

    /// Advertised name
    pub name: String,

    /// Signal strength at discovery time, if reported
    pub rssi: Option<i16>,
}

/// Characteristic topology discovered after connecting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkTopology {
    /// Standard heart-rate characteristic present
    pub has_heart_rate: bool,

    /// Proprietary measurement-data characteristic present
    pub has_measurement_data: bool,
}

/// Streamed channel on the proprietary measurement-data characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Ppg,
    Acc,
    Gyro,
    Ppi,
}

impl StreamKind {
    /// Label for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Ppg => "ppg",
            StreamKind::Acc => "acc",
            StreamKind::Gyro => "gyro",
            StreamKind::Ppi => "ppi",
        }
    }
}

/// Control-point command written to the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Begin streaming a channel
    StartStream(StreamKind),
    /// Stop streaming a channel
    StopStream(StreamKind),
    /// Disable the proprietary measurement mode entirely
    DisableMode,
}

impl ControlCommand {
    /// Label for logging and error context
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::StartStream(StreamKind::Ppg) => "start_ppg",
            ControlCommand::StartStream(StreamKind::Acc) => "start_acc",
            ControlCommand::StartStream(StreamKind::Gyro) => "start_gyro",
            ControlCommand::StartStream(StreamKind::Ppi) => "start_ppi",
            ControlCommand::StopStream(StreamKind::Ppg) => "stop_ppg",
            ControlCommand::StopStream(StreamKind::Acc) => "stop_acc",
            ControlCommand::StopStream(StreamKind::Gyro) => "stop_gyro",
            ControlCommand::StopStream(StreamKind::Ppi) => "stop_ppi",
            ControlCommand::DisableMode => "disable_mode",
        }
    }
}

/// Event delivered by the link layer
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// One notification payload from a subscribed characteristic.
    ///
    /// Notifications for a given channel are delivered in order relative to
    /// each other; channels may interleave.
    Notification(RawFrame),

    /// The link dropped. `expected` is true only for user-initiated
    /// disconnects; anything else triggers the reconnect loop.
    Disconnected { expected: bool },
}

/// Link event callback type
///
/// The link layer invokes this once per received event. Uses `Arc` to allow
/// callback sharing across reconnect cycles.
pub type LinkEventCallback = Arc<dyn Fn(LinkEvent) + Send + Sync>;

/// Wireless link trait
///
/// Abstracts the transport beneath the connection manager. Implementations:
/// a hardware backend, the mock link (synthesized frames), and the replay
/// link (recorded frames).
#[trait_variant::make(PeripheralLink: Send)]
pub trait LocalPeripheralLink: Sync {
    /// Scan for peripherals until the timeout elapses.
    ///
    /// Returns every advertisement seen; name filtering and duplicate
    /// suppression are the connection manager's concern.
    async fn scan(&self, timeout_ms: u64) -> Result<Vec<DiscoveredPeripheral>, TelemetryError>;

    /// Establish the link to a peripheral by id.
    async fn connect(&self, peripheral_id: &DeviceId) -> Result<(), TelemetryError>;

    /// Tear the link down.
    async fn disconnect(&self) -> Result<(), TelemetryError>;

    /// Negotiate the maximum transfer unit. Best-effort: failure is
    /// non-fatal for the caller.
    async fn negotiate_mtu(&self, requested: u16) -> Result<u16, TelemetryError>;

    /// Request the highest link priority. Best-effort.
    async fn request_high_priority(&self) -> Result<(), TelemetryError>;

    /// Discover the service/characteristic topology.
    async fn discover_topology(&self) -> Result<LinkTopology, TelemetryError>;

    /// Subscribe to notifications on a characteristic.
    async fn subscribe(&self, channel: NotifyChannel) -> Result<(), TelemetryError>;

    /// Write a control-point command. The peripheral firmware requires
    /// settling time between commands instead of exposing acknowledgments;
    /// pacing is the caller's responsibility.
    async fn write_control(&self, command: ControlCommand) -> Result<(), TelemetryError>;

    /// Register the event callback. Repeated calls are idempotent.
    fn listen(&self, callback: LinkEventCallback);

    /// Check whether the link considers itself connected.
    fn is_connected(&self) -> bool;
}
