//! # Link
//!
//! Connection management over the wireless transport: scanning, connect
//! bring-up, the reconnect loop with exponential backoff, and link event to
//! decoded-sample fan-out. Includes the mock and replay link backends.

mod counters;
mod manager;
mod mock;
mod policy;
mod replay;

pub use counters::{LinkCounters, LinkCountersSnapshot};
pub use manager::ConnectionManager;
pub use mock::MockLink;
pub use policy::ReconnectPolicy;
pub use replay::{write_recording, ReplayLink, ReplayRecord};
