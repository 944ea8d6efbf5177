//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Capture timestamps are assigned at decode time (epoch milliseconds, i64);
//!   the peripheral does not transmit wall-clock time.
//! - All buffer-merge and sync decisions operate on these capture timestamps.

mod config;
mod device_id;
mod error;
mod frame;
mod link;
mod reading;
mod sample;
mod stores;
mod time;

pub use config::*;
pub use device_id::DeviceId;
pub use error::*;
pub use frame::*;
pub use link::*;
pub use reading::*;
pub use sample::*;
pub use stores::*;
pub use time::epoch_ms;
