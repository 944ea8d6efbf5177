//! # Sync Engine
//!
//! Paged upload of locally buffered readings to a remote session store,
//! with all-or-nothing rollback when any step of an attempt fails.

mod engine;
mod mock_remote;

pub use engine::{SessionInfo, SyncEngine};
pub use mock_remote::MockRemoteStore;
