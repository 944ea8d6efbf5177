//! # Storage
//!
//! Durable buffering and local persistence: the merge-window buffer, the
//! single-writer flush task, and the SQLite / in-memory row stores.

mod buffer;
mod memory;
mod sqlite;
mod task;

pub use buffer::{DurableBuffer, FlushOutcome};
pub use memory::MemoryRowStore;
pub use sqlite::SqliteRowStore;
pub use task::{spawn_writer, WriterHandle, WriterStats, WriterStatsSnapshot};
