//! In-process reference host.
//!
//! Implements the [`TabHandle`](tabpilot_core_types::TabHandle) and
//! [`Storage`](tabpilot_core_types::Storage) ports over page-probe
//! documents held in memory. Integration tests drive the full loop
//! through it; embedders without a browser bridge can use it as a model
//! for their own adapter.

mod memory_storage;
mod memory_tab;

pub use memory_storage::MemoryStorage;
pub use memory_tab::{MemoryBrowser, MemoryTab, NavRouter};
