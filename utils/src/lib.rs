//! Shared infrastructure utilities for procoder.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`diff`**: Unified diff rendering and stats

pub mod atomic_write;
pub mod diff;

pub use atomic_write::{FileSyncPolicy, atomic_write, atomic_write_with_sync};
pub use diff::{DiffStats, compute_diff_stats, unified_diff};
