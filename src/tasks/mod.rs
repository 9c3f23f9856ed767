//! Background Tasks Module
//!
//! Periodic housekeeping for a long-lived coordinator.
//!
//! # Tasks
//! - Cleanup: purges expired cache entries and idle rate windows

mod cleanup;

pub use cleanup::spawn_cleanup_task;
