//! Partition execution: per-partition buffers and the parallel executor.
//!
//! This module provides:
//! - `ColumnBuffer`: Arrow builders filled by one partition query
//! - `execute_plan`: runs every partition query of a plan on a worker pool
//! - `Cancellation`: flag shared by workers to stop after the first failure

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ConectaError, Result};

pub mod buffer;
mod executor;

pub use buffer::{ColumnBuffer, ColumnBuilder};
pub use executor::execute_plan;

/// Cooperative cancellation shared by the workers of one read.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once a sibling has failed.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ConectaError::Cancelled)
        } else {
            Ok(())
        }
    }
}
