// src/kernel/driver/mod.rs

//! Hardware drivers used by the scheduler core: the COM1 serial log
//! sink and the interval timer that drives time-slicing.

pub mod pit;
pub mod serial;

use crate::errors::KernelResult;

/// Minimal contract every driver satisfies.
pub trait Device {
    /// Human-readable device name for log lines.
    fn name(&self) -> &'static str;

    /// Bring the device into a usable state.
    fn init(&mut self) -> KernelResult<()>;
}
