// src/errors.rs

//! Unified error types for the kernel
//!
//! One top-level [`KernelError`] with per-subsystem sub-enums, so every
//! fallible kernel path returns the same [`KernelResult`] and call sites
//! can use `?` across subsystem boundaries.

use core::fmt;

/// Top-level kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Hardware device error
    Device(DeviceError),
    /// Initialization error
    Init(InitError),
    /// Thread/process spawn error
    Spawn(SpawnError),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Device(e) => write!(f, "device error: {e}"),
            KernelError::Init(e) => write!(f, "init error: {e}"),
            KernelError::Spawn(e) => write!(f, "spawn error: {e}"),
        }
    }
}

/// Hardware device errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// Device did not respond within the retry budget
    Timeout,
    /// Requested frequency/divisor is outside the device's range
    InvalidFrequency,
    /// Device hardware is not present
    NotPresent,
}

impl DeviceError {
    /// Short description for log lines.
    pub const fn as_str(&self) -> &'static str {
        match self {
            DeviceError::Timeout => "operation timeout",
            DeviceError::InvalidFrequency => "invalid frequency",
            DeviceError::NotPresent => "hardware not present",
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DeviceError> for KernelError {
    fn from(err: DeviceError) -> Self {
        KernelError::Device(err)
    }
}

/// Initialization errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// Subsystem cannot be initialized twice
    AlreadyInitialized,
    /// A prerequisite subsystem was not brought up first
    PrerequisitesNotMet,
    /// The supplied memory region is too small to be usable
    RegionTooSmall,
}

impl InitError {
    /// Short description for log lines.
    pub const fn as_str(&self) -> &'static str {
        match self {
            InitError::AlreadyInitialized => "already initialized",
            InitError::PrerequisitesNotMet => "prerequisites not met",
            InitError::RegionTooSmall => "region too small",
        }
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<InitError> for KernelError {
    fn from(err: InitError) -> Self {
        KernelError::Init(err)
    }
}

/// Thread/process spawn errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Stack or bookkeeping allocation failed
    OutOfMemory,
    /// The owning process does not exist (or is being torn down)
    NoSuchProcess,
}

impl SpawnError {
    /// Short description for log lines.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SpawnError::OutOfMemory => "out of memory",
            SpawnError::NoSuchProcess => "no such process",
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SpawnError> for KernelError {
    fn from(err: SpawnError) -> Self {
        KernelError::Spawn(err)
    }
}

/// Result type alias for kernel operations
pub type KernelResult<T> = core::result::Result<T, KernelError>;
