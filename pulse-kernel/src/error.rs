//! Error types for the control kernel

use std::path::PathBuf;

use pulse_core::{CoreError, MarshalError};
use thiserror::Error;

/// Result type for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors produced by the control kernel.
///
/// Phase hooks (`pull`/`calculate`/`push`) cannot fail; components absorb
/// transient faults internally and report unrecoverable ones through the
/// event service. No error crosses a period boundary.
#[derive(Error, Debug)]
pub enum KernelError {
    /// An error from the core runtime (registry lookup, event setup, ...)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A lifecycle hook returned false; the kernel rolled back to the
    /// previous stable state
    #[error("'{component}' rejected {transition}")]
    LifecycleRejected {
        component: String,
        transition: &'static str,
    },

    /// Structural mutation attempted while the kernel is running
    #[error("kernel is running; structure is locked")]
    KernelBusy,

    /// A single step was requested before the kernel was brought up
    #[error("kernel has not been started")]
    NotStarted,

    /// A component property file is absent and `ignoreMissingFiles` is off
    #[error("missing property file {0}")]
    MissingPropertyFile(PathBuf),

    /// Reading or writing a property file failed
    #[error("property marshalling failed: {0}")]
    Marshal(#[from] MarshalError),

    /// Host configuration could not be read
    #[error("configuration error: {0}")]
    Config(String),
}
