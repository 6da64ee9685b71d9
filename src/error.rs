//! Error types for the simulation pipeline.

use thiserror::Error;

/// Errors that can occur while creating or driving the GPU simulation.
#[derive(Error, Debug)]
pub enum SimError {
    /// No compatible GPU adapter was found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request a GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(String),

    /// A compute kernel failed validation or compilation.
    #[error("compute kernel compilation failed: {0}")]
    ShaderCompilation(String),

    /// The requested body capacity does not fit the device.
    ///
    /// The node buffer is the largest allocation, so the limit is checked
    /// against it specifically; the simulation refuses to start rather than
    /// silently truncate.
    #[error("body capacity {requested} exceeds device limits ({detail})")]
    CapacityExceeded { requested: u32, detail: String },

    /// A buffer readback failed to map.
    #[error("buffer readback failed: {0}")]
    Readback(String),
}
