//! Error types for Evergreen.
//!
//! Configuration problems are fatal at construction. Classifier and capture
//! failures are recovered close to where they happen and never reach the
//! animation layer.

use thiserror::Error;

/// Invalid scene or layer configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A count that must be positive was zero.
    #[error("{what} count must be positive")]
    EmptyCount { what: &'static str },

    /// Two index-aligned arrays disagree in length.
    #[error("{what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A numeric range with `min > max` or non-finite bounds.
    #[error("invalid range for {what}: [{min}, {max})")]
    InvalidRange { what: &'static str, min: f32, max: f32 },

    /// A parameter outside its allowed domain.
    #[error("invalid {what}: {reason}")]
    InvalidParameter { what: &'static str, reason: String },

    /// Reading or writing a config file failed.
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A config file could not be parsed.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure of a single call to the remote gesture classifier.
///
/// These are logged and replaced by the neutral sample; see
/// [`crate::gesture::GestureIngestController`].
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier transport error: {0}")]
    Transport(String),

    #[error("classifier returned HTTP {status}")]
    Status { status: u16 },

    #[error("classifier returned an empty body")]
    EmptyBody,

    #[error("classifier response violates schema: {0}")]
    Schema(String),

    #[error("classifier did not answer within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

/// The frame source could not deliver a frame.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read frame: {0}")]
    Read(#[from] image::ImageError),

    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A captured frame could not be JPEG-encoded.
#[derive(Debug, Error)]
#[error("failed to encode frame: {0}")]
pub struct EncodeError(#[from] pub image::ImageError);

/// Errors that can occur during GPU initialization.
#[derive(Debug, Error)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    #[error("failed to create GPU surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found; a GPU with WebGPU/Vulkan/Metal/DX12 support is required")]
    NoAdapter,
    /// Failed to create GPU device.
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),
}

/// Errors that can occur when running the application.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Failed to create event loop.
    #[error("failed to create event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    /// Failed to create window.
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    /// GPU initialization failed.
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
    /// Scene construction failed.
    #[error("scene configuration error: {0}")]
    Config(#[from] ConfigError),
}
