use thiserror::Error;

/// Failures creating a drawing target. Drawing itself never fails.
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("invalid canvas size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("pixel buffer holds {actual} bytes, {expected} expected for {width}x{height}")]
    BufferLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("{backend} surface could not be created: {reason}")]
    SurfaceCreation {
        backend: &'static str,
        reason: String,
    },
}
