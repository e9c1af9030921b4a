//! Engine-wide error type
//!
//! Every subsystem returns `EngineResult<T>`. Whether an error may be absorbed
//! locally (and retried on a later tick) or must end the frame loop is decided
//! by [`EngineError::is_fatal`].

use thiserror::Error;

/// Result alias used throughout the engine
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The device stopped responding. Nothing submitted after this point will execute.
    #[error("GPU device lost: {reason}")]
    DeviceLost { reason: String },

    /// No adapter or device could be opened
    #[error("GPU device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    #[error("Command submission failed: {error}")]
    SubmissionFailed { error: String },

    #[error("GPU allocation of {requested_bytes} bytes failed ({resident_bytes} of {budget_bytes} bytes resident)")]
    AllocationFailed {
        requested_bytes: u64,
        resident_bytes: u64,
        budget_bytes: u64,
    },

    #[error("Frame resource slot {slot} is already in use")]
    SlotInUse { slot: usize },

    #[error("Frame resource slot {slot} is {found}, expected {expected}")]
    InvalidSlotState {
        slot: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Frame resource slot {slot} is still referenced by a worker")]
    SlotStillShared { slot: usize },

    #[error("Fence value {value} does not advance past {previous}")]
    FenceNotMonotonic { previous: u64, value: u64 },

    #[error("Index {index} out of range for {buffer} buffer with capacity {capacity}")]
    BufferOverflow {
        buffer: &'static str,
        index: usize,
        capacity: usize,
    },

    #[error("Render worker {worker} panicked: {message}")]
    WorkerPanicked { worker: usize, message: String },

    #[error("Failed to spawn render worker {worker}: {error}")]
    WorkerSpawn { worker: usize, error: String },

    #[error("Viewer position ({x}, {z}) is outside the chunk grid")]
    ViewerOutOfRange { x: f32, z: f32 },

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl EngineError {
    /// Whether the error must terminate the frame loop.
    ///
    /// Only a failed allocation is chunk-local: the streamer leaves the
    /// coordinate empty and the next update tries again. A requested shutdown
    /// is not a failure either, it only ends the loop early.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            EngineError::AllocationFailed { .. } | EngineError::ShutdownRequested
        )
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        EngineError::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn device_lost(reason: impl std::fmt::Display) -> Self {
        EngineError::DeviceLost {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_taxonomy() {
        let allocation = EngineError::AllocationFailed {
            requested_bytes: 10,
            resident_bytes: 0,
            budget_bytes: 5,
        };
        assert!(!allocation.is_fatal());
        assert!(!EngineError::ShutdownRequested.is_fatal());
        assert!(EngineError::device_lost("removed").is_fatal());
        assert!(EngineError::DeviceUnavailable {
            reason: "no adapter".to_string()
        }
        .is_fatal());
        assert!(EngineError::ViewerOutOfRange { x: f32::NAN, z: 0.0 }.is_fatal());
        assert!(EngineError::SlotInUse { slot: 0 }.is_fatal());
        assert!(EngineError::WorkerPanicked {
            worker: 1,
            message: "boom".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = EngineError::FenceNotMonotonic {
            previous: 4,
            value: 4,
        };
        assert_eq!(err.to_string(), "Fence value 4 does not advance past 4");
        assert!(EngineError::invalid_config("octaves must be > 0")
            .to_string()
            .contains("octaves"));
    }
}
