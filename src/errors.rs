// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the equalization pipeline

use crate::media::Channel;
use std::fmt;

/// Result type alias using EqualizeError
pub type EqualizeResult<T> = Result<T, EqualizeError>;

/// Pipeline stage, used to attribute backend failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Plane upload to the device
    Upload,
    /// Histogram accumulation
    Histogram,
    /// Inclusive prefix scan
    Scan,
    /// LUT normalization
    Normalize,
    /// LUT application and output readback
    Apply,
}

impl Stage {
    /// Stages in execution order
    pub const ALL: [Stage; 5] = [
        Stage::Upload,
        Stage::Histogram,
        Stage::Scan,
        Stage::Normalize,
        Stage::Apply,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Histogram => "histogram",
            Stage::Scan => "scan",
            Stage::Normalize => "normalize",
            Stage::Apply => "apply",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rejected input image; raised before any stage runs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("unsupported channel count {0} (expected 1 or 3)")]
    UnsupportedChannelCount(u8),
    #[error("image has zero dimensions ({width}x{height})")]
    ZeroDimensions { width: u32, height: u32 },
    #[error("unsupported sample format {0} (only 8-bit channels are supported)")]
    UnsupportedSampleFormat(String),
    #[error("sample buffer holds {actual} bytes, geometry needs {expected}")]
    SampleCountMismatch { expected: usize, actual: usize },
    #[error("{pixels} pixels per plane exceeds the 32-bit counter limit")]
    TooManyPixels { pixels: u64 },
    #[error("cannot assemble an image from {0} planes")]
    PlaneCountMismatch(usize),
}

/// Failure reported by a compute backend primitive
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct BackendError {
    /// Primitive that failed (allocate, write, read, fill, launch, ...)
    pub operation: &'static str,
    /// Diagnostic payload from the backend
    pub message: String,
}

impl BackendError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Kernel program failed to build
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("kernel program `{program}` failed to build:\n{log}")]
pub struct CompileError {
    /// Program label
    pub program: &'static str,
    /// Build log as reported by the backend
    pub log: String,
}

/// A channel that did not make it through the pipeline
#[derive(Debug)]
pub struct ChannelFailure {
    pub channel: Channel,
    pub error: EqualizeError,
}

impl fmt::Display for ChannelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} channel: {}", self.channel, self.error)
    }
}

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum EqualizeError {
    #[error("invalid input: {0}")]
    Input(#[from] InputError),
    #[error("{stage} stage failed: {source}")]
    Backend {
        stage: Stage,
        #[source]
        source: BackendError,
    },
    #[error("no usable compute device: {0}")]
    Device(#[source] BackendError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("{} of {channel_count} channels failed: {}", .failures.len(), describe_failures(.failures))]
    Channels {
        failures: Vec<ChannelFailure>,
        channel_count: usize,
    },
}

impl EqualizeError {
    /// Stage a backend failure happened in, if this is one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            EqualizeError::Backend { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

fn describe_failures(failures: &[ChannelFailure]) -> String {
    failures
        .iter()
        .map(ChannelFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Attach the failing stage to a backend result
pub trait StageContext<T> {
    fn at_stage(self, stage: Stage) -> EqualizeResult<T>;
}

impl<T> StageContext<T> for Result<T, BackendError> {
    fn at_stage(self, stage: Stage) -> EqualizeResult<T> {
        self.map_err(|source| EqualizeError::Backend { stage, source })
    }
}

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config file is malformed: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_names_stage() {
        let result: Result<(), BackendError> =
            Err(BackendError::new("allocate", "out of device memory"));
        let err = result.at_stage(Stage::Histogram).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Histogram));
        assert_eq!(
            err.to_string(),
            "histogram stage failed: allocate failed: out of device memory"
        );
    }

    #[test]
    fn test_compile_error_keeps_log_verbatim() {
        let err = EqualizeError::from(CompileError {
            program: "scan",
            log: "1:5 error: expected ';'".to_string(),
        });
        assert!(err.to_string().ends_with("1:5 error: expected ';'"));
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn test_channel_failures_listed() {
        let err = EqualizeError::Channels {
            failures: vec![ChannelFailure {
                channel: Channel::Green,
                error: EqualizeError::Backend {
                    stage: Stage::Apply,
                    source: BackendError::new("launch", "device lost"),
                },
            }],
            channel_count: 3,
        };
        assert_eq!(
            err.to_string(),
            "1 of 3 channels failed: green channel: apply stage failed: launch failed: device lost"
        );
    }
}
