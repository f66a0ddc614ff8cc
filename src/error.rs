//! Error types of a validation run.

use std::path::PathBuf;

use crate::scoring::Accuracy;

/// Every way a validation run can fail.
///
/// Failures are grouped in three families: the environment never served (infrastructure),
/// the model broke the submission contract, or its accuracy is too low. None of them is
/// recoverable; the binary maps each one to an exit code with [`ValidationError::exit_code`].
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("'{}' is not a valid directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("the sample set is empty, accuracy is undefined")]
    EmptySampleSet,

    #[error("container '{name}' exited with code {exit_code} before serving")]
    EnvironmentExited {
        name: String,
        exit_code: i32,
        diagnostics: String,
    },

    #[error("container '{name}' was still not serving after {attempts} attempt(s)")]
    NotReady { name: String, attempts: u32 },

    #[error("channel axis must be {expected}, got {actual}")]
    ChannelAxisMismatch { expected: usize, actual: usize },

    #[error("bounds must be {expected:?}, got {actual:?}")]
    BoundsMismatch {
        expected: (f64, f64),
        actual: (f64, f64),
    },

    #[error("prediction must be an integer, got {kind}")]
    NonIntegerPrediction { kind: String },

    #[error(
        "accuracy is too low: {accuracy} (expected at least {threshold}); \
         make sure the model applies the same preprocessing as during training"
    )]
    LowAccuracy {
        accuracy: Accuracy,
        threshold: Accuracy,
    },

    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl ValidationError {
    /// Exit code of the validator process for this failure.
    ///
    /// A container that died before serving hands its own exit code over to the validator.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidationError::EnvironmentExited { exit_code, .. } => *exit_code,
            _ => 1,
        }
    }
}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
