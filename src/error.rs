use std::{fmt, io};

use machine_learning::MlErr;

/// The result type used across the gaze pipeline.
pub type Result<T> = std::result::Result<T, GazeError>;

/// All errors that can occur in the gaze pipeline.
#[derive(Debug)]
pub enum GazeError {
    /// The detected face lacks landmarks a computation depends on.
    InsufficientLandmarks {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// Feature vectors of different lengths met in the same dataset.
    SchemaMismatch { expected: usize, got: usize },
    /// A round hasn't been flushed to the store yet.
    RoundNotFound { key: String },
    /// The training run failed and won't be retried on its own.
    TrainingAborted(Box<GazeError>),
    /// Inference was requested before training finished.
    ModelNotReady,
    /// A frame can't be used for image capture.
    InvalidFrame(String),
    /// Invalid configuration, caught before the session starts.
    InvalidConfig(String),
    Ml(MlErr),
    Io(io::Error),
    Json(serde_json::Error),
}

impl GazeError {
    /// Whether the error describes a transient condition the pipeline can wait out.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientLandmarks { .. } | Self::RoundNotFound { .. } | Self::InvalidFrame(_)
        )
    }
}

impl fmt::Display for GazeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientLandmarks {
                what,
                got,
                expected,
            } => write!(
                f,
                "insufficient landmarks for {what}: got {got}, expected {expected}"
            ),
            Self::SchemaMismatch { expected, got } => {
                write!(f, "schema mismatch: expected vectors of {expected} values, got {got}")
            }
            Self::RoundNotFound { key } => write!(f, "round not found: {key}"),
            Self::TrainingAborted(e) => write!(f, "training aborted: {e}"),
            Self::ModelNotReady => write!(f, "the model hasn't been trained yet"),
            Self::InvalidFrame(msg) => write!(f, "invalid frame: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Ml(e) => write!(f, "machine learning error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl std::error::Error for GazeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TrainingAborted(e) => Some(e.as_ref()),
            Self::Ml(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for GazeError {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

impl From<io::Error> for GazeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for GazeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_classifies_recoverable_errors() {
        let missing = GazeError::RoundNotFound {
            key: "eyegaze-r0".into(),
        };
        let landmarks = GazeError::InsufficientLandmarks {
            what: "iris",
            got: 468,
            expected: 478,
        };
        let mismatch = GazeError::SchemaMismatch {
            expected: 74,
            got: 372,
        };

        assert!(missing.is_recoverable());
        assert!(landmarks.is_recoverable());
        assert!(!mismatch.is_recoverable());
        assert!(!GazeError::TrainingAborted(Box::new(missing)).is_recoverable());
    }
}
