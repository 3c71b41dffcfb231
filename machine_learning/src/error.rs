use ndarray::ShapeError;
use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    EmptyDataset,
    Shape(ShapeError),
    InvalidInit(String),
    InvalidSpec(String),
    Interrupted {
        epoch: usize,
    },
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => format!("There's a size mismatch in {what}, got {got} and expected {expected}"),
            MlErr::EmptyDataset => "Tried to train or evaluate over an empty dataset".to_string(),
            MlErr::Shape(e) => format!("Invalid array shape: {e}"),
            MlErr::InvalidInit(msg) => format!("Failed to initialize the parameters: {msg}"),
            MlErr::InvalidSpec(msg) => format!("Invalid trainer specification: {msg}"),
            MlErr::Interrupted { epoch } => format!("Training was interrupted before epoch {epoch}"),
        };

        write!(f, "{s}")
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}
