use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use darts::DartsErr;

/// The ensemble crate's result type.
pub type Result<T> = std::result::Result<T, EnsembleErr>;

/// Failures while loading models or data, computing weights or running inference.
#[derive(Debug)]
pub enum EnsembleErr {
    Darts(DartsErr),
    Candle(candle_core::Error),
    Shape(ndarray::ShapeError),
    Io {
        path: PathBuf,
        source: io::Error,
    },
    NotADirectory(PathBuf),
    NoModels(PathBuf),
    EmptyCollection,
    InvalidConfig(String),
    MalformedDataset {
        path: PathBuf,
        len: usize,
        record: usize,
    },
    LabelOutOfRange {
        label: usize,
        num_classes: usize,
    },
    WeightShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    OutputShapeMismatch {
        model: String,
        expected: (usize, usize),
        got: (usize, usize),
    },
}

impl Display for EnsembleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnsembleErr::Darts(e) => write!(f, "{e}"),
            EnsembleErr::Candle(e) => write!(f, "tensor error: {e}"),
            EnsembleErr::Shape(e) => write!(f, "array shape error: {e}"),
            EnsembleErr::Io { path, source } => write!(f, "io error on {}: {source}", path.display()),
            EnsembleErr::NotADirectory(path) => {
                write!(f, "the models folder {} is not a directory", path.display())
            }
            EnsembleErr::NoModels(path) => write!(f, "no model was found on {}", path.display()),
            EnsembleErr::EmptyCollection => write!(f, "the model collection is empty"),
            EnsembleErr::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            EnsembleErr::MalformedDataset { path, len, record } => write!(
                f,
                "{} has {len} bytes, not a multiple of the {record} byte record size",
                path.display()
            ),
            EnsembleErr::LabelOutOfRange { label, num_classes } => {
                write!(f, "label {label} out of range for {num_classes} classes")
            }
            EnsembleErr::WeightShapeMismatch { expected, got } => write!(
                f,
                "weight shape mismatch: got {got:?}, expected {expected:?}"
            ),
            EnsembleErr::OutputShapeMismatch {
                model,
                expected,
                got,
            } => write!(
                f,
                "model {model} produced outputs of shape {got:?}, expected {expected:?}"
            ),
        }
    }
}

impl Error for EnsembleErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EnsembleErr::Darts(e) => Some(e),
            EnsembleErr::Candle(e) => Some(e),
            EnsembleErr::Shape(e) => Some(e),
            EnsembleErr::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DartsErr> for EnsembleErr {
    fn from(value: DartsErr) -> Self {
        Self::Darts(value)
    }
}

impl From<candle_core::Error> for EnsembleErr {
    fn from(value: candle_core::Error) -> Self {
        Self::Candle(value)
    }
}

impl From<ndarray::ShapeError> for EnsembleErr {
    fn from(value: ndarray::ShapeError) -> Self {
        Self::Shape(value)
    }
}
