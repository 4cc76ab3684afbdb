use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

/// The result type used in the entire darts crate.
pub type Result<T> = std::result::Result<T, DartsErr>;

/// The darts crate's error type.
#[derive(Debug)]
pub enum DartsErr {
    Candle(candle_core::Error),
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Json(serde_json::Error),
    UnknownOp(String),
    InvalidGenotype(String),
    InvalidConfig(String),
    NoAccelerator {
        gpu: usize,
    },
}

impl Display for DartsErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DartsErr::Candle(e) => write!(f, "tensor error: {e}"),
            DartsErr::Io { path, source } => write!(f, "io error on {}: {source}", path.display()),
            DartsErr::Json(e) => write!(f, "json error: {e}"),
            DartsErr::UnknownOp(name) => write!(f, "unknown operation '{name}'"),
            DartsErr::InvalidGenotype(msg) => write!(f, "invalid genotype: {msg}"),
            DartsErr::InvalidConfig(msg) => write!(f, "invalid network config: {msg}"),
            DartsErr::NoAccelerator { gpu } => {
                write!(f, "no gpu device available (requested device {gpu})")
            }
        }
    }
}

impl Error for DartsErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DartsErr::Candle(e) => Some(e),
            DartsErr::Io { source, .. } => Some(source),
            DartsErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<candle_core::Error> for DartsErr {
    fn from(value: candle_core::Error) -> Self {
        Self::Candle(value)
    }
}

impl From<serde_json::Error> for DartsErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
