use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use darts::DartsErr;

/// The search analyzer's result type.
pub type Result<T> = std::result::Result<T, AnalyzerErr>;

/// Failures while reading a search log, profiling its candidates or writing the results.
#[derive(Debug)]
pub enum AnalyzerErr {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Csv(csv::Error),
    Darts(DartsErr),
    /// Malformed literal text, at a byte offset of the parsed text.
    Parse {
        offset: usize,
        msg: String,
    },
    MissingMarker(&'static str),
    UnknownRegularization(String),
    /// Well-formed text that doesn't have the expected structure.
    Schema(String),
    Config(String),
    /// A chart that couldn't be drawn or saved.
    Plot {
        path: PathBuf,
        msg: String,
    },
}

impl Display for AnalyzerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyzerErr::Io { path, source } => write!(f, "io error on {}: {source}", path.display()),
            AnalyzerErr::Csv(e) => write!(f, "csv error: {e}"),
            AnalyzerErr::Darts(e) => write!(f, "{e}"),
            AnalyzerErr::Parse { offset, msg } => write!(f, "parse error at byte {offset}: {msg}"),
            AnalyzerErr::MissingMarker(marker) => write!(f, "no line contains '{marker}'"),
            AnalyzerErr::UnknownRegularization(line) => {
                write!(f, "cannot decode regularization from '{line}'")
            }
            AnalyzerErr::Schema(msg) => write!(f, "unexpected log structure: {msg}"),
            AnalyzerErr::Config(msg) => write!(f, "invalid arguments: {msg}"),
            AnalyzerErr::Plot { path, msg } => {
                write!(f, "cannot plot {}: {msg}", path.display())
            }
        }
    }
}

impl Error for AnalyzerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AnalyzerErr::Io { source, .. } => Some(source),
            AnalyzerErr::Csv(e) => Some(e),
            AnalyzerErr::Darts(e) => Some(e),
            _ => None,
        }
    }
}

impl From<csv::Error> for AnalyzerErr {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<DartsErr> for AnalyzerErr {
    fn from(value: DartsErr) -> Self {
        Self::Darts(value)
    }
}
