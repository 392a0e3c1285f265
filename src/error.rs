use std::path::PathBuf;

use thiserror::Error;

/// Every failure the pipeline can report. Nothing is retried; the first error
/// aborts the run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },
    #[error("cannot decode {path}: {message}")]
    Format { path: PathBuf, message: String },
    #[error("invalid npy data: {0}")]
    Npy(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("atlas: {0}")]
    Atlas(String),
    #[error("degenerate input: {0}")]
    Degenerate(String),
    #[error("render failed: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn shape(context: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected,
            found,
        }
    }

    pub(crate) fn render<E: std::fmt::Display>(err: E) -> Self {
        Self::Render(err.to_string())
    }
}
