//! Error taxonomy shared by the removal engine and the rendering pipeline

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by sheet removal and PDF rendering
#[derive(Debug, Error)]
pub enum Error {
    #[error("source file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("sheet '{sheet}' references relationship '{relationship_id}' with no entry in {rels_part}")]
    UnresolvedRelationship {
        sheet: String,
        relationship_id: String,
        rels_part: String,
    },

    #[error("{predicate} matches every sheet; a workbook must keep at least one sheet")]
    NoSheetsRemaining { predicate: String },

    #[error("no sheets left to render (include: {include:?}, exclude: {exclude:?})")]
    NoSheetsToRender {
        include: Vec<String>,
        exclude: Vec<String>,
    },

    #[error("failed to write {}: {source}", .path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("engine '{engine}' is unavailable: {reason}")]
    EngineUnavailable { engine: String, reason: String },

    #[error("engine '{engine}' timed out after {}ms", .elapsed.as_millis())]
    RenderTimeout { engine: String, elapsed: Duration },

    #[error("engine '{engine}' failed: {reason}")]
    RenderFailure { engine: String, reason: String },

    #[error("engine '{engine}' produced an invalid PDF: {reason}")]
    ValidationFailure { engine: String, reason: String },

    #[error("all rendering engines failed:\n{}", FailureList(.failures))]
    EnginesExhausted { failures: Vec<EngineFailure> },
}

/// Fieldless mirror of [`Error`] for callers that only branch on the category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    CorruptArchive,
    UnresolvedRelationship,
    NoSheetsRemaining,
    NoSheetsToRender,
    WriteFailure,
    EngineUnavailable,
    RenderTimeout,
    RenderFailure,
    ValidationFailure,
    EnginesExhausted,
}

/// Last failure recorded for one engine before the orchestrator moved on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineFailure {
    pub engine: String,
    /// Attempts consumed on this engine (0 when it was skipped as unavailable)
    pub attempts: u32,
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::CorruptArchive(_) => ErrorKind::CorruptArchive,
            Error::UnresolvedRelationship { .. } => ErrorKind::UnresolvedRelationship,
            Error::NoSheetsRemaining { .. } => ErrorKind::NoSheetsRemaining,
            Error::NoSheetsToRender { .. } => ErrorKind::NoSheetsToRender,
            Error::WriteFailure { .. } => ErrorKind::WriteFailure,
            Error::EngineUnavailable { .. } => ErrorKind::EngineUnavailable,
            Error::RenderTimeout { .. } => ErrorKind::RenderTimeout,
            Error::RenderFailure { .. } => ErrorKind::RenderFailure,
            Error::ValidationFailure { .. } => ErrorKind::ValidationFailure,
            Error::EnginesExhausted { .. } => ErrorKind::EnginesExhausted,
        }
    }

    /// Whether another attempt on the same engine may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RenderTimeout { .. } | Error::RenderFailure { .. } | Error::ValidationFailure { .. }
        )
    }

    pub(crate) fn corrupt(part: &str, err: impl fmt::Display) -> Self {
        Error::CorruptArchive(format!("{part}: {err}"))
    }

    pub(crate) fn write_failure(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::WriteFailure {
            path: path.into(),
            source,
        }
    }
}

struct FailureList<'a>(&'a [EngineFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "  - {} ({} attempt{}): {}",
                failure.engine,
                failure.attempts,
                if failure.attempts == 1 { "" } else { "s" },
                failure.message
            )?;
        }
        Ok(())
    }
}
