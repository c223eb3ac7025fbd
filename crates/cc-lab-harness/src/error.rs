use cc_lab_abstract::{ImpairmentSetting, InvalidSetting, Metric, MissingReason};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The emulated link could not be put into the requested state.
#[derive(Debug, Error)]
pub enum ImpairmentError {
    #[error(transparent)]
    Invalid(#[from] InvalidSetting),
    #[error("failed to run `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Rejected {
        command: String,
        status: String,
        stderr: String,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not apply {setting}")]
    Impairment {
        setting: ImpairmentSetting,
        #[source]
        source: ImpairmentError,
    },
    #[error("failed to launch {peer} `{program}`")]
    Spawn {
        peer: &'static str,
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for {peer}")]
    Wait {
        peer: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("session did not complete within {0:?}")]
    Timeout(Duration),
    #[error("{peer} exited with {status}")]
    ExitStatus { peer: &'static str, status: String },
    #[error("failed to prepare log directory {path}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    /// Sentinel recorded for the sweep point this error ended.
    pub fn missing_reason(&self) -> MissingReason {
        match self {
            SessionError::Impairment { .. } => MissingReason::ImpairmentFailed,
            SessionError::Timeout(_) => MissingReason::SessionTimedOut,
            SessionError::Spawn { .. }
            | SessionError::Wait { .. }
            | SessionError::ExitStatus { .. }
            | SessionError::LogDir { .. } => MissingReason::SessionFailed,
        }
    }
}

/// A raw log broke the column-count or ordering invariant.
#[derive(Debug, Error)]
pub enum LogFormatError {
    #[error("failed to read {metric} log {path}")]
    Io {
        metric: Metric,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: expected {expected} columns, found {found}")]
    ColumnCount {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("{path}:{line}: column {column} is not a number: {value:?}")]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        value: String,
    },
    #[error("{path}:{line}: independent variable went backwards ({previous} -> {current})")]
    NotMonotonic {
        path: PathBuf,
        line: usize,
        previous: f64,
        current: f64,
    },
    #[error("{path}: {reduction} of the log is not finite ({value})")]
    NonFinite {
        path: PathBuf,
        reduction: String,
        value: f64,
    },
}

impl LogFormatError {
    /// The log was never written, as opposed to being written badly.
    pub fn is_absent(&self) -> bool {
        matches!(self, LogFormatError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("existing archive {path} could not be cleared; raw logs left in place")]
    Conflict {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("refusing to archive an incomplete sweep")]
    IncompleteSweep,
    #[error("failed to move {from} to {to}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
