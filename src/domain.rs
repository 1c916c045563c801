use std::fmt;
use std::io::Error;

use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;

use crate::dispatcher::Completion;
use crate::router::Tab;

pub const HELP_TEXT: &str =
    " Tab/1-4 switch  ←/→ board  / edit  Enter run  Esc cancel  ↑/↓ scroll  y copy  q quit ";

// Error type shared by the whole pipeline.
#[derive(Debug)]
pub enum DashError {
    IoError(Error),
    PolarsError(PolarsError),
    Configuration(String),
    DataAccess(sqlx::Error),
    Schema(String),
    Validation(String),
    Worker(String),
}

impl DashError {
    /// Errors that end up in an output region instead of stopping the app.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DashError::Configuration(_) | DashError::IoError(_))
    }
}

impl fmt::Display for DashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashError::IoError(e) => write!(f, "io error: {e}"),
            DashError::PolarsError(e) => write!(f, "table error: {e}"),
            DashError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            DashError::DataAccess(e) => write!(f, "data access error: {e}"),
            DashError::Schema(msg) => write!(f, "schema error: {msg}"),
            DashError::Validation(msg) => write!(f, "invalid input: {msg}"),
            DashError::Worker(msg) => write!(f, "background task failed: {msg}"),
        }
    }
}

impl std::error::Error for DashError {}

impl From<Error> for DashError {
    fn from(err: Error) -> Self {
        DashError::IoError(err)
    }
}

impl From<PolarsError> for DashError {
    fn from(err: PolarsError) -> Self {
        match err {
            PolarsError::ColumnNotFound(msg) => {
                DashError::Schema(format!("column not found: {msg}"))
            }
            PolarsError::SchemaMismatch(msg) => DashError::Schema(msg.to_string()),
            other => DashError::PolarsError(other),
        }
    }
}

impl From<tokio::task::JoinError> for DashError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            DashError::Worker("task panicked".to_string())
        } else {
            DashError::Worker(err.to_string())
        }
    }
}

impl From<sqlx::Error> for DashError {
    fn from(err: sqlx::Error) -> Self {
        DashError::DataAccess(err)
    }
}

#[derive(Debug)]
pub enum Message {
    Quit,
    NextTab,
    PrevTab,
    SelectTab(Tab),
    NextOption,
    PrevOption,
    EditFilter,
    RawKey(KeyEvent),
    Submit,
    Cancel,
    MoveUp,
    MoveDown,
    MovePageUp,
    MovePageDown,
    CopyLink,
    Resize(usize),
    Completed(Completion),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_not_found_maps_to_schema_error() {
        let err: DashError = PolarsError::ColumnNotFound("norm_salary".into()).into();
        assert!(matches!(err, DashError::Schema(ref m) if m.contains("norm_salary")));
        assert!(err.is_recoverable());
    }

    #[test]
    fn configuration_errors_are_fatal() {
        let err = DashError::Configuration("DBNAME is not set".into());
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "configuration error: DBNAME is not set");
    }
}
