use crate::sheets::StoreError;
use thiserror::Error;

/// Job-level error taxonomy for report generation and record updates.
///
/// Input errors are rejected before any processing; data-integrity errors
/// abort the affected student/subject pair; store errors abort the report for
/// the class being rendered (partial writes are possible and not rolled back).
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid request: {0}")]
    BadInput(String),

    #[error("subject '{subject}' is not in the curriculum for class {class_code}")]
    SubjectNotInCurriculum { class_code: String, subject: String },

    #[error("no batch curriculum defined for class {0}")]
    MissingCurriculum(String),

    #[error("database: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("sheet store: {0}")]
    Store(#[from] StoreError),
}

impl ReportError {
    pub fn code(&self) -> &'static str {
        match self {
            ReportError::BadInput(_) => "bad_params",
            ReportError::SubjectNotInCurriculum { .. } | ReportError::MissingCurriculum(_) => {
                "data_integrity"
            }
            ReportError::Db(_) => "db_query_failed",
            ReportError::Store(_) => "store_failed",
        }
    }
}
