use chrono::NaiveDate;
use thiserror::Error;

/// Every failure the report pipeline can surface to the operator.
///
/// The `Display` text of each variant is the notice shown on the input form,
/// so keep them short and user-facing.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Please enter sheet URL/ID and date.")]
    MissingInput,

    #[error("Missing sheet or date for preview.")]
    MissingPreviewInput,

    #[error("Invalid date format.")]
    InvalidDate,

    #[error("Template must be a .docx file.")]
    TemplateNotDocx,

    #[error("Unable to read form: {0}")]
    InvalidForm(String),

    #[error("Unable to load Google Sheet: {0}")]
    Fetch(String),

    #[error("Column '{0}' missing in Google Sheet.")]
    MissingColumn(&'static str),

    #[error("No records found for {0}.")]
    NoRecords(NaiveDate),

    #[error("No template uploaded and template.docx not found in project folder.")]
    MissingTemplate,

    #[error("Unable to render documents: {0}")]
    Template(String),

    #[error("Unable to render documents: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Unable to render documents: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown action.")]
    UnknownAction,

    #[error("{0} is missing in the environment")]
    Config(&'static str),
}

impl ReportError {
    /// Notice category used when the error is flashed back to the form.
    pub fn category(&self) -> &'static str {
        match self {
            ReportError::NoRecords(_) => "warning",
            _ => "error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_records_is_a_warning_with_iso_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let err = ReportError::NoRecords(date);
        assert_eq!(err.category(), "warning");
        assert_eq!(err.to_string(), "No records found for 2024-03-05.");
    }

    #[test]
    fn everything_else_is_an_error() {
        assert_eq!(ReportError::MissingTemplate.category(), "error");
        assert_eq!(
            ReportError::MissingColumn("Date").to_string(),
            "Column 'Date' missing in Google Sheet."
        );
        assert_eq!(
            ReportError::Fetch("HTTP status 404 Not Found".into()).to_string(),
            "Unable to load Google Sheet: HTTP status 404 Not Found"
        );
    }
}
