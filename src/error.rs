use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("record is missing required field `{0}`")]
    MissingField(String),

    #[error("field `{field}` has invalid value `{value}`")]
    InvalidField { field: String, value: String },

    #[error("malformed line `{line}`: {reason}")]
    Malformed { line: String, reason: &'static str },

    #[error("remote workbook returned {status} for sheet `{sheet}`")]
    RemoteStatus { sheet: String, status: u16 },

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Time format error: {0}")]
    Time(#[from] time::error::Format),
}

impl Error {
    pub(crate) fn malformed(line: &str, reason: &'static str) -> Self {
        Error::Malformed {
            line: line.to_string(),
            reason,
        }
    }

    pub(crate) fn invalid(field: &str, value: &str) -> Self {
        Error::InvalidField {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
