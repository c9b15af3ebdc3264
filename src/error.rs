use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Error, Debug)]
pub enum AuditError {
    /// Operator-supplied settings that the pipeline cannot work with
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Image buffer that could not be decoded or encoded
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Detector output or manual counts that violate the record shape
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("config file error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<image::ImageError> for AuditError {
    fn from(err: image::ImageError) -> Self {
        AuditError::InvalidImage(err.to_string())
    }
}
