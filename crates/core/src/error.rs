use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpnoteError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("invalid report: {0}")]
    Validation(String),
    #[error("report {0} not found")]
    NotFound(i64),
    #[error("de-identification gate failed: {0}")]
    PhiGate(String),
    #[error("index error: {0}")]
    Index(String),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, OpnoteError>;

impl From<anyhow::Error> for OpnoteError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
