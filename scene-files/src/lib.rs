use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("The document is violating the expected format, because: {reason}")]
    FormatError { reason: String },

    /// Represents an empty source, e.g. a zero byte file served for an identifier.
    #[error("Source contains no data")]
    EmptySource,

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    /// Represents all other cases of `std::io::Error`.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

pub mod entity;
