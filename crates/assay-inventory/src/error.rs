use std::path::PathBuf;

use assay_common::error::CommonError;
use thiserror::Error;

pub type InventoryResult<T> = Result<T, InventoryError>;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl InventoryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InventoryError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        InventoryError::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        InventoryError::InternalError(message.into())
    }
}

impl From<CommonError> for InventoryError {
    fn from(error: CommonError) -> Self {
        match error {
            CommonError::MissingArgument(message)
            | CommonError::InvalidArgument(message)
            | CommonError::NotSupported(message) => InventoryError::InvalidArgument(message),
            CommonError::InternalError(message) => InventoryError::InternalError(message),
        }
    }
}
