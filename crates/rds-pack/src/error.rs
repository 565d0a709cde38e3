use std::io;

use rds_types::{ClientError, RdsError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("unexpected end of archive at offset {0}")]
    UnexpectedEof(u64),

    #[error("corrupt header at offset {offset}: {reason}")]
    CorruptHeader { offset: u64, reason: String },

    #[error("header checksum mismatch at offset {0}")]
    ChecksumMismatch(u64),

    #[error("invalid entry path: {0:?}")]
    InvalidPath(String),

    #[error("missing size for streamed entry {0}")]
    MissingSize(String),

    #[error("entry {path} declared {declared} bytes but produced {actual}")]
    SizeMismatch {
        path: String,
        declared: u64,
        actual: u64,
    },

    #[error("archive consumer went away")]
    ConsumerClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type PackResult<T> = Result<T, PackError>;

impl From<PackError> for ClientError {
    fn from(err: PackError) -> Self {
        match err {
            PackError::Io(e) => ClientError::Io(e),
            other => ClientError::Archive(other.to_string()),
        }
    }
}

impl From<PackError> for RdsError {
    fn from(err: PackError) -> Self {
        RdsError::Client(err.into())
    }
}

impl From<PackError> for io::Error {
    fn from(err: PackError) -> Self {
        match err {
            PackError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}
