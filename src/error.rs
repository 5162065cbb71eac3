//! Errors

use std::io;

use thiserror::Error;

/// Errors generated by this crate
#[derive(Error, Debug)]
pub enum Squash4Error {
    #[error("std io error: {0}")]
    Io(#[from] io::Error),

    #[error("deku error: {0:?}")]
    Deku(#[from] deku::DekuError),

    #[error("not a squashfs v4 image")]
    BadFs,

    #[error("corrupted squashfs image: {0}")]
    Corrupt(&'static str),

    #[error("path not found")]
    NotFound,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("symlink cycle or depth exceeded")]
    SymlinkLoop,
}

impl From<Squash4Error> for io::Error {
    fn from(value: Squash4Error) -> Self {
        use Squash4Error::*;
        match value {
            Io(io) => io,
            NotFound => Self::from(io::ErrorKind::NotFound),
            NotADirectory | IsADirectory => Self::from(io::ErrorKind::InvalidInput),
            BadFs | Corrupt(_) | Deku(_) | SymlinkLoop => Self::from(io::ErrorKind::InvalidData),
        }
    }
}
