//! Crate-wide error type.
//!
//! One `thiserror`-derived enum covers both the file system and the
//! scheduler, rather than a per-module `Fat`/`Dir`/`File` split: this
//! crate is consumed through a single facade, so a single error type is
//! the natural seam.

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("name too long: {0:?}")]
    NameTooLong(String),

    #[error("root directory is full")]
    DirFull,

    #[error("no free clusters remain")]
    OutOfSpace,

    #[error("invalid mode: {0:?}")]
    BadMode(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("authentication failed")]
    AuthFailed,

    #[error("account locked")]
    AuthLocked,

    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("user {0:?} already exists")]
    UserExists(String),

    #[error("user {0:?} not found")]
    UserNotFound(String),

    #[error("group {0:?} already exists")]
    GroupExists(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
