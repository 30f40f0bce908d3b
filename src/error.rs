use std::panic::Location;

use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a failure, independent of the backend that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    OutOfMemory,
    CompileFailed,
    LaunchFailed,
    DeviceLost,
    InvalidArgument,
    /// The driver library or one of its entry points could not be loaded.
    Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{call} returned status {code} ({kind:?}) at {location}")]
    Status {
        kind: ErrorKind,
        call: &'static str,
        code: i32,
        location: &'static Location<'static>,
    },

    #[error("failed to compile `{name}`:\n{log}")]
    Compile { name: String, log: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Status { kind, .. } => *kind,
            Error::Compile { .. } => ErrorKind::CompileFailed,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Error::Unavailable(msg.into())
    }

    /// Builds the error for a failed native call and logs it with the caller's location.
    #[track_caller]
    pub(crate) fn status(kind: ErrorKind, call: &'static str, code: i32) -> Self {
        let location = Location::caller();
        log::error!("{} returned status {} in {}", call, code, location);
        Error::Status {
            kind,
            call,
            code,
            location,
        }
    }

    #[cfg_attr(not(any(feature = "cuda", feature = "opencl")), allow(dead_code))]
    pub(crate) fn compile<N: Into<String>, L: Into<String>>(name: N, log: L) -> Self {
        let name = name.into();
        let log = log.into();
        log::error!("*** {}: {}", name, log);
        Error::Compile { name, log }
    }
}
