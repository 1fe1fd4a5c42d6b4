use std::{error, fmt, io};

/// A specialized result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the session runtime.
///
/// The variants separate caller mistakes (`BadArg`), integrator mistakes
/// (`Bug`), and failures propagated from the outside world (`Sys`, `Driver`,
/// `Transform`). `NotFound` is special: removing an event source that is no
/// longer installed is logged as a warning and reported, but it is never
/// fatal to a running session, since source keys may legitimately be reused
/// after removal.
#[derive(Debug)]
pub enum Error {
    /// The caller passed a structurally invalid argument.
    BadArg(&'static str),
    /// An event source with the same key is already installed.
    AlreadyInstalled,
    /// An internal invariant was violated.
    Bug(&'static str),
    /// No event source matches the given key.
    NotFound,
    /// A system call failed.
    Sys(io::Error),
    /// A device driver reported a failure.
    Driver(&'static str),
    /// A transform reported a negative status.
    Transform(i32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadArg(msg) => write!(f, "invalid argument: {}", msg),
            Error::AlreadyInstalled => write!(f, "event source already installed"),
            Error::Bug(msg) => write!(f, "internal error: {}", msg),
            Error::NotFound => write!(f, "no such event source"),
            Error::Sys(err) => write!(f, "system error: {}", err),
            Error::Driver(msg) => write!(f, "driver error: {}", msg),
            Error::Transform(status) => write!(f, "transform failed with status {}", status),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Sys(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Sys(err)
    }
}
