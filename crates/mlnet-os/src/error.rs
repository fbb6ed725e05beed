//! Translation of native OS error codes into a portable error type.
//!
//! Every fallible call in this crate captures the native code (errno or
//! Win32/WinSock code) at the failure site and turns it into an
//! [`OsError`]. Callers match on the variant, never on raw codes; the raw
//! code stays available through [`OsError::code`] for logging.

use crate::Offset;
use crate::descriptor::DescriptorKind;
use crate::file_io::SeekOrigin;
use std::io;
use thiserror::Error;
use tracing::trace;

/// Result alias used by every fallible operation of this crate.
pub type Result<T> = std::result::Result<T, OsError>;

/// Upper bound on consecutive retries of a call interrupted by a signal.
pub const MAX_INTERRUPT_RETRIES: usize = 64;

/// Portable OS error
#[derive(Debug, Error)]
pub enum OsError {
    /// A file operation was requested on a socket descriptor or vice versa
    #[error("{operation}: expected a {expected} descriptor, got a {found}")]
    InvalidDescriptorKind {
        /// Failing operation
        operation: &'static str,
        /// Kind the operation requires
        expected: DescriptorKind,
        /// Kind actually held by the descriptor
        found: DescriptorKind,
    },

    /// Seek would move the file pointer before the start of the file
    #[error("{operation}{}: position {position} from {origin} is out of range", suffix(.argument))]
    SeekOutOfRange {
        /// Failing operation
        operation: &'static str,
        /// Descriptor description
        argument: Option<String>,
        /// Requested offset
        position: Offset,
        /// Requested origin
        origin: SeekOrigin,
    },

    /// An offset or size does not fit the width used on the other side of the OS boundary
    #[error("{operation}{}: value {value} does not fit a 64-bit file offset", suffix(.argument))]
    OffsetOverflow {
        /// Failing operation
        operation: &'static str,
        /// Descriptor or path description
        argument: Option<String>,
        /// Offending value
        value: i128,
    },

    /// The named file or one of its parent directories does not exist
    #[error("{operation}{}: no such file or directory", suffix(.argument))]
    NotFound {
        /// Native error code
        code: i32,
        /// Failing operation
        operation: &'static str,
        /// Path or descriptor description
        argument: Option<String>,
    },

    /// The OS refused the operation for lack of permission
    #[error("{operation}{}: permission denied", suffix(.argument))]
    AccessDenied {
        /// Native error code
        code: i32,
        /// Failing operation
        operation: &'static str,
        /// Path or descriptor description
        argument: Option<String>,
    },

    /// The call was interrupted by a signal before it completed
    ///
    /// Only produced inside retry loops; never returned to callers.
    #[error("{operation}{}: interrupted system call", suffix(.argument))]
    Interrupted {
        /// Native error code
        code: i32,
        /// Failing operation
        operation: &'static str,
        /// Path or descriptor description
        argument: Option<String>,
    },

    /// Any other failure reported by the OS
    #[error("{operation}{}: {} (os error {code})", suffix(.argument), describe(.code))]
    Os {
        /// Native error code
        code: i32,
        /// Failing operation
        operation: &'static str,
        /// Path or descriptor description
        argument: Option<String>,
    },
}

fn suffix(argument: &Option<String>) -> String {
    match argument {
        Some(arg) => format!(" ({arg})"),
        None => String::new(),
    }
}

fn describe(code: &i32) -> String {
    let message = io::Error::from_raw_os_error(*code).to_string();
    // std appends " (os error N)" itself; the variant prints the code once
    match message.rfind(" (os error") {
        Some(idx) => message[..idx].to_string(),
        None => message,
    }
}

impl OsError {
    /// Build an error from an explicit native error code.
    ///
    /// Used where the OS hands the code back directly (return value of
    /// `posix_fallocate`, a completed `io::Error`, ...).
    pub fn unix_error(code: i32, operation: &'static str, argument: Option<String>) -> Self {
        if native::INTERRUPTED.contains(&code) {
            OsError::Interrupted {
                code,
                operation,
                argument,
            }
        } else if native::NOT_FOUND.contains(&code) {
            OsError::NotFound {
                code,
                operation,
                argument,
            }
        } else if native::ACCESS_DENIED.contains(&code) {
            OsError::AccessDenied {
                code,
                operation,
                argument,
            }
        } else {
            OsError::Os {
                code,
                operation,
                argument,
            }
        }
    }

    /// Build an error from the calling thread's last OS error.
    ///
    /// Must be called right after the failing call returned its sentinel,
    /// before anything else can overwrite errno / `GetLastError`.
    pub fn uerror(operation: &'static str, argument: Option<String>) -> Self {
        Self::from_io(io::Error::last_os_error(), operation, argument)
    }

    /// Translate a `std::io::Error` produced by a standard library call.
    ///
    /// Errors synthesized by std without a native code are mapped to the
    /// closest native code for their kind.
    pub fn from_io(err: io::Error, operation: &'static str, argument: Option<String>) -> Self {
        let code = err
            .raw_os_error()
            .unwrap_or_else(|| native::code_for_kind(err.kind()));
        Self::unix_error(code, operation, argument)
    }

    /// Invalid argument rejected before reaching the OS.
    pub(crate) fn invalid_argument(operation: &'static str, argument: Option<String>) -> Self {
        OsError::Os {
            code: native::INVALID_ARGUMENT,
            operation,
            argument,
        }
    }

    /// Native error code, when the error came from the OS.
    pub fn code(&self) -> Option<i32> {
        match self {
            OsError::NotFound { code, .. }
            | OsError::AccessDenied { code, .. }
            | OsError::Interrupted { code, .. }
            | OsError::Os { code, .. } => Some(*code),
            OsError::InvalidDescriptorKind { .. }
            | OsError::SeekOutOfRange { .. }
            | OsError::OffsetOverflow { .. } => None,
        }
    }

    /// Name of the operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            OsError::InvalidDescriptorKind { operation, .. }
            | OsError::SeekOutOfRange { operation, .. }
            | OsError::OffsetOverflow { operation, .. }
            | OsError::NotFound { operation, .. }
            | OsError::AccessDenied { operation, .. }
            | OsError::Interrupted { operation, .. }
            | OsError::Os { operation, .. } => operation,
        }
    }

    /// Whether the failed call should simply be reissued.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, OsError::Interrupted { .. })
    }

    /// Turn an exhausted interrupt into a plain OS error for the caller.
    fn surface(self) -> Self {
        match self {
            OsError::Interrupted {
                code,
                operation,
                argument,
            } => OsError::Os {
                code,
                operation,
                argument,
            },
            other => other,
        }
    }
}

/// Run `op` until it completes with anything other than an interrupt.
///
/// Gives up after [`MAX_INTERRUPT_RETRIES`] consecutive interrupts, in which
/// case the interrupt is reported as an ordinary [`OsError::Os`].
pub(crate) fn retry_interrupted<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut retries = 0;
    loop {
        match op() {
            Err(err) if err.is_interrupted() && retries < MAX_INTERRUPT_RETRIES => {
                retries += 1;
                trace!(retries, "{err}, retrying");
            }
            Err(err) => return Err(err.surface()),
            ok => return ok,
        }
    }
}

#[cfg(unix)]
mod native {
    use std::io::ErrorKind;

    pub(crate) const INTERRUPTED: &[i32] = &[libc::EINTR];
    pub(crate) const NOT_FOUND: &[i32] = &[libc::ENOENT, libc::ENOTDIR];
    pub(crate) const ACCESS_DENIED: &[i32] = &[libc::EACCES, libc::EPERM];
    pub(crate) const INVALID_ARGUMENT: i32 = libc::EINVAL;
    pub(crate) const SEEK_OUT_OF_RANGE: i32 = libc::EINVAL;
    pub(crate) const IS_DIRECTORY: i32 = libc::EISDIR;

    pub(crate) fn code_for_kind(kind: ErrorKind) -> i32 {
        match kind {
            ErrorKind::NotFound => libc::ENOENT,
            ErrorKind::PermissionDenied => libc::EACCES,
            ErrorKind::Interrupted => libc::EINTR,
            ErrorKind::InvalidInput | ErrorKind::InvalidData => libc::EINVAL,
            ErrorKind::Unsupported => libc::ENOTSUP,
            _ => libc::EIO,
        }
    }
}

#[cfg(windows)]
mod native {
    use std::io::ErrorKind;
    use windows_sys::Win32::Foundation::{
        ERROR_ACCESS_DENIED, ERROR_DIRECTORY_NOT_SUPPORTED, ERROR_FILE_NOT_FOUND, ERROR_GEN_FAILURE,
        ERROR_INVALID_PARAMETER, ERROR_NEGATIVE_SEEK, ERROR_NOT_SUPPORTED, ERROR_PATH_NOT_FOUND,
    };
    use windows_sys::Win32::Networking::WinSock::{WSAEACCES, WSAEINTR};

    pub(crate) const INTERRUPTED: &[i32] = &[WSAEINTR];
    pub(crate) const NOT_FOUND: &[i32] = &[ERROR_FILE_NOT_FOUND as i32, ERROR_PATH_NOT_FOUND as i32];
    pub(crate) const ACCESS_DENIED: &[i32] = &[ERROR_ACCESS_DENIED as i32, WSAEACCES];
    pub(crate) const INVALID_ARGUMENT: i32 = ERROR_INVALID_PARAMETER as i32;
    pub(crate) const SEEK_OUT_OF_RANGE: i32 = ERROR_NEGATIVE_SEEK as i32;
    pub(crate) const IS_DIRECTORY: i32 = ERROR_DIRECTORY_NOT_SUPPORTED as i32;

    pub(crate) fn code_for_kind(kind: ErrorKind) -> i32 {
        match kind {
            ErrorKind::NotFound => ERROR_FILE_NOT_FOUND as i32,
            ErrorKind::PermissionDenied => ERROR_ACCESS_DENIED as i32,
            ErrorKind::Interrupted => WSAEINTR,
            ErrorKind::InvalidInput | ErrorKind::InvalidData => ERROR_INVALID_PARAMETER as i32,
            ErrorKind::Unsupported => ERROR_NOT_SUPPORTED as i32,
            _ => ERROR_GEN_FAILURE as i32,
        }
    }
}

pub(crate) use native::{IS_DIRECTORY, SEEK_OUT_OF_RANGE};
