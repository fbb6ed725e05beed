//! Unified handle over an open file or a socket.
//!
//! On POSIX both are plain integer descriptors; on Windows a file is a
//! kernel `HANDLE` while a socket is a WinSock `SOCKET`. A [`Descriptor`]
//! carries exactly one of them, tagged with what it is, so operations can
//! refuse the wrong kind instead of handing a socket to a file call.
//!
//! A descriptor does not close its handle when dropped: opening and closing
//! belong to whoever created the handle.

use crate::error::{OsError, Result};
use std::fmt;

#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};
#[cfg(windows)]
use std::os::windows::io::{AsRawHandle, AsRawSocket, RawHandle, RawSocket};

/// Native file handle
#[cfg(unix)]
pub type RawFileHandle = RawFd;
/// Native socket handle
#[cfg(unix)]
pub type RawSocketHandle = RawFd;

/// Native file handle
#[cfg(windows)]
pub type RawFileHandle = RawHandle;
/// Native socket handle
#[cfg(windows)]
pub type RawSocketHandle = RawSocket;

/// What a [`Descriptor`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DescriptorKind {
    /// Regular file (or anything opened like one)
    File,
    /// Network socket
    Socket,
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorKind::File => f.write_str("file"),
            DescriptorKind::Socket => f.write_str("socket"),
        }
    }
}

/// An open file or socket handle
#[derive(Debug, PartialEq, Eq)]
pub enum Descriptor {
    /// Open file handle
    File(RawFileHandle),
    /// Socket handle
    Socket(RawSocketHandle),
}

// SAFETY: a Windows HANDLE names a kernel object in the process handle
// table; it is not a pointer into memory and may be used from any thread.
#[cfg(windows)]
unsafe impl Send for Descriptor {}
#[cfg(windows)]
unsafe impl Sync for Descriptor {}

impl Descriptor {
    /// Wrap a native file handle
    pub fn file(handle: RawFileHandle) -> Self {
        Descriptor::File(handle)
    }

    /// Wrap a native socket handle
    pub fn socket(handle: RawSocketHandle) -> Self {
        Descriptor::Socket(handle)
    }

    /// Borrow the handle of an open file.
    ///
    /// The file must outlive every use of the returned descriptor.
    #[cfg(unix)]
    pub fn from_file<F: AsRawFd>(file: &F) -> Self {
        Descriptor::File(file.as_raw_fd())
    }

    /// Borrow the handle of an open file.
    ///
    /// The file must outlive every use of the returned descriptor.
    #[cfg(windows)]
    pub fn from_file<F: AsRawHandle>(file: &F) -> Self {
        Descriptor::File(file.as_raw_handle())
    }

    /// Borrow the handle of an open socket.
    ///
    /// The socket must outlive every use of the returned descriptor.
    #[cfg(unix)]
    pub fn from_socket<S: AsRawFd>(socket: &S) -> Self {
        Descriptor::Socket(socket.as_raw_fd())
    }

    /// Borrow the handle of an open socket.
    ///
    /// The socket must outlive every use of the returned descriptor.
    #[cfg(windows)]
    pub fn from_socket<S: AsRawSocket>(socket: &S) -> Self {
        Descriptor::Socket(socket.as_raw_socket())
    }

    /// Kind of handle held
    pub fn kind(&self) -> DescriptorKind {
        match self {
            Descriptor::File(_) => DescriptorKind::File,
            Descriptor::Socket(_) => DescriptorKind::Socket,
        }
    }

    /// Native file handle, or `InvalidDescriptorKind` for a socket
    pub fn as_file_handle(&self) -> Result<RawFileHandle> {
        self.file_handle_for("as_file_handle")
    }

    /// Native socket handle, or `InvalidDescriptorKind` for a file
    pub fn as_socket_handle(&self) -> Result<RawSocketHandle> {
        self.socket_handle_for("as_socket_handle")
    }

    pub(crate) fn file_handle_for(&self, operation: &'static str) -> Result<RawFileHandle> {
        match self {
            Descriptor::File(handle) => Ok(*handle),
            Descriptor::Socket(_) => Err(OsError::InvalidDescriptorKind {
                operation,
                expected: DescriptorKind::File,
                found: DescriptorKind::Socket,
            }),
        }
    }

    pub(crate) fn socket_handle_for(&self, operation: &'static str) -> Result<RawSocketHandle> {
        match self {
            Descriptor::Socket(handle) => Ok(*handle),
            Descriptor::File(_) => Err(OsError::InvalidDescriptorKind {
                operation,
                expected: DescriptorKind::Socket,
                found: DescriptorKind::File,
            }),
        }
    }

    /// Diagnostic label attached to errors
    pub(crate) fn label(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::File(handle) => write!(f, "file:{handle:?}"),
            Descriptor::Socket(handle) => write!(f, "socket:{handle:?}"),
        }
    }
}
