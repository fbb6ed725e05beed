//! # mlnet OS
//!
//! Operating-system abstraction layer for the mlnet transfer and hashing
//! engine.
//!
//! This crate provides:
//! - Platform detection, probed once per process
//! - A single descriptor type over POSIX descriptors and Windows
//!   file/socket handles
//! - Large-file I/O with 64-bit offsets and sparse truncation
//! - Non-blocking socket mode control
//! - Translation of native error codes into [`OsError`]
//! - A fixed-size scratch buffer for streaming file contents into a hash
//!
//! Every operation is synchronous and may block the calling thread for the
//! duration of its system call. Concurrent use of one descriptor from
//! several threads needs external locking.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod descriptor;
pub mod error;
pub mod file_io;
pub mod hash_buffer;
pub mod platform;
pub mod socket;

pub use descriptor::{Descriptor, DescriptorKind, RawFileHandle, RawSocketHandle};
pub use error::{OsError, Result};
pub use file_io::{SeekOrigin, dtable_size, fd_size, path_size, read, seek, truncate};
pub use hash_buffer::{HASH_BUFFER_LEN, HashBuffer, shared_hash_buffer};
pub use platform::{OsFamily, PlatformInfo, detect_platform, is_supported};
pub use socket::set_nonblocking;

/// Byte position or length in a file, 64 bits on every platform
pub type Offset = i64;
