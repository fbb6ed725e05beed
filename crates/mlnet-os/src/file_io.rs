//! Large-file I/O on raw descriptors.
//!
//! Every position and length crosses this API as a 64-bit [`Offset`],
//! whatever the width of the host's native offset type. The OS is always
//! reached through its 64-bit entry points (`lseek64`/`ftruncate64`/
//! `fstat64` on Linux, `SetFilePointerEx`/`GetFileSizeEx` and friends on
//! Windows); values that cannot cross the boundary are rejected with
//! [`OsError::OffsetOverflow`] instead of being truncated.
//!
//! The functions borrow the native handle for the duration of one call and
//! never close it.

use crate::Offset;
use crate::descriptor::{Descriptor, RawFileHandle};
use crate::error::{IS_DIRECTORY, OsError, Result, SEEK_OUT_OF_RANGE, retry_interrupted};
use crate::platform;
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::mem::ManuallyDrop;
use std::path::Path;
use tracing::debug;

#[cfg(unix)]
use std::os::unix::io::FromRawFd;
#[cfg(windows)]
use std::os::windows::io::FromRawHandle;

/// Size of the zero block written when a file is extended without holes
/// and the filesystem cannot preallocate.
pub const ZERO_FILL_CHUNK: usize = 64 * 1024;

/// Descriptor table size reported on Windows, where sockets are polled
/// through a `select` set of this many entries.
#[cfg(windows)]
pub const WINSOCK_SET_SIZE: i32 = 1024;

/// Used when the OS cannot report its descriptor limit.
#[cfg(unix)]
const FALLBACK_DTABLE_SIZE: i32 = 1024;

/// Reference point of a [`seek`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SeekOrigin {
    /// Beginning of the file (`SEEK_SET` / `FILE_BEGIN`)
    Start,
    /// Current file pointer (`SEEK_CUR` / `FILE_CURRENT`)
    Current,
    /// End of the file (`SEEK_END` / `FILE_END`)
    End,
}

impl fmt::Display for SeekOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeekOrigin::Start => f.write_str("start"),
            SeekOrigin::Current => f.write_str("current"),
            SeekOrigin::End => f.write_str("end"),
        }
    }
}

/// View a borrowed native handle as a `File` without taking ownership.
fn borrow_file(handle: RawFileHandle) -> ManuallyDrop<File> {
    // SAFETY: the descriptor keeps the handle open for the duration of the
    // call, and ManuallyDrop keeps the File from closing it afterwards.
    #[cfg(unix)]
    let file = unsafe { File::from_raw_fd(handle) };
    #[cfg(windows)]
    let file = unsafe { File::from_raw_handle(handle) };
    ManuallyDrop::new(file)
}

fn to_offset(value: u64, operation: &'static str, argument: Option<String>) -> Result<Offset> {
    Offset::try_from(value).map_err(|_| OsError::OffsetOverflow {
        operation,
        argument,
        value: value.into(),
    })
}

/// Move the file pointer and return its new absolute position.
///
/// A target before the start of the file fails with
/// [`OsError::SeekOutOfRange`]; seeking past the end is allowed.
///
/// # Examples
/// ```no_run
/// use mlnet_os::{Descriptor, SeekOrigin, file_io};
///
/// let file = std::fs::File::open("/var/lib/mlnet/temp/chunk.part").unwrap();
/// let fd = Descriptor::from_file(&file);
/// let end = file_io::seek(&fd, 0, SeekOrigin::End).unwrap();
/// println!("file ends at {end}");
/// ```
pub fn seek(fd: &Descriptor, pos: Offset, origin: SeekOrigin) -> Result<Offset> {
    let handle = fd.file_handle_for("seek")?;
    let out_of_range = || OsError::SeekOutOfRange {
        operation: "seek",
        argument: fd.label(),
        position: pos,
        origin,
    };

    let target = match origin {
        SeekOrigin::Start => SeekFrom::Start(u64::try_from(pos).map_err(|_| out_of_range())?),
        SeekOrigin::Current => SeekFrom::Current(pos),
        SeekOrigin::End => SeekFrom::End(pos),
    };

    let mut file = borrow_file(handle);
    let new_pos = file.seek(target).map_err(|err| {
        // A positive target past the filesystem limit fails with the same
        // code and stays an OS error
        if pos < 0 && err.raw_os_error() == Some(SEEK_OUT_OF_RANGE) {
            out_of_range()
        } else {
            OsError::from_io(err, "seek", fd.label())
        }
    })?;

    to_offset(new_pos, "seek", fd.label())
}

/// Set the length of the file to `len` bytes.
///
/// Shrinking discards the tail. When the file grows and `sparse` is set on
/// a platform that supports sparse files, the new range is left as a hole
/// that reads as zeroes without occupying disk blocks; otherwise the range
/// is zero-filled and allocated. Filesystems that cannot hold holes (FAT,
/// some network filesystems) silently store the zeroes instead.
///
/// The file pointer is not moved.
pub fn truncate(fd: &Descriptor, len: Offset, sparse: bool) -> Result<()> {
    let handle = fd.file_handle_for("ftruncate")?;
    let new_len =
        u64::try_from(len).map_err(|_| OsError::invalid_argument("ftruncate", fd.label()))?;

    let file = borrow_file(handle);
    let current = file
        .metadata()
        .map_err(|err| OsError::from_io(err, "fstat", fd.label()))?
        .len();

    if new_len <= current {
        return set_len(&file, fd, new_len);
    }

    if sparse && platform::supports_sparse_files() {
        extend_sparse(&file, fd, new_len)
    } else {
        if sparse {
            debug!("{fd}: sparse files unsupported on this platform, extending with zeroes");
        }
        extend_allocated(&file, fd, current, new_len)
    }
}

fn set_len(file: &File, fd: &Descriptor, len: u64) -> Result<()> {
    file.set_len(len)
        .map_err(|err| OsError::from_io(err, "ftruncate", fd.label()))
}

#[cfg(unix)]
fn extend_sparse(file: &File, fd: &Descriptor, len: u64) -> Result<()> {
    // ftruncate past the end leaves a hole on every filesystem that has them
    set_len(file, fd, len)
}

#[cfg(windows)]
fn extend_sparse(file: &File, fd: &Descriptor, len: u64) -> Result<()> {
    if !set_sparse_flag(file, fd, true) {
        debug!("{fd}: extending without holes");
    }
    set_len(file, fd, len)
}

/// Set or clear the NTFS sparse attribute. Returns false when the
/// filesystem refuses, which is logged and otherwise ignored.
#[cfg(windows)]
fn set_sparse_flag(file: &File, fd: &Descriptor, sparse: bool) -> bool {
    use std::os::windows::io::AsRawHandle;
    use std::ptr;
    use windows_sys::Win32::System::IO::DeviceIoControl;
    use windows_sys::Win32::System::Ioctl::{FILE_SET_SPARSE_BUFFER, FSCTL_SET_SPARSE};

    let mut returned = 0u32;
    // SAFETY: the handle is open for the duration of the call. Without an
    // input buffer FSCTL_SET_SPARSE sets the flag; clearing it takes a
    // zeroed FILE_SET_SPARSE_BUFFER. Neither form produces output.
    let ok = unsafe {
        if sparse {
            DeviceIoControl(
                file.as_raw_handle(),
                FSCTL_SET_SPARSE,
                ptr::null(),
                0,
                ptr::null_mut(),
                0,
                &mut returned,
                ptr::null_mut(),
            )
        } else {
            let clear = FILE_SET_SPARSE_BUFFER {
                SetSparse: Default::default(),
            };
            DeviceIoControl(
                file.as_raw_handle(),
                FSCTL_SET_SPARSE,
                ptr::from_ref(&clear).cast(),
                std::mem::size_of::<FILE_SET_SPARSE_BUFFER>() as u32,
                ptr::null_mut(),
                0,
                &mut returned,
                ptr::null_mut(),
            )
        }
    };
    if ok == 0 {
        let err = OsError::uerror("FSCTL_SET_SPARSE", fd.label());
        debug!(sparse, "{err}");
        return false;
    }
    true
}

#[cfg(unix)]
fn extend_allocated(file: &File, fd: &Descriptor, from: u64, to: u64) -> Result<()> {
    if preallocate(file, fd, from, to)? {
        return Ok(());
    }
    debug!("{fd}: preallocation unavailable, writing {} zero bytes", to - from);
    zero_fill(file, fd, from, to)
}

#[cfg(windows)]
fn extend_allocated(file: &File, fd: &Descriptor, _from: u64, to: u64) -> Result<()> {
    // An earlier sparse extension leaves the attribute set, and NTFS would
    // keep the new range as a hole. Holes already present stay unallocated.
    set_sparse_flag(file, fd, false);
    // Extending a non-sparse file makes NTFS allocate and zero the range
    set_len(file, fd, to)
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
use libc::{off64_t as native_off_t, posix_fallocate64 as native_fallocate};
#[cfg(any(
    all(target_os = "linux", not(target_env = "gnu")),
    target_os = "freebsd"
))]
use libc::{off_t as native_off_t, posix_fallocate as native_fallocate};

/// Allocate `[from, to)`, growing the file. Returns `false` when the
/// filesystem does not support preallocation.
#[cfg(any(target_os = "linux", target_os = "freebsd"))]
fn preallocate(file: &File, fd: &Descriptor, from: u64, to: u64) -> Result<bool> {
    use std::os::unix::io::AsRawFd;

    let narrow = |value: u64| {
        native_off_t::try_from(value).map_err(|_| OsError::OffsetOverflow {
            operation: "posix_fallocate",
            argument: fd.label(),
            value: value.into(),
        })
    };
    let offset = narrow(from)?;
    let len = narrow(to - from)?;

    retry_interrupted(|| {
        // SAFETY: plain syscall on a descriptor that stays open for the call.
        // posix_fallocate reports failure through its return value, not errno.
        let rc = unsafe { native_fallocate(file.as_raw_fd(), offset, len) };
        match rc {
            0 => Ok(true),
            libc::EOPNOTSUPP | libc::EINVAL => Ok(false),
            rc => Err(OsError::unix_error(rc, "posix_fallocate", fd.label())),
        }
    })
}

#[cfg(all(unix, not(any(target_os = "linux", target_os = "freebsd"))))]
fn preallocate(_file: &File, _fd: &Descriptor, _from: u64, _to: u64) -> Result<bool> {
    Ok(false)
}

#[cfg(unix)]
static ZEROES: [u8; ZERO_FILL_CHUNK] = [0; ZERO_FILL_CHUNK];

#[cfg(unix)]
fn zero_fill(file: &File, fd: &Descriptor, from: u64, to: u64) -> Result<()> {
    use std::os::unix::fs::FileExt;

    let mut offset = from;
    while offset < to {
        let n = (to - offset).min(ZERO_FILL_CHUNK as u64) as usize;
        // positional writes leave the file pointer alone
        file.write_all_at(&ZEROES[..n], offset)
            .map_err(|err| OsError::from_io(err, "ftruncate", fd.label()))?;
        offset += n as u64;
    }
    Ok(())
}

/// Read up to `buf.len()` bytes at the current file position.
///
/// Returns the number of bytes read, `0` at end of file. Calls interrupted
/// by a signal are reissued transparently.
pub fn read(fd: &Descriptor, buf: &mut [u8]) -> Result<usize> {
    let handle = fd.file_handle_for("read")?;
    let mut file = borrow_file(handle);

    retry_interrupted(|| {
        file.read(&mut buf[..])
            .map_err(|err| OsError::from_io(err, "read", fd.label()))
    })
}

/// Maximum number of descriptors the process may have open at once.
#[cfg(unix)]
pub fn dtable_size() -> i32 {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit only writes into the struct it is given.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } == 0 {
        if limit.rlim_cur == libc::RLIM_INFINITY {
            return i32::MAX;
        }
        return i32::try_from(limit.rlim_cur).unwrap_or(i32::MAX);
    }

    let err = OsError::uerror("getrlimit", None);
    debug!("{err}; asking sysconf instead");

    // SAFETY: sysconf has no memory side effects.
    let open_max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    if open_max > 0 {
        i32::try_from(open_max).unwrap_or(i32::MAX)
    } else {
        FALLBACK_DTABLE_SIZE
    }
}

/// Maximum number of descriptors the process may have open at once.
#[cfg(windows)]
pub fn dtable_size() -> i32 {
    WINSOCK_SET_SIZE
}

/// Size in bytes of the open file, from its status rather than by seeking.
pub fn fd_size(fd: &Descriptor) -> Result<Offset> {
    let file = borrow_file(fd.file_handle_for("fstat")?);
    let len = file
        .metadata()
        .map_err(|err| OsError::from_io(err, "fstat", fd.label()))?
        .len();
    to_offset(len, "fstat", fd.label())
}

/// Size in bytes of the file at `path`, without opening it.
///
/// Fails with [`OsError::NotFound`] when the path does not exist and
/// [`OsError::AccessDenied`] when it cannot be inspected. A directory has
/// no content length and fails with [`OsError::Os`] carrying `EISDIR`
/// (`ERROR_DIRECTORY_NOT_SUPPORTED` on Windows).
pub fn path_size<P: AsRef<Path>>(path: P) -> Result<Offset> {
    let path = path.as_ref();
    let label = || Some(path.display().to_string());
    let meta = fs::metadata(path).map_err(|err| OsError::from_io(err, "stat", label()))?;
    if meta.is_dir() {
        return Err(OsError::unix_error(IS_DIRECTORY, "stat", label()));
    }
    to_offset(meta.len(), "stat", label())
}

/// Bytes of storage physically allocated to the file, when the OS reports it.
///
/// Holes in a sparse file do not count. `None` where the platform has no
/// cheap way to tell (Windows).
#[cfg(unix)]
pub fn allocated_bytes(fd: &Descriptor) -> Result<Option<Offset>> {
    use std::os::unix::fs::MetadataExt;

    let file = borrow_file(fd.file_handle_for("fstat")?);
    let meta = file
        .metadata()
        .map_err(|err| OsError::from_io(err, "fstat", fd.label()))?;
    // st_blocks is in 512-byte units regardless of the filesystem block size
    to_offset(meta.blocks().saturating_mul(512), "fstat", fd.label()).map(Some)
}

/// Bytes of storage physically allocated to the file, when the OS reports it.
#[cfg(windows)]
pub fn allocated_bytes(fd: &Descriptor) -> Result<Option<Offset>> {
    fd.file_handle_for("fstat")?;
    Ok(None)
}
