//! Host platform detection.
//!
//! The host is probed once, on first use, and the result is cached for the
//! lifetime of the process. Upper layers use [`is_supported`] to gate
//! features that depend on validated OS behavior, such as sparse
//! truncation.

use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

/// Version string reported when the OS cannot be introspected
pub const UNKNOWN_VERSION: &str = "unknown";

/// Broad OS family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OsFamily {
    /// POSIX systems (Linux, BSDs, macOS, ...)
    Unix,
    /// Windows NT family
    Windows,
    /// Anything this crate was not built for
    Unknown,
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsFamily::Unix => f.write_str("unix"),
            OsFamily::Windows => f.write_str("windows"),
            OsFamily::Unknown => f.write_str("unknown"),
        }
    }
}

/// Description of the running OS
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlatformInfo {
    /// OS family
    pub family: OsFamily,
    /// OS name (`Linux`, `Darwin`, `FreeBSD`, `Windows`, ...)
    pub name: String,
    /// Kernel release or OS version, or [`UNKNOWN_VERSION`]
    pub version: String,
    /// Hardware architecture
    pub machine: String,
    /// Whether this OS is one the engine has been validated on
    pub supported: bool,
}

impl PlatformInfo {
    /// One-line `uname`-style summary, e.g. `Linux 6.8.0 x86_64`
    pub fn describe(&self) -> String {
        format!("{} {} {}", self.name, self.version, self.machine)
    }
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

static PLATFORM: OnceLock<PlatformInfo> = OnceLock::new();

/// Cached platform description, probed on first call.
pub fn platform() -> &'static PlatformInfo {
    PLATFORM.get_or_init(|| {
        let info = probe();
        debug!(
            family = %info.family,
            supported = info.supported,
            "detected platform {}",
            info.describe()
        );
        info
    })
}

/// Describe the running OS. Never fails.
pub fn detect_platform() -> PlatformInfo {
    platform().clone()
}

/// Whether the running OS is one the engine has been validated on.
pub fn is_supported() -> bool {
    platform().supported
}

/// Whether [`truncate`](crate::file_io::truncate) may leave holes when
/// asked to.
///
/// Every supported Unix can; on Windows, sparse files exist from NT 5.0
/// onwards, which is also the supported baseline.
pub fn supports_sparse_files() -> bool {
    let info = platform();
    info.supported && matches!(info.family, OsFamily::Unix | OsFamily::Windows)
}

#[cfg(unix)]
fn utsname_field(field: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = field
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(unix)]
fn probe() -> PlatformInfo {
    use crate::error::OsError;
    use std::mem::MaybeUninit;

    let mut uts = MaybeUninit::<libc::utsname>::zeroed();
    // SAFETY: uname fills the struct we hand it; it was zeroed beforehand so
    // every field is a NUL-terminated array even if uname leaves one short.
    let rc = unsafe { libc::uname(uts.as_mut_ptr()) };
    if rc != 0 {
        let err = OsError::uerror("uname", None);
        debug!("{err}; platform version unknown");
        return PlatformInfo {
            family: OsFamily::Unix,
            name: std::env::consts::OS.to_string(),
            version: UNKNOWN_VERSION.to_string(),
            machine: std::env::consts::ARCH.to_string(),
            supported: true,
        };
    }
    // SAFETY: zero-initialized and then filled by a successful uname
    let uts = unsafe { uts.assume_init() };

    PlatformInfo {
        family: OsFamily::Unix,
        name: utsname_field(&uts.sysname),
        version: utsname_field(&uts.release),
        machine: utsname_field(&uts.machine),
        supported: true,
    }
}

/// Oldest Windows major version the engine supports (Windows 2000, NT 5.0)
#[cfg(windows)]
pub const MIN_WINDOWS_MAJOR: u32 = 5;

#[cfg(windows)]
fn probe() -> PlatformInfo {
    use crate::error::OsError;
    use windows_sys::Win32::System::SystemInformation::{GetVersionExW, OSVERSIONINFOW};

    // SAFETY: OSVERSIONINFOW is plain data; all-zero is a valid value
    let mut version: OSVERSIONINFOW = unsafe { std::mem::zeroed() };
    version.dwOSVersionInfoSize = std::mem::size_of::<OSVERSIONINFOW>() as u32;

    // SAFETY: the struct is correctly sized and writable
    let ok = unsafe { GetVersionExW(&mut version) };
    if ok == 0 {
        let err = OsError::uerror("GetVersionExW", None);
        debug!("{err}; platform version unknown");
        return PlatformInfo {
            family: OsFamily::Windows,
            name: "Windows".to_string(),
            version: UNKNOWN_VERSION.to_string(),
            machine: std::env::consts::ARCH.to_string(),
            supported: false,
        };
    }

    // Without a compatibility manifest this reports at most 6.2, which is
    // still enough to tell NT 5.0+ apart from older releases.
    PlatformInfo {
        family: OsFamily::Windows,
        name: "Windows".to_string(),
        version: format!(
            "{}.{}.{}",
            version.dwMajorVersion, version.dwMinorVersion, version.dwBuildNumber
        ),
        machine: std::env::consts::ARCH.to_string(),
        supported: version.dwMajorVersion >= MIN_WINDOWS_MAJOR,
    }
}

#[cfg(not(any(unix, windows)))]
fn probe() -> PlatformInfo {
    PlatformInfo {
        family: OsFamily::Unknown,
        name: std::env::consts::OS.to_string(),
        version: UNKNOWN_VERSION.to_string(),
        machine: std::env::consts::ARCH.to_string(),
        supported: false,
    }
}
