//! Scratch buffer for streaming file contents into a hash function.
//!
//! Hashing reads a file block by block; the buffer is allocated once and
//! reused for every block instead of allocating per read. Its capacity,
//! [`HASH_BUFFER_LEN`], is fixed for the lifetime of the process so callers
//! can size their read loops against it.
//!
//! A [`HashBuffer`] is not synchronized. The process-wide instance returned
//! by [`shared_hash_buffer`] sits behind a mutex that callers hold for the
//! whole fill/drain cycle.

use crate::descriptor::Descriptor;
use crate::error::Result;
use crate::file_io;
use std::fmt;
use std::sync::{Mutex, OnceLock};

/// Capacity of a [`HashBuffer`] in bytes (128 KiB)
pub const HASH_BUFFER_LEN: usize = 131_072;

/// Fixed-capacity byte buffer with a fill length
pub struct HashBuffer {
    storage: Box<[u8]>,
    len: usize,
}

impl HashBuffer {
    /// Allocate an empty buffer of [`HASH_BUFFER_LEN`] bytes
    pub fn new() -> Self {
        Self {
            storage: vec![0u8; HASH_BUFFER_LEN].into_boxed_slice(),
            len: 0,
        }
    }

    /// Capacity in bytes, always [`HASH_BUFFER_LEN`]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of valid bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no bytes are held
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The whole storage, for filling
    ///
    /// Call [`set_len`](Self::set_len) afterwards to record how much was
    /// written.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// The valid bytes
    pub fn filled(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    /// Record the number of valid bytes, clamped to the capacity
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.storage.len());
    }

    /// Forget the contents
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Replace the contents with the next block read from `fd`.
    ///
    /// Returns the number of bytes read; `0` means end of file and leaves
    /// the buffer empty.
    pub fn fill_from(&mut self, fd: &Descriptor) -> Result<usize> {
        self.len = 0;
        let n = file_io::read(fd, &mut self.storage)?;
        self.len = n;
        Ok(n)
    }
}

impl Default for HashBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HashBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .finish()
    }
}

static SHARED: OnceLock<Mutex<HashBuffer>> = OnceLock::new();

/// The process-wide hash buffer, allocated on first use.
pub fn shared_hash_buffer() -> &'static Mutex<HashBuffer> {
    SHARED.get_or_init(|| Mutex::new(HashBuffer::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_capacity_is_constant() {
        let mut buffer = HashBuffer::new();
        assert_eq!(buffer.capacity(), HASH_BUFFER_LEN);
        assert_eq!(buffer.as_mut_slice().len(), HASH_BUFFER_LEN);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_set_len_is_clamped() {
        let mut buffer = HashBuffer::new();
        buffer.set_len(HASH_BUFFER_LEN + 10);
        assert_eq!(buffer.len(), HASH_BUFFER_LEN);
        buffer.clear();
        assert!(buffer.filled().is_empty());
    }

    #[test]
    fn test_fill_from_streams_file() {
        let data: Vec<u8> = (0..HASH_BUFFER_LEN + 1000).map(|i| (i % 251) as u8).collect();
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&data).unwrap();
        temp.flush().unwrap();

        let file = std::fs::File::open(temp.path()).unwrap();
        let fd = Descriptor::from_file(&file);
        let mut buffer = HashBuffer::new();
        let mut hasher = blake3::Hasher::new();
        let mut total = 0;

        while buffer.fill_from(&fd).unwrap() > 0 {
            hasher.update(buffer.filled());
            total += buffer.len();
        }

        assert!(buffer.is_empty());
        assert_eq!(total, data.len());
        assert_eq!(hasher.finalize(), blake3::hash(&data));
    }

    #[test]
    fn test_shared_buffer_is_single_instance() {
        let a = shared_hash_buffer();
        let b = shared_hash_buffer();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.lock().unwrap().capacity(), HASH_BUFFER_LEN);
    }

    #[test]
    fn test_debug_does_not_dump_storage() {
        let text = format!("{:?}", HashBuffer::new());
        assert_eq!(text, "HashBuffer { capacity: 131072, len: 0 }");
    }
}
