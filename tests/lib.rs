//! Shared fixtures for the mlnet OS layer integration tests.

use std::io::Write;
use tempfile::NamedTempFile;

/// Deterministic, non-repeating-at-block-boundaries test content
pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Temporary file holding `data`, flushed to the OS
pub fn temp_file_with(data: &[u8]) -> NamedTempFile {
    let mut temp = NamedTempFile::new().expect("create temp file");
    temp.write_all(data).expect("write temp file");
    temp.flush().expect("flush temp file");
    temp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterned_wraps_at_prime() {
        let data = patterned(600);
        assert_eq!(data[0], 0);
        assert_eq!(data[250], 250);
        assert_eq!(data[251], 0);
    }
}
