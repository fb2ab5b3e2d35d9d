//! Content hashing for build staleness decisions

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Compute the content digest of a file as a hex string.
///
/// A missing or unreadable file hashes to the empty string, which compares
/// unequal to every recorded digest and so always triggers a rebuild.
pub fn file_hash<P: AsRef<Path>>(path: P) -> String {
    let file = match File::open(path.as_ref()) {
        Ok(file) => file,
        Err(_) => return String::new(),
    };

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(n) => n,
            Err(_) => return String::new(),
        };
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    hex::encode(hasher.finalize())
}

/// Compute the digest of an in-memory byte string as a hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
