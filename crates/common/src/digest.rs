//! Content hashes used to decide whether a stored artifact is still valid.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Builds a SHA-256 over named, length-prefixed fields.
///
/// Length prefixes keep `("ab", "c")` and `("a", "bc")` distinct.
pub struct InputHasher {
    hasher: Sha256,
}

impl InputHasher {
    /// Start a hash for one stage; the domain keeps stages from colliding.
    pub fn new(domain: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"reelsmith/v1/");
        hasher.update(domain.as_bytes());
        Self { hasher }
    }

    pub fn field(mut self, name: &str, value: impl AsRef<[u8]>) -> Self {
        let value = value.as_ref();
        self.hasher.update((name.len() as u64).to_le_bytes());
        self.hasher.update(name.as_bytes());
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(value);
        self
    }

    pub fn finish(self) -> String {
        to_hex(&self.hasher.finalize())
    }
}

/// SHA-256 of a file's contents, streamed.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
