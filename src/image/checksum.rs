//! SHA-256 digests and checksum manifests

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::ProvisionError;

const READ_BUF: usize = 1 << 20;

/// Lowercase hex SHA-256 of a file
pub async fn sha256_file(path: &Path) -> Result<String, ProvisionError> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Lowercase hex SHA-256 of a byte slice
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Whether two hex digests are equal, ignoring case and surrounding space
pub fn digests_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Parsed checksum manifest (filename -> hex digest)
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: HashMap<String, String>,
}

impl Manifest {
    /// Parse `SHA256SUMS`-style text
    ///
    /// Accepts GNU lines (`<hex>  [*]<file>`) and BSD lines
    /// (`SHA256 (<file>) = <hex>`). Blank lines, comments and lines without
    /// a valid SHA-256 digest are skipped.
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_line(line) {
                Some((name, digest)) => {
                    entries.insert(name, digest);
                }
                None => debug!("Skipping manifest line: {}", line),
            }
        }

        Self { entries }
    }

    /// Expected digest for `filename`
    pub fn digest_for(&self, filename: &str) -> Option<&str> {
        self.entries.get(filename).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    if let Some(rest) = line.strip_prefix("SHA256 (") {
        let (name, digest) = rest.split_once(") = ")?;
        return valid_digest(digest).map(|d| (normalize_name(name), d));
    }

    let (digest, name) = line.split_once(char::is_whitespace)?;
    let name = name.trim_start();
    let name = name.strip_prefix('*').unwrap_or(name);
    if name.is_empty() {
        return None;
    }
    valid_digest(digest).map(|d| (normalize_name(name), d))
}

fn normalize_name(name: &str) -> String {
    name.strip_prefix("./").unwrap_or(name).to_string()
}

fn valid_digest(digest: &str) -> Option<String> {
    let digest = digest.trim();
    (digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| digest.to_ascii_lowercase())
}
