// SPDX-License-Identifier: Apache-2.0

//! Boot-image hashing in the RFC 8572 hex-string form.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256, Sha384};

use crate::error::{Error, Result};

const CHUNK_SIZE: usize = 64 * 1024;

/// Digest algorithms accepted for image-verification entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
}

impl HashAlgorithm {
    /// Parses a caller-supplied algorithm name. A colon-delimited namespace
    /// prefix (`ietf-sztp-conveyed-info:sha-256`) is dropped and hyphens in
    /// the remaining segment are ignored. Unknown names are an error, never
    /// a silent default.
    pub fn parse(name: &str) -> Result<Self> {
        let tail = name.rsplit(':').next().unwrap_or(name);
        match tail.replace('-', "").to_ascii_lowercase().as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            _ => Err(Error::InvalidInput(format!(
                "unsupported hash algorithm '{name}'"
            ))),
        }
    }

    /// Identity recorded in serialized `image-verification` entries.
    pub fn conveyed_info_identity(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "ietf-sztp-conveyed-info:sha-256",
            HashAlgorithm::Sha384 => "ietf-sztp-conveyed-info:sha-384",
        }
    }
}

/// Hashes the file at `path`, reading it in fixed-size chunks so large
/// boot images never have to fit in memory, and renders the digest as
/// lower-case hex octet pairs joined with `:` (RFC 8572 section 6.3).
pub fn file_digest(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let raw = match algorithm {
        HashAlgorithm::Sha256 => digest_file::<Sha256>(path)?,
        HashAlgorithm::Sha384 => digest_file::<Sha384>(path)?,
    };
    Ok(colon_hex(&raw))
}

fn digest_file<D: Digest>(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| Error::read(path, e))?;
    let mut hasher = D::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut chunk).map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

fn colon_hex(digest: &[u8]) -> String {
    digest
        .iter()
        .map(|b| hex::encode([*b]))
        .collect::<Vec<_>>()
        .join(":")
}
