// SPDX-License-Identifier: Apache-2.0

//! Failure taxonomy for the bootstrap pipeline.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Stable identity of a failure class. Discriminants are explicit so the
/// numeric code of a kind never moves when variants are added or
/// reordered; codes are safe to log and compare across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorKind {
    InvalidInput = 1,
    FileNotFound = 2,
    InvalidCertificate = 3,
    InvalidSerialNumber = 4,
    DataCreationFailed = 10,
    SigningFailed = 11,
    EncryptionFailed = 12,
    EncodingFailed = 13,
    VerificationFailed = 20,
    DecryptionFailed = 21,
    DecodingFailed = 22,
    ContentExtractionFailed = 23,
    ContentClassificationFailed = 24,
    IoFailure = 30,
}

impl ErrorKind {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid-input",
            ErrorKind::FileNotFound => "file-not-found",
            ErrorKind::InvalidCertificate => "invalid-certificate",
            ErrorKind::InvalidSerialNumber => "invalid-serial-number",
            ErrorKind::DataCreationFailed => "data-creation-failed",
            ErrorKind::SigningFailed => "signing-failed",
            ErrorKind::EncryptionFailed => "encryption-failed",
            ErrorKind::EncodingFailed => "encoding-failed",
            ErrorKind::VerificationFailed => "verification-failed",
            ErrorKind::DecryptionFailed => "decryption-failed",
            ErrorKind::DecodingFailed => "decoding-failed",
            ErrorKind::ContentExtractionFailed => "content-extraction-failed",
            ErrorKind::ContentClassificationFailed => "content-classification-failed",
            ErrorKind::IoFailure => "io-failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure the pipeline can report. Variants carry the offending
/// value; [`Error::kind`] gives the stable classification.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A caller-supplied path does not resolve to an existing regular file.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid certificate {}: {reason}", path.display())]
    InvalidCertificate { path: PathBuf, reason: String },

    #[error("serial number must be a non-empty string")]
    InvalidSerialNumber,

    /// A CMS/PKCS7 structure could not be created from its inputs.
    #[error("CMS data creation failed: {0}")]
    DataCreation(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("signature verification failed: {0}")]
    Verification(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("decoding failed: {0}")]
    Decoding(String),

    #[error("certificate extraction failed: {0}")]
    ContentExtraction(String),

    #[error("content classification failed: {0}")]
    ContentClassification(String),

    #[error("i/o failure on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A later artifact write failed after earlier ones succeeded. The
    /// files already in `dir` are left in place and the set is incomplete.
    #[error("partial artifact set written to {}: writing {file} failed", dir.display())]
    PartialWrite {
        dir: PathBuf,
        file: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::FileNotFound(_) => ErrorKind::FileNotFound,
            Error::InvalidCertificate { .. } => ErrorKind::InvalidCertificate,
            Error::InvalidSerialNumber => ErrorKind::InvalidSerialNumber,
            Error::DataCreation(_) => ErrorKind::DataCreationFailed,
            Error::Signing(_) => ErrorKind::SigningFailed,
            Error::Encryption(_) => ErrorKind::EncryptionFailed,
            Error::Encoding(_) => ErrorKind::EncodingFailed,
            Error::Verification(_) => ErrorKind::VerificationFailed,
            Error::Decryption(_) => ErrorKind::DecryptionFailed,
            Error::Decoding(_) => ErrorKind::DecodingFailed,
            Error::ContentExtraction(_) => ErrorKind::ContentExtractionFailed,
            Error::ContentClassification(_) => ErrorKind::ContentClassificationFailed,
            Error::Io { .. } | Error::PartialWrite { .. } => ErrorKind::IoFailure,
        }
    }

    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Maps a read error, distinguishing a missing file from other i/o
    /// faults.
    pub(crate) fn read(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Error::FileNotFound(path.to_path_buf())
        } else {
            Error::io(path, source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_have_stable_codes() {
        assert_eq!(ErrorKind::InvalidInput.code(), 1);
        assert_eq!(ErrorKind::SigningFailed.code(), 11);
        assert_eq!(ErrorKind::VerificationFailed.code(), 20);
        assert_eq!(ErrorKind::IoFailure.code(), 30);
    }

    #[test]
    fn kinds_display_as_kebab_case() {
        assert_eq!(ErrorKind::InvalidSerialNumber.to_string(), "invalid-serial-number");
        assert_eq!(
            ErrorKind::ContentClassificationFailed.to_string(),
            "content-classification-failed"
        );
    }

    #[test]
    fn variants_map_to_their_kind() {
        let err = Error::FileNotFound(PathBuf::from("/missing"));
        assert_eq!(err.kind(), ErrorKind::FileNotFound);

        let err = Error::PartialWrite {
            dir: PathBuf::from("/out"),
            file: "ztp_actions.cms".into(),
            source: io::Error::other("disk full"),
        };
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn missing_file_reads_classify_as_file_not_found() {
        let path = Path::new("/no/such/file");
        let err = Error::read(path, io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.kind(), ErrorKind::FileNotFound);

        let err = Error::read(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }
}
