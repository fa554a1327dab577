//! Files pinned by a SHA-256 digest.
//!
//! An [`Artefact`] holds the bytes of a file read once from disk, so the
//! digest check and the parser see the same contents.

use std::{
    fs,
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use thiserror::Error;

const DIGEST_HEX_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum ArtefactError {
    #[error("failed to read artefact at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("\"{0}\" is not a hexadecimal SHA-256 digest")]
    InvalidDigest(String),
    #[error("artefact at {path} expected SHA-256 {expected} but found {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// Contents of a file together with where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artefact {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl Artefact {
    /// Read the whole file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::Io`] when the file cannot be read.
    pub fn read(path: &Path) -> Result<Self, ArtefactError> {
        let bytes = fs::read(path).map_err(|source| ArtefactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lower-case hex digest of the contents.
    #[must_use]
    pub fn sha256(&self) -> String {
        sha256_hex(&self.bytes)
    }

    /// Check the contents against `expected`, ignoring case and surrounding
    /// whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::InvalidDigest`] when `expected` is not 64 hex
    /// digits and [`ArtefactError::ChecksumMismatch`] when the digests differ.
    pub fn verify(&self, expected: &str) -> Result<(), ArtefactError> {
        let expected = normalise_digest(expected)?;
        let actual = self.sha256();
        if actual != expected {
            return Err(ArtefactError::ChecksumMismatch {
                path: self.path.clone(),
                expected,
                actual,
            });
        }
        log::debug!("verified SHA-256 of {}", self.path.display());
        Ok(())
    }
}

/// Lower-case hex SHA-256 digest of `bytes`.
///
/// ```
/// use attention_viz::artefact::sha256_hex;
///
/// assert!(sha256_hex(b"abc").starts_with("ba7816bf"));
/// ```
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn normalise_digest(value: &str) -> Result<String, ArtefactError> {
    let digest = value.trim().to_ascii_lowercase();
    if digest.len() == DIGEST_HEX_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(digest)
    } else {
        Err(ArtefactError::InvalidDigest(value.to_owned()))
    }
}
