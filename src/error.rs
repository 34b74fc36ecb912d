//! Error types for the songe signing core
//!
//! All errors are designed to be informative without leaking sensitive data.
//! `SongeWarning` carries the one non-fatal condition in the system
//! (a trust file without a signature yet) out of band, since it must
//! not block a non-strict load.

use thiserror::Error;

/// Errors that can occur while operating on keys, signatures, or the
/// trust store.
#[derive(Error, Debug)]
pub enum SongeError {
    /// Memory locking failed - system may not support mlock or limit reached
    #[error("Failed to lock memory: {0}")]
    MemoryLockFailed(String),

    /// Base32/Base64 input was malformed
    #[error("Bad encoding: {0}")]
    BadEncoding(String),

    /// CRC-16 checksum on a decoded encoded key did not match
    #[error("Bad checksum on encoded key")]
    BadChecksum,

    /// Key file missing, malformed, or its declared verify key does not
    /// match the one derived from the unwrapped signing key
    #[error("Bad key file: {0}")]
    BadKeyfile(String),

    /// Secretbox authentication failed while unwrapping a signing key
    #[error("Bad passphrase")]
    BadPassphrase,

    /// Ed25519 verification returned false
    #[error("Bad signature")]
    BadSignature,

    /// Verify was requested but neither the target file nor embedded
    /// data was available
    #[error("No data to verify")]
    NoData,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SongeError {
    fn from(e: std::io::Error) -> Self {
        SongeError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for SongeError {
    fn from(e: serde_yaml::Error) -> Self {
        SongeError::BadKeyfile(e.to_string())
    }
}

impl From<data_encoding::DecodeError> for SongeError {
    fn from(e: data_encoding::DecodeError) -> Self {
        SongeError::BadEncoding(e.to_string())
    }
}

impl From<base64::DecodeError> for SongeError {
    fn from(e: base64::DecodeError) -> Self {
        SongeError::BadEncoding(e.to_string())
    }
}

/// Non-fatal conditions a caller may want to render as a warning rather
/// than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongeWarning {
    /// The trust file exists but has no `.sgsig` sibling yet.
    TrustUnsigned,
    /// A signature record carried embedded `data` that was ignored
    /// because the target file was present on disk.
    EmbeddedDataIgnored,
}
