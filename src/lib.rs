//! songe -- a memory-safe, per-project file-signing core
//!
//! This crate issues an Ed25519 signing key pair bound to a project
//! directory, encrypts the secret half under a user passphrase,
//! produces detached or embedded signatures over arbitrary files (with
//! optional signed metadata), verifies such signatures, and maintains
//! a signed local list of trusted verify keys.
//!
//! # Security Model
//!
//! The signing key is:
//! 1. Stored on disk only as an Argon2id/XSalsa20-Poly1305-wrapped blob
//! 2. Unwrapped directly into a memory-locked, zeroize-on-drop buffer
//! 3. Used for signing within that scope
//! 4. Immediately zeroized after use (even on error/panic)
//!
//! The plaintext key NEVER:
//! - Leaves the locked memory buffer
//! - Gets logged or written to disk
//! - Gets swapped to disk (memory is locked)
//! - Survives beyond the operation that needed it
//!
//! # Scope
//!
//! This crate covers the cryptographic engine and signature format:
//! key generation, passphrase-based key-wrap, canonical signature-input
//! construction, sign/verify state machines, and the trust-store
//! integrity scheme. The interactive command-line surface, terminal
//! colorization and prompting, and YAML I/O plumbing are external
//! collaborators layered on top (see the `songe` and `songev` binaries).

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod keystore;
pub mod keywrap;
pub mod record;
pub mod secure_buffer;
pub mod truststore;

pub use config::SongeConfig;
pub use engine::{SignOptions, Verdict, VerifyOutcome};
pub use error::{SongeError, SongeWarning};
pub use facade::{Facade, KeyIdentity};
pub use secure_buffer::{LockingMode, SecureBuffer};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export of the types most embedders need.
pub mod prelude {
    pub use crate::config::SongeConfig;
    pub use crate::engine::{SignOptions, Verdict};
    pub use crate::error::{SongeError, SongeWarning};
    pub use crate::facade::Facade;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
