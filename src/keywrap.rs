//! Passphrase-based key wrapping: Argon2id key derivation feeding an
//! XSalsa20-Poly1305 secretbox around the raw Ed25519 seed.
//!
//! The Argon2id parameters are fixed at the values mandated by the
//! wire format — any implementation that changes them can no longer
//! decrypt existing `.songe.key` files.

use argon2::{Algorithm, Argon2, Params, Version};
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::SongeError;
use crate::secure_buffer::{LockingMode, SecureBuffer};

/// Environment variable to allow insecure memory (permissive mode).
/// Set to "1" or "true" to allow operation when mlock fails.
/// WARNING: only use this for testing or on systems that don't
/// support mlock (sandboxes, CI containers without CAP_IPC_LOCK).
const ENV_ALLOW_INSECURE: &str = "SONGE_ALLOW_INSECURE_MEMORY";

fn locking_mode() -> LockingMode {
    match std::env::var(ENV_ALLOW_INSECURE) {
        Ok(val) if val == "1" || val.eq_ignore_ascii_case("true") => LockingMode::Permissive,
        _ => LockingMode::Strict,
    }
}

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;
const SEED_LEN: usize = 32;
const CIPHERTEXT_LEN: usize = SEED_LEN + 16; // plaintext + Poly1305 MAC
const WRAPPED_LEN: usize = SALT_LEN + NONCE_LEN + CIPHERTEXT_LEN;

/// Argon2id parameters mandated by the wire format: 5 iterations,
/// ~7 MiB memory, 32-byte output.
const ARGON2_OPSLIMIT: u32 = 5;
const ARGON2_MEMLIMIT_BYTES: u32 = 7_256_678;
const ARGON2_MEMLIMIT_KIB: u32 = (ARGON2_MEMLIMIT_BYTES + 1023) / 1024;

fn kdf(passphrase: &[u8], salt: &[u8]) -> Result<SecureBuffer, SongeError> {
    let params = Params::new(ARGON2_MEMLIMIT_KIB, ARGON2_OPSLIMIT, 1, Some(KEY_LEN))
        .map_err(|e| SongeError::BadKeyfile(format!("invalid Argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = SecureBuffer::with_mode(KEY_LEN, locking_mode())?;
    argon2
        .hash_password_into(passphrase, salt, out.as_mut_slice())
        .map_err(|e| SongeError::BadKeyfile(format!("Argon2 derivation failed: {e}")))?;
    Ok(out)
}

/// Encrypt a 32-byte Ed25519 seed under a passphrase, returning the
/// 88-byte `salt || nonce || ciphertext` wrapped-key blob.
pub fn wrap(signing_key: &[u8; SEED_LEN], passphrase: &str) -> Result<Vec<u8>, SongeError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce_bytes);

    let mut derived = kdf(passphrase.as_bytes(), &salt)?;
    let cipher = XSalsa20Poly1305::new_from_slice(derived.as_slice())
        .map_err(|e| SongeError::BadKeyfile(format!("invalid derived key: {e}")))?;
    derived.zeroize();

    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, signing_key.as_slice())
        .map_err(|_| SongeError::BadKeyfile("secretbox seal failed".to_string()))?;

    let mut out = Vec::with_capacity(WRAPPED_LEN);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a wrapped-key blob under a passphrase, returning the raw
/// 32-byte Ed25519 seed in locked, zeroize-on-drop memory.
///
/// Authentication failure (wrong passphrase, or corrupted ciphertext)
/// is reported as `BadPassphrase` without distinguishing the two
/// causes, matching the reference behavior.
pub fn unwrap(wrapped: &[u8], passphrase: &str) -> Result<SecureBuffer, SongeError> {
    if wrapped.len() != WRAPPED_LEN {
        return Err(SongeError::BadKeyfile(format!(
            "wrapped key must be {WRAPPED_LEN} bytes, got {}",
            wrapped.len()
        )));
    }

    let salt = &wrapped[..SALT_LEN];
    let nonce_bytes = &wrapped[SALT_LEN..SALT_LEN + NONCE_LEN];
    let ciphertext = &wrapped[SALT_LEN + NONCE_LEN..];

    let mut derived = kdf(passphrase.as_bytes(), salt)?;
    let cipher = XSalsa20Poly1305::new_from_slice(derived.as_slice())
        .map_err(|e| SongeError::BadKeyfile(format!("invalid derived key: {e}")))?;
    derived.zeroize();

    let nonce = Nonce::from_slice(nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| SongeError::BadPassphrase)?;

    if plaintext.len() != SEED_LEN {
        return Err(SongeError::BadKeyfile(format!(
            "decrypted seed must be {SEED_LEN} bytes, got {}",
            plaintext.len()
        )));
    }

    let buffer = SecureBuffer::from_slice_with_mode(&plaintext, locking_mode())?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// mlock may not be available in CI/sandboxed environments.
    fn enable_permissive_mode() {
        std::env::set_var(ENV_ALLOW_INSECURE, "1");
    }

    #[test]
    fn wrap_unwrap_round_trips() {
        enable_permissive_mode();
        let seed = [42u8; 32];
        let wrapped = wrap(&seed, "correct horse battery staple").unwrap();
        assert_eq!(wrapped.len(), WRAPPED_LEN);

        let unwrapped = unwrap(&wrapped, "correct horse battery staple").unwrap();
        assert_eq!(unwrapped.as_slice(), &seed);
    }

    #[test]
    fn wrong_passphrase_is_bad_passphrase() {
        enable_permissive_mode();
        let seed = [7u8; 32];
        let wrapped = wrap(&seed, "p1").unwrap();
        match unwrap(&wrapped, "p2") {
            Err(SongeError::BadPassphrase) => {}
            other => panic!("expected BadPassphrase, got {other:?}"),
        }
    }

    #[test]
    fn wrong_length_blob_is_bad_keyfile() {
        enable_permissive_mode();
        match unwrap(&[0u8; 10], "anything") {
            Err(SongeError::BadKeyfile(_)) => {}
            other => panic!("expected BadKeyfile, got {other:?}"),
        }
    }
}
