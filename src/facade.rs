//! The discrete operations a CLI collaborator drives: generate,
//! import, change-passphrase, show-signing-key, show-verify-key,
//! sign, verify, trust-list, trust-add, trust-remove.
//!
//! This module owns no terminal I/O, colorization, or prompting --
//! passphrases and comments arrive as plain arguments, and results are
//! plain data the binary renders however it likes.

use std::path::{Path, PathBuf};

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

use crate::codec;
use crate::config::SongeConfig;
use crate::engine::{self, SignOptions, VerifyOutcome};
use crate::error::{SongeError, SongeWarning};
use crate::keystore;
use crate::truststore;

/// Entry point into every operation, bound to one resolved project
/// directory and configuration.
pub struct Facade {
    config: SongeConfig,
    dir: PathBuf,
}

/// Result of `generate` or `import`: the verify key to show the user.
pub struct KeyIdentity {
    pub verify_key_encoded: String,
}

impl Facade {
    /// Open a facade against a directory resolved for reads (an
    /// existing key file must already live somewhere on the
    /// resolution path).
    pub fn open(config: SongeConfig) -> Result<Self, SongeError> {
        let dir = keystore::resolve_dir(&config, false)?;
        Ok(Self { config, dir })
    }

    /// Open a facade for a write operation (`generate`/`import`),
    /// which is allowed to fall back to the current directory when no
    /// key file exists anywhere yet.
    pub fn open_for_write(config: SongeConfig) -> Result<Self, SongeError> {
        let dir = keystore::resolve_dir(&config, true)?;
        Ok(Self { config, dir })
    }

    /// Open a facade against an explicit directory, bypassing path
    /// resolution entirely (mainly useful for tests and embedders
    /// that already know where the project lives).
    pub fn at(config: SongeConfig, dir: PathBuf) -> Self {
        Self { config, dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn unwrap_signing_key(&self, passphrase: &str) -> Result<(SigningKey, [u8; 32]), SongeError> {
        let loaded = keystore::load_from(&self.config, &self.dir)?;
        let seed = crate::keywrap::unwrap(&loaded.wrapped, passphrase)?;
        let seed_array: [u8; 32] = seed
            .as_slice()
            .try_into()
            .map_err(|_| SongeError::BadKeyfile("unwrapped seed must be 32 bytes".to_string()))?;
        let signing_key = SigningKey::from_bytes(&seed_array);
        let derived = signing_key.verifying_key().to_bytes();
        if derived != loaded.declared_verify_key {
            return Err(SongeError::BadKeyfile(
                "verify key derived from signing key does not match key file".to_string(),
            ));
        }
        Ok((signing_key, derived))
    }

    /// Generate a fresh Ed25519 key pair and store it wrapped under
    /// `passphrase`.
    pub fn generate(&self, passphrase: &str) -> Result<KeyIdentity, SongeError> {
        let signing_key = SigningKey::generate(&mut OsRng);
        self.store_new_key(&signing_key, passphrase)
    }

    /// Import a raw 32-byte Ed25519 seed (as an `EncodedKey` string or
    /// raw bytes) and store it wrapped under `passphrase`.
    pub fn import(&self, raw_seed: &[u8; 32], passphrase: &str) -> Result<KeyIdentity, SongeError> {
        let signing_key = SigningKey::from_bytes(raw_seed);
        self.store_new_key(&signing_key, passphrase)
    }

    fn store_new_key(
        &self,
        signing_key: &SigningKey,
        passphrase: &str,
    ) -> Result<KeyIdentity, SongeError> {
        let verify_key = signing_key.verifying_key().to_bytes();
        let wrapped = crate::keywrap::wrap(&signing_key.to_bytes(), passphrase)?;
        keystore::store(&self.config, &self.dir, &wrapped, &verify_key)?;
        Ok(KeyIdentity {
            verify_key_encoded: codec::encode_verify_key(&verify_key),
        })
    }

    /// Unwrap under `old_passphrase`, rewrap under `new_passphrase`.
    /// Deletes the trust signature sibling, since the reference
    /// invalidates it whenever the signing identity is rewritten.
    pub fn change_passphrase(
        &self,
        old_passphrase: &str,
        new_passphrase: &str,
    ) -> Result<(), SongeError> {
        let (signing_key, verify_key) = self.unwrap_signing_key(old_passphrase)?;
        let wrapped = crate::keywrap::wrap(&signing_key.to_bytes(), new_passphrase)?;
        keystore::store(&self.config, &self.dir, &wrapped, &verify_key)?;
        Ok(())
    }

    /// Unwrap the signing key and return its `K`-prefixed encoding.
    pub fn show_signing_key(&self, passphrase: &str) -> Result<String, SongeError> {
        let (signing_key, _verify_key) = self.unwrap_signing_key(passphrase)?;
        Ok(codec::encode_signing_key(&signing_key.to_bytes()))
    }

    /// Return the `P`-prefixed verify key without needing a passphrase.
    pub fn show_verify_key(&self) -> Result<String, SongeError> {
        let loaded = keystore::load_from(&self.config, &self.dir)?;
        Ok(codec::encode_verify_key(&loaded.declared_verify_key))
    }

    /// Sign `file_path`, writing its `.sgsig` sibling.
    pub fn sign(
        &self,
        passphrase: &str,
        file_path: &Path,
        comment: Option<String>,
        embedded: bool,
        datetime: i64,
    ) -> Result<(), SongeError> {
        let (signing_key, verify_key) = self.unwrap_signing_key(passphrase)?;
        let options = SignOptions { comment, embedded };
        engine::sign(
            &self.config,
            &signing_key,
            &verify_key,
            file_path,
            &options,
            datetime,
        )
    }

    /// Verify `file_path`'s `.sgsig`, consulting the local trust list
    /// (loaded non-strictly -- no passphrase required to verify).
    ///
    /// Returns every warning a caller should surface: a trust file
    /// present without a signature, and/or a record whose embedded
    /// `data` was ignored because the target file was present on disk.
    pub fn verify(&self, file_path: &Path) -> Result<(VerifyOutcome, Vec<SongeWarning>), SongeError> {
        let loaded = keystore::load_from(&self.config, &self.dir)?;
        let (trust_list, trust_warning) =
            truststore::load(&self.config, &self.dir, &loaded.declared_verify_key, None)?;
        let (outcome, data_warning) = engine::verify(&self.config, file_path, &trust_list)?;
        let warnings = trust_warning.into_iter().chain(data_warning).collect();
        Ok((outcome, warnings))
    }

    /// List trusted keys, optionally filtered by substring.
    pub fn trust_list(&self, substring: Option<&str>) -> Result<Vec<(usize, String)>, SongeError> {
        let loaded = keystore::load_from(&self.config, &self.dir)?;
        let (list, _warning) =
            truststore::load(&self.config, &self.dir, &loaded.declared_verify_key, None)?;
        Ok(match substring {
            Some(s) => truststore::find(&list, s),
            None => list.into_iter().enumerate().map(|(i, k)| (i + 1, k)).collect(),
        })
    }

    /// Add a verify key to the trust list. Requires the passphrase to
    /// derive the local signing key needed to re-sign the list.
    pub fn trust_add(&self, passphrase: &str, key: &str) -> Result<Vec<String>, SongeError> {
        let (signing_key, verify_key) = self.unwrap_signing_key(passphrase)?;
        truststore::add(&self.config, &self.dir, &verify_key, &signing_key, key)
    }

    /// Remove a verify key (by literal value or 1-based index).
    pub fn trust_remove(&self, passphrase: &str, selector: &str) -> Result<Vec<String>, SongeError> {
        let (signing_key, verify_key) = self.unwrap_signing_key(passphrase)?;
        truststore::remove(&self.config, &self.dir, &verify_key, &signing_key, selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// mlock may not be available in CI/sandboxed environments.
    fn enable_permissive_mode() {
        std::env::set_var("SONGE_ALLOW_INSECURE_MEMORY", "1");
    }

    #[test]
    fn generate_then_show_verify_key_round_trips() {
        enable_permissive_mode();
        let dir = tempfile::tempdir().unwrap();
        let facade = Facade::at(SongeConfig::default(), dir.path().to_path_buf());

        let identity = facade.generate("correct horse battery staple").unwrap();
        assert!(identity.verify_key_encoded.starts_with('P'));
        assert_eq!(identity.verify_key_encoded.len(), 56);

        let shown = facade.show_verify_key().unwrap();
        assert_eq!(shown, identity.verify_key_encoded);
    }

    #[test]
    fn sign_and_verify_through_the_facade() {
        enable_permissive_mode();
        let dir = tempfile::tempdir().unwrap();
        let facade = Facade::at(SongeConfig::default(), dir.path().to_path_buf());
        let identity = facade.generate("hunter2").unwrap();

        let file = dir.path().join("hello.txt");
        std::fs::write(&file, b"Hello, world!\n").unwrap();
        facade
            .sign("hunter2", &file, Some("release v1".to_string()), false, 1_700_000_000)
            .unwrap();

        facade
            .trust_add("hunter2", &identity.verify_key_encoded)
            .unwrap();

        let (outcome, warnings) = facade.verify(&file).unwrap();
        assert_eq!(outcome.verdict, crate::engine::Verdict::GoodTrusted);
        assert!(warnings.is_empty());
    }

    #[test]
    fn change_passphrase_preserves_verify_key_and_drops_trust_signature() {
        enable_permissive_mode();
        let dir = tempfile::tempdir().unwrap();
        let facade = Facade::at(SongeConfig::default(), dir.path().to_path_buf());
        let identity = facade.generate("p1").unwrap();
        facade.trust_add("p1", &identity.verify_key_encoded).unwrap();

        let sig_path = SongeConfig::default().trust_sig_path(dir.path());
        assert!(sig_path.exists());

        facade.change_passphrase("p1", "p2").unwrap();
        assert!(!sig_path.exists());

        let shown = facade.show_verify_key().unwrap();
        assert_eq!(shown, identity.verify_key_encoded);
    }
}
