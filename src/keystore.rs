//! Locating, reading, and writing the project's key file.
//!
//! Path resolution mirrors the reference order: a key file in the
//! current directory wins outright; failing that, `SONGE_HOME` (if it
//! names an existing directory); failing that, `$HOME`; write
//! operations that find nothing fall back to the current directory.

use std::fs;
use std::io::Write as _;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::config::SongeConfig;
use crate::error::SongeError;

const SONGE_HOME_VAR: &str = "SONGE_HOME";
const HOME_VAR: &str = "HOME";

/// On-disk shape of `.songe.key`. Field names match the reference's
/// symbol keys exactly; unknown keys are rejected by serde's default
/// (non-`deny_unknown_fields`... so we opt in explicitly) so a
/// strongly typed reader never silently accepts a malformed file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyFile {
    /// Despite the field name, this is stored with the signing-key
    /// tag (`K…`), not the verify-key tag (`P…`) — a verify-only
    /// reader can parse the key file without knowing anything about
    /// the wrap scheme, it just needs a tagged key string. Every
    /// implementation must reproduce this byte-for-byte or existing
    /// key files stop round-tripping.
    verifykey: String,
    /// Base64 of the 88-byte wrapped-key blob.
    signingkey: String,
}

/// Resolve the directory that holds (or should hold) the key file.
///
/// `for_write` controls the final fallback: a write operation that
/// finds no existing key file anywhere still needs a directory to
/// write into, so it falls back to the current directory; a read
/// operation finding nothing should simply fail with `BadKeyfile`.
pub fn resolve_dir(config: &SongeConfig, for_write: bool) -> Result<PathBuf, SongeError> {
    let cwd = std::env::current_dir()?;
    let cwd_key = cwd.join(&config.key_file_name);
    if cwd_key.exists() {
        return Ok(cwd);
    }

    if let Ok(home) = std::env::var(SONGE_HOME_VAR) {
        let dir = PathBuf::from(home);
        if dir.is_dir() {
            return Ok(dir);
        }
    }

    if let Ok(home) = std::env::var(HOME_VAR) {
        let dir = PathBuf::from(home);
        if dir.join(&config.key_file_name).exists() {
            return Ok(dir);
        }
    }

    if for_write {
        return Ok(cwd);
    }

    Err(SongeError::BadKeyfile(format!(
        "no {} found in current directory, SONGE_HOME, or HOME",
        config.key_file_name
    )))
}

/// Raw contents needed to unwrap the signing key and cross-check it.
pub struct LoadedKeyFile {
    pub wrapped: Vec<u8>,
    pub declared_verify_key: [u8; 32],
}

/// Locate and parse the key file, returning the wrapped signing key
/// and the verify key it declares. Callers MUST, after unwrapping,
/// check that the derived verify key matches `declared_verify_key`.
pub fn load(config: &SongeConfig) -> Result<LoadedKeyFile, SongeError> {
    let dir = resolve_dir(config, false)?;
    load_from(config, &dir)
}

/// Parse the key file from an explicit directory.
pub fn load_from(config: &SongeConfig, dir: &Path) -> Result<LoadedKeyFile, SongeError> {
    let path = dir.join(&config.key_file_name);
    let text = fs::read_to_string(&path)
        .map_err(|e| SongeError::BadKeyfile(format!("reading {}: {e}", path.display())))?;
    let parsed: KeyFile = serde_yaml::from_str(&text)?;

    let declared_verify_key = codec::decode_key(&parsed.verifykey)?;
    let wrapped = codec::decode_bytes(&parsed.signingkey)?;

    Ok(LoadedKeyFile {
        wrapped,
        declared_verify_key,
    })
}

/// Write the key file with owner-only permissions, and delete any
/// stale trust-file signature in the same directory — the trust list
/// is no longer validly signed once the signing identity changes.
pub fn store(
    config: &SongeConfig,
    dir: &Path,
    wrapped: &[u8],
    verify_key: &[u8; 32],
) -> Result<(), SongeError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(&config.key_file_name);

    let record = KeyFile {
        verifykey: codec::encode_signing_key(verify_key),
        signingkey: codec::encode_bytes(wrapped),
    };
    let text = serde_yaml::to_string(&record)?;

    write_atomic(&path, text.as_bytes())?;

    let mut perms = fs::metadata(&path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(&path, perms)?;

    let sig_path = config.trust_sig_path(dir);
    if sig_path.exists() {
        tracing::warn!(
            path = %sig_path.display(),
            "signing identity replaced; deleting stale trust signature"
        );
        fs::remove_file(&sig_path)?;
    }

    Ok(())
}

/// Write `bytes` to `path` via a same-directory temp file, fsync, then
/// rename, so a crash mid-write cannot leave a half-written file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SongeError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| SongeError::Io(e.to_string()))?;
    Ok(())
}
