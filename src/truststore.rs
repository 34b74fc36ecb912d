//! The local, signed list of trusted verify keys.
//!
//! `.songe.trust` is a plain sorted, deduplicated, LF-terminated list
//! of `EncodedKey` strings; `.songe.trust.sgsig` carries only a
//! `signature` field over the exact bytes of the trust file,
//! including its trailing newline.

use std::fs;
use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::config::SongeConfig;
use crate::error::{SongeError, SongeWarning};
use crate::keystore::write_atomic;

/// On-disk shape of `.songe.trust.sgsig`: only the signature field.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TrustSignature {
    signature: String,
}

fn serialize_list(list: &[String]) -> String {
    if list.is_empty() {
        String::new()
    } else {
        let mut text = list.join("\n");
        text.push('\n');
        text
    }
}

fn normalize(mut list: Vec<String>) -> Vec<String> {
    list.sort();
    list.dedup();
    list
}

/// Load the trust list.
///
/// `strict_verify_key`, when given, is the verify key to check the
/// signature against (derived from a freshly unwrapped signing key,
/// forcing passphrase entry). When `None`, the signature — if
/// present — is checked against `local_verify_key` instead.
///
/// Returns the sorted, deduplicated list plus an optional warning for
/// the caller's diagnostic channel.
pub fn load(
    config: &SongeConfig,
    dir: &Path,
    local_verify_key: &[u8; 32],
    strict_verify_key: Option<&[u8; 32]>,
) -> Result<(Vec<String>, Option<SongeWarning>), SongeError> {
    let trust_path = config.trust_file_path(dir);
    if !trust_path.exists() {
        return Ok((Vec::new(), None));
    }

    let text = fs::read_to_string(&trust_path)?;
    let sig_path = config.trust_sig_path(dir);

    let warning = if sig_path.exists() {
        let sig_text = fs::read_to_string(&sig_path)?;
        let record: TrustSignature = serde_yaml::from_str(&sig_text)?;
        let sig_bytes = codec::decode_bytes(&record.signature)?;
        let sig_array: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| SongeError::BadKeyfile("trust signature must be 64 bytes".to_string()))?;
        let signature = Signature::from_bytes(&sig_array);

        let verify_raw = strict_verify_key.unwrap_or(local_verify_key);
        let verify_key = VerifyingKey::from_bytes(verify_raw)
            .map_err(|e| SongeError::BadKeyfile(e.to_string()))?;

        verify_key
            .verify(text.as_bytes(), &signature)
            .map_err(|_| SongeError::BadSignature)?;
        None
    } else {
        tracing::warn!(path = %trust_path.display(), "trust file present without a signature");
        Some(SongeWarning::TrustUnsigned)
    };

    let list = normalize(
        text.lines()
            .map(|l| l.to_string())
            .filter(|l| !l.is_empty())
            .collect(),
    );

    Ok((list, warning))
}

/// Sign and write the trust list: text file first, then its signature
/// sibling, each via the atomic write-temp-then-rename discipline.
pub fn save(
    config: &SongeConfig,
    dir: &Path,
    list: &[String],
    signing_key: &SigningKey,
) -> Result<(), SongeError> {
    let normalized = normalize(list.to_vec());
    let text = serialize_list(&normalized);

    let trust_path = config.trust_file_path(dir);
    write_atomic(&trust_path, text.as_bytes())?;

    let signature: Signature = signing_key.sign(text.as_bytes());
    let record = TrustSignature {
        signature: codec::encode_bytes(&signature.to_bytes()),
    };
    let sig_text = serde_yaml::to_string(&record)?;

    let sig_path = config.trust_sig_path(dir);
    write_atomic(&sig_path, sig_text.as_bytes())?;

    Ok(())
}

/// Add a key to the trust list, re-signing the result.
pub fn add(
    config: &SongeConfig,
    dir: &Path,
    local_verify_key: &[u8; 32],
    signing_key: &SigningKey,
    key: &str,
) -> Result<Vec<String>, SongeError> {
    let (mut list, _warning) = load(config, dir, local_verify_key, None)?;
    if !list.iter().any(|k| k == key) {
        list.push(key.to_string());
    }
    let list = normalize(list);
    save(config, dir, &list, signing_key)?;
    Ok(list)
}

/// Remove a key by literal value, or by 1-based index when `selector`
/// parses as a positive integer of at most 4 digits. Removing a key
/// that isn't present is a no-op, matching the reference.
pub fn remove(
    config: &SongeConfig,
    dir: &Path,
    local_verify_key: &[u8; 32],
    signing_key: &SigningKey,
    selector: &str,
) -> Result<Vec<String>, SongeError> {
    let (mut list, _warning) = load(config, dir, local_verify_key, None)?;

    let as_index = if selector.len() <= 4 && !selector.is_empty() && selector.chars().all(|c| c.is_ascii_digit())
    {
        selector.parse::<usize>().ok().filter(|n| *n > 0)
    } else {
        None
    };

    if let Some(index) = as_index {
        if index <= list.len() {
            list.remove(index - 1);
        }
    } else {
        list.retain(|k| k != selector);
    }

    let list = normalize(list);
    save(config, dir, &list, signing_key)?;
    Ok(list)
}

/// Linear scan for entries containing `substring`; returns the
/// 1-based index and the matching key for each hit.
pub fn find(list: &[String], substring: &str) -> Vec<(usize, String)> {
    list.iter()
        .enumerate()
        .filter(|(_, key)| key.contains(substring))
        .map(|(i, key)| (i + 1, key.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey as DalekSigningKey;
    use rand::rngs::OsRng;

    fn test_signing_key() -> DalekSigningKey {
        DalekSigningKey::generate(&mut OsRng)
    }

    #[test]
    fn save_then_load_normalizes_order_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let config = SongeConfig::default();
        let signing_key = test_signing_key();
        let verify_key = signing_key.verifying_key().to_bytes();

        let unsorted = vec![
            "Pccccccccccc".to_string(),
            "Paaaaaaaaaaa".to_string(),
            "Pbbbbbbbbbbb".to_string(),
            "Paaaaaaaaaaa".to_string(),
        ];
        save(&config, dir.path(), &unsorted, &signing_key).unwrap();

        let (loaded, warning) = load(&config, dir.path(), &verify_key, None).unwrap();
        assert_eq!(warning, None);
        assert_eq!(
            loaded,
            vec!["Paaaaaaaaaaa", "Pbbbbbbbbbbb", "Pccccccccccc"]
        );
    }

    #[test]
    fn missing_signature_warns_but_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let config = SongeConfig::default();
        fs::write(config.trust_file_path(dir.path()), "Pabc\n").unwrap();

        let (list, warning) = load(&config, dir.path(), &[0u8; 32], None).unwrap();
        assert_eq!(list, vec!["Pabc"]);
        assert_eq!(warning, Some(SongeWarning::TrustUnsigned));
    }

    #[test]
    fn tampered_trust_file_fails_strict_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = SongeConfig::default();
        let signing_key = test_signing_key();
        let verify_key = signing_key.verifying_key().to_bytes();

        save(&config, dir.path(), &["Pabc".to_string()], &signing_key).unwrap();
        fs::write(config.trust_file_path(dir.path()), "Pabc\nPxyz\n").unwrap();

        match load(&config, dir.path(), &verify_key, Some(&verify_key)) {
            Err(SongeError::BadSignature) => {}
            other => panic!("expected BadSignature, got {other:?}"),
        }
    }

    #[test]
    fn add_and_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = SongeConfig::default();
        let signing_key = test_signing_key();
        let verify_key = signing_key.verifying_key().to_bytes();

        let list = add(&config, dir.path(), &verify_key, &signing_key, "Pabc").unwrap();
        assert_eq!(list, vec!["Pabc"]);

        let list = add(&config, dir.path(), &verify_key, &signing_key, "Pxyz").unwrap();
        assert_eq!(list, vec!["Pabc", "Pxyz"]);

        let list = remove(&config, dir.path(), &verify_key, &signing_key, "1").unwrap();
        assert_eq!(list, vec!["Pxyz"]);
    }

    #[test]
    fn remove_nonexistent_key_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let config = SongeConfig::default();
        let signing_key = test_signing_key();
        let verify_key = signing_key.verifying_key().to_bytes();

        add(&config, dir.path(), &verify_key, &signing_key, "Pabc").unwrap();
        let list = remove(&config, dir.path(), &verify_key, &signing_key, "Pdoesnotexist").unwrap();
        assert_eq!(list, vec!["Pabc"]);
    }

    #[test]
    fn five_digit_selector_is_treated_as_literal_not_index() {
        let dir = tempfile::tempdir().unwrap();
        let config = SongeConfig::default();
        let signing_key = test_signing_key();
        let verify_key = signing_key.verifying_key().to_bytes();

        add(&config, dir.path(), &verify_key, &signing_key, "Pabc").unwrap();
        // "12345" has 5 digits, so it must be treated as a literal key,
        // not an index -- removing it is a no-op.
        let list = remove(&config, dir.path(), &verify_key, &signing_key, "12345").unwrap();
        assert_eq!(list, vec!["Pabc"]);
    }

    #[test]
    fn find_returns_all_matches_with_index() {
        let list = vec!["Pabc".to_string(), "Pxab".to_string(), "Pzzz".to_string()];
        let hits = find(&list, "ab");
        assert_eq!(hits, vec![(1, "Pabc".to_string()), (2, "Pxab".to_string())]);
    }
}
