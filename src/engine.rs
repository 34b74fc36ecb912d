//! Signing and verification state machine.
//!
//! `sign` always succeeds or fails outright (no partial signatures);
//! `verify` follows the state machine from the system design: parse
//! the record, hash either the detached file or the embedded bytes,
//! check the signature, then look the signer up in the trust store.
//! A bad signature is a distinct error path (`SongeError::BadSignature`),
//! never a `Verdict` value a caller could mistake for success.

use std::fs::File;
use std::io::Write as _;
use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::config::SongeConfig;
use crate::error::{SongeError, SongeWarning};
use crate::keystore::write_atomic;
use crate::record::{self, SignatureRecord};

/// Options for a signing operation.
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    pub comment: Option<String>,
    pub embedded: bool,
}

/// Outcome of a successful verification. `BadSignature` is never a
/// value of this type -- it surfaces as `Err(SongeError::BadSignature)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    GoodTrusted,
    GoodUntrusted,
}

/// Result of a verify call: the verdict, the verify key that produced
/// the signature, and recovered embedded data (present only when the
/// target file was absent and the record carried `data`).
pub struct VerifyOutcome {
    pub verdict: Verdict,
    pub verify_key_encoded: String,
    pub recovered_data: Option<Vec<u8>>,
}

/// Sign `file_path`, writing `<file_path>.sgsig` alongside it.
///
/// In detached mode the file is hashed incrementally and never fully
/// materialized; in embedded mode its bytes are read into memory and
/// copied into the record.
pub fn sign(
    config: &SongeConfig,
    signing_key: &SigningKey,
    verify_key: &[u8; 32],
    file_path: &Path,
    options: &SignOptions,
    datetime: i64,
) -> Result<(), SongeError> {
    let embedded_data = if options.embedded {
        Some(std::fs::read(file_path)?)
    } else {
        None
    };

    let digest = if options.embedded {
        record::canonical_digest(
            None,
            options.comment.as_deref(),
            datetime,
            embedded_data.as_deref(),
        )?
    } else {
        let mut file = File::open(file_path)?;
        record::canonical_digest(Some(&mut file), options.comment.as_deref(), datetime, None)?
    };

    let signature: Signature = signing_key.sign(&digest);

    let comment = options
        .comment
        .clone()
        .filter(|c| !c.is_empty());

    let record = SignatureRecord {
        comment,
        datetime,
        verifykey: record::encode_record_verify_key(verify_key),
        data: embedded_data,
        signature: record::encode_signature(&signature.to_bytes()),
    };

    let text = record.to_text()?;
    let sig_path = config.sig_path_for(file_path);
    write_atomic(&sig_path, text.as_bytes())?;
    Ok(())
}

/// Look up a verify key (as produced by `record::encode_record_verify_key`)
/// in the trust list.
pub fn is_trusted(trust_list: &[String], verify_key_encoded: &str) -> bool {
    trust_list.iter().any(|k| k == verify_key_encoded)
}

/// Verify `<file_path>.sgsig` against `file_path`.
///
/// If `file_path` does not exist on disk and the record carries
/// embedded `data`, verification proceeds against that data and the
/// recovered bytes are returned for the caller to emit. If `file_path`
/// exists, it is used even when the record also carries `data`; in that
/// case `data` is ignored and `SongeWarning::EmbeddedDataIgnored` is
/// returned alongside the outcome for the caller to surface.
pub fn verify(
    config: &SongeConfig,
    file_path: &Path,
    trust_list: &[String],
) -> Result<(VerifyOutcome, Option<SongeWarning>), SongeError> {
    let sig_path = config.sig_path_for(file_path);
    let text = std::fs::read_to_string(&sig_path)?;
    let record = SignatureRecord::from_text(&text)?;

    let file_exists = file_path.exists();
    if !file_exists && record.data.is_none() {
        return Err(SongeError::NoData);
    }

    let warning = if file_exists && record.data.is_some() {
        Some(SongeWarning::EmbeddedDataIgnored)
    } else {
        None
    };

    let (digest, recovered_data) = if file_exists {
        let mut file = File::open(file_path)?;
        let digest = record::canonical_digest(
            Some(&mut file),
            record.comment.as_deref(),
            record.datetime,
            None,
        )?;
        (digest, None)
    } else {
        let data = record.data.clone();
        let digest = record::canonical_digest(
            None,
            record.comment.as_deref(),
            record.datetime,
            data.as_deref(),
        )?;
        (digest, data)
    };

    let (verify_raw, _tag) = crate::codec::decode_key_tagged(&record.verifykey)?;
    let verify_key =
        VerifyingKey::from_bytes(&verify_raw).map_err(|e| SongeError::BadKeyfile(e.to_string()))?;

    let sig_bytes: [u8; 64] = record
        .signature
        .clone()
        .try_into()
        .map_err(|_| SongeError::BadKeyfile("signature must be 64 bytes".to_string()))?;
    let signature = Signature::from_bytes(&sig_bytes);

    verify_key
        .verify(&digest, &signature)
        .map_err(|_| SongeError::BadSignature)?;

    let trusted = is_trusted(trust_list, &record.verifykey);
    let verdict = if trusted {
        Verdict::GoodTrusted
    } else {
        Verdict::GoodUntrusted
    };

    Ok((
        VerifyOutcome {
            verdict,
            verify_key_encoded: record.verifykey,
            recovered_data,
        },
        warning,
    ))
}

/// Write recovered embedded data to a writer (standard-output, in the
/// CLI binary's case) while diagnostics are expected on a separate
/// channel -- this function only performs the write.
pub fn emit_recovered_data(out: &mut dyn Write, data: &[u8]) -> Result<(), SongeError> {
    out.write_all(data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use std::fs;

    fn gen_key() -> (SigningKey, [u8; 32]) {
        let sk = SigningKey::generate(&mut OsRng);
        let vk = sk.verifying_key().to_bytes();
        (sk, vk)
    }

    #[test]
    fn detached_sign_then_verify_is_good() {
        let dir = tempfile::tempdir().unwrap();
        let config = SongeConfig::default();
        let (sk, vk) = gen_key();
        let file = dir.path().join("hello.txt");
        fs::write(&file, b"Hello, world!\n").unwrap();

        let opts = SignOptions {
            comment: Some("release v1".to_string()),
            embedded: false,
        };
        sign(&config, &sk, &vk, &file, &opts, 1_700_000_000).unwrap();

        let encoded_vk = record::encode_record_verify_key(&vk);
        let (outcome, warning) = verify(&config, &file, &[encoded_vk.clone()]).unwrap();
        assert_eq!(outcome.verdict, Verdict::GoodTrusted);
        assert_eq!(warning, None);

        let (outcome, warning) = verify(&config, &file, &[]).unwrap();
        assert_eq!(outcome.verdict, Verdict::GoodUntrusted);
        assert_eq!(warning, None);
    }

    #[test]
    fn tampering_with_file_yields_bad_signature() {
        let dir = tempfile::tempdir().unwrap();
        let config = SongeConfig::default();
        let (sk, vk) = gen_key();
        let file = dir.path().join("hello.txt");
        fs::write(&file, b"Hello, world!\n").unwrap();

        let opts = SignOptions::default();
        sign(&config, &sk, &vk, &file, &opts, 1).unwrap();

        fs::write(&file, b"Iello, world!\n").unwrap();
        match verify(&config, &file, &[]) {
            Err(SongeError::BadSignature) => {}
            other => panic!("expected BadSignature, got {other:?}"),
        }
    }

    #[test]
    fn embedded_mode_survives_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = SongeConfig::default();
        let (sk, vk) = gen_key();
        let file = dir.path().join("hello.txt");
        fs::write(&file, b"Hello, world!\n").unwrap();

        let opts = SignOptions {
            comment: None,
            embedded: true,
        };
        sign(&config, &sk, &vk, &file, &opts, 1).unwrap();

        fs::remove_file(&file).unwrap();
        let (outcome, warning) = verify(&config, &file, &[]).unwrap();
        assert_eq!(outcome.recovered_data.as_deref(), Some(&b"Hello, world!\n"[..]));
        assert_eq!(warning, None);
    }

    #[test]
    fn embedded_data_present_alongside_file_warns_and_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = SongeConfig::default();
        let (sk, vk) = gen_key();
        let file = dir.path().join("hello.txt");
        fs::write(&file, b"Hello, world!\n").unwrap();

        let opts = SignOptions {
            comment: None,
            embedded: true,
        };
        sign(&config, &sk, &vk, &file, &opts, 1).unwrap();

        // The file is still present on disk, so the record's embedded
        // `data` must be ignored in favor of the file's own bytes.
        let (outcome, warning) = verify(&config, &file, &[]).unwrap();
        assert_eq!(warning, Some(SongeWarning::EmbeddedDataIgnored));
        assert_eq!(outcome.recovered_data, None);
    }

    #[test]
    fn verify_without_file_or_data_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = SongeConfig::default();
        let (sk, vk) = gen_key();
        let file = dir.path().join("hello.txt");
        fs::write(&file, b"Hello, world!\n").unwrap();

        let opts = SignOptions {
            comment: None,
            embedded: false,
        };
        sign(&config, &sk, &vk, &file, &opts, 1).unwrap();
        fs::remove_file(&file).unwrap();

        match verify(&config, &file, &[]) {
            Err(SongeError::NoData) => {}
            other => panic!("expected NoData, got {other:?}"),
        }
    }

    #[test]
    fn tampered_datetime_yields_bad_signature() {
        let dir = tempfile::tempdir().unwrap();
        let config = SongeConfig::default();
        let (sk, vk) = gen_key();
        let file = dir.path().join("hello.txt");
        fs::write(&file, b"Hello, world!\n").unwrap();

        let opts = SignOptions::default();
        sign(&config, &sk, &vk, &file, &opts, 1).unwrap();

        let sig_path = config.sig_path_for(&file);
        let text = fs::read_to_string(&sig_path).unwrap();
        let mut rec = SignatureRecord::from_text(&text).unwrap();
        rec.datetime += 1;
        fs::write(&sig_path, rec.to_text().unwrap()).unwrap();

        match verify(&config, &file, &[]) {
            Err(SongeError::BadSignature) => {}
            other => panic!("expected BadSignature, got {other:?}"),
        }
    }
}
