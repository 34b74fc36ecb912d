//! `SignatureRecord`: the structured payload written to a `.sgsig`
//! file, and the canonical hash-input builder both signing and
//! verification use.
//!
//! The separator fed before each hashed chunk is the literal five
//! ASCII characters `\0x00` (backslash, zero, x, zero, zero) — not a
//! NUL byte. This is almost certainly a bug in the original
//! implementation, but every existing signature depends on it, so it
//! is preserved exactly. The reference's signing and verifying code
//! paths historically used two different chunk orders (comment before
//! datetime, or after); this implementation uses one order, matching
//! the reference's more widely deployed verify path, in both
//! directions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::io::Read;

use crate::codec;
use crate::error::SongeError;

/// The literal five-byte separator fed before every hashed chunk.
const SEPARATOR: &[u8] = b"\\0x00";

/// Leading human-readable banner written before the YAML body.
/// Parsers tolerate and skip any number of leading comment lines.
const BANNER: &str = "# songe signature\n# do not edit below this line\n";

/// Structured `.sgsig` payload. Field order here is for readability
/// only; on-disk order is whatever `serde_yaml` produces, and readers
/// MUST NOT rely on field order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub datetime: i64,
    pub verifykey: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_base64")]
    pub data: Option<Vec<u8>>,
    #[serde(with = "base64_field")]
    pub signature: Vec<u8>,
}

mod base64_field {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&crate::codec::encode_bytes(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        crate::codec::decode_bytes(&s).map_err(serde::de::Error::custom)
    }
}

mod opt_base64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_str(&crate::codec::encode_bytes(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let opt = Option::<String>::deserialize(d)?;
        opt.map(|s| crate::codec::decode_bytes(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

impl SignatureRecord {
    /// Serialize with the leading human-readable banner.
    pub fn to_text(&self) -> Result<String, SongeError> {
        let body = serde_yaml::to_string(self)?;
        Ok(format!("{BANNER}{body}"))
    }

    /// Parse, tolerating any number of leading `#` comment lines.
    pub fn from_text(text: &str) -> Result<Self, SongeError> {
        let lines: Vec<&str> = text.lines().collect();
        let first_body_line = lines
            .iter()
            .position(|line| !line.trim_start().starts_with('#'))
            .unwrap_or(lines.len());
        let body = lines[first_body_line..].join("\n");
        serde_yaml::from_str(&body).map_err(Into::into)
    }
}

/// Build the canonical SHA-512 digest signed (and verified) over.
///
/// `file_reader` supplies the detached file's bytes (streamed, never
/// fully materialized); pass `None` in embedded mode, where the bytes
/// instead arrive via `embedded_data`.
pub fn canonical_digest(
    file_reader: Option<&mut dyn Read>,
    comment: Option<&str>,
    datetime: i64,
    embedded_data: Option<&[u8]>,
) -> Result<[u8; 64], SongeError> {
    let mut hasher = Sha512::new();

    if let Some(reader) = file_reader {
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }

    if let Some(c) = comment {
        if !c.is_empty() {
            hasher.update(SEPARATOR);
            hasher.update(c.as_bytes());
        }
    }

    hasher.update(SEPARATOR);
    hasher.update(datetime.to_string().as_bytes());

    if let Some(data) = embedded_data {
        hasher.update(SEPARATOR);
        hasher.update(data);
    }

    let digest = hasher.finalize();
    let mut out = [0u8; 64];
    out.copy_from_slice(&digest);
    Ok(out)
}

/// Encode a 64-byte Ed25519 signature for storage in a record.
pub fn encode_signature(sig: &[u8; 64]) -> Vec<u8> {
    sig.to_vec()
}

/// Encode a verify key for storage in a record (P-prefixed tag).
pub fn encode_record_verify_key(raw: &[u8; 32]) -> String {
    codec::encode_verify_key(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_is_tolerated_on_parse() {
        let record = SignatureRecord {
            comment: Some("release v1".to_string()),
            datetime: 1_700_000_000,
            verifykey: "P".to_string() + &"A".repeat(10),
            data: None,
            signature: vec![1u8; 64],
        };
        let text = record.to_text().unwrap();
        assert!(text.starts_with("# "));
        let parsed = SignatureRecord::from_text(&text).unwrap();
        assert_eq!(parsed.datetime, record.datetime);
        assert_eq!(parsed.comment, record.comment);
        assert_eq!(parsed.signature, record.signature);
    }

    #[test]
    fn digest_changes_with_comment_or_datetime() {
        let base = canonical_digest(None, Some("a"), 1, None).unwrap();
        let diff_comment = canonical_digest(None, Some("b"), 1, None).unwrap();
        let diff_time = canonical_digest(None, Some("a"), 2, None).unwrap();
        assert_ne!(base, diff_comment);
        assert_ne!(base, diff_time);
    }

    #[test]
    fn empty_comment_is_treated_as_absent() {
        let with_empty = canonical_digest(None, Some(""), 1, None).unwrap();
        let with_none = canonical_digest(None, None, 1, None).unwrap();
        assert_eq!(with_empty, with_none);
    }

    #[test]
    fn embedded_data_changes_digest() {
        let without = canonical_digest(None, None, 1, None).unwrap();
        let with = canonical_digest(None, None, 1, Some(b"hello")).unwrap();
        assert_ne!(without, with);
    }

    #[test]
    fn detached_bytes_feed_through_reader() {
        let mut a: &[u8] = b"Hello, world!\n";
        let mut b: &[u8] = b"Hello, world?\n";
        let digest_a = canonical_digest(Some(&mut a), None, 1, None).unwrap();
        let digest_b = canonical_digest(Some(&mut b), None, 1, None).unwrap();
        assert_ne!(digest_a, digest_b);
    }
}
