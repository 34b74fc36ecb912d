//! Base32 key codec with CRC-16 checksum and type tag, plus the plain
//! Base64 codec used for opaque byte blobs (wrapped keys, signatures).
//!
//! The CRC is a typo-detection aid for humans copying keys around; it
//! is not a cryptographic check. The tag byte is what makes an
//! `EncodedKey` string self-describing: a verify key always begins
//! with `P`, a signing key always begins with `K`, under the RFC 4648
//! Base32 alphabet this crate uses throughout.

use data_encoding::BASE32_NOPAD;

use crate::error::SongeError;

/// Tag byte for a `P`-prefixed verify key.
pub const VERIFY_TAG: u8 = 0x78;
/// Tag byte for a `K`-prefixed signing key.
pub const SIGNING_TAG: u8 = 0x50;

fn crc16(bytes: &[u8]) -> u16 {
    const CRC_16_ARC: crc::Algorithm<u16> = crc::Algorithm {
        width: 16,
        poly: 0x8005,
        init: 0x0000,
        refin: true,
        refout: true,
        xorout: 0x0000,
        check: 0xbb3d,
        residue: 0x0000,
    };
    crc::Crc::<u16>::new(&CRC_16_ARC).checksum(bytes)
}

/// Encode an opaque byte blob as standard, padded Base64.
pub fn encode_bytes(bytes: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

/// Decode a standard, padded Base64 string.
pub fn decode_bytes(s: &str) -> Result<Vec<u8>, SongeError> {
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s).map_err(Into::into)
}

fn encode_tagged_key(raw: &[u8; 32], tag: u8) -> String {
    let mut body = Vec::with_capacity(1 + 32);
    body.push(tag);
    body.extend_from_slice(raw);
    let crc = crc16(&body);
    body.extend_from_slice(&crc.to_le_bytes());
    BASE32_NOPAD.encode(&body)
}

/// Encode a 32-byte Ed25519 public key as a `P`-prefixed `EncodedKey`.
pub fn encode_verify_key(raw: &[u8; 32]) -> String {
    encode_tagged_key(raw, VERIFY_TAG)
}

/// Encode a 32-byte Ed25519 seed as a `K`-prefixed `EncodedKey`.
pub fn encode_signing_key(raw: &[u8; 32]) -> String {
    encode_tagged_key(raw, SIGNING_TAG)
}

/// Decode an `EncodedKey` string, verifying its CRC-16 and returning
/// the raw 32-byte key along with the tag byte it was encoded under.
pub fn decode_key_tagged(s: &str) -> Result<([u8; 32], u8), SongeError> {
    let body = BASE32_NOPAD
        .decode(s.as_bytes())
        .map_err(|e| SongeError::BadEncoding(e.to_string()))?;

    if body.len() != 1 + 32 + 2 {
        return Err(SongeError::BadEncoding(format!(
            "expected {} decoded bytes, got {}",
            1 + 32 + 2,
            body.len()
        )));
    }

    let (payload, crc_bytes) = body.split_at(1 + 32);
    let expected_crc = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    if crc16(payload) != expected_crc {
        return Err(SongeError::BadChecksum);
    }

    let tag = payload[0];
    let mut raw = [0u8; 32];
    raw.copy_from_slice(&payload[1..]);
    Ok((raw, tag))
}

/// Decode an `EncodedKey` string without caring which tag it carries.
pub fn decode_key(s: &str) -> Result<[u8; 32], SongeError> {
    decode_key_tagged(s).map(|(raw, _tag)| raw)
}

/// Whether an `EncodedKey` string carries the verify-key tag.
pub fn is_verify_key(s: &str) -> bool {
    matches!(decode_key_tagged(s), Ok((_, tag)) if tag == VERIFY_TAG)
}

/// Whether an `EncodedKey` string carries the signing-key tag.
pub fn is_signing_key(s: &str) -> bool {
    matches!(decode_key_tagged(s), Ok((_, tag)) if tag == SIGNING_TAG)
}
