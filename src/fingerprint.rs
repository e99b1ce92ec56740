//! Fingerprint algorithm tagging and wire-form codec.
//!
//! A [`Fingerprint`] pairs an [`Algorithm`] with its canonical string
//! encoding. The string form is the only representation that ever crosses a
//! process boundary (it is what gets sent to and received from a stash-box
//! endpoint), so encode/decode here are the single place that wire-format
//! drift would show up.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three fingerprint algorithms a local scene may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Algorithm {
    Md5,
    Oshash,
    Phash,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Md5 => "MD5",
            Algorithm::Oshash => "OSHASH",
            Algorithm::Phash => "PHASH",
        }
    }
}

/// A single fingerprint as read from (or destined for) the local repository
/// or a stash-box endpoint.
///
/// `hash` is always the canonical wire-form string: lowercase hex, of the
/// algorithm's natural byte length for `Md5`/`Oshash`, or the zero-padded
/// 16-character encoding of a `u64` for `Phash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub algorithm: Algorithm,
    pub hash: String,
    pub duration: Option<i64>,
}

/// Errors raised while encoding or decoding a fingerprint's wire form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("malformed {algorithm} fingerprint: {reason}")]
    BadFingerprint {
        algorithm: &'static str,
        reason: String,
    },
}

/// Encode a raw MD5/OSHASH byte digest as lowercase hex.
///
/// MD5 digests are 16 bytes (32 hex chars); OSHASH digests are 8 bytes
/// (16 hex chars, matching the OpenSubtitles hash's 64-bit output).
pub fn encode_hex(algorithm: Algorithm, bytes: &[u8]) -> String {
    debug_assert!(!matches!(algorithm, Algorithm::Phash));
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decode a hex-encoded MD5/OSHASH digest, validating its expected byte length.
pub fn decode_hex(algorithm: Algorithm, value: &str) -> Result<Vec<u8>, FingerprintError> {
    let expected_chars = match algorithm {
        Algorithm::Md5 => 32,
        Algorithm::Oshash => 16,
        Algorithm::Phash => {
            return Err(FingerprintError::BadFingerprint {
                algorithm: algorithm.as_str(),
                reason: "use decode_phash for PHASH values".into(),
            });
        }
    };

    if value.len() != expected_chars || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FingerprintError::BadFingerprint {
            algorithm: algorithm.as_str(),
            reason: format!("expected {expected_chars} lowercase hex characters, got {value:?}"),
        });
    }

    (0..value.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&value[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|e| FingerprintError::BadFingerprint {
            algorithm: algorithm.as_str(),
            reason: e.to_string(),
        })
}

/// Encode a signed 64-bit perceptual hash value as its canonical wire form:
/// the bit pattern reinterpreted as unsigned and formatted as 16-char
/// lowercase hex.
pub fn encode_phash(value: i64) -> String {
    format!("{:016x}", value as u64)
}

/// Decode a wire-form PHASH string back into its signed 64-bit value.
///
/// `decode_phash(encode_phash(v)) == v` for every `v`.
pub fn decode_phash(value: &str) -> Result<i64, FingerprintError> {
    if value.len() != 16 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FingerprintError::BadFingerprint {
            algorithm: Algorithm::Phash.as_str(),
            reason: format!("expected 16 lowercase hex characters, got {value:?}"),
        });
    }
    let bits = u64::from_str_radix(value, 16).map_err(|e| FingerprintError::BadFingerprint {
        algorithm: Algorithm::Phash.as_str(),
        reason: e.to_string(),
    })?;
    Ok(bits as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_round_trip() {
        let bytes: Vec<u8> = (0u8..16).collect();
        let hex = encode_hex(Algorithm::Md5, &bytes);
        assert_eq!(hex.len(), 32);
        assert_eq!(decode_hex(Algorithm::Md5, &hex).unwrap(), bytes);
    }

    #[test]
    fn oshash_round_trip() {
        let bytes: Vec<u8> = (0u8..8).collect();
        let hex = encode_hex(Algorithm::Oshash, &bytes);
        assert_eq!(hex.len(), 16);
        assert_eq!(decode_hex(Algorithm::Oshash, &hex).unwrap(), bytes);
    }

    #[test]
    fn md5_wrong_length_is_bad_fingerprint() {
        let err = decode_hex(Algorithm::Md5, "abcd").unwrap_err();
        assert!(matches!(err, FingerprintError::BadFingerprint { .. }));
    }

    #[test]
    fn phash_sign_invariance() {
        assert_eq!(encode_phash(-1), "ffffffffffffffff");
        assert_eq!(decode_phash("ffffffffffffffff").unwrap(), -1);
    }

    #[test]
    fn phash_round_trip_arbitrary_values() {
        for v in [0i64, 1, -1, i64::MIN, i64::MAX, 42, -42] {
            let encoded = encode_phash(v);
            assert_eq!(encoded.len(), 16);
            assert_eq!(decode_phash(&encoded).unwrap(), v);
        }
    }

    #[test]
    fn malformed_phash_is_rejected() {
        assert!(decode_phash("not-hex-at-all!!").is_err());
        assert!(decode_phash("abc").is_err());
    }
}
