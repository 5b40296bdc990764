//! `kek_meta_extended` envelope for HSM ciphertexts.
//!
//! Version 1 is the legacy wire form, a JSON object with a single base64
//! `iv` field written as `{"iv": "<base64>"}`. Stored ciphertexts depend on
//! those exact bytes, so the encoder writes them by hand rather than through
//! serde's compact formatter. The decoder goes through serde, ignores unknown
//! fields and accepts an optional `v` tag, so later versions can add fields
//! without breaking old readers.

use crate::error::{CryptoError, CryptoResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

/// Current envelope version.
pub const EXTENDED_META_VERSION: u32 = 1;

/// Typed form of the `kek_meta_extended` string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendedMeta {
    pub version: u32,
    pub iv: Vec<u8>,
}

#[derive(Deserialize)]
struct WireMeta {
    #[serde(default, rename = "v")]
    version: Option<u32>,
    iv: String,
}

impl ExtendedMeta {
    pub fn new(iv: &[u8]) -> Self {
        Self {
            version: EXTENDED_META_VERSION,
            iv: iv.to_vec(),
        }
    }

    /// Wire encoding.
    pub fn encode(&self) -> CryptoResult<String> {
        let iv = serde_json::to_string(&STANDARD.encode(&self.iv))?;
        match self.version {
            1 => Ok(format!("{{\"iv\": {iv}}}")),
            v => Ok(format!("{{\"v\": {v}, \"iv\": {iv}}}")),
        }
    }

    /// Parses a stored `kek_meta_extended` value.
    pub fn decode(raw: &str) -> CryptoResult<Self> {
        let wire: WireMeta = serde_json::from_str(raw)
            .map_err(|e| CryptoError::InvalidInput(format!("kek_meta_extended: {e}")))?;
        let iv = STANDARD
            .decode(wire.iv.as_bytes())
            .map_err(|e| CryptoError::InvalidInput(format!("kek_meta_extended iv: {e}")))?;

        Ok(Self {
            version: wire.version.unwrap_or(EXTENDED_META_VERSION),
            iv,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IV: [u8; 16] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];

    #[test]
    fn encodes_legacy_bytes_exactly() {
        let encoded = ExtendedMeta::new(&IV).encode().unwrap();
        assert_eq!(encoded, r#"{"iv": "AQIDBAUGBwgJCgsMDQ4PEA=="}"#);
    }

    #[test]
    fn decodes_legacy_form() {
        let meta = ExtendedMeta::decode(r#"{"iv": "AQIDBAUGBwgJCgsMDQ4PEA=="}"#).unwrap();
        assert_eq!(meta.version, 1);
        assert_eq!(meta.iv, IV);
    }

    #[test]
    fn tolerates_tag_and_unknown_fields() {
        let meta = ExtendedMeta::decode(
            r#"{"v": 2, "iv": "AQIDBAUGBwgJCgsMDQ4PEA==", "aad": "dGVuYW50"}"#,
        )
        .unwrap();
        assert_eq!(meta.version, 2);
        assert_eq!(meta.iv, IV);
        assert_eq!(
            meta.encode().unwrap(),
            r#"{"v": 2, "iv": "AQIDBAUGBwgJCgsMDQ4PEA=="}"#
        );
    }

    #[test]
    fn missing_iv_is_invalid_input() {
        let err = ExtendedMeta::decode(r#"{"nonce": "AA=="}"#).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidInput(_)));
    }
}
