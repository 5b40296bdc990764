//! Versioned, timestamped, authenticated token encryption.
//!
//! Each token is self-describing and carries everything but the key:
//!
//! ```text
//! version (1) | issued-at, unix secs BE (8) | nonce (12) | ChaCha20-Poly1305 ciphertext + tag
//! ```
//!
//! The 21-byte header is bound as associated data, so neither the version
//! nor the timestamp can be altered without failing authentication. Tokens
//! and keys travel as url-safe base64 text.

use crate::error::{CryptoError, CryptoResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use chrono::Utc;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Token format version.
pub const TOKEN_VERSION: u8 = 0x80;

/// Token key size in bytes.
pub const TOKEN_KEY_SIZE: usize = 32;

/// Nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size in bytes.
pub const TAG_SIZE: usize = 16;

const HEADER_SIZE: usize = 1 + 8 + NONCE_SIZE;

/// Symmetric key for [`TokenCipher`]. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TokenKey([u8; TOKEN_KEY_SIZE]);

impl TokenKey {
    /// Generates a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Decodes a url-safe base64 key.
    pub fn from_encoded(encoded: &str) -> CryptoResult<Self> {
        let mut decoded = URL_SAFE
            .decode(encoded.trim())
            .map_err(|e| CryptoError::Encoding(format!("token key is not base64: {e}")))?;
        let result = Self::from_slice(&decoded);
        decoded.zeroize();
        result
    }

    /// Builds a key from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != TOKEN_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: TOKEN_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; TOKEN_KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Url-safe base64 encoding of the key.
    pub fn encode(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenKey([REDACTED])")
    }
}

/// Encrypts and decrypts tokens under a single key.
pub struct TokenCipher {
    cipher: ChaCha20Poly1305,
}

impl TokenCipher {
    pub fn new(key: &TokenKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.as_bytes())),
        }
    }

    /// Encrypts `plaintext` into a base64 token stamped with the current time.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<String> {
        self.encrypt_at(plaintext, Utc::now().timestamp())
    }

    /// Encrypts with an explicit issued-at timestamp.
    pub fn encrypt_at(&self, plaintext: &[u8], issued_at: i64) -> CryptoResult<String> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let mut token = Vec::with_capacity(HEADER_SIZE + plaintext.len() + TAG_SIZE);
        token.push(TOKEN_VERSION);
        token.extend_from_slice(&issued_at.to_be_bytes());
        token.extend_from_slice(&nonce);

        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &token,
                },
            )
            .map_err(|e| CryptoError::Encryption(format!("token seal failed: {e}")))?;
        token.extend_from_slice(&sealed);

        Ok(URL_SAFE.encode(token))
    }

    /// Decrypts a token produced by [`TokenCipher::encrypt`].
    pub fn decrypt(&self, token: &str) -> CryptoResult<Vec<u8>> {
        let raw = decode_token(token)?;
        let (header, sealed) = raw.split_at(HEADER_SIZE);

        self.cipher
            .decrypt(
                Nonce::from_slice(&header[9..]),
                Payload {
                    msg: sealed,
                    aad: header,
                },
            )
            .map_err(|_| {
                CryptoError::Decryption("token open failed (wrong key or tampered data)".to_string())
            })
    }

    /// Decrypts a token, rejecting it if it is older than `ttl_secs`.
    pub fn decrypt_with_ttl(&self, token: &str, ttl_secs: i64) -> CryptoResult<Vec<u8>> {
        let plaintext = self.decrypt(token)?;
        let age = Utc::now().timestamp() - timestamp_of(token)?;
        if age > ttl_secs {
            return Err(CryptoError::Decryption(format!(
                "token expired ({age}s old, ttl {ttl_secs}s)"
            )));
        }
        Ok(plaintext)
    }
}

/// Reads the issued-at timestamp without authenticating the token.
pub fn timestamp_of(token: &str) -> CryptoResult<i64> {
    let raw = decode_token(token)?;
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&raw[1..9]);
    Ok(i64::from_be_bytes(ts))
}

fn decode_token(token: &str) -> CryptoResult<Vec<u8>> {
    let raw = URL_SAFE
        .decode(token.trim())
        .map_err(|e| CryptoError::Decryption(format!("token is not base64: {e}")))?;

    if raw.len() < HEADER_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption(format!(
            "token too short ({} bytes)",
            raw.len()
        )));
    }
    if raw[0] != TOKEN_VERSION {
        return Err(CryptoError::Decryption(format!(
            "unsupported token version {:#04x}",
            raw[0]
        )));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cipher = TokenCipher::new(&TokenKey::generate());
        let token = cipher.encrypt(b"some_secret").unwrap();
        assert_eq!(cipher.decrypt(&token).unwrap(), b"some_secret");
    }

    #[test]
    fn key_encoding_round_trips() {
        let key = TokenKey::generate();
        let decoded = TokenKey::from_encoded(&key.encode()).unwrap();
        assert_eq!(key.as_bytes(), decoded.as_bytes());
    }

    #[test]
    fn short_key_rejected() {
        let err = TokenKey::from_encoded(&URL_SAFE.encode([7u8; 16])).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            }
        ));
    }

    #[test]
    fn timestamp_is_recoverable() {
        let cipher = TokenCipher::new(&TokenKey::generate());
        let token = cipher.encrypt_at(b"x", 1_400_000_000).unwrap();
        assert_eq!(timestamp_of(&token).unwrap(), 1_400_000_000);
    }

    #[test]
    fn expired_token_rejected() {
        let cipher = TokenCipher::new(&TokenKey::generate());
        let token = cipher.encrypt_at(b"x", Utc::now().timestamp() - 120).unwrap();
        assert!(cipher.decrypt_with_ttl(&token, 60).is_err());
        assert_eq!(cipher.decrypt_with_ttl(&token, 600).unwrap(), b"x");
    }

    #[test]
    fn tampered_timestamp_fails_authentication() {
        let cipher = TokenCipher::new(&TokenKey::generate());
        let token = cipher.encrypt(b"payload").unwrap();

        let mut raw = URL_SAFE.decode(&token).unwrap();
        raw[8] ^= 0x01;
        let forged = URL_SAFE.encode(raw);

        assert!(cipher.decrypt(&forged).is_err());
    }

    #[test]
    fn wrong_version_rejected() {
        let cipher = TokenCipher::new(&TokenKey::generate());
        let token = cipher.encrypt(b"payload").unwrap();

        let mut raw = URL_SAFE.decode(&token).unwrap();
        raw[0] = 0x81;
        let err = cipher.decrypt(&URL_SAFE.encode(raw)).unwrap_err();
        assert!(err.to_string().contains("unsupported token version"));
    }
}
