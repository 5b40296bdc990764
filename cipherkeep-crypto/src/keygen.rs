//! Software key pair generation.
//!
//! Private keys are serialized as PKCS#8 PEM, public keys as SPKI PEM.
//! Passphrase protection uses PKCS#8 encrypted PEM (PBES2, PBKDF2-SHA256,
//! AES-256-CBC) so any standard tool can open the result.

use crate::error::{CryptoError, CryptoResult};
use pkcs8::pkcs5::pbes2;
use pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding, PrivateKeyInfo};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

/// PBKDF2 iteration count for passphrase-protected private keys.
pub const PKCS8_PBKDF2_ITERATIONS: u32 = 100_000;

/// DSA is only offered with 1024-bit primes.
pub const DSA_BIT_LENGTH: u32 = 1024;

/// Smallest RSA modulus accepted.
pub const MIN_RSA_BIT_LENGTH: u32 = 1024;

const ENCRYPTED_PEM_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// PEM-encoded key pair. The private half is zeroized on drop.
pub struct KeyPairPem {
    pub private_pem: Zeroizing<String>,
    pub public_pem: String,
}

/// Generates an RSA key pair, optionally encrypting the private key.
pub fn generate_rsa(bit_length: u32, passphrase: Option<&str>) -> CryptoResult<KeyPairPem> {
    let private = RsaPrivateKey::new(&mut OsRng, bit_length as usize)
        .map_err(|e| CryptoError::KeyGeneration(format!("RSA-{bit_length}: {e}")))?;
    let public_pem = RsaPublicKey::from(&private)
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::Encoding(format!("RSA public key PEM: {e}")))?;

    let private_pem = match passphrase {
        Some(passphrase) => encrypt_private_key(&private, passphrase)?,
        None => private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Encoding(format!("RSA private key PEM: {e}")))?,
    };

    Ok(KeyPairPem {
        private_pem,
        public_pem,
    })
}

/// Generates a DSA key pair with 1024-bit p and 160-bit q.
pub fn generate_dsa() -> CryptoResult<KeyPairPem> {
    #[allow(deprecated)]
    let components = dsa::Components::generate(&mut OsRng, dsa::KeySize::DSA_1024_160);
    let signing_key = dsa::SigningKey::generate(&mut OsRng, components);

    let private_pem = signing_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CryptoError::Encoding(format!("DSA private key PEM: {e}")))?;
    let public_pem = signing_key
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::Encoding(format!("DSA public key PEM: {e}")))?;

    Ok(KeyPairPem {
        private_pem,
        public_pem,
    })
}

fn encrypt_private_key(key: &RsaPrivateKey, passphrase: &str) -> CryptoResult<Zeroizing<String>> {
    let der = key
        .to_pkcs8_der()
        .map_err(|e| CryptoError::Encoding(format!("RSA private key DER: {e}")))?;
    let info = PrivateKeyInfo::try_from(der.as_bytes())
        .map_err(|e| CryptoError::Encoding(format!("PKCS#8 parse: {e}")))?;

    let mut salt = [0u8; 16];
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(PKCS8_PBKDF2_ITERATIONS, &salt, &iv)
        .map_err(|e| CryptoError::KeyGeneration(format!("PBES2 parameters: {e}")))?;
    let encrypted = info
        .encrypt_with_params(params, passphrase.as_bytes())
        .map_err(|e| CryptoError::Encryption(format!("PKCS#8 encryption: {e}")))?;

    encrypted
        .to_pem(ENCRYPTED_PEM_LABEL, LineEnding::LF)
        .map_err(|e| CryptoError::Encoding(format!("encrypted PEM: {e}")))
}
