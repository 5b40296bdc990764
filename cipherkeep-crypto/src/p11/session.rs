//! PKCS#11-shaped session abstraction.
//!
//! The plugin talks to hardware only through these traits, so a vendor
//! binding, a software token, or a scripted test double can sit behind it.
//! Types mirror the PKCS#11 structures they stand for (`CK_OBJECT_HANDLE`,
//! `CK_MECHANISM`, `CK_AES_GCM_PARAMS`, attribute templates).

use crate::config::P11CryptoConfig;
use crate::error::CryptoResult;

/// Opaque handle to an object stored on the token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub u64);

/// `CK_AES_GCM_PARAMS`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcmParams {
    pub iv: Vec<u8>,
    pub iv_len: u64,
    pub iv_bits: u64,
    pub aad: Vec<u8>,
    pub tag_bits: u64,
}

impl GcmParams {
    pub fn new(iv: &[u8], tag_bits: u64) -> Self {
        Self {
            iv: iv.to_vec(),
            iv_len: iv.len() as u64,
            iv_bits: iv.len() as u64 * 8,
            aad: Vec::new(),
            tag_bits,
        }
    }
}

/// Mechanisms the plugin invokes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mechanism {
    /// `CKM_AES_KEY_GEN`
    AesKeyGen,
    /// `CKM_AES_GCM`
    AesGcm(GcmParams),
}

/// `CKO_*` object classes used here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectClass {
    SecretKey,
}

/// `CKK_*` key types used here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyType {
    Aes,
}

/// Attribute template for object search and key generation.
///
/// Search only matches on class, key type and label; the remaining
/// attributes apply to generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyTemplate {
    pub class: ObjectClass,
    pub key_type: KeyType,
    pub label: String,
    pub value_len: Option<usize>,
    pub token: bool,
    pub private: bool,
    pub sensitive: bool,
    pub extractable: bool,
    pub encrypt: bool,
    pub decrypt: bool,
    pub wrap: bool,
    pub unwrap: bool,
}

impl KeyTemplate {
    /// Template matching an AES secret key by label.
    pub fn find_aes(label: &str) -> Self {
        Self {
            class: ObjectClass::SecretKey,
            key_type: KeyType::Aes,
            label: label.to_string(),
            value_len: None,
            token: false,
            private: false,
            sensitive: false,
            extractable: false,
            encrypt: false,
            decrypt: false,
            wrap: false,
            unwrap: false,
        }
    }

    /// Template for a persistent, non-extractable AES KEK.
    pub fn aes_kek(label: &str, value_len: usize) -> Self {
        Self {
            value_len: Some(value_len),
            token: true,
            private: true,
            sensitive: true,
            extractable: false,
            encrypt: true,
            decrypt: true,
            wrap: true,
            unwrap: true,
            ..Self::find_aes(label)
        }
    }

    /// Whether an object carrying this template satisfies a search template.
    pub fn matches(&self, search: &KeyTemplate) -> bool {
        self.class == search.class && self.key_type == search.key_type && self.label == search.label
    }
}

/// An authenticated session against a token.
///
/// Implementations need not be thread safe; the plugin serializes access.
pub trait P11Session: Send {
    /// `C_GenerateRandom`. May return fewer bytes than requested.
    fn generate_random(&mut self, len: usize) -> CryptoResult<Vec<u8>>;

    /// `C_FindObjectsInit` / `C_FindObjects` / `C_FindObjectsFinal`.
    fn find_objects(&mut self, template: &KeyTemplate) -> CryptoResult<Vec<ObjectHandle>>;

    /// `C_GenerateKey`.
    fn generate_key(
        &mut self,
        mechanism: &Mechanism,
        template: &KeyTemplate,
    ) -> CryptoResult<ObjectHandle>;

    /// `C_EncryptInit` + `C_Encrypt`.
    fn encrypt(
        &mut self,
        key: ObjectHandle,
        data: &[u8],
        mechanism: &Mechanism,
    ) -> CryptoResult<Vec<u8>>;

    /// `C_DecryptInit` + `C_Decrypt`.
    fn decrypt(
        &mut self,
        key: ObjectHandle,
        data: &[u8],
        mechanism: &Mechanism,
    ) -> CryptoResult<Vec<u8>>;
}

/// A loadable PKCS#11 library.
pub trait P11Library {
    /// Loads the library at `library_path`, runs `C_Initialize`, opens a
    /// read-write session on the configured slot and logs in.
    fn open_session(
        &self,
        library_path: &str,
        config: &P11CryptoConfig,
    ) -> CryptoResult<Box<dyn P11Session>>;
}
