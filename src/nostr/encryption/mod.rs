//! NIP-04 encryption for direct messages.
//!
//! Content is AES-256-CBC with PKCS#7 padding, keyed by the ECDH
//! [`SharedSecret`], with a fresh random IV per message. On the wire the
//! payload is `<base64 ciphertext>?iv=<base64 iv>`.

use std::fmt;
use std::str::FromStr;

use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::nostr::error::{NostrError, Result};
use crate::nostr::keys::SharedSecret;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Separator between ciphertext and IV in the event content.
pub const IV_MARKER: &str = "?iv=";

/// Length of the AES-CBC initialization vector.
pub const IV_LEN: usize = 16;

/// Ciphertext plus the IV it was produced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// AES-256-CBC ciphertext.
    pub ciphertext: Vec<u8>,
    /// Initialization vector.
    pub iv: [u8; IV_LEN],
}

impl EncryptedPayload {
    /// Returns true if `content` looks like an encrypted payload.
    #[must_use]
    pub fn is_encrypted_content(content: &str) -> bool {
        content.contains(IV_MARKER)
    }

    /// Parses the wire form `<base64>?iv=<base64>`.
    ///
    /// A malformed payload is reported as a decryption failure: from the
    /// reader's point of view it is simply not decryptable.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::Decryption`] if the marker is missing, either
    /// half is not base64, or the IV has the wrong length.
    pub fn parse(content: &str) -> Result<Self> {
        let (ciphertext_b64, iv_b64) = content
            .split_once(IV_MARKER)
            .ok_or_else(|| NostrError::Decryption("missing iv marker".to_string()))?;

        let ciphertext = STANDARD
            .decode(ciphertext_b64.trim())
            .map_err(|e| NostrError::Decryption(format!("Base64 decode error: {e}")))?;
        let iv: [u8; IV_LEN] = STANDARD
            .decode(iv_b64.trim())
            .map_err(|e| NostrError::Decryption(format!("Base64 decode error: {e}")))?
            .try_into()
            .map_err(|_| NostrError::Decryption("iv must be 16 bytes".to_string()))?;

        Ok(Self { ciphertext, iv })
    }
}

impl fmt::Display for EncryptedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{IV_MARKER}{}",
            STANDARD.encode(&self.ciphertext),
            STANDARD.encode(self.iv)
        )
    }
}

impl FromStr for EncryptedPayload {
    type Err = NostrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Encrypts `plaintext` with a fresh random IV.
///
/// # Errors
///
/// Returns an error if the cipher cannot be initialized.
pub fn encrypt(secret: &SharedSecret, plaintext: &str) -> Result<EncryptedPayload> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(secret.as_bytes(), &iv)
        .map_err(|e| NostrError::Encryption(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    Ok(EncryptedPayload { ciphertext, iv })
}

/// Decrypts a payload back to UTF-8 text.
///
/// # Errors
///
/// Returns [`NostrError::Decryption`] on a padding mismatch (typically the
/// wrong key) or if the plaintext is not UTF-8.
pub fn decrypt(secret: &SharedSecret, payload: &EncryptedPayload) -> Result<String> {
    let cipher = Aes256CbcDec::new_from_slices(secret.as_bytes(), &payload.iv)
        .map_err(|e| NostrError::Decryption(e.to_string()))?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&payload.ciphertext)
        .map_err(|_| NostrError::Decryption("padding mismatch".to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|e| NostrError::Decryption(format!("UTF-8 decode error: {e}")))
}

/// Encrypts straight to the event content form.
///
/// # Errors
///
/// Returns an error if encryption fails.
pub fn encrypt_content(secret: &SharedSecret, plaintext: &str) -> Result<String> {
    encrypt(secret, plaintext).map(|payload| payload.to_string())
}

/// Parses and decrypts event content.
///
/// # Errors
///
/// Returns [`NostrError::Decryption`] for anything not decryptable.
pub fn decrypt_content(secret: &SharedSecret, content: &str) -> Result<String> {
    decrypt(secret, &EncryptedPayload::parse(content)?)
}
