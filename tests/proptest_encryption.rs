//! Property-based tests for NIP-04 direct message encryption.
//!
//! These tests use proptest to verify invariants that should hold for any valid input,
//! helping catch edge cases and subtle bugs that might not be found by unit tests alone.

use nostr_relay_client::nostr::encryption::{
    decrypt, decrypt_content, encrypt, encrypt_content, EncryptedPayload, IV_MARKER,
};
use nostr_relay_client::nostr::SharedSecret;
use proptest::prelude::*;

/// Strategy to generate plaintext, including non-ASCII characters
fn plaintext_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,1000}",
        "\\PC{0,200}",
    ]
}

/// Strategy to generate 32-byte shared secrets
fn secret_strategy() -> impl Strategy<Value = [u8; 32]> {
    prop::array::uniform32(any::<u8>())
}

proptest! {
    /// Property: Encryption followed by decryption should yield the original plaintext
    #[test]
    fn encrypt_decrypt_roundtrip(
        plaintext in plaintext_strategy(),
        key in secret_strategy(),
    ) {
        let secret = SharedSecret::from_bytes(key);
        let content = encrypt_content(&secret, &plaintext).expect("encryption should succeed");
        let decrypted = decrypt_content(&secret, &content).expect("decryption should succeed");
        prop_assert_eq!(plaintext, decrypted);
    }

    /// Property: The wire form always has exactly one IV marker
    #[test]
    fn wire_form_has_one_marker(
        plaintext in plaintext_strategy(),
        key in secret_strategy(),
    ) {
        let secret = SharedSecret::from_bytes(key);
        let content = encrypt_content(&secret, &plaintext).expect("encryption should succeed");
        prop_assert_eq!(content.matches(IV_MARKER).count(), 1);
        prop_assert!(EncryptedPayload::is_encrypted_content(&content));
    }

    /// Property: Ciphertext is whole AES blocks and strictly longer than the plaintext
    #[test]
    fn ciphertext_is_padded_to_blocks(
        plaintext in plaintext_strategy(),
        key in secret_strategy(),
    ) {
        let secret = SharedSecret::from_bytes(key);
        let payload = encrypt(&secret, &plaintext).expect("encryption should succeed");
        prop_assert_eq!(payload.ciphertext.len() % 16, 0);
        prop_assert!(payload.ciphertext.len() > plaintext.len());
    }

    /// Property: Same plaintext with same key produces different payloads (random IV)
    #[test]
    fn encryption_is_randomized(
        plaintext in plaintext_strategy(),
        key in secret_strategy(),
    ) {
        let secret = SharedSecret::from_bytes(key);
        let first = encrypt(&secret, &plaintext).expect("encryption should succeed");
        let second = encrypt(&secret, &plaintext).expect("encryption should succeed");
        prop_assert_ne!(first.iv, second.iv);
    }

    /// Property: Decryption with the wrong secret never returns the plaintext
    ///
    /// CBC has no authentication, so a wrong key occasionally produces valid
    /// padding; what must never happen is recovering the original text.
    #[test]
    fn wrong_secret_never_recovers_plaintext(
        plaintext in "[a-zA-Z0-9 ]{1,200}",
        key1 in secret_strategy(),
        key2 in secret_strategy(),
    ) {
        prop_assume!(key1 != key2);
        let payload = encrypt(&SharedSecret::from_bytes(key1), &plaintext)
            .expect("encryption should succeed");
        let result = decrypt(&SharedSecret::from_bytes(key2), &payload);
        prop_assert!(result.map_or(true, |text| text != plaintext));
    }

    /// Property: Arbitrary content never panics the decoder
    #[test]
    fn arbitrary_content_does_not_panic(
        content in "\\PC{0,300}",
        key in secret_strategy(),
    ) {
        let _ = decrypt_content(&SharedSecret::from_bytes(key), &content);
    }

    /// Property: Content without the marker is always a decryption failure
    #[test]
    fn content_without_marker_fails(
        content in "[a-zA-Z0-9+/=]{0,200}",
        key in secret_strategy(),
    ) {
        let result = decrypt_content(&SharedSecret::from_bytes(key), &content);
        prop_assert!(result.is_err_and(|e| e.is_decryption_failure()));
    }
}
