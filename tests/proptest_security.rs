//! Property-based tests for security-critical operations.
//!
//! These tests focus on:
//! - Key derivation and import
//! - Shared secret agreement
//! - Signature and event verification
//! - Input validation and boundary conditions

use nostr_relay_client::nostr::{
    verify_signature, Event, Keys, NostrError, UnsignedEvent,
};
use proptest::prelude::*;

/// Strategy for valid secp256k1 secret keys (well below the curve order)
fn valid_secret_key_strategy() -> impl Strategy<Value = [u8; 32]> {
    (prop::array::uniform31(any::<u8>()), 1u8..=255u8).prop_map(|(rest, last)| {
        let mut key = [0u8; 32];
        // A zero first byte keeps the scalar below the curve order.
        key[1..].copy_from_slice(&rest);
        key[31] = last;
        key
    })
}

/// Strategy for hex strings that are not 32 bytes long
fn wrong_length_hex_strategy() -> impl Strategy<Value = String> {
    prop_oneof![0usize..32, 33usize..64]
        .prop_flat_map(|len| prop::collection::vec(any::<u8>(), len))
        .prop_map(hex::encode)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: The same seed always derives the same public key
    #[test]
    fn seed_derivation_is_deterministic(secret in valid_secret_key_strategy()) {
        let seed = hex::encode(secret);
        let a = Keys::from_seed(Some(&seed)).expect("valid seed");
        let b = Keys::from_seed(Some(&seed)).expect("valid seed");
        prop_assert_eq!(a.public_key(), b.public_key());
    }

    /// Property: Seeds of the wrong length are rejected as invalid key material
    #[test]
    fn wrong_length_seed_is_rejected(seed in wrong_length_hex_strategy()) {
        let result = Keys::from_seed(Some(&seed));
        prop_assert!(matches!(result, Err(NostrError::InvalidKeyMaterial(_))));
    }

    /// Property: Both parties derive the same shared secret
    #[test]
    fn shared_secret_is_symmetric(
        a in valid_secret_key_strategy(),
        b in valid_secret_key_strategy(),
    ) {
        let alice = Keys::from_secret_bytes(a).expect("valid key");
        let bob = Keys::from_secret_bytes(b).expect("valid key");

        let ab = alice.shared_secret(&bob.public_key()).expect("ecdh");
        let ba = bob.shared_secret(&alice.public_key()).expect("ecdh");
        prop_assert_eq!(ab, ba);
    }

    /// Property: nsec export and import round-trips the identity
    #[test]
    fn nsec_roundtrip_preserves_identity(secret in valid_secret_key_strategy()) {
        let keys = Keys::from_secret_bytes(secret).expect("valid key");
        let nsec = keys.export_nsec().expect("bech32");
        prop_assert!(nsec.starts_with("nsec1"));

        let restored = Keys::parse(&nsec).expect("valid nsec");
        prop_assert_eq!(keys.public_key(), restored.public_key());
    }

    /// Property: A signature verifies only for the signed id and signer
    #[test]
    fn signatures_bind_id_and_signer(
        secret in valid_secret_key_strategy(),
        id in prop::array::uniform32(any::<u8>()),
        flip in 0usize..32,
    ) {
        let keys = Keys::from_secret_bytes(secret).expect("valid key");
        let other = Keys::generate();
        let sig = keys.sign(&id).expect("signing");

        prop_assert!(verify_signature(&keys.public_key(), &id, &sig));
        prop_assert!(!verify_signature(&other.public_key(), &id, &sig));

        let mut altered = id;
        altered[flip] ^= 0x01;
        prop_assert!(!verify_signature(&keys.public_key(), &altered, &sig));
    }

    /// Property: Any signed text note verifies, and changing its content breaks it
    #[test]
    fn altered_content_fails_verification(
        content in "\\PC{0,200}",
        suffix in "[a-z]{1,10}",
    ) {
        let keys = Keys::generate();
        let event = UnsignedEvent::text_note(content.clone(), keys.public_key())
            .sign(&keys)
            .expect("signing");
        prop_assert!(event.verify().is_ok());

        let mut value = serde_json::to_value(&event).expect("serialize");
        value["content"] = serde_json::Value::String(format!("{content}{suffix}"));
        let tampered: Event = serde_json::from_value(value).expect("deserialize");
        prop_assert!(tampered.verify().is_err());
    }

    /// Property: Malformed signatures are rejected rather than panicking
    #[test]
    fn malformed_signature_is_rejected(
        sig in "[0-9a-fA-FxyzXYZ]{0,140}",
        id in prop::array::uniform32(any::<u8>()),
    ) {
        let keys = Keys::generate();
        prop_assert!(!verify_signature(&keys.public_key(), &id, &sig));
    }
}
