//! Identity keys, Schnorr signatures and ECDH shared secrets.
//!
//! A client holds one long-lived [`Keys`] for the lifetime of the process.
//! Secret bytes are zeroized on drop and never appear in `Debug` output.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use nostr::prelude::ToBech32;
use nostr::secp256k1::rand::rngs::OsRng;
use nostr::secp256k1::schnorr::Signature;
use nostr::secp256k1::{
    ecdh, Keypair, Message, Parity, PublicKey as FullPublicKey, Secp256k1, SecretKey,
    XOnlyPublicKey,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::nostr::error::{NostrError, Result};

/// Global secp256k1 context for cryptographic operations.
///
/// Creating a `Secp256k1` context precomputes tables for signing and
/// verification, so it is built once and shared.
pub static SECP: LazyLock<Secp256k1<nostr::secp256k1::All>> = LazyLock::new(Secp256k1::new);

/// An x-only (BIP-340) public key, as carried in the `pubkey` field of events.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Builds a public key from raw x-only bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a point on the curve.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        XOnlyPublicKey::from_slice(&bytes)
            .map_err(|e| NostrError::InvalidPublicKey(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Parses a 64-character hex public key.
    ///
    /// # Errors
    ///
    /// Returns an error on bad hex, wrong length, or an off-curve point.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes: [u8; 32] = hex::decode(hex_str)?
            .try_into()
            .map_err(|_| NostrError::InvalidPublicKey("expected 32 bytes".to_string()))?;
        Self::from_bytes(bytes)
    }

    /// Parses either hex or an `npub1...` bech32 string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is neither.
    pub fn parse(input: &str) -> Result<Self> {
        if input.starts_with("npub1") {
            let parsed = nostr::PublicKey::parse(input)
                .map_err(|e| NostrError::InvalidPublicKey(e.to_string()))?;
            return Self::from_bytes(parsed.to_bytes());
        }
        Self::from_hex(input)
    }

    /// Returns the lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the raw x-only bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the NIP-19 `npub` encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if bech32 encoding fails.
    pub fn npub(&self) -> Result<String> {
        let pubkey = nostr::PublicKey::from_slice(&self.0)
            .map_err(|e| NostrError::InvalidPublicKey(e.to_string()))?;
        pubkey
            .to_bech32()
            .map_err(|e| NostrError::Bech32(e.to_string()))
    }

    fn x_only(self) -> Result<XOnlyPublicKey> {
        XOnlyPublicKey::from_slice(&self.0).map_err(|e| NostrError::InvalidPublicKey(e.to_string()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = NostrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PublicKey {
    type Error = NostrError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<PublicKey> for String {
    fn from(value: PublicKey) -> Self {
        value.to_hex()
    }
}

/// A 32-byte symmetric key agreed between two keypairs (NIP-04 ECDH).
///
/// Equality is constant-time. The bytes are zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Wraps raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SharedSecret {}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// The client's identity keypair.
///
/// The public key is always derived from the secret; neither changes after
/// construction.
///
/// # Example
///
/// ```
/// use nostr_relay_client::nostr::Keys;
///
/// let seed = "01".repeat(32);
/// let a = Keys::from_seed(Some(&seed)).unwrap();
/// let b = Keys::from_seed(Some(&seed)).unwrap();
/// assert_eq!(a.public_key(), b.public_key());
/// ```
#[derive(ZeroizeOnDrop)]
pub struct Keys {
    /// The secret key bytes (zeroized on drop).
    secret_bytes: [u8; 32],

    /// Cached public key (not sensitive, skip zeroization).
    #[zeroize(skip)]
    public_key: PublicKey,
}

impl Keys {
    /// Generates a new random keypair from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let keypair = Keypair::new(&SECP, &mut OsRng);
        let secret_bytes = keypair.secret_key().secret_bytes();
        let (public_key, _parity) = keypair.x_only_public_key();

        Self {
            secret_bytes,
            public_key: PublicKey(public_key.serialize()),
        }
    }

    /// Builds keys from an optional hex seed, or randomly when none is given.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::InvalidKeyMaterial`] if the seed is not exactly
    /// 32 bytes of hex or is not a valid secp256k1 scalar.
    pub fn from_seed(seed_hex: Option<&str>) -> Result<Self> {
        match seed_hex {
            None => Ok(Self::generate()),
            Some(seed) => Self::from_hex(seed),
        }
    }

    /// Builds keys from a 64-character hex secret.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::InvalidKeyMaterial`] on malformed input.
    pub fn from_hex(secret_hex: &str) -> Result<Self> {
        let mut decoded = hex::decode(secret_hex.trim())
            .map_err(|e| NostrError::InvalidKeyMaterial(format!("seed is not hex: {e}")))?;

        let result = <[u8; 32]>::try_from(decoded.as_slice())
            .map_err(|_| {
                NostrError::InvalidKeyMaterial(format!(
                    "seed must be 32 bytes, got {}",
                    decoded.len()
                ))
            })
            .and_then(Self::from_secret_bytes);

        decoded.zeroize();
        result
    }

    /// Builds keys from raw secret bytes.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::InvalidKeyMaterial`] if the bytes are zero or
    /// not below the curve order.
    pub fn from_secret_bytes(secret_bytes: [u8; 32]) -> Result<Self> {
        let secret_key = SecretKey::from_slice(&secret_bytes)
            .map_err(|e| NostrError::InvalidKeyMaterial(e.to_string()))?;
        let keypair = Keypair::from_secret_key(&SECP, &secret_key);
        let (public_key, _parity) = keypair.x_only_public_key();

        Ok(Self {
            secret_bytes,
            public_key: PublicKey(public_key.serialize()),
        })
    }

    /// Imports keys from a NIP-19 `nsec1...` string.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::InvalidKeyMaterial`] if the nsec is malformed.
    pub fn from_nsec(nsec: &str) -> Result<Self> {
        let keys =
            nostr::Keys::parse(nsec).map_err(|e| NostrError::InvalidKeyMaterial(e.to_string()))?;
        Self::from_secret_bytes(keys.secret_key().secret_bytes())
    }

    /// Accepts either an `nsec1...` string or a hex secret.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::InvalidKeyMaterial`] if neither form parses.
    pub fn parse(secret: &str) -> Result<Self> {
        if secret.starts_with("nsec1") {
            Self::from_nsec(secret)
        } else {
            Self::from_hex(secret)
        }
    }

    /// Exports the secret key as nsec (NIP-19).
    ///
    /// Only for user-initiated backup.
    ///
    /// # Errors
    ///
    /// Returns an error if bech32 encoding fails.
    pub fn export_nsec(&self) -> Result<String> {
        let mut secret_bytes_copy = self.secret_bytes;

        let result = (|| {
            let secret_key = nostr::SecretKey::from_slice(&secret_bytes_copy)
                .map_err(|e| NostrError::InvalidKeyMaterial(e.to_string()))?;
            secret_key
                .to_bech32()
                .map_err(|e| NostrError::Bech32(e.to_string()))
        })();

        secret_bytes_copy.zeroize();
        result
    }

    /// Returns the public key.
    #[must_use]
    pub const fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Returns the public key as a 64-character hex string.
    #[must_use]
    pub fn pubkey_hex(&self) -> String {
        self.public_key.to_hex()
    }

    /// Signs a 32-byte event id with BIP-340 Schnorr.
    ///
    /// Returns the 64-byte signature as 128 hex characters.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored secret cannot be reconstructed.
    pub fn sign(&self, event_id: &[u8; 32]) -> Result<String> {
        let mut secret_bytes_copy = self.secret_bytes;

        let result = (|| {
            let secret_key = SecretKey::from_slice(&secret_bytes_copy)
                .map_err(|e| NostrError::Signing(e.to_string()))?;
            let keypair = Keypair::from_secret_key(&SECP, &secret_key);
            let message = Message::from_digest(*event_id);
            let signature = SECP.sign_schnorr(&message, &keypair);
            Ok(hex::encode(signature.serialize()))
        })();

        secret_bytes_copy.zeroize();
        result
    }

    /// Derives the NIP-04 shared secret with another party.
    ///
    /// The x-only key is lifted with even parity, and the result is the x
    /// coordinate of the ECDH point, so both parties obtain the same bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `other` is not a valid point.
    pub fn shared_secret(&self, other: &PublicKey) -> Result<SharedSecret> {
        let mut secret_bytes_copy = self.secret_bytes;

        let result = (|| {
            let secret_key = SecretKey::from_slice(&secret_bytes_copy)
                .map_err(|e| NostrError::InvalidKeyMaterial(e.to_string()))?;
            let point = FullPublicKey::from_x_only_public_key(other.x_only()?, Parity::Even);
            let mut xy = ecdh::shared_secret_point(&point, &secret_key);

            let mut x = [0u8; 32];
            x.copy_from_slice(&xy[..32]);
            xy.zeroize();
            Ok(SharedSecret(x))
        })();

        secret_bytes_copy.zeroize();
        result
    }
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the secret key
        f.debug_struct("Keys")
            .field("pubkey", &self.pubkey_hex())
            .finish()
    }
}

/// Verifies a hex Schnorr signature over a 32-byte event id.
///
/// Malformed keys or signatures simply fail verification.
#[must_use]
pub fn verify_signature(public_key: &PublicKey, event_id: &[u8; 32], signature_hex: &str) -> bool {
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return false;
    };
    let Ok(pubkey) = public_key.x_only() else {
        return false;
    };
    let message = Message::from_digest(*event_id);
    SECP.verify_schnorr(&signature, &message, &pubkey).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_valid_keypair() {
        let keys = Keys::generate();
        assert_eq!(keys.pubkey_hex().len(), 64);
        assert!(PublicKey::from_hex(&keys.pubkey_hex()).is_ok());
    }

    #[test]
    fn seed_is_deterministic() {
        let seed = "01".repeat(32);
        let a = Keys::from_seed(Some(&seed)).unwrap();
        let b = Keys::from_seed(Some(&seed)).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn no_seed_is_random() {
        let a = Keys::from_seed(None).unwrap();
        let b = Keys::from_seed(None).unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn short_seed_is_invalid_key_material() {
        let result = Keys::from_seed(Some("0101"));
        assert!(matches!(result, Err(NostrError::InvalidKeyMaterial(_))));
    }

    #[test]
    fn long_seed_is_invalid_key_material() {
        let seed = "01".repeat(33);
        let result = Keys::from_seed(Some(&seed));
        assert!(matches!(result, Err(NostrError::InvalidKeyMaterial(_))));
    }

    #[test]
    fn non_hex_seed_is_invalid_key_material() {
        let seed = "zz".repeat(32);
        let result = Keys::from_seed(Some(&seed));
        assert!(matches!(result, Err(NostrError::InvalidKeyMaterial(_))));
    }

    #[test]
    fn zero_seed_is_invalid_key_material() {
        let result = Keys::from_secret_bytes([0u8; 32]);
        assert!(matches!(result, Err(NostrError::InvalidKeyMaterial(_))));
    }

    #[test]
    fn curve_order_is_invalid_key_material() {
        let curve_order =
            hex::decode("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141")
                .unwrap();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&curve_order);
        assert!(Keys::from_secret_bytes(bytes).is_err());
    }

    #[test]
    fn nsec_roundtrip() {
        let original = Keys::generate();
        let nsec = original.export_nsec().unwrap();
        assert!(nsec.starts_with("nsec1"));

        let imported = Keys::parse(&nsec).unwrap();
        assert_eq!(original.public_key(), imported.public_key());
    }

    #[test]
    fn npub_parses_back() {
        let keys = Keys::generate();
        let npub = keys.public_key().npub().unwrap();
        assert!(npub.starts_with("npub1"));
        assert_eq!(PublicKey::parse(&npub).unwrap(), keys.public_key());
    }

    #[test]
    fn signature_verifies_correctly() {
        let keys = Keys::generate();
        let id = [0x42u8; 32];
        let sig = keys.sign(&id).unwrap();

        assert_eq!(sig.len(), 128);
        assert!(verify_signature(&keys.public_key(), &id, &sig));
    }

    #[test]
    fn signature_fails_with_wrong_pubkey() {
        let keys1 = Keys::generate();
        let keys2 = Keys::generate();
        let id = [0x42u8; 32];
        let sig = keys1.sign(&id).unwrap();

        assert!(!verify_signature(&keys2.public_key(), &id, &sig));
    }

    #[test]
    fn signature_fails_with_wrong_message() {
        let keys = Keys::generate();
        let sig = keys.sign(&[0x42u8; 32]).unwrap();

        assert!(!verify_signature(&keys.public_key(), &[0x43u8; 32], &sig));
    }

    #[test]
    fn garbage_signature_does_not_verify() {
        let keys = Keys::generate();
        assert!(!verify_signature(&keys.public_key(), &[0u8; 32], "not hex"));
        assert!(!verify_signature(&keys.public_key(), &[0u8; 32], "abcd"));
    }

    #[test]
    fn shared_secret_is_symmetric() {
        let alice = Keys::generate();
        let bob = Keys::generate();

        let ab = alice.shared_secret(&bob.public_key()).unwrap();
        let ba = bob.shared_secret(&alice.public_key()).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn shared_secret_differs_per_peer() {
        let alice = Keys::generate();
        let bob = Keys::generate();
        let carol = Keys::generate();

        let ab = alice.shared_secret(&bob.public_key()).unwrap();
        let ac = alice.shared_secret(&carol.public_key()).unwrap();
        assert_ne!(ab, ac);
    }

    #[test]
    fn public_key_rejects_bad_input() {
        assert!(PublicKey::from_hex("abcd").is_err());
        assert!(PublicKey::from_hex(&"zz".repeat(32)).is_err());
        assert!(PublicKey::parse("npub1invalid").is_err());
    }

    #[test]
    fn public_key_serde_is_hex_string() {
        let keys = Keys::generate();
        let json = serde_json::to_string(&keys.public_key()).unwrap();
        assert_eq!(json, format!("\"{}\"", keys.pubkey_hex()));

        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, keys.public_key());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let keys = Keys::from_seed(Some(&"01".repeat(32))).unwrap();
        let debug_output = format!("{keys:?}");

        assert!(debug_output.contains(&keys.pubkey_hex()));
        assert!(!debug_output.contains(&"01".repeat(32)));
    }

    #[test]
    fn shared_secret_debug_is_redacted() {
        let secret = SharedSecret::from_bytes([7u8; 32]);
        assert_eq!(format!("{secret:?}"), "SharedSecret(<redacted>)");
    }

    #[test]
    fn implements_zeroize_on_drop() {
        fn assert_zeroize_on_drop<T: ZeroizeOnDrop>() {}
        assert_zeroize_on_drop::<Keys>();
        assert_zeroize_on_drop::<SharedSecret>();
    }
}
