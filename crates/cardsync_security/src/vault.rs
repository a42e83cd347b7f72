//! Credential encryption using AES-256-GCM.
//!
//! Stored credentials have the form `iv_hex:tag_hex:data_hex`, all lower-case
//! hex, with a 16-byte IV drawn fresh for every encryption. The GCM tag is
//! kept separate from the ciphertext so each part can be validated on its
//! own before decryption is attempted.
//!
//! ## Usage
//!
//! ```
//! use cardsync_security::{CredentialVault, VaultKey};
//!
//! let vault = CredentialVault::new(VaultKey::generate());
//! let stored = vault.encrypt("hunter2").unwrap();
//! assert_eq!(vault.decrypt(&stored).unwrap().as_str(), "hunter2");
//! ```

use crate::error::{VaultError, VaultResult};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce, Tag};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the IV in bytes.
pub const IV_SIZE: usize = 16;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const HKDF_INFO: &[u8] = b"cardsync-credential-vault-v1";

type VaultCipher = AesGcm<Aes256, U16>;

/// Vault key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    bytes: [u8; KEY_SIZE],
}

impl VaultKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> VaultResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(VaultError::invalid_key(bytes.len(), KEY_SIZE));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { bytes: key })
    }

    /// Parses a 64-character hex key.
    pub fn from_hex(text: &str) -> VaultResult<Self> {
        let decoded = Zeroizing::new(
            hex::decode(text.trim()).map_err(|_| VaultError::invalid_format("key is not hex"))?,
        );
        Self::from_bytes(&decoded)
    }

    /// Derives a key from a passphrase using HKDF-SHA256.
    ///
    /// HKDF is not a password hash; the passphrase should already carry high
    /// entropy (a generated secret, not a user-chosen word).
    pub fn derive_from_passphrase(passphrase: &[u8], salt: &[u8]) -> VaultResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), passphrase);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(HKDF_INFO, &mut bytes)
            .map_err(|_| VaultError::EncryptionFailed("HKDF expand failed".into()))?;
        Ok(Self { bytes })
    }

    /// Hex form of the key, for handing to an operator once.
    #[must_use]
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.bytes))
    }

    fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypts and decrypts server credentials.
///
/// The key is injected at construction; the vault holds no other state and
/// can be shared freely between threads.
pub struct CredentialVault {
    cipher: VaultCipher,
}

impl CredentialVault {
    /// Creates a vault with the given key.
    #[must_use]
    pub fn new(key: VaultKey) -> Self {
        let cipher = VaultCipher::new(Key::<VaultCipher>::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// Encrypts a credential into `iv_hex:tag_hex:data_hex`.
    pub fn encrypt(&self, plaintext: &str) -> VaultResult<String> {
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| VaultError::EncryptionFailed("encryption error".into()))?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(&buffer)
        ))
    }

    /// Decrypts a value produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidFormat`] when the value is not three lower-case
    /// hex segments with a 16-byte IV and tag, and
    /// [`VaultError::AuthenticationFailed`] when the tag does not verify.
    pub fn decrypt(&self, stored: &str) -> VaultResult<Zeroizing<String>> {
        let parts: Vec<&str> = stored.split(':').collect();
        let [iv_hex, tag_hex, data_hex] = parts.as_slice() else {
            return Err(VaultError::invalid_format(format!(
                "expected 3 segments, found {}",
                parts.len()
            )));
        };

        let iv = decode_segment("iv", iv_hex)?;
        let tag = decode_segment("tag", tag_hex)?;
        let data = decode_segment("data", data_hex)?;
        if iv.len() != IV_SIZE {
            return Err(VaultError::invalid_format("iv must be 16 bytes"));
        }
        if tag.len() != TAG_SIZE {
            return Err(VaultError::invalid_format("tag must be 16 bytes"));
        }

        let mut buffer = Zeroizing::new(data);
        self.cipher
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(&iv),
                b"",
                &mut buffer,
                Tag::<U16>::from_slice(&tag),
            )
            .map_err(|_| VaultError::AuthenticationFailed)?;

        let text = std::str::from_utf8(&buffer)
            .map_err(|_| VaultError::invalid_format("plaintext is not UTF-8"))?;
        Ok(Zeroizing::new(text.to_string()))
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}

/// Decodes a strictly lower-case hex segment.
fn decode_segment(name: &str, segment: &str) -> VaultResult<Vec<u8>> {
    let lower_hex = segment
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !lower_hex || segment.len() % 2 != 0 {
        return Err(VaultError::invalid_format(format!(
            "{name} is not lower-case hex"
        )));
    }
    hex::decode(segment).map_err(|_| VaultError::invalid_format(format!("{name} is not hex")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vault() -> CredentialVault {
        CredentialVault::new(VaultKey::generate())
    }

    #[test]
    fn output_has_three_lowercase_segments() {
        let stored = vault().encrypt("secret").unwrap();
        let parts: Vec<&str> = stored.split(':').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), IV_SIZE * 2);
        assert_eq!(parts[1].len(), TAG_SIZE * 2);
        assert_eq!(parts[2].len(), "secret".len() * 2);
        assert_eq!(stored, stored.to_ascii_lowercase());
    }

    #[test]
    fn repeated_encryptions_differ() {
        let vault = vault();
        let a = vault.encrypt("same").unwrap();
        let b = vault.encrypt("same").unwrap();
        assert_ne!(a, b);
        assert_eq!(vault.decrypt(&a).unwrap().as_str(), "same");
        assert_eq!(vault.decrypt(&b).unwrap().as_str(), "same");
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let vault = vault();
        let stored = vault.encrypt("").unwrap();
        assert!(stored.ends_with(':'));
        assert_eq!(vault.decrypt(&stored).unwrap().as_str(), "");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let stored = vault().encrypt("secret").unwrap();
        assert_eq!(
            vault().decrypt(&stored).unwrap_err(),
            VaultError::AuthenticationFailed
        );
    }

    #[test]
    fn wrong_segment_count_is_invalid_format() {
        let vault = vault();
        for bad in ["", "abc", "aa:bb", "aa:bb:cc:dd"] {
            assert!(matches!(
                vault.decrypt(bad),
                Err(VaultError::InvalidFormat(_))
            ));
        }
    }

    #[test]
    fn uppercase_hex_is_rejected() {
        let vault = vault();
        let stored = vault.encrypt("secret").unwrap();
        assert!(matches!(
            vault.decrypt(&stored.to_ascii_uppercase()),
            Err(VaultError::InvalidFormat(_))
        ));
    }

    #[test]
    fn short_iv_is_rejected() {
        let vault = vault();
        let stored = vault.encrypt("secret").unwrap();
        let truncated = &stored[2..];
        assert!(matches!(
            vault.decrypt(truncated),
            Err(VaultError::InvalidFormat(_))
        ));
    }

    #[test]
    fn key_from_hex_round_trips() {
        let key = VaultKey::generate();
        let hex = key.to_hex();
        let parsed = VaultKey::from_hex(&hex).unwrap();
        assert_eq!(key.as_bytes(), parsed.as_bytes());

        assert!(VaultKey::from_hex("zz").is_err());
        assert_eq!(
            VaultKey::from_hex("abcd").unwrap_err(),
            VaultError::invalid_key(2, KEY_SIZE)
        );
    }

    #[test]
    fn derived_keys_are_deterministic() {
        let a = VaultKey::derive_from_passphrase(b"passphrase", b"salt").unwrap();
        let b = VaultKey::derive_from_passphrase(b"passphrase", b"salt").unwrap();
        let c = VaultKey::derive_from_passphrase(b"passphrase", b"other").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = VaultKey::from_bytes(&[7u8; KEY_SIZE]).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains('7'));
    }

    proptest! {
        #[test]
        fn round_trip(plaintext in ".{0,64}") {
            let vault = vault();
            let stored = vault.encrypt(&plaintext).unwrap();
            let decrypted = vault.decrypt(&stored).unwrap();
            prop_assert_eq!(decrypted.as_str(), plaintext.as_str());
        }

        #[test]
        fn any_single_character_flip_is_detected(
            plaintext in "[a-z]{1,24}",
            index in any::<prop::sample::Index>(),
        ) {
            let vault = vault();
            let stored = vault.encrypt(&plaintext).unwrap();

            let positions: Vec<usize> = stored
                .char_indices()
                .filter(|(_, c)| *c != ':')
                .map(|(i, _)| i)
                .collect();
            let pos = positions[index.index(positions.len())];

            let mut tampered = stored.clone().into_bytes();
            tampered[pos] = if tampered[pos] == b'0' { b'1' } else { b'0' };
            let tampered = String::from_utf8(tampered).unwrap();

            prop_assert!(vault.decrypt(&tampered).is_err());
        }
    }
}
