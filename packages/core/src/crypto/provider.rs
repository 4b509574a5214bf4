//! Primitive interfaces for crypto-agility.
//!
//! Each trait is implemented on a closed enum (the algorithm enums from
//! [`crate::crypto::algorithms`], or [`crate::crypto::master_key::StretchParams`]),
//! so the engine dispatches with a `match` instead of by type parameter. Implementations live in
//! [`crate::crypto::suites::classic`], [`crate::crypto::suites::pq`] and
//! [`crate::crypto::master_key`].

use crate::error::CryptoError;
use rand::rngs::OsRng;
use rand_core::RngCore;
use zeroize::Zeroizing;

/// Длина seed, из которого детерминированно строится пара ключей KEM
pub const KEM_SEED_LENGTH: usize = 32;

/// Длина промежуточного ключевого материала после растяжения пароля
pub const STRETCHED_KEY_LENGTH: usize = 32;

/// Key encapsulation mechanism.
pub trait Kem {
    fn public_key_len(&self) -> usize;

    fn private_key_len(&self) -> usize;

    /// Длина инкапсулированного ключа (для X25519 это эфемерный публичный ключ)
    fn encapsulated_len(&self) -> usize;

    /// Deterministically builds `(private_key, public_key)` from a 32-byte seed.
    fn keypair_from_seed(
        &self,
        seed: &[u8; KEM_SEED_LENGTH],
    ) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), CryptoError>;

    /// Генерирует новую пару ключей из OsRng.
    fn generate_keypair(&self) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), CryptoError> {
        let mut seed = Zeroizing::new([0u8; KEM_SEED_LENGTH]);
        OsRng.fill_bytes(&mut *seed);
        self.keypair_from_seed(&seed)
    }

    /// Returns `(encapsulated_key, shared_secret)`.
    fn encapsulate(&self, public_key: &[u8])
        -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), CryptoError>;

    fn decapsulate(
        &self,
        private_key: &[u8],
        encapsulated_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
}

/// AEAD cipher with a detached tag.
pub trait AeadCipher {
    fn key_len(&self) -> usize;

    fn nonce_len(&self) -> usize;

    fn tag_len(&self) -> usize;

    /// Returns `(ciphertext, tag)`.
    fn seal(
        &self,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError>;

    fn open(
        &self,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
        associated_data: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
}

/// Extract-and-expand KDF.
pub trait Kdf {
    fn derive(
        &self,
        input_keying_material: &[u8],
        salt: Option<&[u8]>,
        info: &[u8],
        output_length: usize,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
}

/// Password-based KDF (растяжение пароля). The implementor carries its own cost.
pub trait PassphraseStretcher {
    fn stretch(
        &self,
        passphrase: &[u8],
        salt: &[u8],
    ) -> Result<Zeroizing<[u8; STRETCHED_KEY_LENGTH]>, CryptoError>;
}

/// Криптографически стойкие случайные байты (nonce, соли)
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_bytes_length_and_uniqueness() {
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let nonce = random_bytes(12);
            assert_eq!(nonce.len(), 12);
            assert!(seen.insert(nonce), "duplicate nonce generated");
        }
    }
}
