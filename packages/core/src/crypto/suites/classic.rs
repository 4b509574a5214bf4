//! Классические примитивы: X25519 KEM, ChaCha20/XChaCha20/AES-GCM, HKDF.

use crate::crypto::algorithms::{ClassicalKemAlgorithm, KdfAlgorithm, SymmetricAlgorithm};
use crate::crypto::provider::{AeadCipher, Kdf, Kem, KEM_SEED_LENGTH};
use crate::error::CryptoError;
use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    ChaCha20Poly1305, XChaCha20Poly1305,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::{Sha256, Sha512};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

const X25519_KEY_LENGTH: usize = 32;

/// Все поддерживаемые AEAD используют 256-битный ключ и 128-битный тег
const AEAD_KEY_LENGTH: usize = 32;
const AEAD_TAG_LENGTH: usize = 16;

fn to_array_32(bytes: &[u8], what: &str) -> Result<[u8; 32], CryptoError> {
    bytes.try_into().map_err(|_| {
        CryptoError::InvalidInputError(format!(
            "Invalid {} length: expected 32, got {}",
            what,
            bytes.len()
        ))
    })
}

impl Kem for ClassicalKemAlgorithm {
    fn public_key_len(&self) -> usize {
        match self {
            ClassicalKemAlgorithm::X25519 => X25519_KEY_LENGTH,
        }
    }

    fn private_key_len(&self) -> usize {
        match self {
            ClassicalKemAlgorithm::X25519 => X25519_KEY_LENGTH,
        }
    }

    fn encapsulated_len(&self) -> usize {
        match self {
            ClassicalKemAlgorithm::X25519 => X25519_KEY_LENGTH,
        }
    }

    fn keypair_from_seed(
        &self,
        seed: &[u8; KEM_SEED_LENGTH],
    ) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), CryptoError> {
        match self {
            ClassicalKemAlgorithm::X25519 => {
                let secret = StaticSecret::from(*seed);
                let public = X25519PublicKey::from(&secret);
                Ok((
                    Zeroizing::new(secret.to_bytes().to_vec()),
                    public.to_bytes().to_vec(),
                ))
            }
        }
    }

    fn encapsulate(
        &self,
        public_key: &[u8],
    ) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), CryptoError> {
        match self {
            ClassicalKemAlgorithm::X25519 => {
                let recipient = X25519PublicKey::from(to_array_32(public_key, "X25519 public key")?);

                // Ephemeral-static DH: эфемерный публичный ключ и есть "инкапсуляция"
                let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
                let ephemeral_public = X25519PublicKey::from(&ephemeral_secret);
                let shared_secret = ephemeral_secret.diffie_hellman(&recipient);

                if !shared_secret.was_contributory() {
                    return Err(CryptoError::KemEncapsulationError(
                        "Non-contributory X25519 shared secret".to_string(),
                    ));
                }

                Ok((
                    ephemeral_public.to_bytes().to_vec(),
                    Zeroizing::new(shared_secret.to_bytes().to_vec()),
                ))
            }
        }
    }

    fn decapsulate(
        &self,
        private_key: &[u8],
        encapsulated_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        match self {
            ClassicalKemAlgorithm::X25519 => {
                let secret_bytes =
                    Zeroizing::new(to_array_32(private_key, "X25519 private key")?);
                let static_secret = StaticSecret::from(*secret_bytes);
                let ephemeral_public =
                    X25519PublicKey::from(to_array_32(encapsulated_key, "X25519 ephemeral key")?);

                let shared_secret = static_secret.diffie_hellman(&ephemeral_public);
                if !shared_secret.was_contributory() {
                    return Err(CryptoError::KemDecapsulationError(
                        "Non-contributory X25519 shared secret".to_string(),
                    ));
                }
                Ok(Zeroizing::new(shared_secret.to_bytes().to_vec()))
            }
        }
    }
}

fn seal_with<C>(
    key: &[u8],
    nonce: &[u8],
    plaintext: &[u8],
    associated_data: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), CryptoError>
where
    C: Aead + KeyInit,
{
    let cipher = C::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidInputError("Invalid AEAD key length".to_string()))?;
    let payload = Payload {
        msg: plaintext,
        aad: associated_data,
    };

    let mut ciphertext = cipher
        .encrypt(GenericArray::from_slice(nonce), payload)
        .map_err(|e| CryptoError::AeadEncryptionError(e.to_string()))?;

    // aead возвращает ciphertext || tag; тег хранится в bundle отдельно
    let tag = ciphertext.split_off(ciphertext.len() - AEAD_TAG_LENGTH);
    Ok((ciphertext, tag))
}

fn open_with<C>(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    associated_data: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError>
where
    C: Aead + KeyInit,
{
    let cipher = C::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidInputError("Invalid AEAD key length".to_string()))?;

    let mut ciphertext_with_tag = Vec::with_capacity(ciphertext.len() + tag.len());
    ciphertext_with_tag.extend_from_slice(ciphertext);
    ciphertext_with_tag.extend_from_slice(tag);

    let payload = Payload {
        msg: &ciphertext_with_tag,
        aad: associated_data,
    };

    let plaintext = cipher
        .decrypt(GenericArray::from_slice(nonce), payload)
        .map_err(|e| CryptoError::AeadDecryptionError(e.to_string()))?;
    Ok(Zeroizing::new(plaintext))
}

impl SymmetricAlgorithm {
    fn check_lengths(&self, key: &[u8], nonce: &[u8]) -> Result<(), CryptoError> {
        if key.len() != self.key_len() {
            return Err(CryptoError::InvalidInputError(format!(
                "Invalid AEAD key length: expected {}, got {}",
                self.key_len(),
                key.len()
            )));
        }
        if nonce.len() != self.nonce_len() {
            return Err(CryptoError::InvalidInputError(format!(
                "Invalid nonce length: expected {}, got {}",
                self.nonce_len(),
                nonce.len()
            )));
        }
        Ok(())
    }
}

impl AeadCipher for SymmetricAlgorithm {
    fn key_len(&self) -> usize {
        AEAD_KEY_LENGTH
    }

    fn nonce_len(&self) -> usize {
        match self {
            SymmetricAlgorithm::ChaCha20Poly1305 => 12,
            SymmetricAlgorithm::XChaCha20Poly1305 => 24,
            SymmetricAlgorithm::Aes256Gcm => 12,
        }
    }

    fn tag_len(&self) -> usize {
        AEAD_TAG_LENGTH
    }

    fn seal(
        &self,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        self.check_lengths(key, nonce)?;
        match self {
            SymmetricAlgorithm::ChaCha20Poly1305 => {
                seal_with::<ChaCha20Poly1305>(key, nonce, plaintext, associated_data)
            }
            SymmetricAlgorithm::XChaCha20Poly1305 => {
                seal_with::<XChaCha20Poly1305>(key, nonce, plaintext, associated_data)
            }
            SymmetricAlgorithm::Aes256Gcm => {
                seal_with::<Aes256Gcm>(key, nonce, plaintext, associated_data)
            }
        }
    }

    fn open(
        &self,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
        associated_data: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        self.check_lengths(key, nonce)?;
        if tag.len() != AEAD_TAG_LENGTH {
            return Err(CryptoError::InvalidInputError(format!(
                "Invalid tag length: expected {}, got {}",
                AEAD_TAG_LENGTH,
                tag.len()
            )));
        }
        match self {
            SymmetricAlgorithm::ChaCha20Poly1305 => {
                open_with::<ChaCha20Poly1305>(key, nonce, ciphertext, tag, associated_data)
            }
            SymmetricAlgorithm::XChaCha20Poly1305 => {
                open_with::<XChaCha20Poly1305>(key, nonce, ciphertext, tag, associated_data)
            }
            SymmetricAlgorithm::Aes256Gcm => {
                open_with::<Aes256Gcm>(key, nonce, ciphertext, tag, associated_data)
            }
        }
    }
}

impl Kdf for KdfAlgorithm {
    fn derive(
        &self,
        input_keying_material: &[u8],
        salt: Option<&[u8]>,
        info: &[u8],
        output_length: usize,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let mut okm = Zeroizing::new(vec![0u8; output_length]);
        match self {
            KdfAlgorithm::HkdfSha256 => Hkdf::<Sha256>::new(salt, input_keying_material)
                .expand(info, &mut okm)
                .map_err(|e| CryptoError::KeyDerivationError(e.to_string()))?,
            KdfAlgorithm::HkdfSha512 => Hkdf::<Sha512>::new(salt, input_keying_material)
                .expand(info, &mut okm)
                .map_err(|e| CryptoError::KeyDerivationError(e.to_string()))?,
        }
        Ok(okm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_AEADS: [SymmetricAlgorithm; 3] = [
        SymmetricAlgorithm::ChaCha20Poly1305,
        SymmetricAlgorithm::XChaCha20Poly1305,
        SymmetricAlgorithm::Aes256Gcm,
    ];

    #[test]
    fn test_x25519_encapsulate_decapsulate() {
        let kem = ClassicalKemAlgorithm::X25519;
        let (private_key, public_key) = kem.generate_keypair().unwrap();
        assert_eq!(public_key.len(), 32);

        let (ephemeral, sender_secret) = kem.encapsulate(&public_key).unwrap();
        let receiver_secret = kem.decapsulate(&private_key, &ephemeral).unwrap();
        assert_eq!(*sender_secret, *receiver_secret);
    }

    #[test]
    fn test_x25519_keypair_from_seed_is_deterministic() {
        let kem = ClassicalKemAlgorithm::X25519;
        let (sk1, pk1) = kem.keypair_from_seed(&[7u8; 32]).unwrap();
        let (sk2, pk2) = kem.keypair_from_seed(&[7u8; 32]).unwrap();
        assert_eq!(*sk1, *sk2);
        assert_eq!(pk1, pk2);
    }

    #[test]
    fn test_x25519_rejects_low_order_point() {
        let kem = ClassicalKemAlgorithm::X25519;
        let (private_key, _) = kem.generate_keypair().unwrap();
        // Нулевая точка даёт нулевой общий секрет
        let result = kem.decapsulate(&private_key, &[0u8; 32]);
        assert!(result.is_err());
        assert!(kem.encapsulate(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_x25519_rejects_wrong_length() {
        let kem = ClassicalKemAlgorithm::X25519;
        assert!(kem.encapsulate(&[1u8; 31]).is_err());
    }

    #[test]
    fn test_aead_seal_open_all_algorithms() {
        for aead in ALL_AEADS {
            let key = vec![3u8; aead.key_len()];
            let nonce = vec![5u8; aead.nonce_len()];
            let (ciphertext, tag) = aead.seal(&key, &nonce, b"Secret message", b"header").unwrap();
            assert_eq!(tag.len(), aead.tag_len());
            assert_eq!(ciphertext.len(), b"Secret message".len());

            let plaintext = aead.open(&key, &nonce, &ciphertext, &tag, b"header").unwrap();
            assert_eq!(plaintext.as_slice(), b"Secret message");
        }
    }

    #[test]
    fn test_aead_rejects_wrong_associated_data() {
        for aead in ALL_AEADS {
            let key = vec![3u8; aead.key_len()];
            let nonce = vec![5u8; aead.nonce_len()];
            let (ciphertext, tag) = aead.seal(&key, &nonce, b"data", b"suite-a").unwrap();
            assert!(aead.open(&key, &nonce, &ciphertext, &tag, b"suite-b").is_err());
        }
    }

    #[test]
    fn test_aead_rejects_bad_nonce_length_without_panic() {
        let aead = SymmetricAlgorithm::ChaCha20Poly1305;
        let key = vec![0u8; 32];
        assert!(aead.seal(&key, &[0u8; 24], b"data", b"").is_err());
        assert!(aead.open(&key, &[0u8; 11], b"data", &[0u8; 16], b"").is_err());
    }

    #[test]
    fn test_hkdf_deterministic_and_algorithm_bound() {
        let a = KdfAlgorithm::HkdfSha256
            .derive(b"ikm", Some(b"salt"), b"info", 32)
            .unwrap();
        let b = KdfAlgorithm::HkdfSha256
            .derive(b"ikm", Some(b"salt"), b"info", 32)
            .unwrap();
        let c = KdfAlgorithm::HkdfSha512
            .derive(b"ikm", Some(b"salt"), b"info", 32)
            .unwrap();
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_hkdf_rejects_oversized_output() {
        // HKDF-SHA256 выдаёт не более 255 * 32 байт
        assert!(KdfAlgorithm::HkdfSha256.derive(b"ikm", None, b"", 255 * 32 + 1).is_err());
    }
}
