//! Post-quantum KEM: Kyber-768.
//!
//! `pqc_kyber` accepts any `CryptoRng`, which lets passphrase-derived suites
//! rebuild the same key pair from a seed via `ChaCha20Rng`.

use crate::crypto::algorithms::PqcKemAlgorithm;
use crate::crypto::provider::{Kem, KEM_SEED_LENGTH};
use crate::error::CryptoError;
use pqc_kyber::{
    decapsulate, encapsulate, keypair, KYBER_CIPHERTEXTBYTES, KYBER_PUBLICKEYBYTES,
    KYBER_SECRETKEYBYTES,
};
use rand::rngs::OsRng;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use zeroize::{Zeroize, Zeroizing};

impl Kem for PqcKemAlgorithm {
    fn public_key_len(&self) -> usize {
        match self {
            PqcKemAlgorithm::Kyber768 => KYBER_PUBLICKEYBYTES,
        }
    }

    fn private_key_len(&self) -> usize {
        match self {
            PqcKemAlgorithm::Kyber768 => KYBER_SECRETKEYBYTES,
        }
    }

    fn encapsulated_len(&self) -> usize {
        match self {
            PqcKemAlgorithm::Kyber768 => KYBER_CIPHERTEXTBYTES,
        }
    }

    fn keypair_from_seed(
        &self,
        seed: &[u8; KEM_SEED_LENGTH],
    ) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), CryptoError> {
        match self {
            PqcKemAlgorithm::Kyber768 => {
                let mut rng = ChaCha20Rng::from_seed(*seed);
                let mut keys = keypair(&mut rng)
                    .map_err(|e| CryptoError::KeyGenerationError(format!("{:?}", e)))?;

                let secret = Zeroizing::new(keys.secret.to_vec());
                keys.secret.zeroize();
                Ok((secret, keys.public.to_vec()))
            }
        }
    }

    fn encapsulate(
        &self,
        public_key: &[u8],
    ) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), CryptoError> {
        match self {
            PqcKemAlgorithm::Kyber768 => {
                if public_key.len() != KYBER_PUBLICKEYBYTES {
                    return Err(CryptoError::InvalidInputError(format!(
                        "Invalid Kyber public key length: expected {}, got {}",
                        KYBER_PUBLICKEYBYTES,
                        public_key.len()
                    )));
                }
                let (ciphertext, mut shared_secret) = encapsulate(public_key, &mut OsRng)
                    .map_err(|e| CryptoError::KemEncapsulationError(format!("{:?}", e)))?;

                let secret = Zeroizing::new(shared_secret.to_vec());
                shared_secret.zeroize();
                Ok((ciphertext.to_vec(), secret))
            }
        }
    }

    fn decapsulate(
        &self,
        private_key: &[u8],
        encapsulated_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        match self {
            PqcKemAlgorithm::Kyber768 => {
                if private_key.len() != KYBER_SECRETKEYBYTES
                    || encapsulated_key.len() != KYBER_CIPHERTEXTBYTES
                {
                    return Err(CryptoError::InvalidInputError(
                        "Invalid Kyber key or ciphertext length".to_string(),
                    ));
                }
                // Kyber использует implicit rejection: неверный ключ даёт случайный секрет,
                // и ошибка проявится только на проверке AEAD-тега
                let mut shared_secret = decapsulate(encapsulated_key, private_key)?;

                let secret = Zeroizing::new(shared_secret.to_vec());
                shared_secret.zeroize();
                Ok(secret)
            }
        }
    }
}
