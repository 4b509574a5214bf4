use thiserror::Error;

/// Ошибки уровня примитивов (KEM, AEAD, KDF).
///
/// Never surfaced to a decrypt caller as-is: the hybrid engine collapses all of
/// them into [`crate::utils::error::AgilityError::DecryptionError`].
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Failed to generate keys: {0}")]
    KeyGenerationError(String),
    #[error("KEM encapsulation failed: {0}")]
    KemEncapsulationError(String),
    #[error("KEM decapsulation failed: {0}")]
    KemDecapsulationError(String),
    #[error("AEAD encryption failed: {0}")]
    AeadEncryptionError(String),
    #[error("AEAD decryption failed: {0}")]
    AeadDecryptionError(String),
    #[error("Key derivation failed: {0}")]
    KeyDerivationError(String),
    #[error("Invalid input: {0}")]
    InvalidInputError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl From<pqc_kyber::KyberError> for CryptoError {
    fn from(err: pqc_kyber::KyberError) -> Self {
        CryptoError::KemDecapsulationError(format!("{:?}", err))
    }
}

impl From<bincode::Error> for CryptoError {
    fn from(err: bincode::Error) -> Self {
        CryptoError::DeserializationError(err.to_string())
    }
}
