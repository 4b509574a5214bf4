// Типы ошибок

use thiserror::Error;

/// Публичная таксономия ошибок ядра.
///
/// The two decryption variants carry no payload: a wrong passphrase, a tampered
/// bundle and a suite mismatch all look the same to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgilityError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Algorithm not found: {0}")]
    AlgorithmNotFound(String),

    #[error("key material error: {0}")]
    KeyManagementError(String),

    #[error("encryption could not complete: {0}")]
    EncryptionFailed(String),

    #[error("Malformed bundle: {0}")]
    MalformedBundle(String),

    #[error("unable to decrypt")]
    DecryptionError,

    #[error("unable to decrypt: no configured scheme succeeded")]
    DecryptionFailed,
}

impl AgilityError {
    /// Ошибки, после которых запуск невозможен (активный набор не настроен)
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            AgilityError::ConfigurationError(_) | AgilityError::AlgorithmNotFound(_)
        )
    }
}

impl From<serde_json::Error> for AgilityError {
    fn from(error: serde_json::Error) -> Self {
        AgilityError::ConfigurationError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgilityError>;
