// Растяжение пароля в промежуточный ключевой материал
// Argon2id (memory-hard) по умолчанию, PBKDF2-SHA256 для legacy-наборов
//
// Параметры стоимости записываются в каждый bundle, поэтому смена CryptoParams
// влияет только на новые шифрования.

use crate::config::{
    CryptoParams, MAX_ARGON2_ITERATIONS, MAX_ARGON2_MEMORY_KIB, MAX_ARGON2_PARALLELISM,
    MAX_PBKDF2_ITERATIONS, MIN_SALT_LENGTH,
};
use crate::crypto::algorithms::PassphraseKdf;
use crate::crypto::provider::{random_bytes, PassphraseStretcher, STRETCHED_KEY_LENGTH};
use crate::error::CryptoError;
use crate::utils::error::{AgilityError, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

/// Алгоритм растяжения вместе с его стоимостью, как он записан в bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StretchParams {
    Argon2id {
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    },
    Pbkdf2Sha256 {
        iterations: u32,
    },
}

impl StretchParams {
    /// Текущие параметры конфигурации для данного алгоритма
    pub fn for_kdf(kdf: PassphraseKdf, params: &CryptoParams) -> Self {
        match kdf {
            PassphraseKdf::Argon2id => StretchParams::Argon2id {
                memory_kib: params.argon2_memory_kib,
                iterations: params.argon2_iterations,
                parallelism: params.argon2_parallelism,
            },
            PassphraseKdf::Pbkdf2Sha256 => StretchParams::Pbkdf2Sha256 {
                iterations: params.pbkdf2_iterations,
            },
        }
    }

    pub fn kdf(&self) -> PassphraseKdf {
        match self {
            StretchParams::Argon2id { .. } => PassphraseKdf::Argon2id,
            StretchParams::Pbkdf2Sha256 { .. } => PassphraseKdf::Pbkdf2Sha256,
        }
    }

    /// Values read from a bundle are untrusted; anything outside these bounds
    /// is refused before stretching.
    pub fn within_limits(&self) -> bool {
        match *self {
            StretchParams::Argon2id {
                memory_kib,
                iterations,
                parallelism,
            } => {
                (1..=MAX_ARGON2_ITERATIONS).contains(&iterations)
                    && (1..=MAX_ARGON2_PARALLELISM).contains(&parallelism)
                    && memory_kib >= 8 * parallelism
                    && memory_kib <= MAX_ARGON2_MEMORY_KIB
            }
            StretchParams::Pbkdf2Sha256 { iterations } => {
                (1..=MAX_PBKDF2_ITERATIONS).contains(&iterations)
            }
        }
    }
}

impl PassphraseStretcher for StretchParams {
    fn stretch(
        &self,
        passphrase: &[u8],
        salt: &[u8],
    ) -> std::result::Result<Zeroizing<[u8; STRETCHED_KEY_LENGTH]>, CryptoError> {
        let mut key = Zeroizing::new([0u8; STRETCHED_KEY_LENGTH]);

        match *self {
            StretchParams::Argon2id {
                memory_kib,
                iterations,
                parallelism,
            } => {
                let argon_params =
                    Params::new(memory_kib, iterations, parallelism, Some(STRETCHED_KEY_LENGTH))
                        .map_err(|e| {
                            CryptoError::KeyDerivationError(format!("Argon2 params: {}", e))
                        })?;

                Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params)
                    .hash_password_into(passphrase, salt, &mut *key)
                    .map_err(|e| CryptoError::KeyDerivationError(format!("Argon2 hash: {}", e)))?;
            }
            StretchParams::Pbkdf2Sha256 { iterations } => {
                pbkdf2_hmac::<Sha256>(passphrase, salt, iterations, &mut *key);
            }
        }

        Ok(key)
    }
}

/// Растянуть пароль в 256-битный промежуточный ключ
///
/// # Arguments
/// * `passphrase` - Пользовательский пароль (не пустой)
/// * `salt` - passphrase_salt из bundle (не короче 16 байт)
/// * `stretch` - Алгоритм и стоимость (текущие при шифровании, из bundle при расшифровке)
pub fn stretch_passphrase(
    passphrase: &str,
    salt: &[u8],
    stretch: &StretchParams,
) -> Result<Zeroizing<[u8; STRETCHED_KEY_LENGTH]>> {
    if passphrase.is_empty() {
        return Err(AgilityError::KeyManagementError(
            "passphrase cannot be empty".to_string(),
        ));
    }

    if salt.len() < MIN_SALT_LENGTH {
        return Err(AgilityError::KeyManagementError(format!(
            "passphrase salt too short: expected at least {}, got {}",
            MIN_SALT_LENGTH,
            salt.len()
        )));
    }

    if !stretch.within_limits() {
        return Err(AgilityError::KeyManagementError(
            "passphrase stretching cost out of range".to_string(),
        ));
    }

    stretch
        .stretch(passphrase.as_bytes(), salt)
        .map_err(|e| AgilityError::KeyManagementError(e.to_string()))
}

struct StretchEntry {
    passphrase: Zeroizing<String>,
    salt: Vec<u8>,
    stretch: StretchParams,
    key: Zeroizing<[u8; STRETCHED_KEY_LENGTH]>,
}

/// Растянутые ключи в пределах одного вызова расшифровки.
///
/// Candidates sharing a salt and stretch parameters reuse one Argon2 run.
/// Entries are wiped when the cache is dropped.
#[derive(Default)]
pub(crate) struct StretchCache {
    entries: Vec<StretchEntry>,
    stretches: usize,
}

impl StretchCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn stretch(
        &mut self,
        passphrase: &str,
        salt: &[u8],
        stretch: &StretchParams,
    ) -> Result<Zeroizing<[u8; STRETCHED_KEY_LENGTH]>> {
        let cached = self.entries.iter().find(|entry| {
            entry.stretch == *stretch
                && entry.salt.as_slice() == salt
                && entry.passphrase.as_str() == passphrase
        });
        if let Some(entry) = cached {
            return Ok(entry.key.clone());
        }

        let key = stretch_passphrase(passphrase, salt, stretch)?;
        self.stretches += 1;
        self.entries.push(StretchEntry {
            passphrase: Zeroizing::new(passphrase.to_string()),
            salt: salt.to_vec(),
            stretch: *stretch,
            key: key.clone(),
        });
        Ok(key)
    }

    /// Сколько раз реально выполнялось растяжение
    pub(crate) fn stretches(&self) -> usize {
        self.stretches
    }
}

/// Генерировать случайную соль
pub fn generate_salt(len: usize) -> Vec<u8> {
    random_bytes(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> CryptoParams {
        CryptoParams {
            argon2_memory_kib: 256,
            argon2_iterations: 1,
            argon2_parallelism: 1,
            pbkdf2_iterations: 1_000,
            salt_length: 16,
        }
    }

    fn argon() -> StretchParams {
        StretchParams::for_kdf(PassphraseKdf::Argon2id, &fast_params())
    }

    #[test]
    fn test_stretch_deterministic() {
        let salt = generate_salt(16);
        for kdf in [PassphraseKdf::Argon2id, PassphraseKdf::Pbkdf2Sha256] {
            let stretch = StretchParams::for_kdf(kdf, &fast_params());
            let key1 = stretch_passphrase("test_password_123", &salt, &stretch).unwrap();
            let key2 = stretch_passphrase("test_password_123", &salt, &stretch).unwrap();
            // Одинаковый пароль и соль должны давать одинаковый ключ
            assert_eq!(&*key1, &*key2);
        }
    }

    #[test]
    fn test_stretch_different_salt() {
        let salt1 = generate_salt(16);
        let salt2 = generate_salt(16);

        let key1 = stretch_passphrase("password", &salt1, &argon()).unwrap();
        let key2 = stretch_passphrase("password", &salt2, &argon()).unwrap();

        assert_ne!(&*key1, &*key2);
    }

    #[test]
    fn test_argon2_and_pbkdf2_disagree() {
        let salt = [1u8; 16];
        let argon_key = stretch_passphrase("pw", &salt, &argon()).unwrap();
        let pbkdf = stretch_passphrase(
            "pw",
            &salt,
            &StretchParams::for_kdf(PassphraseKdf::Pbkdf2Sha256, &fast_params()),
        )
        .unwrap();
        assert_ne!(&*argon_key, &*pbkdf);
    }

    #[test]
    fn test_cost_changes_stretched_key() {
        let salt = [1u8; 16];
        let cheap = stretch_passphrase("pw", &salt, &argon()).unwrap();
        let dearer = StretchParams::Argon2id {
            memory_kib: 256,
            iterations: 2,
            parallelism: 1,
        };
        assert_ne!(&*cheap, &*stretch_passphrase("pw", &salt, &dearer).unwrap());
    }

    #[test]
    fn test_for_kdf_reads_config() {
        assert_eq!(
            argon(),
            StretchParams::Argon2id {
                memory_kib: 256,
                iterations: 1,
                parallelism: 1
            }
        );
        assert_eq!(
            StretchParams::for_kdf(PassphraseKdf::Pbkdf2Sha256, &fast_params()),
            StretchParams::Pbkdf2Sha256 { iterations: 1_000 }
        );
        assert_eq!(argon().kdf(), PassphraseKdf::Argon2id);
    }

    #[test]
    fn test_limits() {
        assert!(argon().within_limits());
        assert!(StretchParams::for_kdf(PassphraseKdf::Argon2id, &CryptoParams::default()).within_limits());

        let too_much_memory = StretchParams::Argon2id {
            memory_kib: MAX_ARGON2_MEMORY_KIB + 1,
            iterations: 1,
            parallelism: 1,
        };
        let zero_passes = StretchParams::Argon2id {
            memory_kib: 256,
            iterations: 0,
            parallelism: 1,
        };
        let too_many_rounds = StretchParams::Pbkdf2Sha256 {
            iterations: MAX_PBKDF2_ITERATIONS + 1,
        };
        for stretch in [too_much_memory, zero_passes, too_many_rounds] {
            assert!(!stretch.within_limits(), "{:?}", stretch);
            assert!(matches!(
                stretch_passphrase("pw", &[0u8; 16], &stretch),
                Err(AgilityError::KeyManagementError(_))
            ));
        }
    }

    #[test]
    fn test_cache_reuses_stretch() {
        let mut cache = StretchCache::new();
        let salt = [9u8; 16];

        let first = cache.stretch("pw", &salt, &argon()).unwrap();
        let second = cache.stretch("pw", &salt, &argon()).unwrap();
        assert_eq!(&*first, &*second);
        assert_eq!(cache.stretches(), 1);

        let other_salt = cache.stretch("pw", &[8u8; 16], &argon()).unwrap();
        assert_ne!(&*first, &*other_salt);
        let other_pw = cache.stretch("pw2", &salt, &argon()).unwrap();
        assert_ne!(&*first, &*other_pw);
        assert_eq!(cache.stretches(), 3);
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        let err = stretch_passphrase("", &[0u8; 16], &argon()).unwrap_err();
        assert!(matches!(err, AgilityError::KeyManagementError(_)));
    }

    #[test]
    fn test_short_salt_rejected() {
        let err = stretch_passphrase("pw", &[0u8; 8], &argon()).unwrap_err();
        assert!(matches!(err, AgilityError::KeyManagementError(_)));
    }

    #[test]
    fn test_generate_salt() {
        let salt1 = generate_salt(32);
        let salt2 = generate_salt(32);
        assert_ne!(salt1, salt2);
        assert_eq!(salt1.len(), 32);
    }
}
