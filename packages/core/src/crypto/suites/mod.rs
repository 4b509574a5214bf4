//! Криптографические наборы (Crypto Suites)
//!
//! ## Примитивы
//! - [`classic`]: X25519, ChaCha20-Poly1305 / XChaCha20-Poly1305 / AES-256-GCM, HKDF
//! - [`pq`]: Kyber-768 (ML-KEM-768)
//! - [`hybrid`]: гибридный KEM + AEAD движок поверх обоих
//!
//! ## Обработчики
//!
//! [`SuiteHandler`] привязывает движок к способу получения ключей:
//!
//! | key_management_mode | Вариант            | Credentials            |
//! |---------------------|--------------------|------------------------|
//! | `passphrase`        | `PassphraseHybrid` | `Credentials::Passphrase` |
//! | `external-key-file` | `ExternalKeyHybrid`| `Credentials::KeyFile`    |

pub mod classic;
pub mod hybrid;
pub mod pq;

use crate::config::CryptoParams;
use crate::crypto::algorithms::{KeyManagementMode, SuiteDefinition, SuiteInfo};
use crate::crypto::bundle::EncryptedBundle;
use crate::crypto::keys::{derive_from_stretched, load_from_external_source, Credentials};
use crate::crypto::master_key::{generate_salt, stretch_passphrase, StretchCache, StretchParams};
use crate::utils::error::{AgilityError, Result};
use hybrid::{HybridEngine, SuiteMatch};
use zeroize::Zeroizing;

/// Обработчик одного набора
#[derive(Debug, Clone)]
pub enum SuiteHandler {
    /// Ключи выводятся из пароля заново при каждой операции.
    /// `params` задают стоимость растяжения только для новых bundle.
    PassphraseHybrid {
        engine: HybridEngine,
        params: CryptoParams,
    },
    /// Ключи читаются из файла внешних ключей
    ExternalKeyHybrid { engine: HybridEngine },
}

impl SuiteHandler {
    /// Фабрика по умолчанию: вариант выбирается по key_management_mode набора
    pub fn from_definition(suite: &SuiteDefinition, params: &CryptoParams) -> Result<Self> {
        params.validate()?;

        let engine = HybridEngine::new(suite.clone(), params);
        Ok(match suite.key_management_mode {
            KeyManagementMode::Passphrase => SuiteHandler::PassphraseHybrid {
                engine,
                params: params.clone(),
            },
            KeyManagementMode::ExternalKeyFile => SuiteHandler::ExternalKeyHybrid { engine },
        })
    }

    fn engine(&self) -> &HybridEngine {
        match self {
            SuiteHandler::PassphraseHybrid { engine, .. } => engine,
            SuiteHandler::ExternalKeyHybrid { engine } => engine,
        }
    }

    pub fn suite(&self) -> &SuiteDefinition {
        self.engine().suite()
    }

    pub fn suite_id(&self) -> &str {
        &self.suite().suite_id
    }

    pub fn info(&self) -> SuiteInfo {
        self.suite().info()
    }

    /// Зашифровать plaintext этим набором
    pub fn encrypt(&self, plaintext: &[u8], credentials: &Credentials) -> Result<EncryptedBundle> {
        match (self, credentials) {
            (SuiteHandler::PassphraseHybrid { engine, params }, Credentials::Passphrase(pw)) => {
                let salt = generate_salt(params.salt_length);
                let stretch = StretchParams::for_kdf(engine.suite().passphrase_kdf, params);
                let stretched = stretch_passphrase(pw, &salt, &stretch)?;
                let keys = derive_from_stretched(&*stretched, &salt, engine.suite())?;

                let mut bundle = engine.encrypt(plaintext, &keys)?;
                bundle.passphrase_kdf_params = Some(stretch);
                Ok(bundle)
            }
            (SuiteHandler::ExternalKeyHybrid { engine }, Credentials::KeyFile(path)) => {
                let keys = load_from_external_source(path, engine.suite())?;
                engine.encrypt(plaintext, &keys)
            }
            _ => Err(AgilityError::KeyManagementError(format!(
                "suite `{}` expects {} credentials",
                self.suite_id(),
                self.suite().key_management_mode.name()
            ))),
        }
    }

    /// Расшифровать уже разобранный bundle
    ///
    /// Every failure is [`AgilityError::DecryptionError`]. The passphrase is
    /// stretched with the parameters recorded in the bundle; bundles without
    /// them fall back to this handler's current params.
    pub fn decrypt(
        &self,
        bundle: &EncryptedBundle,
        credentials: &Credentials,
        suite_match: SuiteMatch,
    ) -> Result<Zeroizing<Vec<u8>>> {
        self.decrypt_cached(bundle, credentials, suite_match, &mut StretchCache::new())
    }

    /// То же, что [`Self::decrypt`], но растяжение пароля берётся из `cache`
    /// (общего для всех попыток одной расшифровки)
    pub(crate) fn decrypt_cached(
        &self,
        bundle: &EncryptedBundle,
        credentials: &Credentials,
        suite_match: SuiteMatch,
        cache: &mut StretchCache,
    ) -> Result<Zeroizing<Vec<u8>>> {
        use tracing::debug;

        let reject = |reason: &str| {
            debug!(
                target: "crypto::suites",
                suite_id = %self.suite_id(),
                reason = %reason,
                "Handler rejected bundle"
            );
            AgilityError::DecryptionError
        };

        // Дешёвые проверки до растяжения пароля
        if suite_match == SuiteMatch::Exact && bundle.suite_id_used != self.suite_id() {
            return Err(reject("bundle belongs to another suite"));
        }
        if bundle.validate_for(self.suite()).is_err() {
            return Err(reject("bundle is incomplete for this suite"));
        }

        match (self, credentials) {
            (SuiteHandler::PassphraseHybrid { engine, params }, Credentials::Passphrase(pw)) => {
                let salt = bundle
                    .passphrase_salt
                    .as_deref()
                    .ok_or_else(|| reject("passphrase salt is missing"))?;
                let stretch = bundle.passphrase_kdf_params.unwrap_or_else(|| {
                    StretchParams::for_kdf(engine.suite().passphrase_kdf, params)
                });
                let keys = cache
                    .stretch(pw, salt, &stretch)
                    .and_then(|stretched| derive_from_stretched(&*stretched, salt, engine.suite()))
                    .map_err(|e| reject(&e.to_string()))?;
                engine.decrypt(bundle, &keys, suite_match)
            }
            (SuiteHandler::ExternalKeyHybrid { engine }, Credentials::KeyFile(path)) => {
                let keys = load_from_external_source(path, engine.suite())
                    .map_err(|e| reject(&e.to_string()))?;
                engine.decrypt(bundle, &keys, suite_match)
            }
            _ => Err(reject("credentials do not match key management mode")),
        }
    }

    /// Разобрать wire-формат и проверить поля, нужные этому набору
    pub fn parse_bundle(&self, bytes: &[u8]) -> Result<EncryptedBundle> {
        let bundle = EncryptedBundle::from_bytes(bytes)?;
        bundle.validate_for(self.suite())?;
        Ok(bundle)
    }
}
