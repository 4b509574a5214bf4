//! Централизованная конфигурация ядра crypto-agility
//!
//! Конфигурация создаётся один раз при старте явно (без глобального синглтона)
//! и передаётся по ссылке в [`crate::crypto::registry::SuiteRegistry`].
//!
//! ```json
//! {
//!   "active_encryption_suite_id": "HYBRID-1",
//!   "decryption_attempt_order": ["HYBRID-1", "HYBRID-0"],
//!   "suites": {
//!     "HYBRID-1": {
//!       "classical_kem_algorithm": "X25519",
//!       "pqc_kem_algorithm": "Kyber768",
//!       "symmetric_algorithm": "ChaCha20-Poly1305",
//!       "kdf_algorithm": "HKDF-SHA256",
//!       "key_management_mode": "passphrase"
//!     }
//!   }
//! }
//! ```

use crate::utils::error::{AgilityError, Result};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Минимальная длина соли (байты) для Argon2 / PBKDF2 / HKDF
pub const MIN_SALT_LENGTH: usize = 16;

/// Переменная окружения с путём к JSON-конфигурации
pub const CONFIG_PATH_ENV: &str = "AGILITY_CONFIG";

/// Верхние границы стоимости растяжения пароля.
///
/// Bundles carry their own stretch parameters, so the same limits apply to
/// values read from a bundle before any Argon2 or PBKDF2 run.
pub const MAX_ARGON2_MEMORY_KIB: u32 = 1 << 20;
pub const MAX_ARGON2_ITERATIONS: u32 = 32;
pub const MAX_ARGON2_PARALLELISM: u32 = 64;
pub const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;

/// Криптографические параметры, общие для всех наборов
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoParams {
    /// Argon2id: память в KiB (по умолчанию 64 MiB)
    pub argon2_memory_kib: u32,

    /// Argon2id: количество проходов
    pub argon2_iterations: u32,

    /// Argon2id: количество параллельных линий
    pub argon2_parallelism: u32,

    /// PBKDF2: количество итераций (только для legacy-наборов)
    pub pbkdf2_iterations: u32,

    /// Длина passphrase_salt и kdf_salt (в байтах)
    pub salt_length: usize,
}

impl Default for CryptoParams {
    fn default() -> Self {
        Self {
            argon2_memory_kib: 65536,
            argon2_iterations: 3,
            argon2_parallelism: 4,
            pbkdf2_iterations: 100_000,
            salt_length: 32,
        }
    }
}

impl CryptoParams {
    /// Значения по умолчанию, переопределённые из переменных окружения
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Переопределить поля из `AGILITY_*`; нечитаемые значения игнорируются
    ///
    /// Changing these only affects new encryptions: every passphrase bundle
    /// records the parameters it was stretched with.
    pub fn with_env_overrides(self) -> Self {
        let mut params = self;

        if let Some(parsed) = env_parse("AGILITY_ARGON2_MEMORY_KIB") {
            params.argon2_memory_kib = parsed;
        }

        if let Some(parsed) = env_parse("AGILITY_ARGON2_ITERATIONS") {
            params.argon2_iterations = parsed;
        }

        if let Some(parsed) = env_parse("AGILITY_ARGON2_PARALLELISM") {
            params.argon2_parallelism = parsed;
        }

        if let Some(parsed) = env_parse("AGILITY_PBKDF2_ITERATIONS") {
            params.pbkdf2_iterations = parsed;
        }

        if let Some(parsed) = env_parse("AGILITY_SALT_LENGTH") {
            params.salt_length = parsed;
        }

        params
    }

    pub fn validate(&self) -> Result<()> {
        if self.salt_length < MIN_SALT_LENGTH {
            return Err(AgilityError::ConfigurationError(format!(
                "salt_length must be at least {} bytes, got {}",
                MIN_SALT_LENGTH, self.salt_length
            )));
        }
        if self.argon2_iterations == 0 || self.argon2_parallelism == 0 {
            return Err(AgilityError::ConfigurationError(
                "argon2 iterations and parallelism must be non-zero".to_string(),
            ));
        }
        if self.argon2_memory_kib < 8 * self.argon2_parallelism {
            return Err(AgilityError::ConfigurationError(format!(
                "argon2_memory_kib must be at least 8 * parallelism ({})",
                8 * self.argon2_parallelism
            )));
        }
        if self.pbkdf2_iterations == 0 {
            return Err(AgilityError::ConfigurationError(
                "pbkdf2_iterations must be non-zero".to_string(),
            ));
        }
        if self.argon2_memory_kib > MAX_ARGON2_MEMORY_KIB
            || self.argon2_iterations > MAX_ARGON2_ITERATIONS
            || self.argon2_parallelism > MAX_ARGON2_PARALLELISM
            || self.pbkdf2_iterations > MAX_PBKDF2_ITERATIONS
        {
            return Err(AgilityError::ConfigurationError(
                "passphrase stretching cost exceeds the supported maximum".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    use tracing::warn;

    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(target: "config", variable = name, "Ignoring unparseable value");
            None
        }
    }
}

/// Описание набора в том виде, в каком оно записано в конфигурации.
///
/// Algorithm names stay strings here; they are resolved into the closed enums
/// by [`crate::crypto::algorithms::SuiteDefinition::from_config`], so a broken
/// candidate suite can be skipped instead of failing the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    pub classical_kem_algorithm: String,
    pub pqc_kem_algorithm: String,
    pub symmetric_algorithm: String,
    pub kdf_algorithm: String,
    pub key_management_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase_kdf: Option<String>,
}

impl SuiteConfig {
    pub fn new(
        classical_kem_algorithm: &str,
        pqc_kem_algorithm: &str,
        symmetric_algorithm: &str,
        kdf_algorithm: &str,
        key_management_mode: &str,
    ) -> Self {
        Self {
            classical_kem_algorithm: classical_kem_algorithm.to_string(),
            pqc_kem_algorithm: pqc_kem_algorithm.to_string(),
            symmetric_algorithm: symmetric_algorithm.to_string(),
            kdf_algorithm: kdf_algorithm.to_string(),
            key_management_mode: key_management_mode.to_string(),
            passphrase_kdf: None,
        }
    }

    pub fn with_passphrase_kdf(mut self, passphrase_kdf: &str) -> Self {
        self.passphrase_kdf = Some(passphrase_kdf.to_string());
        self
    }
}

/// Таблица `suite_id -> SuiteConfig`, отвергающая повторяющиеся id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SuiteTable(BTreeMap<String, SuiteConfig>);

impl SuiteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, suite_id: &str, suite: SuiteConfig) -> Result<()> {
        if suite_id.is_empty() {
            return Err(AgilityError::ConfigurationError(
                "suite id cannot be empty".to_string(),
            ));
        }
        if self.0.contains_key(suite_id) {
            return Err(AgilityError::ConfigurationError(format!(
                "duplicate suite id `{}`",
                suite_id
            )));
        }
        self.0.insert(suite_id.to_string(), suite);
        Ok(())
    }

    pub fn get(&self, suite_id: &str) -> Option<&SuiteConfig> {
        self.0.get(suite_id)
    }

    pub fn contains(&self, suite_id: &str) -> bool {
        self.0.contains_key(suite_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SuiteConfig)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for SuiteTable {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SuiteTableVisitor;

        impl<'de> Visitor<'de> for SuiteTableVisitor {
            type Value = SuiteTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of suite id to suite definition")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut suites = BTreeMap::new();
                while let Some((suite_id, suite)) = map.next_entry::<String, SuiteConfig>()? {
                    if suites.contains_key(&suite_id) {
                        return Err(de::Error::custom(format!(
                            "duplicate suite id `{}`",
                            suite_id
                        )));
                    }
                    suites.insert(suite_id, suite);
                }
                Ok(SuiteTable(suites))
            }
        }

        deserializer.deserialize_map(SuiteTableVisitor)
    }
}

/// Основная структура конфигурации
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgilityConfig {
    /// Набор для всех новых шифрований
    pub active_encryption_suite_id: String,

    /// Порядок попыток расшифровки (может быть пустым)
    #[serde(default)]
    pub decryption_attempt_order: Vec<String>,

    pub suites: SuiteTable,

    #[serde(default)]
    pub params: CryptoParams,
}

impl AgilityConfig {
    pub fn new(active_encryption_suite_id: &str, decryption_attempt_order: &[&str]) -> Self {
        Self {
            active_encryption_suite_id: active_encryption_suite_id.to_string(),
            decryption_attempt_order: decryption_attempt_order
                .iter()
                .map(|id| id.to_string())
                .collect(),
            suites: SuiteTable::new(),
            params: CryptoParams::default(),
        }
    }

    pub fn with_suite(mut self, suite_id: &str, suite: SuiteConfig) -> Result<Self> {
        self.suites.insert(suite_id, suite)?;
        Ok(self)
    }

    pub fn with_params(mut self, params: CryptoParams) -> Self {
        self.params = params;
        self
    }

    /// Разобрать и проверить JSON-конфигурацию
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AgilityConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AgilityError::ConfigurationError(format!(
                "cannot read configuration {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    /// Загрузить конфигурацию по пути из `AGILITY_CONFIG`, затем применить
    /// переопределения `AGILITY_*` к params
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).map_err(|_| {
            AgilityError::ConfigurationError(format!("{} is not set", CONFIG_PATH_ENV))
        })?;
        let mut config = Self::from_file(path)?;
        config.params = config.params.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Schema-level checks. Whether the active suite actually resolves is
    /// decided by the registry.
    pub fn validate(&self) -> Result<()> {
        if self.active_encryption_suite_id.trim().is_empty() {
            return Err(AgilityError::ConfigurationError(
                "active_encryption_suite_id is not configured".to_string(),
            ));
        }
        if self
            .decryption_attempt_order
            .iter()
            .any(|id| id.trim().is_empty())
        {
            return Err(AgilityError::ConfigurationError(
                "decryption_attempt_order contains an empty suite id".to_string(),
            ));
        }
        self.params.validate()
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
