//! Закрытый набор алгоритмов и валидированное описание набора (suite).
//!
//! Every identifier that can appear in configuration maps onto one enum
//! variant here. Adding an algorithm means adding a variant, and the compiler
//! then points at every `match` in the primitive layer that must handle it.

use crate::config::SuiteConfig;
use crate::utils::error::{AgilityError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Максимальная длина suite_id в байтах (ограничение wire-формата)
pub const MAX_SUITE_ID_LEN: usize = 255;

fn lookup<T: Copy>(field: &str, value: &str, table: &[(&'static str, T)]) -> Result<T> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AgilityError::ConfigurationError(format!(
            "{} is missing",
            field
        )));
    }
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(value))
        .map(|(_, algorithm)| *algorithm)
        .ok_or_else(|| {
            AgilityError::ConfigurationError(format!("unsupported {} `{}`", field, value))
        })
}

fn name_of<T: Copy + PartialEq>(value: T, table: &[(&'static str, T)]) -> &'static str {
    table
        .iter()
        .find(|(_, algorithm)| *algorithm == value)
        .map(|(name, _)| *name)
        .unwrap_or("unknown")
}

/// Классический KEM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassicalKemAlgorithm {
    X25519,
}

impl ClassicalKemAlgorithm {
    const NAMES: &'static [(&'static str, Self)] = &[("X25519", Self::X25519)];

    pub fn parse(value: &str) -> Result<Self> {
        lookup("classical_kem_algorithm", value, Self::NAMES)
    }

    pub fn name(&self) -> &'static str {
        name_of(*self, Self::NAMES)
    }
}

/// Пост-квантовый KEM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PqcKemAlgorithm {
    Kyber768,
}

impl PqcKemAlgorithm {
    const NAMES: &'static [(&'static str, Self)] = &[
        ("Kyber768", Self::Kyber768),
        ("ML-KEM-768", Self::Kyber768),
    ];

    pub fn parse(value: &str) -> Result<Self> {
        lookup("pqc_kem_algorithm", value, Self::NAMES)
    }

    pub fn name(&self) -> &'static str {
        name_of(*self, Self::NAMES)
    }
}

/// Симметричный AEAD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymmetricAlgorithm {
    ChaCha20Poly1305,
    XChaCha20Poly1305,
    Aes256Gcm,
}

impl SymmetricAlgorithm {
    const NAMES: &'static [(&'static str, Self)] = &[
        ("ChaCha20-Poly1305", Self::ChaCha20Poly1305),
        ("XChaCha20-Poly1305", Self::XChaCha20Poly1305),
        ("AES-256-GCM", Self::Aes256Gcm),
    ];

    pub fn parse(value: &str) -> Result<Self> {
        lookup("symmetric_algorithm", value, Self::NAMES)
    }

    pub fn name(&self) -> &'static str {
        name_of(*self, Self::NAMES)
    }
}

/// KDF для комбинирования общих секретов и расширения ключей
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KdfAlgorithm {
    HkdfSha256,
    HkdfSha512,
}

impl KdfAlgorithm {
    const NAMES: &'static [(&'static str, Self)] = &[
        ("HKDF-SHA256", Self::HkdfSha256),
        ("HKDF-SHA512", Self::HkdfSha512),
    ];

    pub fn parse(value: &str) -> Result<Self> {
        lookup("kdf_algorithm", value, Self::NAMES)
    }

    pub fn name(&self) -> &'static str {
        name_of(*self, Self::NAMES)
    }
}

/// Растяжение пароля (memory-hard по умолчанию)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PassphraseKdf {
    #[default]
    Argon2id,
    /// Только для наборов, созданных до перехода на Argon2id
    Pbkdf2Sha256,
}

impl PassphraseKdf {
    const NAMES: &'static [(&'static str, Self)] = &[
        ("Argon2id", Self::Argon2id),
        ("PBKDF2-SHA256", Self::Pbkdf2Sha256),
    ];

    pub fn parse(value: &str) -> Result<Self> {
        lookup("passphrase_kdf", value, Self::NAMES)
    }

    pub fn name(&self) -> &'static str {
        name_of(*self, Self::NAMES)
    }
}

/// Откуда берётся ключевой материал набора
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyManagementMode {
    Passphrase,
    ExternalKeyFile,
}

impl KeyManagementMode {
    const NAMES: &'static [(&'static str, Self)] = &[
        ("passphrase", Self::Passphrase),
        ("external-key-file", Self::ExternalKeyFile),
    ];

    pub fn parse(value: &str) -> Result<Self> {
        lookup("key_management_mode", value, Self::NAMES)
    }

    pub fn name(&self) -> &'static str {
        name_of(*self, Self::NAMES)
    }
}

/// Валидированное, неизменяемое описание набора
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteDefinition {
    pub suite_id: String,
    pub classical_kem: ClassicalKemAlgorithm,
    pub pqc_kem: PqcKemAlgorithm,
    pub symmetric: SymmetricAlgorithm,
    pub kdf: KdfAlgorithm,
    pub passphrase_kdf: PassphraseKdf,
    pub key_management_mode: KeyManagementMode,
}

impl SuiteDefinition {
    /// Разрешить строковые имена алгоритмов в закрытые enum'ы
    pub fn from_config(suite_id: &str, config: &SuiteConfig) -> Result<Self> {
        validate_suite_id(suite_id)?;

        let passphrase_kdf = match config.passphrase_kdf.as_deref() {
            Some(name) => PassphraseKdf::parse(name),
            None => Ok(PassphraseKdf::default()),
        };

        let with_suite = |e: AgilityError| match e {
            AgilityError::ConfigurationError(msg) => {
                AgilityError::ConfigurationError(format!("suite `{}`: {}", suite_id, msg))
            }
            other => other,
        };

        Ok(Self {
            suite_id: suite_id.to_string(),
            classical_kem: ClassicalKemAlgorithm::parse(&config.classical_kem_algorithm)
                .map_err(with_suite)?,
            pqc_kem: PqcKemAlgorithm::parse(&config.pqc_kem_algorithm).map_err(with_suite)?,
            symmetric: SymmetricAlgorithm::parse(&config.symmetric_algorithm)
                .map_err(with_suite)?,
            kdf: KdfAlgorithm::parse(&config.kdf_algorithm).map_err(with_suite)?,
            passphrase_kdf: passphrase_kdf.map_err(with_suite)?,
            key_management_mode: KeyManagementMode::parse(&config.key_management_mode)
                .map_err(with_suite)?,
        })
    }

    /// Публичные (несекретные) идентификаторы для UI / диагностики
    pub fn info(&self) -> SuiteInfo {
        SuiteInfo {
            suite_id: self.suite_id.clone(),
            classical_kem_algorithm: self.classical_kem.name().to_string(),
            pqc_kem_algorithm: self.pqc_kem.name().to_string(),
            symmetric_algorithm: self.symmetric.name().to_string(),
            kdf_algorithm: self.kdf.name().to_string(),
            passphrase_kdf: self.passphrase_kdf.name().to_string(),
            key_management_mode: self.key_management_mode.name().to_string(),
        }
    }
}

pub(crate) fn validate_suite_id(suite_id: &str) -> Result<()> {
    if suite_id.trim().is_empty() {
        return Err(AgilityError::ConfigurationError(
            "suite id cannot be empty".to_string(),
        ));
    }
    if suite_id.len() > MAX_SUITE_ID_LEN {
        return Err(AgilityError::ConfigurationError(format!(
            "suite id is longer than {} bytes",
            MAX_SUITE_ID_LEN
        )));
    }
    Ok(())
}

/// Несекретное описание набора, которое можно показывать пользователю
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteInfo {
    pub suite_id: String,
    pub classical_kem_algorithm: String,
    pub pqc_kem_algorithm: String,
    pub symmetric_algorithm: String,
    pub kdf_algorithm: String,
    pub passphrase_kdf: String,
    pub key_management_mode: String,
}

impl fmt::Display for SuiteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} + {}, {}, {})",
            self.suite_id,
            self.classical_kem_algorithm,
            self.pqc_kem_algorithm,
            self.symmetric_algorithm,
            self.kdf_algorithm
        )
    }
}
