// Ключевой материал: деривация из пароля и загрузка внешних файлов ключей
//
// KeyMaterial живёт ровно один вызов encrypt/decrypt и затирается при Drop.

use crate::config::CryptoParams;
use crate::crypto::algorithms::SuiteDefinition;
use crate::crypto::master_key::{stretch_passphrase, StretchParams};
use crate::crypto::provider::{Kdf, Kem, KEM_SEED_LENGTH};
use crate::utils::b64;
use crate::utils::error::{AgilityError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Идентификатор формата файла внешних ключей
pub const KEY_FILE_FORMAT: &str = "agility-core/keyfile/v1";

const KEYPAIR_INFO_PREFIX: &str = "agility-core/keypair/v1";

/// Пары ключей обоих KEM набора.
///
/// Encryption only needs the public halves; decryption needs the private ones.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    pub classical_public_key: Vec<u8>,
    pub pqc_public_key: Vec<u8>,
    pub classical_private_key: Option<Vec<u8>>,
    pub pqc_private_key: Option<Vec<u8>>,
    pub passphrase_salt: Option<Vec<u8>>,
}

impl KeyMaterial {
    /// Copy without the private halves.
    pub fn public_only(&self) -> Self {
        Self {
            classical_public_key: self.classical_public_key.clone(),
            pqc_public_key: self.pqc_public_key.clone(),
            classical_private_key: None,
            pqc_private_key: None,
            passphrase_salt: self.passphrase_salt.clone(),
        }
    }

    pub fn has_private_keys(&self) -> bool {
        self.classical_private_key.is_some() && self.pqc_private_key.is_some()
    }

    /// Проверить длины ключей относительно алгоритмов набора
    pub fn validate_for(&self, suite: &SuiteDefinition) -> Result<()> {
        let check = |what: &str, actual: usize, expected: usize| {
            if actual == expected {
                Ok(())
            } else {
                Err(AgilityError::KeyManagementError(format!(
                    "{} has wrong length for suite `{}`: expected {}, got {}",
                    what, suite.suite_id, expected, actual
                )))
            }
        };

        check(
            "classical public key",
            self.classical_public_key.len(),
            suite.classical_kem.public_key_len(),
        )?;
        check(
            "pqc public key",
            self.pqc_public_key.len(),
            suite.pqc_kem.public_key_len(),
        )?;
        if let Some(key) = &self.classical_private_key {
            check(
                "classical private key",
                key.len(),
                suite.classical_kem.private_key_len(),
            )?;
        }
        if let Some(key) = &self.pqc_private_key {
            check("pqc private key", key.len(), suite.pqc_kem.private_key_len())?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("classical_public_key_len", &self.classical_public_key.len())
            .field("pqc_public_key_len", &self.pqc_public_key.len())
            .field("has_private_keys", &self.has_private_keys())
            .finish()
    }
}

/// Учётные данные вызывающей стороны
pub enum Credentials {
    Passphrase(Zeroizing<String>),
    KeyFile(PathBuf),
}

impl Credentials {
    pub fn passphrase(passphrase: &str) -> Self {
        Credentials::Passphrase(Zeroizing::new(passphrase.to_string()))
    }

    pub fn key_file(path: impl Into<PathBuf>) -> Self {
        Credentials::KeyFile(path.into())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Passphrase(_) => f.write_str("Credentials::Passphrase(<redacted>)"),
            Credentials::KeyFile(path) => write!(f, "Credentials::KeyFile({})", path.display()),
        }
    }
}

// suite_id не входит в info: переименованный набор с теми же алгоритмами
// выводит те же ключи
fn expand_seed(
    suite: &SuiteDefinition,
    stretched: &[u8],
    salt: &[u8],
    algorithm: &str,
) -> Result<Zeroizing<[u8; KEM_SEED_LENGTH]>> {
    let info = format!("{}/{}", KEYPAIR_INFO_PREFIX, algorithm);
    let okm = suite
        .kdf
        .derive(stretched, Some(salt), info.as_bytes(), KEM_SEED_LENGTH)
        .map_err(|e| AgilityError::KeyManagementError(e.to_string()))?;

    let mut seed = Zeroizing::new([0u8; KEM_SEED_LENGTH]);
    seed.copy_from_slice(&okm);
    Ok(seed)
}

/// Детерминированно вывести обе пары ключей набора из пароля
///
/// # Arguments
/// * `passphrase` - Пользовательский пароль
/// * `salt` - passphrase_salt (новый при шифровании, из bundle при расшифровке)
/// * `suite` - Набор; его KDF и алгоритмы KEM определяют деривацию
/// * `params` - Стоимость растяжения для `suite.passphrase_kdf`
pub fn derive_from_passphrase(
    passphrase: &str,
    salt: &[u8],
    suite: &SuiteDefinition,
    params: &CryptoParams,
) -> Result<KeyMaterial> {
    let stretch = StretchParams::for_kdf(suite.passphrase_kdf, params);
    let stretched = stretch_passphrase(passphrase, salt, &stretch)?;
    derive_from_stretched(&*stretched, salt, suite)
}

/// Вторая половина деривации: пары ключей из уже растянутого пароля
pub(crate) fn derive_from_stretched(
    stretched: &[u8],
    salt: &[u8],
    suite: &SuiteDefinition,
) -> Result<KeyMaterial> {
    let classical_seed = expand_seed(suite, stretched, salt, suite.classical_kem.name())?;
    let pqc_seed = expand_seed(suite, stretched, salt, suite.pqc_kem.name())?;

    let (mut classical_private, classical_public) = suite
        .classical_kem
        .keypair_from_seed(&classical_seed)
        .map_err(|e| AgilityError::KeyManagementError(e.to_string()))?;
    let (mut pqc_private, pqc_public) = suite
        .pqc_kem
        .keypair_from_seed(&pqc_seed)
        .map_err(|e| AgilityError::KeyManagementError(e.to_string()))?;

    Ok(KeyMaterial {
        classical_public_key: classical_public,
        pqc_public_key: pqc_public,
        classical_private_key: Some(std::mem::take(&mut *classical_private)),
        pqc_private_key: Some(std::mem::take(&mut *pqc_private)),
        passphrase_salt: Some(salt.to_vec()),
    })
}

/// Сгенерировать новые случайные пары ключей (для файлов внешних ключей)
pub fn generate_key_material(suite: &SuiteDefinition) -> Result<KeyMaterial> {
    let (mut classical_private, classical_public) = suite
        .classical_kem
        .generate_keypair()
        .map_err(|e| AgilityError::KeyManagementError(e.to_string()))?;
    let (mut pqc_private, pqc_public) = suite
        .pqc_kem
        .generate_keypair()
        .map_err(|e| AgilityError::KeyManagementError(e.to_string()))?;

    Ok(KeyMaterial {
        classical_public_key: classical_public,
        pqc_public_key: pqc_public,
        classical_private_key: Some(std::mem::take(&mut *classical_private)),
        pqc_private_key: Some(std::mem::take(&mut *pqc_private)),
        passphrase_salt: None,
    })
}

/// Файл внешних ключей (JSON, ключи в base64)
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct KeyFile {
    format: String,
    suite_id: String,
    classical_public_key: String,
    pqc_public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    classical_private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pqc_private_key: Option<String>,
}

/// Загрузить ключевой материал из файла внешних ключей
///
/// The file must name the same suite as `suite`, and every key length is
/// checked against that suite's algorithms.
pub fn load_from_external_source(path: &Path, suite: &SuiteDefinition) -> Result<KeyMaterial> {
    let contents = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
        AgilityError::KeyManagementError(format!("cannot read key file {}: {}", path.display(), e))
    })?);

    let key_file: KeyFile = serde_json::from_str(&contents).map_err(|e| {
        AgilityError::KeyManagementError(format!("invalid key file {}: {}", path.display(), e))
    })?;

    if key_file.format != KEY_FILE_FORMAT {
        return Err(AgilityError::KeyManagementError(format!(
            "unsupported key file format `{}`",
            key_file.format
        )));
    }
    if key_file.suite_id != suite.suite_id {
        return Err(AgilityError::KeyManagementError(format!(
            "key file belongs to suite `{}`, not `{}`",
            key_file.suite_id, suite.suite_id
        )));
    }

    let material = KeyMaterial {
        classical_public_key: b64::decode("classical_public_key", &key_file.classical_public_key)?,
        pqc_public_key: b64::decode("pqc_public_key", &key_file.pqc_public_key)?,
        classical_private_key: key_file
            .classical_private_key
            .as_deref()
            .map(|key| b64::decode("classical_private_key", key))
            .transpose()?,
        pqc_private_key: key_file
            .pqc_private_key
            .as_deref()
            .map(|key| b64::decode("pqc_private_key", key))
            .transpose()?,
        passphrase_salt: None,
    };

    material.validate_for(suite)?;
    Ok(material)
}

/// Записать ключевой материал в файл внешних ключей
pub fn write_external_key_file(
    path: &Path,
    suite: &SuiteDefinition,
    material: &KeyMaterial,
) -> Result<()> {
    material.validate_for(suite)?;

    let key_file = KeyFile {
        format: KEY_FILE_FORMAT.to_string(),
        suite_id: suite.suite_id.clone(),
        classical_public_key: b64::encode(&material.classical_public_key),
        pqc_public_key: b64::encode(&material.pqc_public_key),
        classical_private_key: material.classical_private_key.as_deref().map(b64::encode),
        pqc_private_key: material.pqc_private_key.as_deref().map(b64::encode),
    };

    let json = Zeroizing::new(
        serde_json::to_string_pretty(&key_file)
            .map_err(|e| AgilityError::KeyManagementError(e.to_string()))?,
    );
    std::fs::write(path, json.as_bytes()).map_err(|e| {
        AgilityError::KeyManagementError(format!("cannot write key file {}: {}", path.display(), e))
    })
}
