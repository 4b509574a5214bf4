//! Encrypted bundle and its wire format.
//!
//! ```text
//! offset  size  field
//! 0       4     format_identifier   = b"AGLC"
//! 4       1     format_version      = 0x01
//! 5       2     suite_id length N   (u16, big-endian)
//! 7       N     suite_id_used       (UTF-8)
//! 7+N     ...   bincode(BundleBody)
//! ```
//!
//! `BundleBody` carries the passphrase stretch parameters next to
//! `passphrase_salt`, so raising the configured Argon2 cost never strands
//! existing bundles.
//!
//! The header is readable on its own ([`BundleHeader::peek`]) so the
//! orchestrator can route a blob without parsing suite-specific fields. The
//! exact header bytes double as AEAD associated data.

use crate::crypto::algorithms::{KeyManagementMode, SuiteDefinition, MAX_SUITE_ID_LEN};
use crate::crypto::master_key::StretchParams;
use crate::crypto::provider::{AeadCipher, Kem};
use crate::error::CryptoError;
use crate::utils::error::{AgilityError, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};

pub const FORMAT_IDENTIFIER: [u8; 4] = *b"AGLC";
pub const FORMAT_VERSION: u8 = 1;

/// magic (4) + version (1) + длина suite_id (2)
const FIXED_HEADER_LENGTH: usize = 7;

/// Верхняя граница на размер тела, защищает от огромных length-prefix
const MAX_BODY_LENGTH: u64 = 1 << 32;

fn body_codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_BODY_LENGTH)
        .reject_trailing_bytes()
}

/// Общий заголовок bundle, одинаковый для всех наборов
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleHeader {
    pub format_identifier: [u8; 4],
    pub format_version: u8,
    pub suite_id: String,
}

impl BundleHeader {
    pub fn new(suite_id: &str) -> Self {
        Self {
            format_identifier: FORMAT_IDENTIFIER,
            format_version: FORMAT_VERSION,
            suite_id: suite_id.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let suite_id = self.suite_id.as_bytes();
        if suite_id.is_empty() || suite_id.len() > MAX_SUITE_ID_LEN {
            return Err(AgilityError::InvalidArgument(format!(
                "suite id must be 1..={} bytes",
                MAX_SUITE_ID_LEN
            )));
        }

        let mut out = Vec::with_capacity(FIXED_HEADER_LENGTH + suite_id.len());
        out.extend_from_slice(&self.format_identifier);
        out.push(self.format_version);
        out.extend_from_slice(&(suite_id.len() as u16).to_be_bytes());
        out.extend_from_slice(suite_id);
        Ok(out)
    }

    /// Прочитать только заголовок. Returns the header and its length in bytes.
    pub fn peek(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < FIXED_HEADER_LENGTH {
            return Err(AgilityError::MalformedBundle("truncated header".to_string()));
        }
        if bytes[..4] != FORMAT_IDENTIFIER {
            return Err(AgilityError::MalformedBundle(
                "unknown format identifier".to_string(),
            ));
        }
        let format_version = bytes[4];
        if format_version != FORMAT_VERSION {
            return Err(AgilityError::MalformedBundle(format!(
                "unsupported format version {}",
                format_version
            )));
        }

        let suite_id_len = u16::from_be_bytes([bytes[5], bytes[6]]) as usize;
        if suite_id_len == 0 || suite_id_len > MAX_SUITE_ID_LEN {
            return Err(AgilityError::MalformedBundle(
                "invalid suite id length".to_string(),
            ));
        }
        let header_len = FIXED_HEADER_LENGTH + suite_id_len;
        if bytes.len() < header_len {
            return Err(AgilityError::MalformedBundle("truncated suite id".to_string()));
        }

        let suite_id = std::str::from_utf8(&bytes[FIXED_HEADER_LENGTH..header_len])
            .map_err(|_| AgilityError::MalformedBundle("suite id is not UTF-8".to_string()))?;

        Ok((
            Self {
                format_identifier: FORMAT_IDENTIFIER,
                format_version,
                suite_id: suite_id.to_string(),
            },
            header_len,
        ))
    }
}

/// Поля, специфичные для набора (кодируются bincode после заголовка)
#[derive(Debug, Serialize, Deserialize)]
struct BundleBody {
    #[serde(with = "serde_bytes")]
    classical_kem_ephemeral_public_key: Option<Vec<u8>>,
    #[serde(with = "serde_bytes")]
    pqc_kem_encapsulated_key: Vec<u8>,
    #[serde(with = "serde_bytes")]
    symmetric_cipher_nonce: Vec<u8>,
    #[serde(with = "serde_bytes")]
    ciphertext: Vec<u8>,
    #[serde(with = "serde_bytes")]
    authentication_tag: Vec<u8>,
    #[serde(with = "serde_bytes")]
    passphrase_salt: Option<Vec<u8>>,
    passphrase_kdf_params: Option<StretchParams>,
    #[serde(with = "serde_bytes")]
    kdf_salt: Option<Vec<u8>>,
}

/// Зашифрованный артефакт (at rest)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBundle {
    pub format_identifier: [u8; 4],
    pub format_version: u8,
    pub suite_id_used: String,
    pub classical_kem_ephemeral_public_key: Option<Vec<u8>>,
    pub pqc_kem_encapsulated_key: Vec<u8>,
    pub symmetric_cipher_nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub authentication_tag: Vec<u8>,
    pub passphrase_salt: Option<Vec<u8>>,
    /// Алгоритм и стоимость растяжения пароля при шифровании
    pub passphrase_kdf_params: Option<StretchParams>,
    pub kdf_salt: Option<Vec<u8>>,
}

impl EncryptedBundle {
    pub fn header(&self) -> BundleHeader {
        BundleHeader {
            format_identifier: self.format_identifier,
            format_version: self.format_version,
            suite_id: self.suite_id_used.clone(),
        }
    }

    /// Associated data for the AEAD: the serialized header.
    pub fn associated_data(&self) -> Result<Vec<u8>> {
        self.header().to_bytes()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = self.header().to_bytes()?;
        let body = BundleBody {
            classical_kem_ephemeral_public_key: self.classical_kem_ephemeral_public_key.clone(),
            pqc_kem_encapsulated_key: self.pqc_kem_encapsulated_key.clone(),
            symmetric_cipher_nonce: self.symmetric_cipher_nonce.clone(),
            ciphertext: self.ciphertext.clone(),
            authentication_tag: self.authentication_tag.clone(),
            passphrase_salt: self.passphrase_salt.clone(),
            passphrase_kdf_params: self.passphrase_kdf_params,
            kdf_salt: self.kdf_salt.clone(),
        };
        body_codec()
            .serialize_into(&mut out, &body)
            .map_err(|e| {
                AgilityError::EncryptionFailed(
                    CryptoError::SerializationError(e.to_string()).to_string(),
                )
            })?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (header, header_len) = BundleHeader::peek(bytes)?;
        let body: BundleBody = body_codec()
            .deserialize(&bytes[header_len..])
            .map_err(|e| AgilityError::MalformedBundle(CryptoError::from(e).to_string()))?;

        Ok(Self {
            format_identifier: header.format_identifier,
            format_version: header.format_version,
            suite_id_used: header.suite_id,
            classical_kem_ephemeral_public_key: body.classical_kem_ephemeral_public_key,
            pqc_kem_encapsulated_key: body.pqc_kem_encapsulated_key,
            symmetric_cipher_nonce: body.symmetric_cipher_nonce,
            ciphertext: body.ciphertext,
            authentication_tag: body.authentication_tag,
            passphrase_salt: body.passphrase_salt,
            passphrase_kdf_params: body.passphrase_kdf_params,
            kdf_salt: body.kdf_salt,
        })
    }

    /// Check every field the suite needs before any primitive sees the data.
    pub fn validate_for(&self, suite: &SuiteDefinition) -> Result<()> {
        let malformed = |what: &str| Err(AgilityError::MalformedBundle(what.to_string()));

        match &self.classical_kem_ephemeral_public_key {
            Some(key) if key.len() == suite.classical_kem.encapsulated_len() => {}
            Some(_) => return malformed("classical ephemeral key has wrong length"),
            None => return malformed("classical ephemeral key is missing"),
        }
        if self.pqc_kem_encapsulated_key.len() != suite.pqc_kem.encapsulated_len() {
            return malformed("pqc encapsulated key has wrong length");
        }
        if self.symmetric_cipher_nonce.len() != suite.symmetric.nonce_len() {
            return malformed("nonce has wrong length");
        }
        if self.authentication_tag.len() != suite.symmetric.tag_len() {
            return malformed("authentication tag has wrong length");
        }
        if self.ciphertext.is_empty() {
            return malformed("ciphertext is empty");
        }
        if matches!(&self.kdf_salt, Some(salt) if salt.is_empty()) {
            return malformed("kdf salt is empty");
        }
        match (&self.passphrase_salt, suite.key_management_mode) {
            (Some(salt), KeyManagementMode::Passphrase) if !salt.is_empty() => {}
            (_, KeyManagementMode::Passphrase) => return malformed("passphrase salt is missing"),
            (_, KeyManagementMode::ExternalKeyFile) => {}
        }
        match (&self.passphrase_kdf_params, suite.key_management_mode) {
            (None, _) => {}
            (Some(_), KeyManagementMode::ExternalKeyFile) => {
                return malformed("stretch parameters in an external-key bundle")
            }
            (Some(stretch), KeyManagementMode::Passphrase) => {
                if stretch.kdf() != suite.passphrase_kdf {
                    return malformed("passphrase kdf does not match the suite");
                }
                if !stretch.within_limits() {
                    return malformed("passphrase stretching cost out of range");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuiteConfig;

    fn suite() -> SuiteDefinition {
        SuiteDefinition::from_config(
            "HYBRID-1",
            &SuiteConfig::new("X25519", "Kyber768", "ChaCha20-Poly1305", "HKDF-SHA256", "passphrase"),
        )
        .unwrap()
    }

    fn sample_bundle() -> EncryptedBundle {
        let suite = suite();
        EncryptedBundle {
            format_identifier: FORMAT_IDENTIFIER,
            format_version: FORMAT_VERSION,
            suite_id_used: suite.suite_id.clone(),
            classical_kem_ephemeral_public_key: Some(vec![1u8; 32]),
            pqc_kem_encapsulated_key: vec![2u8; suite.pqc_kem.encapsulated_len()],
            symmetric_cipher_nonce: vec![3u8; 12],
            ciphertext: vec![4u8; 20],
            authentication_tag: vec![5u8; 16],
            passphrase_salt: Some(vec![6u8; 32]),
            passphrase_kdf_params: Some(StretchParams::Argon2id {
                memory_kib: 256,
                iterations: 1,
                parallelism: 1,
            }),
            kdf_salt: Some(vec![7u8; 32]),
        }
    }

    #[test]
    fn test_header_layout_is_bit_exact() {
        let header = BundleHeader::new("HYBRID-1").to_bytes().unwrap();
        assert_eq!(hex::encode(&header), "41474c430100084859425249442d31");
        assert_eq!(header.len(), 7 + "HYBRID-1".len());
    }

    #[test]
    fn test_peek_reads_header_only() {
        let mut bytes = BundleHeader::new("HYBRID-1").to_bytes().unwrap();
        bytes.extend_from_slice(b"garbage that is not a body");
        let (header, len) = BundleHeader::peek(&bytes).unwrap();
        assert_eq!(header.suite_id, "HYBRID-1");
        assert_eq!(len, 15);
        // Тело не разбирается, но полный разбор должен провалиться
        assert!(EncryptedBundle::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_serialize_parse_preserves_fields() {
        let bundle = sample_bundle();
        let bytes = bundle.to_bytes().unwrap();
        assert_eq!(EncryptedBundle::from_bytes(&bytes).unwrap(), bundle);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = sample_bundle().to_bytes().unwrap();
        bytes.push(0);
        assert!(matches!(
            EncryptedBundle::from_bytes(&bytes),
            Err(AgilityError::MalformedBundle(_))
        ));
    }

    #[test]
    fn test_truncated_bundle_rejected() {
        let bytes = sample_bundle().to_bytes().unwrap();
        for len in [0, 3, 6, 10, bytes.len() - 1] {
            assert!(EncryptedBundle::from_bytes(&bytes[..len]).is_err(), "len {}", len);
        }
    }

    #[test]
    fn test_bad_magic_and_version_rejected() {
        let mut bytes = sample_bundle().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(BundleHeader::peek(&bytes).is_err());

        let mut bytes = sample_bundle().to_bytes().unwrap();
        bytes[4] = 2;
        assert!(BundleHeader::peek(&bytes).is_err());
    }

    #[test]
    fn test_validate_for_accepts_complete_bundle() {
        assert!(sample_bundle().validate_for(&suite()).is_ok());
    }

    #[test]
    fn test_validate_for_rejects_missing_fields() {
        let suite = suite();

        let mut bundle = sample_bundle();
        bundle.classical_kem_ephemeral_public_key = None;
        assert!(bundle.validate_for(&suite).is_err());

        let mut bundle = sample_bundle();
        bundle.passphrase_salt = Some(Vec::new());
        assert!(bundle.validate_for(&suite).is_err());

        let mut bundle = sample_bundle();
        bundle.pqc_kem_encapsulated_key.pop();
        assert!(bundle.validate_for(&suite).is_err());

        let mut bundle = sample_bundle();
        bundle.authentication_tag = vec![0u8; 15];
        assert!(bundle.validate_for(&suite).is_err());

        let mut bundle = sample_bundle();
        bundle.ciphertext.clear();
        assert!(bundle.validate_for(&suite).is_err());
    }

    #[test]
    fn test_validate_for_checks_stretch_params() {
        let suite = suite();

        // Старые bundle без параметров остаются допустимыми
        let mut bundle = sample_bundle();
        bundle.passphrase_kdf_params = None;
        assert!(bundle.validate_for(&suite).is_ok());

        let mut bundle = sample_bundle();
        bundle.passphrase_kdf_params = Some(StretchParams::Pbkdf2Sha256 { iterations: 1_000 });
        assert!(matches!(
            bundle.validate_for(&suite),
            Err(AgilityError::MalformedBundle(_))
        ));

        let mut bundle = sample_bundle();
        bundle.passphrase_kdf_params = Some(StretchParams::Argon2id {
            memory_kib: u32::MAX,
            iterations: u32::MAX,
            parallelism: 1,
        });
        assert!(matches!(
            bundle.validate_for(&suite),
            Err(AgilityError::MalformedBundle(_))
        ));
    }

    #[test]
    fn test_external_key_suite_does_not_need_passphrase_salt() {
        let suite = SuiteDefinition::from_config(
            "HYBRID-EXT",
            &SuiteConfig::new("X25519", "Kyber768", "ChaCha20-Poly1305", "HKDF-SHA256", "external-key-file"),
        )
        .unwrap();
        let mut bundle = sample_bundle();
        bundle.suite_id_used = suite.suite_id.clone();
        bundle.passphrase_salt = None;
        assert!(bundle.validate_for(&suite).is_err());

        bundle.passphrase_kdf_params = None;
        assert!(bundle.validate_for(&suite).is_ok());
    }
}
