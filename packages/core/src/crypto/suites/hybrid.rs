//! Гибридный KEM + AEAD движок.
//!
//! ```text
//! encrypt:
//!   (eph_pk, ss_c) = ClassicalKEM.encaps(classical_pk)
//!   (ct_pq,  ss_q) = PqcKEM.encaps(pqc_pk)
//!   key            = KDF(ikm = ss_c || ss_q, salt = kdf_salt, info = HYBRID_KDF_INFO)
//!   (ct, tag)      = AEAD.seal(key, nonce, plaintext, aad = header)
//! ```
//!
//! Both shared secrets feed the key, so the bundle stays confidential as long
//! as either KEM holds.

use crate::config::CryptoParams;
use crate::crypto::algorithms::SuiteDefinition;
use crate::crypto::bundle::{BundleHeader, EncryptedBundle};
use crate::crypto::keys::KeyMaterial;
use crate::crypto::provider::{random_bytes, AeadCipher, Kdf, Kem};
use crate::error::CryptoError;
use crate::utils::error::{AgilityError, Result};
use zeroize::Zeroizing;

/// Контекст KDF для ключа AEAD
pub const HYBRID_KDF_INFO: &[u8] = b"agility-core/hybrid-kem/v1/aead-key";

/// Требование к suite_id_used при расшифровке
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteMatch {
    /// bundle.suite_id_used должен совпадать с набором движка
    Exact,
    /// Fallback: пробуем набор независимо от метки в bundle
    Override,
}

#[derive(Debug, Clone)]
pub struct HybridEngine {
    suite: SuiteDefinition,
    salt_length: usize,
}

impl HybridEngine {
    pub fn new(suite: SuiteDefinition, params: &CryptoParams) -> Self {
        Self {
            suite,
            salt_length: params.salt_length,
        }
    }

    pub fn suite(&self) -> &SuiteDefinition {
        &self.suite
    }

    /// Зашифровать plaintext на публичные ключи из `keys`
    ///
    /// `keys.passphrase_salt` is copied into the bundle unchanged. The stretch
    /// parameters are left for the passphrase handler to record.
    pub fn encrypt(&self, plaintext: &[u8], keys: &KeyMaterial) -> Result<EncryptedBundle> {
        use tracing::trace;

        if plaintext.is_empty() {
            return Err(AgilityError::InvalidArgument(
                "plaintext cannot be empty".to_string(),
            ));
        }
        keys.validate_for(&self.suite)?;

        let suite = &self.suite;
        let failed = |e: CryptoError| AgilityError::EncryptionFailed(e.to_string());

        let (ephemeral_public, classical_secret) = suite
            .classical_kem
            .encapsulate(&keys.classical_public_key)
            .map_err(failed)?;
        let (pqc_encapsulated, pqc_secret) = suite
            .pqc_kem
            .encapsulate(&keys.pqc_public_key)
            .map_err(failed)?;
        trace!(
            target: "crypto::hybrid",
            suite_id = %suite.suite_id,
            "Encapsulated both shared secrets"
        );

        let kdf_salt = random_bytes(self.salt_length);
        let aead_key =
            self.derive_aead_key(&classical_secret, &pqc_secret, Some(kdf_salt.as_slice()))
                .map_err(failed)?;

        let header = BundleHeader::new(&suite.suite_id);
        let associated_data = header.to_bytes()?;
        let nonce = random_bytes(suite.symmetric.nonce_len());
        let (ciphertext, tag) = suite
            .symmetric
            .seal(&aead_key, &nonce, plaintext, &associated_data)
            .map_err(failed)?;

        Ok(EncryptedBundle {
            format_identifier: header.format_identifier,
            format_version: header.format_version,
            suite_id_used: header.suite_id,
            classical_kem_ephemeral_public_key: Some(ephemeral_public),
            pqc_kem_encapsulated_key: pqc_encapsulated,
            symmetric_cipher_nonce: nonce,
            ciphertext,
            authentication_tag: tag,
            passphrase_salt: keys.passphrase_salt.clone(),
            passphrase_kdf_params: None,
            kdf_salt: Some(kdf_salt),
        })
    }

    /// Расшифровать bundle приватными ключами из `keys`
    ///
    /// Any failure (wrong key, tampering, missing field, suite mismatch) is
    /// reported as the same [`AgilityError::DecryptionError`].
    pub fn decrypt(
        &self,
        bundle: &EncryptedBundle,
        keys: &KeyMaterial,
        suite_match: SuiteMatch,
    ) -> Result<Zeroizing<Vec<u8>>> {
        use tracing::debug;

        self.open(bundle, keys, suite_match).map_err(|e| {
            debug!(
                target: "crypto::hybrid",
                suite_id = %self.suite.suite_id,
                bundle_suite_id = %bundle.suite_id_used,
                reason = %e,
                "Hybrid decryption rejected"
            );
            AgilityError::DecryptionError
        })
    }

    fn open(
        &self,
        bundle: &EncryptedBundle,
        keys: &KeyMaterial,
        suite_match: SuiteMatch,
    ) -> std::result::Result<Zeroizing<Vec<u8>>, CryptoError> {
        let suite = &self.suite;

        if suite_match == SuiteMatch::Exact && bundle.suite_id_used != suite.suite_id {
            return Err(CryptoError::InvalidInputError(
                "bundle belongs to another suite".to_string(),
            ));
        }
        bundle
            .validate_for(suite)
            .map_err(|e| CryptoError::InvalidInputError(e.to_string()))?;
        keys.validate_for(suite)
            .map_err(|e| CryptoError::InvalidInputError(e.to_string()))?;

        let (classical_private, pqc_private) =
            match (&keys.classical_private_key, &keys.pqc_private_key) {
                (Some(classical), Some(pqc)) => (classical, pqc),
                _ => {
                    return Err(CryptoError::InvalidInputError(
                        "private keys are not available".to_string(),
                    ))
                }
            };
        let ephemeral_public = bundle
            .classical_kem_ephemeral_public_key
            .as_deref()
            .ok_or_else(|| CryptoError::InvalidInputError("missing ephemeral key".to_string()))?;

        let classical_secret = suite
            .classical_kem
            .decapsulate(classical_private, ephemeral_public)?;
        let pqc_secret = suite
            .pqc_kem
            .decapsulate(pqc_private, &bundle.pqc_kem_encapsulated_key)?;

        let aead_key =
            self.derive_aead_key(&classical_secret, &pqc_secret, bundle.kdf_salt.as_deref())?;
        let associated_data = bundle
            .associated_data()
            .map_err(|e| CryptoError::InvalidInputError(e.to_string()))?;

        suite.symmetric.open(
            &aead_key,
            &bundle.symmetric_cipher_nonce,
            &bundle.ciphertext,
            &bundle.authentication_tag,
            &associated_data,
        )
    }

    fn derive_aead_key(
        &self,
        classical_secret: &[u8],
        pqc_secret: &[u8],
        kdf_salt: Option<&[u8]>,
    ) -> std::result::Result<Zeroizing<Vec<u8>>, CryptoError> {
        let mut ikm = Zeroizing::new(Vec::with_capacity(classical_secret.len() + pqc_secret.len()));
        ikm.extend_from_slice(classical_secret);
        ikm.extend_from_slice(pqc_secret);

        self.suite.kdf.derive(
            &ikm,
            kdf_salt,
            HYBRID_KDF_INFO,
            self.suite.symmetric.key_len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuiteConfig;
    use crate::crypto::keys::generate_key_material;

    fn engine_with(symmetric: &str, kdf: &str) -> HybridEngine {
        let suite = SuiteDefinition::from_config(
            "HYBRID-T",
            &SuiteConfig::new("X25519", "Kyber768", symmetric, kdf, "external-key-file"),
        )
        .unwrap();
        HybridEngine::new(suite, &CryptoParams::default())
    }

    fn engine() -> HybridEngine {
        engine_with("ChaCha20-Poly1305", "HKDF-SHA256")
    }

    #[test]
    fn test_roundtrip_all_aead_and_kdf_combinations() {
        for symmetric in ["ChaCha20-Poly1305", "XChaCha20-Poly1305", "AES-256-GCM"] {
            for kdf in ["HKDF-SHA256", "HKDF-SHA512"] {
                let engine = engine_with(symmetric, kdf);
                let keys = generate_key_material(engine.suite()).unwrap();

                let bundle = engine.encrypt(b"ledger entry", &keys.public_only()).unwrap();
                assert_eq!(bundle.suite_id_used, "HYBRID-T");
                assert_eq!(
                    bundle.symmetric_cipher_nonce.len(),
                    engine.suite().symmetric.nonce_len()
                );

                let plaintext = engine.decrypt(&bundle, &keys, SuiteMatch::Exact).unwrap();
                assert_eq!(plaintext.as_slice(), b"ledger entry", "{} / {}", symmetric, kdf);
            }
        }
    }

    #[test]
    fn test_encryption_is_fresh() {
        let engine = engine();
        let keys = generate_key_material(engine.suite()).unwrap();

        let a = engine.encrypt(b"same", &keys).unwrap();
        let b = engine.encrypt(b"same", &keys).unwrap();

        assert_ne!(a.classical_kem_ephemeral_public_key, b.classical_kem_ephemeral_public_key);
        assert_ne!(a.pqc_kem_encapsulated_key, b.pqc_kem_encapsulated_key);
        assert_ne!(a.symmetric_cipher_nonce, b.symmetric_cipher_nonce);
        assert_ne!(a.kdf_salt, b.kdf_salt);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_tampering_any_field_is_rejected() {
        let engine = engine();
        let keys = generate_key_material(engine.suite()).unwrap();
        let bundle = engine.encrypt(b"attack at dawn", &keys).unwrap();

        let mutations: Vec<Box<dyn Fn(&mut EncryptedBundle)>> = vec![
            Box::new(|b: &mut EncryptedBundle| b.ciphertext[0] ^= 0x01),
            Box::new(|b: &mut EncryptedBundle| b.authentication_tag[0] ^= 0x01),
            Box::new(|b: &mut EncryptedBundle| b.symmetric_cipher_nonce[0] ^= 0x01),
            Box::new(|b: &mut EncryptedBundle| b.pqc_kem_encapsulated_key[0] ^= 0x01),
            Box::new(|b: &mut EncryptedBundle| {
                if let Some(key) = b.classical_kem_ephemeral_public_key.as_mut() {
                    key[0] ^= 0x01;
                }
            }),
            Box::new(|b: &mut EncryptedBundle| {
                if let Some(salt) = b.kdf_salt.as_mut() {
                    salt[0] ^= 0x01;
                }
            }),
        ];

        for (i, mutate) in mutations.iter().enumerate() {
            let mut tampered = bundle.clone();
            mutate(&mut tampered);
            let err = engine.decrypt(&tampered, &keys, SuiteMatch::Exact).unwrap_err();
            assert_eq!(err, AgilityError::DecryptionError, "mutation {}", i);
        }
    }

    #[test]
    fn test_wrong_key_and_missing_private_key_are_indistinguishable() {
        let engine = engine();
        let keys = generate_key_material(engine.suite()).unwrap();
        let other = generate_key_material(engine.suite()).unwrap();
        let bundle = engine.encrypt(b"secret", &keys).unwrap();

        let wrong = engine.decrypt(&bundle, &other, SuiteMatch::Exact).unwrap_err();
        let public_only = engine
            .decrypt(&bundle, &keys.public_only(), SuiteMatch::Exact)
            .unwrap_err();
        assert_eq!(wrong, public_only);
        assert_eq!(wrong.to_string(), AgilityError::DecryptionError.to_string());
    }

    #[test]
    fn test_suite_match_exact_vs_override() {
        let engine = engine();
        let keys = generate_key_material(engine.suite()).unwrap();
        let mut bundle = engine.encrypt(b"relabel", &keys).unwrap();
        bundle.suite_id_used = "OTHER".to_string();

        // Exact отклоняет чужую метку
        assert!(engine.decrypt(&bundle, &keys, SuiteMatch::Exact).is_err());
        // Override пробует, но заголовок входит в AAD, и тег не сходится
        assert!(engine.decrypt(&bundle, &keys, SuiteMatch::Override).is_err());
    }

    #[test]
    fn test_empty_plaintext_rejected() {
        let engine = engine();
        let keys = generate_key_material(engine.suite()).unwrap();
        assert!(matches!(
            engine.encrypt(b"", &keys),
            Err(AgilityError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_encrypt_rejects_malformed_public_key() {
        let engine = engine();
        let mut keys = generate_key_material(engine.suite()).unwrap();
        keys.pqc_public_key.truncate(10);
        assert!(matches!(
            engine.encrypt(b"data", &keys),
            Err(AgilityError::KeyManagementError(_))
        ));
    }
}
