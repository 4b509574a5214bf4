//! Двухфазная расшифровка с перебором наборов.
//!
//! ```text
//! blob ──► BundleHeader::peek ──► suite_id среди кандидатов?
//!               │                        │ да
//!               │                        ▼
//!               │                 targeted attempt (SuiteMatch::Exact)
//!               │                        │ неудача
//!               ▼                        ▼
//!          fallback: каждый кандидат по порядку, кроме уже испробованного
//!          (SuiteMatch::Override), до первого успеха
//!               │ все неудачно
//!               ▼
//!          AgilityError::DecryptionFailed
//! ```
//!
//! Per-attempt results never leave this module; the caller sees either the
//! plaintext or the single aggregate error. Within one call the stretched
//! passphrase is shared between candidates with the same salt and stretch
//! parameters.

use crate::crypto::bundle::BundleHeader;
use crate::crypto::keys::Credentials;
use crate::crypto::master_key::StretchCache;
use crate::crypto::registry::SuiteRegistry;
use crate::crypto::suites::hybrid::SuiteMatch;
use crate::crypto::suites::SuiteHandler;
use crate::utils::error::{AgilityError, Result};
use std::fmt;
use zeroize::Zeroizing;

/// Результат успешной расшифровки
pub struct DecryptedPayload {
    pub plaintext: Zeroizing<Vec<u8>>,
    /// Набор, которым удалось расшифровать
    pub suite_id: String,
}

impl fmt::Debug for DecryptedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptedPayload")
            .field("plaintext_len", &self.plaintext.len())
            .field("suite_id", &self.suite_id)
            .finish()
    }
}

/// Почему попытка не удалась
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptFailure {
    /// Bundle не соответствует форме набора
    Malformed,
    /// Набор разобрал bundle, но расшифровка не прошла
    Decryption,
}

/// Исход одной попытки
pub enum AttemptOutcome {
    Decrypted(Zeroizing<Vec<u8>>),
    Rejected(AttemptFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Targeted,
    Fallback,
}

/// Запись о попытке (без секретов)
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttemptRecord {
    pub suite_id: String,
    pub phase: Phase,
    pub failure: Option<AttemptFailure>,
}

pub struct DecryptionOrchestrator<'a> {
    registry: &'a SuiteRegistry,
}

impl<'a> DecryptionOrchestrator<'a> {
    pub fn new(registry: &'a SuiteRegistry) -> Self {
        Self { registry }
    }

    /// Расшифровать blob любым подходящим кандидатом
    pub fn decrypt(&self, blob: &[u8], credentials: &Credentials) -> Result<DecryptedPayload> {
        self.run(blob, credentials, &mut StretchCache::new()).0
    }

    pub(crate) fn run(
        &self,
        blob: &[u8],
        credentials: &Credentials,
        cache: &mut StretchCache,
    ) -> (Result<DecryptedPayload>, Vec<AttemptRecord>) {
        use tracing::{debug, warn};

        let candidates = self.registry.candidate_decryption_handlers();
        let mut records = Vec::with_capacity(candidates.len());

        let targeted = match BundleHeader::peek(blob) {
            Ok((header, _)) => candidates
                .iter()
                .position(|handler| handler.suite_id() == header.suite_id),
            Err(e) => {
                debug!(
                    target: "crypto::orchestrator",
                    error = %e,
                    "Bundle header unreadable, skipping targeted phase"
                );
                None
            }
        };

        let order = targeted
            .map(|index| (index, Phase::Targeted))
            .into_iter()
            .chain(
                (0..candidates.len())
                    .filter(|index| Some(*index) != targeted)
                    .map(|index| (index, Phase::Fallback)),
            );

        for (index, phase) in order {
            let handler = &candidates[index];
            let suite_match = match phase {
                Phase::Targeted => SuiteMatch::Exact,
                Phase::Fallback => SuiteMatch::Override,
            };

            match Self::attempt(handler, blob, credentials, suite_match, cache) {
                AttemptOutcome::Decrypted(plaintext) => {
                    records.push(AttemptRecord {
                        suite_id: handler.suite_id().to_string(),
                        phase,
                        failure: None,
                    });
                    debug!(
                        target: "crypto::orchestrator",
                        suite_id = %handler.suite_id(),
                        phase = ?phase,
                        "Bundle decrypted"
                    );
                    let payload = DecryptedPayload {
                        plaintext,
                        suite_id: handler.suite_id().to_string(),
                    };
                    return (Ok(payload), records);
                }
                AttemptOutcome::Rejected(failure) => {
                    debug!(
                        target: "crypto::orchestrator",
                        suite_id = %handler.suite_id(),
                        phase = ?phase,
                        failure = ?failure,
                        "Decryption attempt rejected"
                    );
                    records.push(AttemptRecord {
                        suite_id: handler.suite_id().to_string(),
                        phase,
                        failure: Some(failure),
                    });
                }
            }
        }

        let attempted: Vec<&str> = records.iter().map(|r| r.suite_id.as_str()).collect();
        let malformed = records
            .iter()
            .filter(|r| r.failure == Some(AttemptFailure::Malformed))
            .count();
        warn!(
            target: "crypto::orchestrator",
            attempted = ?attempted,
            malformed = malformed,
            targeted = records.iter().any(|r| r.phase == Phase::Targeted),
            stretches = cache.stretches(),
            "No candidate suite could decrypt the bundle"
        );
        (Err(AgilityError::DecryptionFailed), records)
    }

    fn attempt(
        handler: &SuiteHandler,
        blob: &[u8],
        credentials: &Credentials,
        suite_match: SuiteMatch,
        cache: &mut StretchCache,
    ) -> AttemptOutcome {
        let bundle = match handler.parse_bundle(blob) {
            Ok(bundle) => bundle,
            Err(_) => return AttemptOutcome::Rejected(AttemptFailure::Malformed),
        };

        match handler.decrypt_cached(&bundle, credentials, suite_match, cache) {
            Ok(plaintext) => AttemptOutcome::Decrypted(plaintext),
            Err(_) => AttemptOutcome::Rejected(AttemptFailure::Decryption),
        }
    }

    /// Узкая проверка для определения типа файла: заголовок читается и
    /// называет один из наборов-кандидатов.
    ///
    /// This only answers "names a candidate suite". It runs no KDF, so `false`
    /// does not mean [`Self::decrypt`] will fail: a bundle written under a
    /// suite id that was later renamed still opens in the fallback phase.
    pub fn can_decrypt(&self, blob: &[u8]) -> bool {
        match BundleHeader::peek(blob) {
            Ok((header, _)) => self
                .registry
                .candidate_decryption_handlers()
                .iter()
                .any(|handler| handler.suite_id() == header.suite_id),
            Err(_) => false,
        }
    }
}
