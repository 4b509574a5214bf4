//! Реестр наборов: suite_id → обработчик.
//!
//! Registration happens only through [`SuiteRegistryBuilder`]; once
//! [`SuiteRegistryBuilder::build`] returns, the registry is read-only and can
//! be shared between threads. The one piece of interior mutability is the
//! per-entry [`OnceCell`] that memoizes a factory-built handler.

use crate::config::{AgilityConfig, CryptoParams};
use crate::crypto::algorithms::{SuiteDefinition, SuiteInfo};
use crate::crypto::suites::SuiteHandler;
use crate::utils::error::{AgilityError, Result};
use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Конструктор обработчика по определению набора
pub type HandlerFactory = fn(&SuiteDefinition, &CryptoParams) -> Result<SuiteHandler>;

/// Что регистрируется под suite_id
pub enum HandlerEntry {
    /// Готовый обработчик
    Instance(Arc<SuiteHandler>),
    /// Обработчик создаётся при первом обращении
    Factory {
        definition: SuiteDefinition,
        factory: HandlerFactory,
    },
}

impl HandlerEntry {
    /// Фабрика по умолчанию для определения из конфигурации
    pub fn from_definition(definition: SuiteDefinition) -> Self {
        HandlerEntry::Factory {
            definition,
            factory: SuiteHandler::from_definition,
        }
    }

    fn declared_suite_id(&self) -> &str {
        match self {
            HandlerEntry::Instance(handler) => handler.suite_id(),
            HandlerEntry::Factory { definition, .. } => &definition.suite_id,
        }
    }
}

struct Slot {
    entry: HandlerEntry,
    handler: OnceCell<Arc<SuiteHandler>>,
}

/// Изменяемая фаза реестра
pub struct SuiteRegistryBuilder {
    active_suite_id: String,
    attempt_order: Vec<String>,
    params: CryptoParams,
    slots: HashMap<String, Slot>,
}

impl SuiteRegistryBuilder {
    pub fn new(config: &AgilityConfig) -> Self {
        Self {
            active_suite_id: config.active_encryption_suite_id.clone(),
            attempt_order: config.decryption_attempt_order.clone(),
            params: config.params.clone(),
            slots: HashMap::new(),
        }
    }

    /// Зарегистрировать обработчик или фабрику
    ///
    /// Re-registering an id replaces the previous entry.
    pub fn register(&mut self, suite_id: &str, entry: HandlerEntry) -> Result<&mut Self> {
        use tracing::warn;

        if suite_id.trim().is_empty() {
            return Err(AgilityError::InvalidArgument(
                "suite id cannot be empty".to_string(),
            ));
        }
        if entry.declared_suite_id() != suite_id {
            return Err(AgilityError::InvalidArgument(format!(
                "handler for `{}` registered under `{}`",
                entry.declared_suite_id(),
                suite_id
            )));
        }

        let slot = Slot {
            entry,
            handler: OnceCell::new(),
        };
        if self.slots.insert(suite_id.to_string(), slot).is_some() {
            warn!(
                target: "crypto::registry",
                suite_id = %suite_id,
                "Suite registered twice, last registration wins"
            );
        }
        Ok(self)
    }

    /// Заморозить реестр. Активный набор должен разрешаться.
    pub fn build(self) -> Result<SuiteRegistry> {
        use tracing::{debug, error};

        self.params.validate()?;

        let registry = SuiteRegistry {
            active_suite_id: self.active_suite_id,
            attempt_order: self.attempt_order,
            params: self.params,
            slots: self.slots,
        };

        if let Err(e) = registry.active_encryption_handler() {
            error!(
                target: "crypto::registry",
                suite_id = %registry.active_suite_id,
                error = %e,
                "Active encryption suite cannot be resolved"
            );
            return Err(e);
        }

        debug!(
            target: "crypto::registry",
            active = %registry.active_suite_id,
            registered = registry.slots.len(),
            "Suite registry ready"
        );
        Ok(registry)
    }
}

/// Неизменяемый реестр наборов
pub struct SuiteRegistry {
    active_suite_id: String,
    attempt_order: Vec<String>,
    params: CryptoParams,
    slots: HashMap<String, Slot>,
}

impl SuiteRegistry {
    pub fn builder(config: &AgilityConfig) -> SuiteRegistryBuilder {
        SuiteRegistryBuilder::new(config)
    }

    /// Зарегистрировать все наборы из конфигурации фабрикой по умолчанию
    ///
    /// A suite with unsupported or missing algorithms is fatal when it is the
    /// active suite and is skipped with a warning otherwise.
    pub fn from_config(config: &AgilityConfig) -> Result<Self> {
        use tracing::{error, warn};

        config.validate()?;

        let mut builder = SuiteRegistryBuilder::new(config);
        for (suite_id, suite_config) in config.suites.iter() {
            match SuiteDefinition::from_config(suite_id, suite_config) {
                Ok(definition) => {
                    builder.register(suite_id, HandlerEntry::from_definition(definition))?;
                }
                Err(e) if *suite_id == config.active_encryption_suite_id => {
                    error!(
                        target: "crypto::registry",
                        suite_id = %suite_id,
                        error = %e,
                        "Active suite definition is invalid"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        target: "crypto::registry",
                        suite_id = %suite_id,
                        error = %e,
                        "Skipping invalid suite definition"
                    );
                }
            }
        }
        builder.build()
    }

    /// Найти обработчик по suite_id
    pub fn resolve(&self, suite_id: &str) -> Result<Arc<SuiteHandler>> {
        let slot = self
            .slots
            .get(suite_id)
            .ok_or_else(|| AgilityError::AlgorithmNotFound(suite_id.to_string()))?;

        match &slot.entry {
            HandlerEntry::Instance(handler) => Ok(Arc::clone(handler)),
            HandlerEntry::Factory {
                definition,
                factory,
            } => slot
                .handler
                .get_or_try_init(|| factory(definition, &self.params).map(Arc::new))
                .map(Arc::clone),
        }
    }

    pub fn active_suite_id(&self) -> &str {
        &self.active_suite_id
    }

    /// Обработчик для новых шифрований
    pub fn active_encryption_handler(&self) -> Result<Arc<SuiteHandler>> {
        if self.active_suite_id.trim().is_empty() {
            return Err(AgilityError::ConfigurationError(
                "active_encryption_suite_id is not configured".to_string(),
            ));
        }
        self.resolve(&self.active_suite_id)
    }

    /// Кандидаты для расшифровки в порядке decryption_attempt_order
    ///
    /// Ids that do not resolve are dropped with a warning. Repeated ids are
    /// kept only at their first position.
    pub fn candidate_decryption_handlers(&self) -> Vec<Arc<SuiteHandler>> {
        use tracing::warn;

        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(self.attempt_order.len());

        for suite_id in &self.attempt_order {
            if !seen.insert(suite_id.as_str()) {
                continue;
            }
            match self.resolve(suite_id) {
                Ok(handler) => candidates.push(handler),
                Err(e) => warn!(
                    target: "crypto::registry",
                    suite_id = %suite_id,
                    error = %e,
                    "Skipping unresolvable decryption candidate"
                ),
            }
        }
        candidates
    }

    /// Публичные идентификаторы активного набора
    pub fn active_suite_info(&self) -> Result<SuiteInfo> {
        Ok(self.active_encryption_handler()?.info())
    }

    pub fn is_registered(&self, suite_id: &str) -> bool {
        self.slots.contains_key(suite_id)
    }

    pub fn registered_suite_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuiteConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_params() -> CryptoParams {
        CryptoParams {
            argon2_memory_kib: 256,
            argon2_iterations: 1,
            argon2_parallelism: 1,
            pbkdf2_iterations: 1_000,
            salt_length: 16,
        }
    }

    fn hybrid(symmetric: &str) -> SuiteConfig {
        SuiteConfig::new("X25519", "Kyber768", symmetric, "HKDF-SHA256", "passphrase")
    }

    fn config(active: &str, order: &[&str]) -> AgilityConfig {
        AgilityConfig::new(active, order)
            .with_suite("X", hybrid("ChaCha20-Poly1305"))
            .unwrap()
            .with_suite("Y", hybrid("AES-256-GCM"))
            .unwrap()
            .with_params(fast_params())
    }

    fn definition(id: &str) -> SuiteDefinition {
        SuiteDefinition::from_config(id, &hybrid("ChaCha20-Poly1305")).unwrap()
    }

    #[test]
    fn test_registry_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SuiteRegistry>();
    }

    #[test]
    fn test_from_config_resolves_active_and_candidates() {
        let registry = SuiteRegistry::from_config(&config("X", &["X", "Y"])).unwrap();

        assert_eq!(registry.active_encryption_handler().unwrap().suite_id(), "X");
        let ids: Vec<String> = registry
            .candidate_decryption_handlers()
            .iter()
            .map(|h| h.suite_id().to_string())
            .collect();
        assert_eq!(ids, vec!["X", "Y"]);
        assert_eq!(registry.registered_suite_ids(), vec!["X", "Y"]);
    }

    #[test]
    fn test_resolve_unregistered_is_algorithm_not_found() {
        let registry = SuiteRegistry::from_config(&config("X", &[])).unwrap();
        assert!(matches!(
            registry.resolve("Z"),
            Err(AgilityError::AlgorithmNotFound(_))
        ));
    }

    #[test]
    fn test_unresolvable_candidates_are_dropped() {
        let registry = SuiteRegistry::from_config(&config("X", &["Z"])).unwrap();
        assert!(registry.candidate_decryption_handlers().is_empty());

        let registry = SuiteRegistry::from_config(&config("X", &["Z", "Y", "Y"])).unwrap();
        let candidates = registry.candidate_decryption_handlers();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].suite_id(), "Y");
    }

    #[test]
    fn test_empty_order_means_no_candidates() {
        let registry = SuiteRegistry::from_config(&config("X", &[])).unwrap();
        assert!(registry.candidate_decryption_handlers().is_empty());
    }

    #[test]
    fn test_unregistered_active_suite_is_fatal() {
        let err = SuiteRegistry::from_config(&config("MISSING", &["X"])).err().unwrap();
        assert!(matches!(err, AgilityError::AlgorithmNotFound(_)));
        assert!(err.is_startup_fatal());
    }

    #[test]
    fn test_broken_candidate_skipped_broken_active_fatal() {
        let broken = SuiteConfig::new("X25519", "Kyber768", "ROT13", "HKDF-SHA256", "passphrase");

        let config_ok = config("X", &["X", "BROKEN"])
            .with_suite("BROKEN", broken.clone())
            .unwrap();
        let registry = SuiteRegistry::from_config(&config_ok).unwrap();
        assert!(!registry.is_registered("BROKEN"));
        assert_eq!(registry.candidate_decryption_handlers().len(), 1);

        let config_bad = config("BROKEN", &["X"]).with_suite("BROKEN", broken).unwrap();
        let err = SuiteRegistry::from_config(&config_bad).err().unwrap();
        assert!(matches!(err, AgilityError::ConfigurationError(_)));
    }

    #[test]
    fn test_register_rejects_empty_or_mismatched_id() {
        let mut builder = SuiteRegistry::builder(&config("X", &[]));
        assert!(matches!(
            builder.register("", HandlerEntry::from_definition(definition("X"))),
            Err(AgilityError::InvalidArgument(_))
        ));
        assert!(matches!(
            builder.register("Y", HandlerEntry::from_definition(definition("X"))),
            Err(AgilityError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_overwrite_last_registration_wins() {
        let handler = Arc::new(
            SuiteHandler::from_definition(&definition("X"), &fast_params()).unwrap(),
        );

        let mut builder = SuiteRegistry::builder(&config("X", &[]));
        builder
            .register("X", HandlerEntry::from_definition(definition("X")))
            .unwrap();
        builder
            .register("X", HandlerEntry::Instance(Arc::clone(&handler)))
            .unwrap();
        let registry = builder.build().unwrap();

        assert!(Arc::ptr_eq(&registry.resolve("X").unwrap(), &handler));
    }

    static FACTORY_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_factory(suite: &SuiteDefinition, params: &CryptoParams) -> Result<SuiteHandler> {
        FACTORY_CALLS.fetch_add(1, Ordering::SeqCst);
        SuiteHandler::from_definition(suite, params)
    }

    #[test]
    fn test_factory_runs_once_and_is_shared() {
        let mut builder = SuiteRegistry::builder(&config("C", &["C"]));
        builder
            .register(
                "C",
                HandlerEntry::Factory {
                    definition: definition("C"),
                    factory: counting_factory,
                },
            )
            .unwrap();
        let registry = Arc::new(builder.build().unwrap());

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.resolve("C").unwrap())
            })
            .collect();
        let handlers: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        assert_eq!(FACTORY_CALLS.load(Ordering::SeqCst), 1);
        assert!(handlers.iter().all(|h| Arc::ptr_eq(h, &handlers[0])));
    }

    #[test]
    fn test_active_suite_info() {
        let registry = SuiteRegistry::from_config(&config("Y", &["X"])).unwrap();
        let info = registry.active_suite_info().unwrap();
        assert_eq!(info.suite_id, "Y");
        assert_eq!(info.symmetric_algorithm, "AES-256-GCM");
    }
}
