use crate::config::AgilityConfig;
use crate::crypto::algorithms::SuiteInfo;
use crate::crypto::bundle::BundleHeader;
use crate::crypto::keys::{generate_key_material, write_external_key_file, Credentials};
use crate::crypto::orchestrator::{DecryptedPayload, DecryptionOrchestrator};
use crate::crypto::registry::SuiteRegistry;
use crate::utils::error::Result;
use std::path::Path;

/// Точка входа для приложения: шифрование активным набором и расшифровка
/// любым из кандидатов
pub struct CryptoAgility {
    registry: SuiteRegistry,
}

impl CryptoAgility {
    /// Построить реестр из конфигурации. Ошибка здесь блокирует запуск.
    pub fn new(config: AgilityConfig) -> Result<Self> {
        let registry = SuiteRegistry::from_config(&config)?;
        Ok(Self { registry })
    }

    /// Обернуть реестр, собранный вручную через [`SuiteRegistry::builder`]
    pub fn from_registry(registry: SuiteRegistry) -> Self {
        Self { registry }
    }

    /// Зашифровать активным набором, вернуть сериализованный bundle
    pub fn encrypt(&self, plaintext: &[u8], credentials: &Credentials) -> Result<Vec<u8>> {
        use tracing::debug;

        let handler = self.registry.active_encryption_handler()?;
        let bundle = handler.encrypt(plaintext, credentials)?;

        debug!(
            target: "api::crypto",
            suite_id = %handler.suite_id(),
            ciphertext_len = bundle.ciphertext.len(),
            "Encrypted with active suite"
        );
        bundle.to_bytes()
    }

    pub fn decrypt(&self, blob: &[u8], credentials: &Credentials) -> Result<DecryptedPayload> {
        DecryptionOrchestrator::new(&self.registry).decrypt(blob, credentials)
    }

    /// Перешифровать bundle активным набором (миграция после смены алгоритмов)
    pub fn reencrypt(
        &self,
        blob: &[u8],
        old_credentials: &Credentials,
        new_credentials: &Credentials,
    ) -> Result<Vec<u8>> {
        use tracing::info;

        let payload = self.decrypt(blob, old_credentials)?;
        let migrated = self.encrypt(&payload.plaintext, new_credentials)?;

        info!(
            target: "api::crypto",
            from = %payload.suite_id,
            to = %self.registry.active_suite_id(),
            "Bundle re-encrypted"
        );
        Ok(migrated)
    }

    /// Заголовок называет набор-кандидат; расшифровку не гарантирует
    /// (см. [`DecryptionOrchestrator::can_decrypt`])
    pub fn can_decrypt(&self, blob: &[u8]) -> bool {
        DecryptionOrchestrator::new(&self.registry).can_decrypt(blob)
    }

    pub fn active_suite(&self) -> Result<SuiteInfo> {
        self.registry.active_suite_info()
    }

    pub fn registry(&self) -> &SuiteRegistry {
        &self.registry
    }

    /// Создать новый файл внешних ключей для набора
    pub fn provision_key_file(&self, suite_id: &str, path: &Path) -> Result<()> {
        let handler = self.registry.resolve(suite_id)?;
        let material = generate_key_material(handler.suite())?;
        write_external_key_file(path, handler.suite(), &material)
    }
}

/// suite_id_used из заголовка bundle, без разбора остальных полей
pub fn bundle_suite_id(blob: &[u8]) -> Option<String> {
    BundleHeader::peek(blob).ok().map(|(header, _)| header.suite_id)
}
