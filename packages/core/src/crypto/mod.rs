//! Криптографический модуль
//!
//! # Архитектура
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Application                          │
//! └─────────────────────────────────────────────────────────────┘
//!                │ encrypt                    │ decrypt
//!                ▼                            ▼
//! ┌───────────────────────────┐  ┌──────────────────────────────┐
//! │   SuiteRegistry           │  │  DecryptionOrchestrator      │
//! │  - active handler         │◄─│  - targeted phase (header)   │
//! │  - decryption candidates  │  │  - fallback phase (order)    │
//! └───────────────────────────┘  └──────────────────────────────┘
//!                │
//!                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              SuiteHandler (closed enum)                     │
//! │  - PassphraseHybrid: Argon2id/PBKDF2 → key pairs            │
//! │  - ExternalKeyHybrid: key file → key pairs                  │
//! └─────────────────────────────────────────────────────────────┘
//!                │
//!                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              HybridEngine (Crypto-Agility)                  │
//! │  - KEM (X25519 + Kyber-768)                                 │
//! │  - KDF (HKDF-SHA256 / HKDF-SHA512)                          │
//! │  - AEAD (ChaCha20-Poly1305 / XChaCha20-Poly1305 / AES-GCM)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Модули
//!
//! ### Core Traits
//! - [`provider`]: интерфейсы примитивов (Kem, AeadCipher, Kdf, PassphraseStretcher)
//! - [`algorithms`]: закрытый набор алгоритмов и SuiteDefinition
//!
//! ### Implementations
//! - [`suites`]: примитивы, гибридный движок и обработчики наборов
//! - [`bundle`]: EncryptedBundle и wire-формат
//!
//! ### Dispatch
//! - [`registry`]: SuiteRegistry (active / candidates)
//! - [`orchestrator`]: двухфазная расшифровка
//!
//! ### Utilities
//! - [`keys`]: KeyMaterial, Credentials, файлы внешних ключей
//! - [`master_key`]: растяжение пароля

// ============================================================================
// Core Traits
// ============================================================================

pub mod algorithms;

pub mod provider;

// ============================================================================
// Implementations
// ============================================================================

/// Криптографические наборы (примитивы + гибридный движок)
pub mod suites;

pub mod bundle;

// ============================================================================
// Dispatch
// ============================================================================

pub mod registry;

pub mod orchestrator;

// ============================================================================
// Utilities
// ============================================================================

pub mod keys;

pub mod master_key;

// ============================================================================
// Re-exports для удобства
// ============================================================================

pub use algorithms::{SuiteDefinition, SuiteInfo};
pub use bundle::{BundleHeader, EncryptedBundle};
pub use keys::{Credentials, KeyMaterial};
pub use master_key::StretchParams;
pub use orchestrator::{DecryptedPayload, DecryptionOrchestrator};
pub use registry::{HandlerEntry, SuiteRegistry, SuiteRegistryBuilder};
pub use suites::hybrid::{HybridEngine, SuiteMatch};
pub use suites::SuiteHandler;
