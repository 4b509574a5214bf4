// Публичный API ядра
// Высокоуровневые методы поверх реестра и оркестратора

pub mod crypto;

pub use crypto::CryptoAgility;
