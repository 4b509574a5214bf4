// Base64 утилиты (файлы внешних ключей)

use crate::utils::error::{AgilityError, Result};
use base64::{engine::general_purpose, Engine};

pub fn encode(data: &[u8]) -> String {
    general_purpose::STANDARD.encode(data)
}

/// Декодировать поле файла ключей; `field` попадает только в текст ошибки
pub fn decode(field: &str, data: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| AgilityError::KeyManagementError(format!("{} is not valid base64: {}", field, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reports_field_name() {
        let err = decode("pqc_public_key", "***").unwrap_err();
        assert!(err.to_string().contains("pqc_public_key"));
    }

    #[test]
    fn test_decode_ignores_surrounding_whitespace() {
        let encoded = format!("  {}\n", encode(b"key bytes"));
        assert_eq!(decode("field", &encoded).unwrap(), b"key bytes");
    }
}
