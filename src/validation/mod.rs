use std::fmt;

use bigdecimal::BigDecimal;

pub const CURRENCY_CODE_LEN: usize = 3;
pub const NAME_MAX_LEN: usize = 120;
pub const DESCRIPTION_MAX_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for crate::error::AppError {
    fn from(err: ValidationError) -> Self {
        crate::error::AppError::Validation(err.to_string())
    }
}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Normalizes a currency code to uppercase and checks the 3-letter shape.
/// Whether the code is actually active is a database question answered later.
pub fn normalize_currency_code(field: &'static str, code: &str) -> Result<String, ValidationError> {
    let code = sanitize_string(code).to_uppercase();
    validate_required(field, &code)?;

    if code.len() != CURRENCY_CODE_LEN || !code.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            field,
            "must be a 3-letter currency code",
        ));
    }

    Ok(code)
}

pub fn validate_positive_amount(field: &'static str, amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new(field, "must be greater than zero"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string("single"), "single");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "abcd");
    }

    #[test]
    fn normalizes_currency_codes() {
        assert_eq!(normalize_currency_code("currency", " usd ").unwrap(), "USD");
        assert_eq!(normalize_currency_code("currency", "EUR").unwrap(), "EUR");
        assert!(normalize_currency_code("currency", "US").is_err());
        assert!(normalize_currency_code("currency", "USDT").is_err());
        assert!(normalize_currency_code("currency", "U1D").is_err());
        assert!(normalize_currency_code("currency", "").is_err());
    }

    #[test]
    fn validates_positive_amounts() {
        assert!(validate_positive_amount("amount", &BigDecimal::from_str("0.01").unwrap()).is_ok());
        assert!(validate_positive_amount("amount", &BigDecimal::from(0)).is_err());
        assert!(validate_positive_amount("amount", &BigDecimal::from(-5)).is_err());
    }
}
