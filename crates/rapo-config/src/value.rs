//! Scalar normalization (§6.1): every raw INI value is coerced to `null`,
//! a boolean, a number or a plain string before the rest of the engine
//! ever sees it.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

fn int_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?\d+$").unwrap())
}

fn float_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?(\d*\.\d+|\d+\.\d*)$").unwrap())
}

/// Normalize a raw INI value the way the original configurator does.
pub fn normalize(raw: Option<&str>) -> Value {
    let raw = match raw {
        None => return Value::Null,
        Some(s) => s,
    };
    if raw.trim().is_empty() || raw.eq_ignore_ascii_case("none") {
        return Value::Null;
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if int_pattern().is_match(raw) {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::Int(n);
        }
    }
    if float_pattern().is_match(raw) {
        if let Ok(n) = raw.parse::<f64>() {
            return Value::Float(n);
        }
    }
    Value::Str(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_none_normalize_to_null() {
        assert_eq!(normalize(None), Value::Null);
        assert_eq!(normalize(Some("")), Value::Null);
        assert_eq!(normalize(Some("  ")), Value::Null);
        assert_eq!(normalize(Some("NONE")), Value::Null);
    }

    #[test]
    fn booleans_are_case_insensitive() {
        assert_eq!(normalize(Some("TRUE")), Value::Bool(true));
        assert_eq!(normalize(Some("false")), Value::Bool(false));
    }

    #[test]
    fn numbers_parse_as_int_or_float() {
        assert_eq!(normalize(Some("42")), Value::Int(42));
        assert_eq!(normalize(Some("-7")), Value::Int(-7));
        assert_eq!(normalize(Some("3.14")), Value::Float(3.14));
    }

    #[test]
    fn everything_else_is_a_string() {
        assert_eq!(normalize(Some("oracle")), Value::Str("oracle".to_string()));
    }
}
