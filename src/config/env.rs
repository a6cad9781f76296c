use toml::Value;

use super::error::ProviderError;
use super::source::{Provider, Values};
use super::tree::insert_path;

/// Loads configuration from environment variables sharing a prefix.
///
/// Variables are mapped to config paths by:
/// 1. Removing the prefix and separator
/// 2. Splitting remaining segments on the separator
/// 3. Converting path segments to lowercase
///
/// Values are coerced from strings to the most specific type:
/// boolean, integer, float, or string (fallback).
///
/// With `MYAPP__DATABASE__HOST=localhost`, `EnvProvider::new("MYAPP", "__")`
/// yields `database.host = "localhost"`.
#[derive(Debug, Clone)]
pub struct EnvProvider {
    prefix: String,
    separator: String,
}

impl EnvProvider {
    /// # Panics
    ///
    /// Panics if `separator` is empty.
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        let separator = separator.into();
        assert!(!separator.is_empty(), "separator must not be empty");
        Self {
            prefix: prefix.into(),
            separator,
        }
    }

    fn collect(&self, vars: impl IntoIterator<Item = (String, String)>) -> Values {
        let prefix_with_sep = format!("{}{}", self.prefix, self.separator);
        let mut values = Values::new();

        for (key, value) in vars {
            let Some(path_str) = key.strip_prefix(&prefix_with_sep) else {
                continue;
            };
            if path_str.is_empty() {
                continue;
            }

            let path: Vec<String> = path_str
                .split(&self.separator)
                .map(str::to_lowercase)
                .collect();
            if path.iter().any(String::is_empty) {
                continue;
            }

            insert_path(&mut values, &path, coerce_value(&value));
        }

        values
    }
}

impl Provider for EnvProvider {
    fn load(&self) -> Result<Values, ProviderError> {
        Ok(self.collect(std::env::vars()))
    }
}

fn coerce_value(s: &str) -> Value {
    if s.eq_ignore_ascii_case("true") {
        return Value::Boolean(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return Value::Boolean(false);
    }

    // Only digits with an optional minus sign count as an integer.
    if looks_like_integer(s) {
        if let Ok(i) = s.parse::<i64>() {
            return Value::Integer(i);
        }
    }

    if s.contains('.') {
        if let Ok(f) = s.parse::<f64>() {
            return Value::Float(f);
        }
    }

    Value::String(s.to_string())
}

fn looks_like_integer(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
