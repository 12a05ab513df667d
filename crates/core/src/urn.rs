//! Contact URNs: normalized `scheme:path` addresses.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A normalized contact address of the form `scheme:path`, e.g.
/// `tel:+254791541111` or `whatsapp:12065551212`.
///
/// Construction always normalizes, and normalization is idempotent: the same
/// logical endpoint maps to the same URN string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Urn(String);

impl Urn {
    /// Parse and normalize a raw `scheme:path` string.
    pub fn parse(raw: &str) -> Result<Self> {
        let (scheme, path) = raw
            .split_once(':')
            .ok_or_else(|| Error::invalid_urn(raw))?;
        if scheme.is_empty() || path.is_empty() {
            return Err(Error::invalid_urn(raw));
        }
        Self::from_parts(scheme, path)
    }

    /// Build a URN from a scheme and path, normalizing both.
    pub fn from_parts(scheme: &str, path: &str) -> Result<Self> {
        let scheme = scheme.to_lowercase();
        let path = match scheme.as_str() {
            "tel" => normalize_tel(path),
            _ => path.trim().to_string(),
        };
        if path.is_empty() {
            return Err(Error::invalid_urn(format!("{scheme}:{path}")));
        }
        Ok(Self(format!("{scheme}:{path}")))
    }

    /// Build a `tel:` URN from a raw phone number as providers report it.
    pub fn from_tel(number: &str) -> Result<Self> {
        Self::from_parts("tel", number)
    }

    pub fn scheme(&self) -> &str {
        self.0.split(':').next().unwrap_or("")
    }

    pub fn path(&self) -> &str {
        self.0.split_once(':').map(|(_, p)| p).unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalize a phone number: strip formatting characters, rewrite an
/// international `00` prefix to `+`, and prepend `+` to bare international
/// numbers. Short codes (fewer than 8 digits) are left as-is.
fn normalize_tel(raw: &str) -> String {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if let Some(rest) = cleaned.strip_prefix("00") {
        cleaned = format!("+{rest}");
    }

    if !cleaned.starts_with('+') && cleaned.len() >= 8 {
        cleaned = format!("+{cleaned}");
    }

    // A stray plus inside the number is formatting noise.
    let head = if cleaned.starts_with('+') { "+" } else { "" };
    let digits: String = cleaned.chars().filter(char::is_ascii_digit).collect();
    format!("{head}{digits}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tel_normalization() {
        assert_eq!(
            Urn::from_tel("254791541111").unwrap().as_str(),
            "tel:+254791541111"
        );
        assert_eq!(
            Urn::from_tel("+254 791 541-111").unwrap().as_str(),
            "tel:+254791541111"
        );
        assert_eq!(
            Urn::from_tel("00254791541111").unwrap().as_str(),
            "tel:+254791541111"
        );
        // Short codes keep their bare form.
        assert_eq!(Urn::from_tel("2020").unwrap().as_str(), "tel:2020");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = Urn::from_tel("(206) 555-1212x").unwrap();
        let twice = Urn::parse(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn scheme_and_path() {
        let urn = Urn::parse("whatsapp:12065551212").unwrap();
        assert_eq!(urn.scheme(), "whatsapp");
        assert_eq!(urn.path(), "12065551212");
    }

    #[test]
    fn rejects_malformed() {
        assert!(Urn::parse("no-colon").is_err());
        assert!(Urn::parse(":path").is_err());
        assert!(Urn::parse("tel:").is_err());
    }
}
