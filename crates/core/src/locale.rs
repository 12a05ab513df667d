//! Message locales: `lang[-COUNTRY]` codes, e.g. `eng-US`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A language plus optional country, encoded as the three-letter language
/// code optionally followed by `-` and the country code. Empty = unspecified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locale(String);

impl Locale {
    pub const NIL: Locale = Locale(String::new());

    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_empty()
    }

    /// Decompose into (language, country), each possibly empty.
    pub fn to_parts(&self) -> (&str, &str) {
        if self.0.len() < 3 {
            return ("", "");
        }
        match self.0.split_once('-') {
            Some((lang, country)) => (lang, country),
            None => (self.0.as_str(), ""),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Locale {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
