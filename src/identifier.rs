//! Tag identifier canonicalization.
//!
//! Readers emit tag codes in whatever shape their firmware prints them
//! (`"ab 12 cd"`, `"AB:12:CD"`, `"ab-12-cd\r"`). Everything that is matched,
//! stored, or logged goes through [`normalize`] first so that equality is the
//! only relation we ever need.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical tag identifier: ASCII alphanumerics only, uppercase.
///
/// An `Identifier` may be empty; an empty identifier means "no event" and
/// callers filter it out. Use [`Identifier::parse`] to get `None` instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Normalize `text` and return `None` if nothing is left.
    pub fn parse(text: &str) -> Option<Self> {
        let id = normalize(text);
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    /// The canonical text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when nothing survived canonicalization.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Strip every non-alphanumeric character and uppercase the rest.
///
/// ASCII semantics only; tag codes are hex-like and locale casing must not apply.
pub fn normalize(text: &str) -> Identifier {
    Identifier(
        text.chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect(),
    )
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        normalize(&value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
