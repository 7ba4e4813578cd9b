//! Account handle normalization and validation.

use crate::error::SweepError;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static HANDLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\-]{2,30}$").expect("handle pattern is valid"));

/// Strip surrounding whitespace and one leading `@` marker.
pub fn clean(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix('@').unwrap_or(trimmed).trim()
}

/// True iff the cleaned form is 2-30 word characters or hyphens.
pub fn validate(raw: &str) -> bool {
    HANDLE_PATTERN.is_match(clean(raw))
}

/// A validated account identifier, stored in cleaned form with case preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(String);

impl Handle {
    /// Returns `None` for anything that fails [`validate`].
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned = clean(raw);
        HANDLE_PATTERN
            .is_match(cleaned)
            .then(|| Self(cleaned.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Handle {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| SweepError::InvalidHandle(s.to_string()))
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
