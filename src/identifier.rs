//! Player identifier parsing and validation
//!
//! A player is known by two names: the stable numeric XUID and the display
//! gamertag, which the owner may change at any time.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Longest gamertag Xbox Live accepts, including the numeric suffix
const MAX_GAMERTAG_LEN: usize = 16;

/// Stable numeric Xbox user id
///
/// Accepts both the bare number and the `xuid(N)` form used by the stats service.
///
/// # Examples
///
/// ```
/// use halo_stats::identifier::Xuid;
///
/// let plain: Xuid = "2533274818160056".parse().unwrap();
/// let wrapped: Xuid = "xuid(2533274818160056)".parse().unwrap();
/// assert_eq!(plain, wrapped);
/// assert_eq!(plain.to_wire(), "xuid(2533274818160056)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Xuid(u64);

impl Xuid {
    /// Wrap a numeric id
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Numeric value
    pub fn value(self) -> u64 {
        self.0
    }

    /// `xuid(N)` form used in stats service paths and player lists
    pub fn to_wire(self) -> String {
        format!("xuid({})", self.0)
    }

    /// Short stable hash used for cache keys when no gamertag is known
    pub fn cache_hash(self) -> String {
        let digest = Sha256::digest(self.0.to_string().as_bytes());
        digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
    }
}

impl FromStr for Xuid {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix("xuid(")
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(trimmed);

        inner
            .parse::<u64>()
            .map(Xuid)
            .map_err(|_| IdentifierError::InvalidXuid(s.to_string()))
    }
}

impl fmt::Display for Xuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated gamertag
///
/// Comparison is case-insensitive, as it is on Xbox Live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gamertag(String);

impl Gamertag {
    /// Parse and validate a gamertag
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, too long or contains characters
    /// Xbox Live never issues.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let name = s.trim();
        if name.is_empty() {
            return Err(IdentifierError::InvalidGamertag("gamertag cannot be empty".to_string()));
        }
        if name.chars().count() > MAX_GAMERTAG_LEN {
            return Err(IdentifierError::InvalidGamertag(format!(
                "gamertag '{name}' is longer than {MAX_GAMERTAG_LEN} characters"
            )));
        }
        if let Some(bad) = name.chars().find(|c| !(c.is_alphanumeric() || *c == ' ' || *c == '#')) {
            return Err(IdentifierError::InvalidGamertag(format!(
                "gamertag '{name}' contains invalid character '{bad}'"
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// The name as entered
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form used for index lookups
    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }

    /// Filesystem-safe form
    ///
    /// # Examples
    ///
    /// ```
    /// use halo_stats::identifier::Gamertag;
    ///
    /// let gt = Gamertag::parse("Major Nelson#2").unwrap();
    /// assert_eq!(gt.to_filesystem_safe(), "Major_Nelson_2");
    /// ```
    pub fn to_filesystem_safe(&self) -> String {
        sanitize_key(&self.0)
    }
}

impl PartialEq for Gamertag {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Gamertag {}

impl fmt::Display for Gamertag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`
pub fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Errors that can occur during identifier parsing
#[derive(Debug, thiserror::Error)]
pub enum IdentifierError {
    /// Not a numeric XUID
    #[error("invalid xuid: {0}")]
    InvalidXuid(String),

    /// Not an acceptable gamertag
    #[error("invalid gamertag: {0}")]
    InvalidGamertag(String),
}
