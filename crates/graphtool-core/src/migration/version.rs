//! Migration versions.
//!
//! A version is a numeric revision with an optional textual part, written as
//! `<revision>[+<part>]`. Versions order by revision first and by part second,
//! a version without a part sorting before any version with one.

use crate::error::{MigrationError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between revision and part.
pub const PART_SEPARATOR: char = '+';

/// A comparable migration point.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    revision: u64,
    part: Option<String>,
}

impl Version {
    /// Create a version without a part.
    pub fn new(revision: u64) -> Self {
        Self {
            revision,
            part: None,
        }
    }

    /// Create a version with a part.
    pub fn with_part(revision: u64, part: impl Into<String>) -> Result<Self> {
        let part = part.into();
        validate_part(&part).map_err(|reason| MigrationError::InvalidVersionFormat {
            input: format!("{revision}{PART_SEPARATOR}{part}"),
            reason,
        })?;
        Ok(Self {
            revision,
            part: Some(part),
        })
    }

    /// Parse `<revision>[+<part>]`.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |reason: &str| MigrationError::InvalidVersionFormat {
            input: text.to_string(),
            reason: reason.to_string(),
        };

        let (revision, part) = match text.split_once(PART_SEPARATOR) {
            Some((revision, part)) => (revision, Some(part)),
            None => (text, None),
        };

        let revision = parse_revision(revision).map_err(|reason| invalid(&reason))?;
        let part = match part {
            Some(part) => {
                validate_part(part).map_err(|reason| invalid(&reason))?;
                Some(part.to_string())
            }
            None => None,
        };

        Ok(Self { revision, part })
    }

    /// Numeric revision.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Optional part.
    pub fn part(&self) -> Option<&str> {
        self.part.as_deref()
    }
}

fn parse_revision(text: &str) -> std::result::Result<u64, String> {
    if text.is_empty() {
        return Err("missing revision".to_string());
    }
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("revision {text:?} is not a decimal number"));
    }
    text.parse::<u64>()
        .map_err(|_| format!("revision {text:?} is out of range"))
}

fn validate_part(part: &str) -> std::result::Result<(), String> {
    if part.is_empty() {
        return Err("empty part after separator".to_string());
    }
    if part.contains(PART_SEPARATOR) {
        return Err(format!("separator {PART_SEPARATOR:?} appears more than once"));
    }
    if let Some(c) = part
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
    {
        return Err(format!("part contains invalid character {c:?}"));
    }
    Ok(())
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.part {
            Some(part) => write!(f, "{}{}{}", self.revision, PART_SEPARATOR, part),
            None => write!(f, "{}", self.revision),
        }
    }
}

impl FromStr for Version {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = MigrationError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

/// The version a plan should reach, optionally pinned to a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetVersion {
    /// Version to reach.
    pub version: Version,
    /// Batch to start planning from; the configured initial batch when absent.
    pub batch: Option<String>,
}

impl TargetVersion {
    /// Target a version with no explicit batch.
    pub fn new(version: Version) -> Self {
        Self {
            version,
            batch: None,
        }
    }

    /// Pin the target to a batch.
    pub fn with_batch(mut self, batch: impl Into<String>) -> Self {
        self.batch = Some(batch.into());
        self
    }

    /// Parse `<revision>[+<part>]`, allowing the revision to be omitted.
    ///
    /// An omitted revision parses as `0`; callers decide what that means
    /// (the CLI substitutes the current time).
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let version = if text.is_empty() {
            Version::new(0)
        } else if let Some(part) = text.strip_prefix(PART_SEPARATOR) {
            Version::with_part(0, part).map_err(|_| MigrationError::InvalidVersionFormat {
                input: text.to_string(),
                reason: "invalid part".to_string(),
            })?
        } else {
            Version::parse(text)?
        };
        Ok(Self::new(version))
    }

    /// Whether the revision still needs a caller-supplied value.
    pub fn needs_revision(&self) -> bool {
        self.version.revision == 0
    }

    /// Replace a zero revision, keeping the part.
    pub fn fill_revision(mut self, revision: u64) -> Self {
        if self.needs_revision() {
            self.version.revision = revision;
        }
        self
    }

    /// Batch to plan from, falling back to `initial_batch`.
    pub fn resolve_batch<'a>(&'a self, initial_batch: &'a str) -> &'a str {
        self.batch.as_deref().unwrap_or(initial_batch)
    }
}

impl fmt::Display for TargetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.batch {
            Some(batch) => write!(f, "{} ({})", self.version, batch),
            None => write!(f, "{}", self.version),
        }
    }
}

impl FromStr for TargetVersion {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
