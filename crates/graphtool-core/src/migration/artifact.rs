//! Migration artifacts and their on-disk file names.
//!
//! Artifact files live directly inside a batch folder and are named
//!
//! ```text
//! <revision>[+<part>]_<name>.<up|down>.<cypher|run>
//! ```
//!
//! Generated names zero-pad the revision to [`REVISION_WIDTH`] digits so that
//! a plain directory listing sorts by version. Any width is accepted when
//! parsing.

use super::version::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Minimum number of digits written for a revision.
pub const REVISION_WIDTH: usize = 10;

/// Separator between the version and the name.
const NAME_SEPARATOR: char = '_';

/// Command token that marks a step as a no-op.
pub const NOOP_COMMAND: &str = "exit";

/// Direction of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Moves the database forward.
    Up,
    /// Reverts a previous up migration.
    Down,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an artifact contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// A Cypher script streamed to the query shell.
    Script,
    /// An argument vector for an external process.
    Command,
}

impl ArtifactKind {
    /// File extension used for this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Script => "cypher",
            ArtifactKind::Command => "run",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "cypher" => Some(ArtifactKind::Script),
            "run" => Some(ArtifactKind::Command),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Script => write!(f, "cypher"),
            ArtifactKind::Command => write!(f, "command"),
        }
    }
}

/// Everything encoded in an artifact file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFileName {
    /// Version of the artifact.
    pub version: Version,
    /// Display name.
    pub name: String,
    /// Direction.
    pub direction: Direction,
    /// Content kind.
    pub kind: ArtifactKind,
}

impl ArtifactFileName {
    /// Render the file name.
    pub fn to_file_name(&self) -> String {
        let revision = format!("{:0width$}", self.version.revision(), width = REVISION_WIDTH);
        let version = match self.version.part() {
            Some(part) => format!("{revision}+{part}"),
            None => revision,
        };
        format!(
            "{version}{NAME_SEPARATOR}{}.{}.{}",
            self.name,
            self.direction,
            self.kind.extension()
        )
    }

    /// Parse a file name, returning the reason on failure.
    pub fn parse(file_name: &str) -> Result<Self, String> {
        let mut pieces = file_name.rsplitn(3, '.');
        let ext = pieces.next().unwrap_or_default();
        let (direction, stem) = match (pieces.next(), pieces.next()) {
            (Some(direction), Some(stem)) => (direction, stem),
            _ => return Err("expected <version>_<name>.<up|down>.<cypher|run>".to_string()),
        };

        let kind = ArtifactKind::from_extension(ext)
            .ok_or_else(|| format!("unknown extension {ext:?}, expected cypher or run"))?;
        let direction = Direction::from_suffix(direction)
            .ok_or_else(|| format!("unknown direction {direction:?}, expected up or down"))?;

        let (version, name) = stem
            .split_once(NAME_SEPARATOR)
            .ok_or_else(|| "missing '_' between version and name".to_string())?;
        let version = Version::parse(version).map_err(|e| e.to_string())?;
        validate_name(name)?;

        Ok(Self {
            version,
            name: name.to_string(),
            direction,
            kind,
        })
    }
}

/// Check that a migration name can be embedded in a file name.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty name".to_string());
    }
    if name.trim() != name {
        return Err("leading or trailing whitespace".to_string());
    }
    if let Some(c) = name
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '\0') || c.is_control())
    {
        return Err(format!("invalid character {c:?}"));
    }
    Ok(())
}

/// Contents of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Payload {
    /// Cypher script text.
    Script(String),
    /// Command and its arguments.
    Command(Vec<String>),
}

impl Payload {
    /// Kind of this payload.
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Payload::Script(_) => ArtifactKind::Script,
            Payload::Command(_) => ArtifactKind::Command,
        }
    }

    /// Whether this payload is the no-op sentinel command.
    pub fn is_noop(&self) -> bool {
        matches!(self, Payload::Command(argv) if argv.first().map(String::as_str) == Some(NOOP_COMMAND))
    }
}

/// Parse the contents of a command file into an argument vector.
///
/// Blank lines and lines starting with `#` are skipped; the remaining text is
/// split on whitespace.
pub fn parse_command(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(str::split_whitespace)
        .map(str::to_string)
        .collect()
}

/// One migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationArtifact {
    /// Batch the artifact belongs to.
    pub batch: String,
    /// Version.
    pub version: Version,
    /// Display name.
    pub name: String,
    /// Direction.
    pub direction: Direction,
    /// Contents.
    pub payload: Payload,
    /// Where the artifact was read from, if anywhere.
    pub path: Option<PathBuf>,
}

impl MigrationArtifact {
    /// Create an artifact that is not backed by a file.
    pub fn new(
        batch: impl Into<String>,
        version: Version,
        name: impl Into<String>,
        direction: Direction,
        payload: Payload,
    ) -> Self {
        Self {
            batch: batch.into(),
            version,
            name: name.into(),
            direction,
            payload,
            path: None,
        }
    }

    /// Attach the source path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Kind of the artifact.
    pub fn kind(&self) -> ArtifactKind {
        self.payload.kind()
    }

    /// File name this artifact would be stored under.
    pub fn file_name(&self) -> String {
        ArtifactFileName {
            version: self.version.clone(),
            name: self.name.clone(),
            direction: self.direction,
            kind: self.kind(),
        }
        .to_file_name()
    }
}
