//! Migration folder scanning and artifact generation.
//!
//! Each direct child directory of the root folder is a batch. Artifact files
//! inside a batch folder are named as described in
//! [`artifact`](super::artifact); hidden entries are always skipped.

use super::artifact::{
    parse_command, validate_name, ArtifactFileName, ArtifactKind, Direction, MigrationArtifact,
    Payload, NOOP_COMMAND,
};
use super::inventory::Inventory;
use super::version::Version;
use crate::error::{MigrationError, Result};
use serde::Deserialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// What to do with files in a batch folder that do not follow the naming scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownFilePolicy {
    /// Log and skip them.
    Ignore,
    /// Fail the scan.
    #[default]
    Reject,
}

/// Scans and creates migration artifacts below a root folder.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    unknown_files: UnknownFilePolicy,
}

impl Scanner {
    /// Create a scanner rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            unknown_files: UnknownFilePolicy::default(),
        }
    }

    /// Set the policy for unrecognised files.
    pub fn with_unknown_files(mut self, policy: UnknownFilePolicy) -> Self {
        self.unknown_files = policy;
        self
    }

    /// Root folder.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the root folder into an inventory.
    ///
    /// Any malformed name (under [`UnknownFilePolicy::Reject`]), unreadable
    /// file or duplicate version fails the whole scan.
    pub fn scan(&self) -> Result<Inventory> {
        let mut artifacts = Vec::new();
        let mut batches = Vec::new();

        for batch_dir in sorted_entries(&self.root)? {
            if is_hidden(&batch_dir) || !batch_dir.is_dir() {
                continue;
            }
            let batch = file_name_str(&batch_dir)?.to_string();
            tracing::debug!(batch = %batch, path = %batch_dir.display(), "scanning batch");

            for path in sorted_entries(&batch_dir)? {
                if is_hidden(&path) {
                    continue;
                }
                if !path.is_file() {
                    tracing::debug!(path = %path.display(), "skipping non-file entry");
                    continue;
                }
                if let Some(artifact) = self.read_artifact(&batch, &path)? {
                    artifacts.push(artifact);
                }
            }
            batches.push(batch);
        }

        let mut inventory = Inventory::from_artifacts(artifacts)?;
        for batch in batches {
            inventory.add_batch(batch);
        }

        tracing::info!(
            root = %self.root.display(),
            artifacts = inventory.len(),
            "scan complete"
        );
        Ok(inventory)
    }

    fn read_artifact(&self, batch: &str, path: &Path) -> Result<Option<MigrationArtifact>> {
        let parsed = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| "file name is not valid UTF-8".to_string())
            .and_then(ArtifactFileName::parse);
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(reason) => {
                return match self.unknown_files {
                    UnknownFilePolicy::Ignore => {
                        tracing::warn!(path = %path.display(), %reason, "ignoring unrecognised file");
                        Ok(None)
                    }
                    UnknownFilePolicy::Reject => Err(MigrationError::malformed(path, reason)),
                };
            }
        };

        let content =
            fs::read_to_string(path).map_err(|e| MigrationError::filesystem(path, e))?;
        let payload = match parsed.kind {
            ArtifactKind::Script => Payload::Script(content),
            ArtifactKind::Command => {
                let argv = parse_command(&content);
                if argv.is_empty() {
                    return Err(MigrationError::EmptyCommand {
                        path: path.to_path_buf(),
                    });
                }
                Payload::Command(argv)
            }
        };

        tracing::debug!(
            batch,
            version = %parsed.version,
            direction = %parsed.direction,
            kind = %parsed.kind,
            "found artifact"
        );

        Ok(Some(
            MigrationArtifact::new(batch, parsed.version, parsed.name, parsed.direction, payload)
                .with_path(path),
        ))
    }

    /// Create the up and down artifact files for a new migration.
    ///
    /// Returns the created paths, up first. Either both files are created or
    /// neither is left behind.
    pub fn generate(
        &self,
        batch: &str,
        version: &Version,
        name: &str,
        up_kind: ArtifactKind,
        down_kind: ArtifactKind,
    ) -> Result<Vec<PathBuf>> {
        if name.is_empty() {
            return Err(MigrationError::EmptyName);
        }
        validate_name(name).map_err(|reason| MigrationError::InvalidName {
            name: name.to_string(),
            reason,
        })?;
        validate_name(batch)
            .and_then(|()| {
                if batch.starts_with('.') {
                    Err("batch folders cannot be hidden".to_string())
                } else {
                    Ok(())
                }
            })
            .map_err(|reason| MigrationError::InvalidName {
                name: batch.to_string(),
                reason,
            })?;

        let batch_dir = self.root.join(batch);
        fs::create_dir_all(&batch_dir).map_err(|e| MigrationError::filesystem(&batch_dir, e))?;
        self.ensure_version_free(batch, &batch_dir, version, name)?;

        let up = ArtifactFileName {
            version: version.clone(),
            name: name.to_string(),
            direction: Direction::Up,
            kind: up_kind,
        };
        let down = ArtifactFileName {
            direction: Direction::Down,
            kind: down_kind,
            ..up.clone()
        };

        let up_path = batch_dir.join(up.to_file_name());
        let down_path = batch_dir.join(down.to_file_name());

        write_new(&up_path, &template(&up))?;
        if let Err(e) = write_new(&down_path, &template(&down)) {
            if let Err(remove_err) = fs::remove_file(&up_path) {
                tracing::warn!(
                    path = %up_path.display(),
                    error = %remove_err,
                    "failed to remove up artifact after down artifact failed"
                );
            }
            return Err(e);
        }

        tracing::info!(batch, version = %version, name, "generated migration");
        Ok(vec![up_path, down_path])
    }

    fn ensure_version_free(
        &self,
        batch: &str,
        batch_dir: &Path,
        version: &Version,
        name: &str,
    ) -> Result<()> {
        for path in sorted_entries(batch_dir)? {
            if is_hidden(&path) || !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(existing) = ArtifactFileName::parse(file_name) else {
                continue;
            };
            if &existing.version == version {
                let requested = ArtifactFileName {
                    name: name.to_string(),
                    ..existing.clone()
                };
                return Err(MigrationError::DuplicateVersion {
                    batch: batch.to_string(),
                    direction: existing.direction,
                    version: version.clone(),
                    first: path.clone(),
                    second: batch_dir.join(requested.to_file_name()),
                });
            }
        }
        Ok(())
    }
}

fn template(file: &ArtifactFileName) -> String {
    match file.kind {
        ArtifactKind::Script => format!(
            "// Migration: {}\n// Version: {}\n// Direction: {}\n\n",
            file.name, file.version, file.direction
        ),
        ArtifactKind::Command => format!(
            "# Migration: {}\n# Version: {}\n# Direction: {}\n# Replace '{NOOP_COMMAND}' with the command to run.\n{NOOP_COMMAND}\n",
            file.name, file.version, file.direction
        ),
    }
}

fn write_new(path: &Path, content: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| MigrationError::filesystem(path, e))?;
    if let Err(e) = file.write_all(content.as_bytes()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(MigrationError::filesystem(path, e));
    }
    Ok(())
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| MigrationError::filesystem(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MigrationError::filesystem(dir, e))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn file_name_str(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MigrationError::malformed(path, "file name is not valid UTF-8"))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
