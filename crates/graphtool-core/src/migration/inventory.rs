//! In-memory inventory of available migration artifacts.

use super::artifact::{Direction, MigrationArtifact};
use super::version::Version;
use crate::error::{MigrationError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Artifacts of one batch, split by direction and sorted by version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchInventory {
    up: Vec<MigrationArtifact>,
    down: Vec<MigrationArtifact>,
}

impl BatchInventory {
    /// Artifacts for a direction, ascending by version.
    pub fn artifacts(&self, direction: Direction) -> &[MigrationArtifact] {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    /// Find the artifact for a version and direction.
    pub fn find(&self, direction: Direction, version: &Version) -> Option<&MigrationArtifact> {
        let artifacts = self.artifacts(direction);
        artifacts
            .binary_search_by(|a| a.version.cmp(version))
            .ok()
            .map(|idx| &artifacts[idx])
    }

    /// Every version known in either direction, ascending.
    pub fn versions(&self) -> BTreeSet<&Version> {
        self.up
            .iter()
            .chain(self.down.iter())
            .map(|a| &a.version)
            .collect()
    }

    /// Whether any artifact in either direction has this version.
    pub fn contains(&self, version: &Version) -> bool {
        self.find(Direction::Up, version).is_some() || self.find(Direction::Down, version).is_some()
    }

    /// Highest known version.
    pub fn latest(&self) -> Option<&Version> {
        self.versions().into_iter().next_back()
    }

    /// Whether the batch has no artifacts.
    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }

    fn list_mut(&mut self, direction: Direction) -> &mut Vec<MigrationArtifact> {
        match direction {
            Direction::Up => &mut self.up,
            Direction::Down => &mut self.down,
        }
    }
}

/// All artifacts found under a migration root, keyed by batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    batches: BTreeMap<String, BatchInventory>,
}

impl Inventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an inventory from artifacts, sorting them and rejecting duplicates.
    pub fn from_artifacts(artifacts: impl IntoIterator<Item = MigrationArtifact>) -> Result<Self> {
        let mut inventory = Self::new();
        for artifact in artifacts {
            inventory
                .batches
                .entry(artifact.batch.clone())
                .or_default()
                .list_mut(artifact.direction)
                .push(artifact);
        }

        for (batch, batch_inventory) in &mut inventory.batches {
            for direction in [Direction::Up, Direction::Down] {
                let list = batch_inventory.list_mut(direction);
                list.sort_by(|a, b| a.version.cmp(&b.version));
                if let Some(pair) = list.windows(2).find(|w| w[0].version == w[1].version) {
                    return Err(MigrationError::DuplicateVersion {
                        batch: batch.clone(),
                        direction,
                        version: pair[0].version.clone(),
                        first: pair[0].path.clone().unwrap_or_default(),
                        second: pair[1].path.clone().unwrap_or_default(),
                    });
                }
            }
        }

        Ok(inventory)
    }

    /// Register a batch that has no artifacts yet.
    pub fn add_batch(&mut self, batch: impl Into<String>) {
        self.batches.entry(batch.into()).or_default();
    }

    /// Look up a batch.
    pub fn batch(&self, batch: &str) -> Option<&BatchInventory> {
        self.batches.get(batch)
    }

    /// Batch names in sorted order.
    pub fn batch_names(&self) -> impl Iterator<Item = &str> {
        self.batches.keys().map(String::as_str)
    }

    /// Total number of artifacts.
    pub fn len(&self) -> usize {
        self.batches
            .values()
            .map(|b| b.up.len() + b.down.len())
            .sum()
    }

    /// Whether the inventory holds no artifacts.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::artifact::Payload;

    fn artifact(batch: &str, rev: u64, direction: Direction) -> MigrationArtifact {
        MigrationArtifact::new(
            batch,
            Version::new(rev),
            format!("m{rev}"),
            direction,
            Payload::Script(String::new()),
        )
        .with_path(format!("{batch}/{rev}.{direction}"))
    }

    #[test]
    fn test_sorted_per_direction() {
        let inventory = Inventory::from_artifacts(vec![
            artifact("schema", 300, Direction::Up),
            artifact("schema", 100, Direction::Up),
            artifact("schema", 200, Direction::Down),
            artifact("data", 150, Direction::Up),
        ])
        .unwrap();

        let schema = inventory.batch("schema").unwrap();
        let ups: Vec<u64> = schema
            .artifacts(Direction::Up)
            .iter()
            .map(|a| a.version.revision())
            .collect();
        assert_eq!(ups, vec![100, 300]);
        assert_eq!(schema.latest(), Some(&Version::new(300)));
        assert!(schema.contains(&Version::new(200)));
        assert!(schema.find(Direction::Down, &Version::new(100)).is_none());
        assert_eq!(inventory.batch_names().collect::<Vec<_>>(), vec!["data", "schema"]);
        assert_eq!(inventory.len(), 4);
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let err = Inventory::from_artifacts(vec![
            artifact("schema", 100, Direction::Up),
            artifact("schema", 100, Direction::Up),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            MigrationError::DuplicateVersion { ref batch, direction: Direction::Up, .. } if batch == "schema"
        ));
    }

    #[test]
    fn test_same_version_in_other_direction_or_batch_allowed() {
        let inventory = Inventory::from_artifacts(vec![
            artifact("schema", 100, Direction::Up),
            artifact("schema", 100, Direction::Down),
            artifact("data", 100, Direction::Up),
        ])
        .unwrap();
        assert_eq!(inventory.len(), 3);
    }

    #[test]
    fn test_empty_batch() {
        let mut inventory = Inventory::new();
        inventory.add_batch("seed");
        assert!(inventory.batch("seed").unwrap().is_empty());
        assert!(inventory.is_empty());
    }
}
