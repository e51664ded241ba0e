//! Plan computation.
//!
//! Given an inventory, the recorded version of each batch and a target, the
//! planner selects the artifacts to run:
//!
//! - target above current: up artifacts in `(current, target]`, ascending;
//! - target below current: down artifacts in `(target, current]`, descending;
//! - target equal to current: nothing.
//!
//! A batch with no recorded version sits below every version. Batches are
//! planned in dependency order and their steps are never interleaved.

use super::artifact::{Direction, MigrationArtifact};
use super::inventory::{BatchInventory, Inventory};
use super::steps::{ExecutionStep, ExecutionSteps};
use super::version::{TargetVersion, Version};
use crate::error::{MigrationError, Result};
use crate::store::DatabaseModel;
use std::collections::BTreeMap;

/// Ordered dependency lists per batch.
pub type BatchDependencies = BTreeMap<String, Vec<String>>;

/// Computes execution plans.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    dependencies: BatchDependencies,
}

impl Planner {
    /// Create a planner with no batch dependencies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a planner with the given batch dependencies.
    pub fn with_dependencies(dependencies: BatchDependencies) -> Self {
        Self { dependencies }
    }

    /// Batches to plan for `batch`: its dependencies (transitively, in listed
    /// order) followed by the batch itself.
    pub fn resolve_batches(&self, batch: &str) -> Result<Vec<String>> {
        let mut order = Vec::new();
        let mut visiting = Vec::new();
        self.visit(batch, &mut visiting, &mut order)?;
        Ok(order)
    }

    fn visit(&self, batch: &str, visiting: &mut Vec<String>, order: &mut Vec<String>) -> Result<()> {
        if order.iter().any(|b| b == batch) {
            return Ok(());
        }
        if let Some(start) = visiting.iter().position(|b| b == batch) {
            let mut chain = visiting[start..].to_vec();
            chain.push(batch.to_string());
            return Err(MigrationError::DependencyCycle { chain });
        }

        visiting.push(batch.to_string());
        for dependency in self.dependencies.get(batch).into_iter().flatten() {
            self.visit(dependency, visiting, order)?;
        }
        visiting.pop();

        order.push(batch.to_string());
        Ok(())
    }

    /// Compute the plan that moves the database to `target`.
    ///
    /// Fails before producing any step if a batch is unknown or a selected
    /// version lacks the artifact for the required direction.
    pub fn plan(
        &self,
        inventory: &Inventory,
        current: &DatabaseModel,
        target: &TargetVersion,
        initial_batch: &str,
    ) -> Result<ExecutionSteps> {
        let start = target.resolve_batch(initial_batch);
        let batches = self.resolve_batches(start)?;

        let mut steps = ExecutionSteps::new();
        for batch in &batches {
            let batch_inventory = inventory
                .batch(batch)
                .ok_or_else(|| MigrationError::UnknownBatch {
                    batch: batch.clone(),
                })?;
            let batch_steps =
                plan_batch(batch, batch_inventory, current.get(batch), &target.version)?;

            tracing::debug!(
                batch = %batch,
                current = ?current.get(batch).map(ToString::to_string),
                target_version = %target.version,
                steps = batch_steps.len(),
                "planned batch"
            );
            steps.extend(batch_steps);
        }

        tracing::info!(target_version = %target, steps = steps.len(), "plan computed");
        Ok(steps)
    }
}

fn plan_batch(
    batch: &str,
    inventory: &BatchInventory,
    current: Option<&Version>,
    target: &Version,
) -> Result<Vec<ExecutionStep>> {
    let versions = inventory.versions();

    match current {
        Some(current) if target < current => {
            // A recorded version between artifacts is a previous revert's
            // landing point. Only a version past every artifact is unreachable.
            if inventory.latest().map_or(true, |latest| current > latest) {
                return Err(MigrationError::NoPathToTarget {
                    batch: batch.to_string(),
                    current: current.clone(),
                    target: target.clone(),
                    reason: "recorded version is newer than every artifact in the batch".to_string(),
                });
            }

            let selected: Vec<&Version> = versions
                .iter()
                .rev()
                .copied()
                .filter(|v| *v > target && *v <= current)
                .collect();

            selected
                .iter()
                .map(|version| {
                    let artifact = require(batch, inventory, Direction::Down, version)?;
                    // Once a version is reverted, the batch sits at the next
                    // lower known version, never below the target.
                    let below = versions
                        .range::<&Version, _>(..*version)
                        .next_back()
                        .map(|v| (*v).clone())
                        .filter(|v| v > target)
                        .unwrap_or_else(|| target.clone());
                    Ok(ExecutionStep::from_artifact(artifact, below))
                })
                .collect()
        }
        Some(current) if target == current => Ok(Vec::new()),
        _ => versions
            .iter()
            .copied()
            .filter(|v| *v <= target && current.map_or(true, |c| *v > c))
            .map(|version| {
                let artifact = require(batch, inventory, Direction::Up, version)?;
                Ok(ExecutionStep::from_artifact(artifact, version.clone()))
            })
            .collect(),
    }
}

fn require<'a>(
    batch: &str,
    inventory: &'a BatchInventory,
    direction: Direction,
    version: &Version,
) -> Result<&'a MigrationArtifact> {
    inventory
        .find(direction, version)
        .ok_or_else(|| MigrationError::MissingCounterpartArtifact {
            batch: batch.to_string(),
            version: version.clone(),
            direction,
        })
}
