//! Output formatters for plans and status.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use graphtool_core::{DatabaseModel, ExecutionSteps, Inventory, Result, Version};
use serde::Serialize;
use std::collections::BTreeSet;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Format a plan.
pub fn format_plan(steps: &ExecutionSteps, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text if steps.is_empty() => Ok("The plan is empty".to_string()),
        OutputFormat::Text => Ok(steps.render()),
        OutputFormat::Json => steps.to_json(),
    }
}

/// One row of the status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub batch: String,
    pub recorded: Option<Version>,
    pub latest: Option<Version>,
    pub pending: usize,
}

/// Build status rows for every batch found on disk or recorded.
pub fn status_rows(inventory: &Inventory, model: &DatabaseModel) -> Vec<StatusRow> {
    let batches: BTreeSet<&str> = inventory
        .batch_names()
        .chain(model.iter().map(|(batch, _)| batch))
        .collect();

    batches
        .into_iter()
        .map(|batch| {
            let recorded = model.get(batch).cloned();
            let available = inventory.batch(batch);
            let latest = available.and_then(|b| b.latest()).cloned();
            let pending = available
                .map(|b| {
                    b.versions()
                        .into_iter()
                        .filter(|v| recorded.as_ref().map_or(true, |r| *v > r))
                        .count()
                })
                .unwrap_or(0);
            StatusRow {
                batch: batch.to_string(),
                recorded,
                latest,
                pending,
            }
        })
        .collect()
}

/// Format status rows.
pub fn format_status(rows: &[StatusRow], format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Text => {
            if rows.is_empty() {
                return Ok("No batches found".to_string());
            }
            let mut table = Table::new();
            table.set_header(vec!["Batch", "Recorded", "Latest", "Pending"]);
            for row in rows {
                table.add_row(vec![
                    Cell::new(&row.batch),
                    Cell::new(display_version(row.recorded.as_ref())),
                    Cell::new(display_version(row.latest.as_ref())),
                    Cell::new(row.pending),
                ]);
            }
            Ok(table.to_string())
        }
        OutputFormat::Json => serde_json::to_string_pretty(rows),
    }
}

fn display_version(version: Option<&Version>) -> String {
    version.map_or_else(|| "-".to_string(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphtool_core::{Direction, MigrationArtifact, Payload};

    fn inventory() -> Inventory {
        let artifacts = [100, 200, 300].into_iter().flat_map(|rev| {
            [Direction::Up, Direction::Down].map(|direction| {
                MigrationArtifact::new(
                    "schema",
                    Version::new(rev),
                    format!("m{rev}"),
                    direction,
                    Payload::Script(String::new()),
                )
            })
        });
        let mut inventory = Inventory::from_artifacts(artifacts).unwrap();
        inventory.add_batch("data");
        inventory
    }

    #[test]
    fn test_status_rows() {
        let model: DatabaseModel = [("schema".to_string(), Version::new(200))]
            .into_iter()
            .collect();
        let rows = status_rows(&inventory(), &model);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].batch, "data");
        assert_eq!(rows[0].recorded, None);
        assert_eq!(rows[0].pending, 0);
        assert_eq!(rows[1].batch, "schema");
        assert_eq!(rows[1].recorded, Some(Version::new(200)));
        assert_eq!(rows[1].latest, Some(Version::new(300)));
        assert_eq!(rows[1].pending, 1);
    }

    #[test]
    fn test_status_table() {
        let rows = status_rows(&inventory(), &DatabaseModel::new());
        let table = format_status(&rows, OutputFormat::Text).unwrap();
        assert!(table.contains("Batch"));
        assert!(table.contains("schema"));
        assert!(table.contains("300"));

        let json = format_status(&rows, OutputFormat::Json).unwrap();
        assert!(json.contains("\"pending\": 3"));
    }

    #[test]
    fn test_empty_plan_message() {
        let empty = ExecutionSteps::new();
        assert_eq!(
            format_plan(&empty, OutputFormat::Text).unwrap(),
            "The plan is empty"
        );
        assert_eq!(format_plan(&empty, OutputFormat::Json).unwrap(), "[]");
    }
}
