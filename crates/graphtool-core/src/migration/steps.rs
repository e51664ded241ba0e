//! Execution steps: the output of planning.

use super::artifact::{Direction, MigrationArtifact, Payload};
use super::version::Version;
use crate::error::{MigrationError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// Maximum number of script lines shown when rendering a plan.
pub const PREVIEW_LINES: usize = 5;

/// Maximum number of characters shown per previewed script line.
pub const PREVIEW_LINE_WIDTH: usize = 100;

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// Batch of the source artifact.
    pub batch: String,
    /// Version of the source artifact.
    pub version: Version,
    /// Name of the source artifact.
    pub name: String,
    /// Direction of the source artifact.
    pub direction: Direction,
    /// What to run.
    pub payload: Payload,
    /// Version to record for the batch once this step has been applied.
    pub record_version: Version,
}

impl ExecutionStep {
    /// Build a step from an artifact.
    pub fn from_artifact(artifact: &MigrationArtifact, record_version: Version) -> Self {
        Self {
            batch: artifact.batch.clone(),
            version: artifact.version.clone(),
            name: artifact.name.clone(),
            direction: artifact.direction,
            payload: artifact.payload.clone(),
            record_version,
        }
    }

    /// Whether this is a Cypher script step.
    pub fn is_script(&self) -> bool {
        matches!(self.payload, Payload::Script(_))
    }

    /// Streamable script content, for script steps.
    pub fn script(&self) -> Option<Cursor<&[u8]>> {
        match &self.payload {
            Payload::Script(script) => Some(Cursor::new(script.as_bytes())),
            Payload::Command(_) => None,
        }
    }

    /// Argument vector, for command steps.
    pub fn command(&self) -> Option<&[String]> {
        match &self.payload {
            Payload::Command(argv) => Some(argv),
            Payload::Script(_) => None,
        }
    }

    /// Whether the executor must skip this step.
    pub fn is_noop(&self) -> bool {
        self.payload.is_noop()
    }

    fn render(&self, index: usize, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "{:>3}. [{}] {} {} {}",
            index + 1,
            self.batch,
            self.direction,
            self.version,
            self.name
        )?;
        match &self.payload {
            Payload::Command(argv) if self.is_noop() => {
                writeln!(out, "       command (no-op): {}", argv.join(" "))
            }
            Payload::Command(argv) => writeln!(out, "       command: {}", argv.join(" ")),
            Payload::Script(script) => {
                let lines: Vec<&str> = script
                    .lines()
                    .map(str::trim_end)
                    .filter(|l| !l.trim().is_empty())
                    .collect();
                writeln!(out, "       cypher: {} line(s)", lines.len())?;
                for line in lines.iter().take(PREVIEW_LINES) {
                    writeln!(out, "         | {}", truncate(line, PREVIEW_LINE_WIDTH))?;
                }
                if lines.len() > PREVIEW_LINES {
                    writeln!(out, "         | ... {} more", lines.len() - PREVIEW_LINES)?;
                }
                Ok(())
            }
        }
    }
}

fn truncate(line: &str, width: usize) -> String {
    match line.char_indices().nth(width) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}

/// An ordered plan.
///
/// An empty plan means the database is already at the target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionSteps {
    steps: Vec<ExecutionStep>,
}

impl ExecutionSteps {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn push(&mut self, step: ExecutionStep) {
        self.steps.push(step);
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Iterate steps in execution order.
    pub fn iter(&self) -> std::slice::Iter<'_, ExecutionStep> {
        self.steps.iter()
    }

    /// Steps as a slice.
    pub fn as_slice(&self) -> &[ExecutionStep] {
        &self.steps
    }

    /// Human-readable summary, stable across runs.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Serialize for saving and later replay.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| MigrationError::PlanFormat(e.to_string()))
    }

    /// Load a saved plan.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MigrationError::PlanFormat(e.to_string()))
    }
}

impl fmt::Display for ExecutionSteps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.steps.iter().enumerate() {
            step.render(index, f)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ExecutionSteps {
    type Item = &'a ExecutionStep;
    type IntoIter = std::slice::Iter<'a, ExecutionStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

impl FromIterator<ExecutionStep> for ExecutionSteps {
    fn from_iter<T: IntoIterator<Item = ExecutionStep>>(iter: T) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

impl Extend<ExecutionStep> for ExecutionSteps {
    fn extend<T: IntoIterator<Item = ExecutionStep>>(&mut self, iter: T) {
        self.steps.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn script_step(rev: u64, script: &str) -> ExecutionStep {
        ExecutionStep {
            batch: "schema".to_string(),
            version: Version::new(rev),
            name: format!("m{rev}"),
            direction: Direction::Up,
            payload: Payload::Script(script.to_string()),
            record_version: Version::new(rev),
        }
    }

    fn command_step(rev: u64, argv: &[&str]) -> ExecutionStep {
        ExecutionStep {
            batch: "data".to_string(),
            version: Version::new(rev),
            name: format!("m{rev}"),
            direction: Direction::Down,
            payload: Payload::Command(argv.iter().map(|s| s.to_string()).collect()),
            record_version: Version::new(rev - 1),
        }
    }

    #[test]
    fn test_render() {
        let steps: ExecutionSteps = vec![
            script_step(100, "CREATE (n:A);\n\nCREATE (m:B);\n"),
            command_step(200, &["bin/load", "--file", "x.csv"]),
            command_step(300, &["exit"]),
        ]
        .into_iter()
        .collect();

        let expected = "\
  1. [schema] up 100 m100
       cypher: 2 line(s)
         | CREATE (n:A);
         | CREATE (m:B);
  2. [data] down 200 m200
       command: bin/load --file x.csv
  3. [data] down 300 m300
       command (no-op): exit
";
        assert_eq!(steps.render(), expected);
        assert_eq!(steps.render(), steps.clone().render());
    }

    #[test]
    fn test_render_bounds_script_preview() {
        let script: String = (0..8).map(|i| format!("RETURN {i};\n")).collect();
        let long = format!("RETURN '{}';", "x".repeat(150));
        let steps: ExecutionSteps = vec![script_step(1, &script), script_step(2, &long)]
            .into_iter()
            .collect();
        let rendered = steps.render();
        assert!(rendered.contains("RETURN 4;"));
        assert!(!rendered.contains("RETURN 5;"));
        assert!(rendered.contains("| ... 3 more"));
        assert!(rendered.lines().all(|l| l.chars().count() < PREVIEW_LINE_WIDTH + 20));
    }

    #[test]
    fn test_empty_plan_renders_nothing() {
        let steps = ExecutionSteps::new();
        assert!(steps.is_empty());
        assert_eq!(steps.render(), "");
    }

    #[test]
    fn test_step_accessors() {
        let step = script_step(1, "RETURN 1;");
        assert!(step.is_script());
        assert!(step.command().is_none());
        let mut body = String::new();
        step.script().unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "RETURN 1;");

        let step = command_step(2, &["exit"]);
        assert!(step.is_noop());
        assert_eq!(step.command().unwrap(), ["exit".to_string()]);
        assert!(step.script().is_none());
    }

    #[test]
    fn test_saved_plan_replays_identically() {
        let steps: ExecutionSteps = vec![
            script_step(100, "CREATE (n);"),
            command_step(200, &["bin/load"]),
        ]
        .into_iter()
        .collect();
        let json = steps.to_json().unwrap();
        let loaded = ExecutionSteps::from_json(&json).unwrap();
        assert_eq!(loaded, steps);
        assert_eq!(loaded.render(), steps.render());

        assert!(matches!(
            ExecutionSteps::from_json("{not json"),
            Err(MigrationError::PlanFormat(_))
        ));
    }
}
