//! Step runner backed by cypher-shell and external processes.

use crate::config::PlannerConfig;
use crate::migration::{ExecutionStep, Payload, StepError, StepRunner};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

/// Runs script steps through cypher-shell and command steps as child processes.
///
/// Script steps are streamed on stdin to
/// `<cypher-shell> -a <address> --format <format>`. Command steps run as
/// `argv[0] argv[1..] -a <address>`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    cypher_shell: PathBuf,
    format: String,
    address: String,
    username: Option<String>,
    password: Option<String>,
}

impl ShellRunner {
    /// Create a runner for the given database address.
    pub fn new(config: &PlannerConfig, address: impl Into<String>) -> Self {
        Self {
            cypher_shell: config.cypher_shell_path.clone(),
            format: config.cypher_shell_format.clone(),
            address: address.into(),
            username: None,
            password: None,
        }
    }

    /// Pass credentials to child processes as `NEO4J_USERNAME` / `NEO4J_PASSWORD`.
    pub fn with_credentials(
        mut self,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    fn script_command(&self) -> Command {
        let mut cmd = Command::new(&self.cypher_shell);
        cmd.arg("-a")
            .arg(&self.address)
            .arg("--format")
            .arg(&self.format);
        cmd
    }

    fn process_command(&self, argv: &[String]) -> Result<Command, StepError> {
        let (program, args) = argv.split_first().ok_or("command has no program")?;
        let mut cmd = Command::new(program);
        cmd.args(args).arg("-a").arg(&self.address);
        Ok(cmd)
    }

    fn apply_env(&self, cmd: &mut Command) {
        if let Some(username) = &self.username {
            cmd.env("NEO4J_USERNAME", username);
        }
        if let Some(password) = &self.password {
            cmd.env("NEO4J_PASSWORD", password);
        }
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    }

    /// Program and arguments that would run for a step, for display.
    pub fn describe(&self, step: &ExecutionStep) -> Vec<OsString> {
        let cmd = match &step.payload {
            Payload::Script(_) => self.script_command(),
            Payload::Command(argv) => match self.process_command(argv) {
                Ok(cmd) => cmd,
                Err(_) => return Vec::new(),
            },
        };
        std::iter::once(cmd.get_program().to_os_string())
            .chain(cmd.get_args().map(|a| a.to_os_string()))
            .collect()
    }
}

impl StepRunner for ShellRunner {
    fn run(&mut self, step: &ExecutionStep) -> Result<(), StepError> {
        let status = match &step.payload {
            Payload::Script(_) => {
                let mut cmd = self.script_command();
                self.apply_env(&mut cmd);
                let mut child = cmd.stdin(Stdio::piped()).spawn().map_err(|e| {
                    format!("failed to start {}: {e}", self.cypher_shell.display())
                })?;
                let copied = match (child.stdin.take(), step.script()) {
                    // Closing stdin on drop ends the shell session.
                    (Some(mut stdin), Some(mut script)) => {
                        std::io::copy(&mut script, &mut stdin).map(drop)
                    }
                    _ => Ok(()),
                };
                // A shell that exits early breaks the pipe; its status explains why.
                let status = child.wait()?;
                check_status(status)?;
                return copied.map_err(|e| format!("failed to send script: {e}").into());
            }
            Payload::Command(argv) => {
                println!(">>> {}", argv.join(" "));
                let mut cmd = self.process_command(argv)?;
                self.apply_env(&mut cmd);
                cmd.stdin(Stdio::null())
                    .status()
                    .map_err(|e| format!("failed to start {}: {e}", argv[0]))?
            }
        };
        check_status(status)
    }
}

fn check_status(status: ExitStatus) -> Result<(), StepError> {
    if status.success() {
        Ok(())
    } else {
        Err(format!("process exited with {status}").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{Direction, Version};
    use std::io::Write;

    fn step(payload: Payload) -> ExecutionStep {
        ExecutionStep {
            batch: "schema".to_string(),
            version: Version::new(1),
            name: "m".to_string(),
            direction: Direction::Up,
            payload,
            record_version: Version::new(1),
        }
    }

    fn runner() -> ShellRunner {
        let config = PlannerConfig::default().with_cypher_shell_format("plain");
        ShellRunner::new(&config, "neo4j://db:7687")
    }

    #[test]
    fn test_describe_script() {
        let argv = runner().describe(&step(Payload::Script("RETURN 1;".into())));
        assert_eq!(
            argv,
            ["cypher-shell", "-a", "neo4j://db:7687", "--format", "plain"]
                .map(OsString::from)
                .to_vec()
        );
    }

    #[test]
    fn test_describe_command_appends_address() {
        let argv = runner().describe(&step(Payload::Command(vec![
            "bin/load".into(),
            "--file".into(),
            "x.csv".into(),
        ])));
        assert_eq!(
            argv,
            ["bin/load", "--file", "x.csv", "-a", "neo4j://db:7687"]
                .map(OsString::from)
                .to_vec()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_run_reports_exit_status() {
        let mut runner = runner();
        // `true`/`false` ignore the appended `-a <address>` arguments.
        assert!(runner.run(&step(Payload::Command(vec!["true".into()]))).is_ok());
        let err = runner
            .run(&step(Payload::Command(vec!["false".into()])))
            .unwrap_err();
        assert!(err.to_string().contains("exited"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_streams_script_to_shell() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("received.cypher");
        let shell = dir.path().join("fake-shell.sh");
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o755)
                .open(&shell)
                .unwrap();
            write!(file, "#!/bin/sh\ncat > '{}'\n", out.display()).unwrap();
        }

        let config = PlannerConfig::default().with_cypher_shell_path(&shell);
        let mut runner = ShellRunner::new(&config, "neo4j://db:7687");
        runner
            .run(&step(Payload::Script("CREATE (n:Test);\n".into())))
            .unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "CREATE (n:Test);\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_exiting_without_reading_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let shell = dir.path().join("failing-shell.sh");
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o755)
                .open(&shell)
                .unwrap();
            write!(file, "#!/bin/sh\nexit 1\n").unwrap();
        }

        let config = PlannerConfig::default().with_cypher_shell_path(&shell);
        let mut runner = ShellRunner::new(&config, "neo4j://db:7687");
        // Larger than a pipe buffer, so writing fails once the shell is gone.
        let script = "RETURN 1;\n".repeat(200_000);
        let err = runner.run(&step(Payload::Script(script))).unwrap_err();
        assert!(err.to_string().contains("exited"), "{err}");
    }

    #[test]
    fn test_missing_program_fails() {
        let mut runner = runner();
        let err = runner
            .run(&step(Payload::Command(vec!["/definitely/not/here".into()])))
            .unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }
}
