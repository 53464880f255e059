//! Blocking boundary to the cloud provider's command-line tool.
//!
//! The engine itself never performs I/O; after it produces its stamps, the
//! orchestrator serializes them into the provider's template format and
//! submits them through the CLI via this wrapper. A non-zero exit is fatal
//! and carries the exact invocation plus the captured standard-error text.
//! Nothing here is retried: the engine is deterministic, so retrying with
//! unchanged input cannot help.

use std::process::Command;

use snafu::{ResultExt, Snafu, ensure};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to spawn {program:?}"))]
    Spawn {
        source: std::io::Error,
        program: String,
    },

    #[snafu(display("{program} {args:?} exited with {status}: {stderr}"))]
    CommandFailed {
        program: String,
        args: Vec<String>,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Runs `program` with `args`, returning its captured standard output.
pub fn run(program: &str, args: &[&str]) -> Result<String, Error> {
    tracing::debug!(program, ?args, "invoking cloud CLI");
    let output = Command::new(program)
        .args(args)
        .output()
        .context(SpawnSnafu { program })?;

    ensure!(
        output.status.success(),
        CommandFailedSnafu {
            program,
            args: args.iter().map(|&arg| arg.to_owned()).collect::<Vec<_>>(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    );
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_on_success() {
        let stdout = run("echo", &["deployment", "complete"]).expect("echo succeeds");
        assert_eq!(stdout.trim(), "deployment complete");
    }

    #[test]
    fn nonzero_exit_carries_the_invocation() {
        let error = run("false", &[]).expect_err("false exits non-zero");
        match error {
            Error::CommandFailed { program, args, .. } => {
                assert_eq!(program, "false");
                assert_eq!(args, Vec::<String>::new());
            }
            Error::Spawn { .. } => panic!("expected CommandFailed, got Spawn"),
        }
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let error = run("definitely-not-a-real-cli", &[]).expect_err("spawn fails");
        assert!(matches!(error, Error::Spawn { .. }));
    }
}
