//! Helpers for running external programs and mapping failures to [`CommandError`].

use std::process::Stdio;

use nix::fcntl::OFlag;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::CommandError;

/// Run `program` with `args`, capturing stdout and stderr into a single stream.
///
/// Both streams share one pipe so the returned text keeps the order the
/// process wrote it in. A non-zero exit becomes [`CommandError::Failed`]
/// carrying that text.
pub async fn run_captured(program: &str, args: &[String]) -> Result<String, CommandError> {
    debug!(target: "process", program = %program, ?args, "running command");

    let io_err = |source| CommandError::Io {
        program: program.to_string(),
        source,
    };

    let (reader, writer) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| io_err(std::io::Error::from(e)))?;
    let writer_dup = writer.try_clone().map_err(io_err)?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(writer))
        .stderr(Stdio::from(writer_dup));

    let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
        program: program.to_string(),
        source,
    })?;
    // The command still holds the write ends; drop it so the read sees EOF.
    drop(cmd);

    let mut reader = tokio::fs::File::from_std(std::fs::File::from(reader));
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.map_err(io_err)?;

    let status = child.wait().await.map_err(io_err)?;
    let output = String::from_utf8_lossy(&buf).into_owned();

    if !status.success() {
        return Err(CommandError::Failed {
            program: program.to_string(),
            status: status.into(),
            output,
        });
    }

    Ok(output)
}

/// Run `program` with inherited stdio, failing on a non-zero exit.
///
/// Used for long-running tools whose progress output should reach the user.
pub async fn run_inherited(program: &str, args: &[String]) -> Result<(), CommandError> {
    debug!(target: "process", program = %program, ?args, "running command");

    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !status.success() {
        return Err(CommandError::Failed {
            program: program.to_string(),
            status: status.into(),
            output: String::new(),
        });
    }

    Ok(())
}
