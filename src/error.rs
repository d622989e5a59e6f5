use std::fmt;
use std::io;

/// Failure of an external process (ssh, scp, qemu, ubuntu-device-flash, apt-get).
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` exited with {status}: {output}")]
    Failed {
        program: String,
        status: ExitCode,
        /// Combined stdout and stderr, empty when the output was not captured
        output: String,
    },

    #[error("I/O error while reading output of `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("refusing to run an empty command")]
    EmptyCommand,

    #[error("VM process already running (pid {pid:?})")]
    AlreadyRunning { pid: Option<u32> },
}

impl CommandError {
    /// Exit code of the failed process, if it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Failed { status, .. } => status.0,
            _ => None,
        }
    }

    /// Captured output of the failed process.
    pub fn output(&self) -> Option<&str> {
        match self {
            CommandError::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Exit code, `None` when the process was terminated by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub Option<i32>);

impl From<std::process::ExitStatus> for ExitCode {
    fn from(status: std::process::ExitStatus) -> Self {
        Self(status.code())
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "signal"),
        }
    }
}

/// Source-list template failure.
#[derive(Debug, thiserror::Error)]
pub enum SourcesError {
    #[error("unknown placeholder in sources template: ${{{0}}}")]
    UnknownPlaceholder(String),

    #[error("unterminated placeholder in sources template: {0}")]
    Unterminated(String),
}

/// Package cache lookup failure.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("The cache has no package named '{0}'")]
    NotFound(String),

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Build-package installation failure.
#[derive(Debug, thiserror::Error)]
pub enum BuildPackagesError {
    #[error("Could not find a required package in 'build-packages': \"{0}\"")]
    MissingPackage(#[source] CacheError),

    #[error("failed to query the package cache: {0}")]
    Cache(#[source] CacheError),

    #[error("failed to install build packages: {0}")]
    Install(#[from] CommandError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_package_message() {
        let err =
            BuildPackagesError::MissingPackage(CacheError::NotFound("package-does-not-exist".into()));
        assert_eq!(
            err.to_string(),
            "Could not find a required package in 'build-packages': \
             \"The cache has no package named 'package-does-not-exist'\""
        );
    }

    #[test]
    fn test_failed_command_accessors() {
        let err = CommandError::Failed {
            program: "ssh".into(),
            status: ExitCode(Some(255)),
            output: "Connection refused\n".into(),
        };
        assert_eq!(err.exit_code(), Some(255));
        assert_eq!(err.output(), Some("Connection refused\n"));
        assert!(err.to_string().contains("exit code 255"));

        assert_eq!(CommandError::EmptyCommand.exit_code(), None);
    }

    #[test]
    fn test_signal_exit_display() {
        assert_eq!(ExitCode(None).to_string(), "signal");
        assert_eq!(ExitCode(Some(1)).to_string(), "exit code 1");
    }
}
