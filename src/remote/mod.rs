pub mod shell;

pub use shell::RemoteShell;

use std::path::Path;

use crate::error::CommandError;

/// Command to run on a remote host: an executable followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand(Vec<String>);

impl RemoteCommand {
    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for RemoteCommand {
    fn from(token: &str) -> Self {
        Self(vec![token.to_string()])
    }
}

impl From<String> for RemoteCommand {
    fn from(token: String) -> Self {
        Self(vec![token])
    }
}

impl From<Vec<String>> for RemoteCommand {
    fn from(tokens: Vec<String>) -> Self {
        Self(tokens)
    }
}

impl From<&[&str]> for RemoteCommand {
    fn from(tokens: &[&str]) -> Self {
        Self(tokens.iter().map(|t| t.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for RemoteCommand {
    fn from(tokens: [&str; N]) -> Self {
        Self(tokens.iter().map(|t| t.to_string()).collect())
    }
}

/// Remote command execution and file copy against a single host
#[async_trait::async_trait]
pub trait RemoteAccess: Send + Sync {
    /// Run a command and return its combined stdout/stderr.
    async fn run_command(&self, command: RemoteCommand) -> Result<String, CommandError>;

    /// Copy a local file to `remote_path` on the host.
    async fn copy_file(&self, local_path: &Path, remote_path: &str) -> Result<(), CommandError>;
}
