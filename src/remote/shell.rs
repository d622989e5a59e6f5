use std::path::{Path, PathBuf};

use tracing::debug;

use super::{RemoteAccess, RemoteCommand};
use crate::error::CommandError;
use crate::process;

const SSH_PROGRAM: &str = "ssh";
const SCP_PROGRAM: &str = "scp";

/// ssh/scp client for one host.
///
/// Host key checking is disabled and nothing is written to known_hosts: the
/// targets are throwaway guests whose keys change on every boot. No
/// connection is kept between calls.
#[derive(Debug, Clone)]
pub struct RemoteShell {
    host: String,
    port: u16,
    user: String,
    private_key: Option<PathBuf>,
    ssh_program: String,
    scp_program: String,
}

impl RemoteShell {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            private_key: None,
            ssh_program: SSH_PROGRAM.to_string(),
            scp_program: SCP_PROGRAM.to_string(),
        }
    }

    /// Authenticate with this identity file. The file is not checked until
    /// the first connection.
    pub fn with_private_key(mut self, private_key: Option<PathBuf>) -> Self {
        self.private_key = private_key;
        self
    }

    /// Use different client executables in place of `ssh` and `scp`.
    pub fn with_programs(mut self, ssh: impl Into<String>, scp: impl Into<String>) -> Self {
        self.ssh_program = ssh.into();
        self.scp_program = scp.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn private_key(&self) -> Option<&Path> {
        self.private_key.as_deref()
    }

    /// Options shared by ssh and scp, in a fixed order.
    pub fn options(&self) -> Vec<String> {
        let mut options = vec![
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "LogLevel=error".to_string(),
        ];
        if let Some(key) = &self.private_key {
            options.push("-i".to_string());
            options.push(key.to_string_lossy().into_owned());
        }
        options
    }

    /// Arguments passed to `ssh` for `command`.
    pub fn ssh_args(&self, command: &RemoteCommand) -> Vec<String> {
        let mut args = vec![
            "-l".to_string(),
            self.user.clone(),
            "-p".to_string(),
            self.port.to_string(),
            self.host.clone(),
        ];
        args.extend(self.options());
        args.extend(command.tokens().iter().cloned());
        args
    }

    /// Arguments passed to `scp` to copy `local_path` to `remote_path`.
    pub fn scp_args(&self, local_path: &Path, remote_path: &str) -> Vec<String> {
        let mut args = vec!["-P".to_string(), self.port.to_string()];
        args.extend(self.options());
        args.push(local_path.to_string_lossy().into_owned());
        args.push(format!("{}@{}:{}", self.user, self.host, remote_path));
        args
    }
}

#[async_trait::async_trait]
impl RemoteAccess for RemoteShell {
    async fn run_command(&self, command: RemoteCommand) -> Result<String, CommandError> {
        if command.is_empty() {
            return Err(CommandError::EmptyCommand);
        }
        debug!(target: "ssh", host = %self.host, port = self.port, command = ?command.tokens(), "running remote command");
        process::run_captured(&self.ssh_program, &self.ssh_args(&command)).await
    }

    async fn copy_file(&self, local_path: &Path, remote_path: &str) -> Result<(), CommandError> {
        debug!(target: "ssh", host = %self.host, port = self.port,
            local = %local_path.display(), remote = %remote_path, "copying file");
        process::run_captured(&self.scp_program, &self.scp_args(local_path, remote_path)).await?;
        Ok(())
    }
}
