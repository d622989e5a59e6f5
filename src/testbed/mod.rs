pub mod image;
pub mod qemu;

pub use image::{create_image, create_image_with, ImageSpec};
pub use qemu::QemuConfig;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::error::CommandError;
use crate::remote::{RemoteAccess, RemoteCommand, RemoteShell};

/// Default budget for [`Testbed::wait`]
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);
/// Default delay between readiness attempts
pub const DEFAULT_WAIT_SLEEP: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestbedState {
    Uninitialized,
    Running,
    Terminated,
}

/// A disposable QEMU VM reached over SSH on a forwarded localhost port.
///
/// The emulator process belongs to the testbed alone. It is spawned with
/// `kill_on_drop`, so dropping the testbed (for example when a test fails
/// half way through) takes the VM down with it.
pub struct Testbed {
    image_path: PathBuf,
    ssh_port: u16,
    shell: RemoteShell,
    qemu: QemuConfig,
    process: Option<Child>,
    terminated: bool,
}

impl Testbed {
    pub fn new(
        image_path: impl Into<PathBuf>,
        ssh_port: u16,
        user: impl Into<String>,
        private_key: Option<PathBuf>,
    ) -> Self {
        Self {
            image_path: image_path.into(),
            ssh_port,
            shell: RemoteShell::new("localhost", ssh_port, user).with_private_key(private_key),
            qemu: QemuConfig::default(),
            process: None,
            terminated: false,
        }
    }

    pub fn with_qemu(mut self, qemu: QemuConfig) -> Self {
        self.qemu = qemu;
        self
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn ssh_port(&self) -> u16 {
        self.ssh_port
    }

    pub fn shell(&self) -> &RemoteShell {
        &self.shell
    }

    pub fn state(&self) -> TestbedState {
        match (&self.process, self.terminated) {
            (Some(_), _) => TestbedState::Running,
            (None, true) => TestbedState::Terminated,
            (None, false) => TestbedState::Uninitialized,
        }
    }

    /// PID of the emulator process, if running
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.id())
    }

    /// Boot the image in the background. Returns as soon as the emulator is
    /// spawned; use [`Testbed::wait`] to block until SSH answers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create(&mut self) -> Result<(), CommandError> {
        if let Some(process) = &self.process {
            return Err(CommandError::AlreadyRunning { pid: process.id() });
        }

        let program = self.qemu.program();
        info!(target: "testbed", image = %self.image_path.display(), port = self.ssh_port,
            "running the snappy image in a virtual machine");

        let mut child = Command::new(&program)
            .args(self.qemu.args(&self.image_path, self.ssh_port))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.clone(),
                source,
            })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(target: "qemu", "{}", line);
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(target: "qemu", "{}", line);
                }
            });
        }

        debug!(target: "testbed", pid = ?child.id(), "emulator started");
        self.process = Some(child);
        self.terminated = false;
        Ok(())
    }

    /// Kill the emulator if one is running. Does not wait for it to exit.
    pub fn delete(&mut self) -> Result<(), CommandError> {
        if let Some(mut process) = self.process.take() {
            info!(target: "testbed", pid = ?process.id(), "killing the virtual machine");
            self.terminated = true;
            process.start_kill().map_err(|source| CommandError::Io {
                program: self.qemu.program(),
                source,
            })?;
        }
        Ok(())
    }

    /// Poll until the guest answers over SSH. See [`wait_for_ssh`].
    pub async fn wait(&self, timeout: Duration, sleep: Duration) -> Result<(), CommandError> {
        wait_for_ssh(&self.shell, timeout, sleep).await
    }

    pub async fn run_command(
        &self,
        command: impl Into<RemoteCommand>,
    ) -> Result<String, CommandError> {
        self.shell.run_command(command.into()).await
    }

    pub async fn copy_file(&self, local_path: &Path, remote_path: &str) -> Result<(), CommandError> {
        self.shell.copy_file(local_path, remote_path).await
    }
}

/// Retry `echo testing ssh` on `remote` every `sleep` until it succeeds.
///
/// One attempt is always made. After a failure the error is returned once
/// the remaining budget can no longer pay for another `sleep`, so a
/// `timeout` shorter than `sleep` (or a zero `sleep`) means exactly one
/// attempt.
pub async fn wait_for_ssh<R>(remote: &R, timeout: Duration, sleep: Duration) -> Result<(), CommandError>
where
    R: RemoteAccess + ?Sized,
{
    debug!(target: "testbed", timeout_secs = timeout.as_secs(), sleep_secs = sleep.as_secs(),
        "waiting for ssh to be enabled in the testbed");

    let mut remaining = timeout;
    loop {
        match remote.run_command(RemoteCommand::from(["echo", "testing ssh"])).await {
            Ok(_) => return Ok(()),
            Err(e) => {
                if sleep.is_zero() || remaining < sleep {
                    error!(target: "testbed", "timed out waiting for ssh in the testbed: {}", e);
                    return Err(e);
                }
                debug!(target: "testbed", remaining_secs = remaining.as_secs(), "ssh not ready: {}", e);
                tokio::time::sleep(sleep).await;
                remaining -= sleep;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExitCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` attempts, then succeeds.
    struct FlakyRemote {
        failures: usize,
        attempts: AtomicUsize,
    }

    impl FlakyRemote {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                attempts: AtomicUsize::new(0),
            }
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl RemoteAccess for FlakyRemote {
        async fn run_command(&self, command: RemoteCommand) -> Result<String, CommandError> {
            assert_eq!(command.tokens(), ["echo", "testing ssh"]);
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(CommandError::Failed {
                    program: "ssh".into(),
                    status: ExitCode(Some(255)),
                    output: "Connection refused".into(),
                })
            } else {
                Ok("testing ssh\n".into())
            }
        }

        async fn copy_file(&self, _: &Path, _: &str) -> Result<(), CommandError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_on_first_success() {
        let remote = FlakyRemote::new(0);
        wait_for_ssh(&remote, DEFAULT_WAIT_TIMEOUT, DEFAULT_WAIT_SLEEP)
            .await
            .unwrap();
        assert_eq!(remote.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_retries_until_ready() {
        let remote = FlakyRemote::new(3);
        let start = tokio::time::Instant::now();
        wait_for_ssh(&remote, Duration::from_secs(60), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(remote.attempts(), 4);
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_shorter_than_sleep_tries_once() {
        let remote = FlakyRemote::new(usize::MAX);
        let err = wait_for_ssh(&remote, Duration::from_secs(5), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(remote.attempts(), 1);
        assert_eq!(err.exit_code(), Some(255));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_zero_timeout_still_attempts() {
        let remote = FlakyRemote::new(usize::MAX);
        assert!(wait_for_ssh(&remote, Duration::ZERO, Duration::from_secs(1))
            .await
            .is_err());
        assert_eq!(remote.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_exhausts_budget() {
        let remote = FlakyRemote::new(usize::MAX);
        let start = tokio::time::Instant::now();
        wait_for_ssh(&remote, Duration::from_secs(30), Duration::from_secs(10))
            .await
            .unwrap_err();
        // Attempts at t=0, 10, 20, 30
        assert_eq!(remote.attempts(), 4);
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test]
    async fn test_delete_before_create_is_noop() {
        let mut testbed = Testbed::new("/tmp/snappy.img", 8022, "ubuntu", None);
        assert_eq!(testbed.state(), TestbedState::Uninitialized);
        testbed.delete().unwrap();
        testbed.delete().unwrap();
        assert_eq!(testbed.state(), TestbedState::Uninitialized);
        assert_eq!(testbed.pid(), None);
    }

    #[test]
    fn test_testbed_targets_forwarded_localhost_port() {
        let testbed = Testbed::new(
            "/tmp/snappy.img",
            8022,
            "ubuntu",
            Some(PathBuf::from("/tmp/id_rsa")),
        );
        assert_eq!(testbed.shell().host(), "localhost");
        assert_eq!(testbed.shell().port(), 8022);
        assert_eq!(testbed.shell().user(), "ubuntu");
        assert_eq!(testbed.shell().private_key(), Some(Path::new("/tmp/id_rsa")));
        assert_eq!(testbed.image_path(), Path::new("/tmp/snappy.img"));
    }
}
