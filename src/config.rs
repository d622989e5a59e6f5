use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use tracing::{debug, info};

use crate::testbed::{ImageSpec, QemuConfig};

/// Config file name
const CONFIG_FILE: &str = "testbed.toml";

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TestbedConfig {
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub vm: VmConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub wait: WaitConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
    #[serde(default = "default_release")]
    pub release: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Where `snapbed image` writes when `--output` is not given
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_release() -> String {
    ImageSpec::default().release
}

fn default_channel() -> String {
    ImageSpec::default().channel
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            release: default_release(),
            channel: default_channel(),
            output_dir: None,
        }
    }
}

impl ImageConfig {
    pub fn spec(&self) -> ImageSpec {
        ImageSpec {
            release: self.release.clone(),
            channel: self.channel.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VmConfig {
    /// Memory in MiB (default 512)
    #[serde(default)]
    pub memory_mib: Option<u32>,
    /// Guest architecture (default: host architecture)
    #[serde(default)]
    pub arch: Option<String>,
    /// Emulator binary (default: qemu-system-<arch> from PATH)
    #[serde(default)]
    pub qemu_binary: Option<PathBuf>,
}

impl VmConfig {
    pub fn qemu(&self) -> QemuConfig {
        let defaults = QemuConfig::default();
        QemuConfig {
            arch: self.arch.clone().unwrap_or(defaults.arch),
            memory_mib: self.memory_mib.unwrap_or(defaults.memory_mib),
            binary: self.qemu_binary.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SshConfig {
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub private_key: Option<PathBuf>,
}

fn default_user() -> String {
    "ubuntu".to_string()
}

fn default_port() -> u16 {
    8022
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            port: default_port(),
            private_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WaitConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_sleep_secs() -> u64 {
    10
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            sleep_secs: default_sleep_secs(),
        }
    }
}

impl WaitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sleep(&self) -> Duration {
        Duration::from_secs(self.sleep_secs)
    }
}

/// Find the config file.
///
/// An explicit `--config` path must exist. Otherwise the first existing
/// file among [`config_candidates`] wins, and `None` means built-in defaults.
pub fn find_config_file(explicit_path: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit_path {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    Ok(config_candidates().into_iter().find(|p| p.exists()))
}

/// Implicit config locations in lookup order: the invoking user's config
/// under sudo, the XDG user config, then `/etc/snapbed`.
pub fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(3);

    if let Some(home) = std::env::var("SUDO_USER").ok().and_then(|name| sudo_user_home(&name)) {
        candidates.push(home.join(".config/snapbed").join(CONFIG_FILE));
    }
    if let Some(dirs) = ProjectDirs::from("", "", "snapbed") {
        candidates.push(dirs.config_dir().join(CONFIG_FILE));
    }
    candidates.push(Path::new("/etc/snapbed").join(CONFIG_FILE));

    candidates
}

fn sudo_user_home(name: &str) -> Option<PathBuf> {
    match nix::unistd::User::from_name(name) {
        Ok(user) => {
            if user.is_none() {
                debug!(sudo_user = name, "SUDO_USER has no passwd entry");
            }
            user.map(|u| u.dir)
        }
        Err(e) => {
            debug!(sudo_user = name, "SUDO_USER lookup failed: {}", e);
            None
        }
    }
}

/// Load the config, falling back to defaults when no file exists.
pub fn load_config(explicit_path: Option<&Path>) -> Result<TestbedConfig> {
    let Some(path) = find_config_file(explicit_path)? else {
        debug!("no config file found, using defaults");
        return Ok(TestbedConfig::default());
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config file: {}", path.display()))?;
    let config = parse_config(&content)
        .with_context(|| format!("parsing config file: {}", path.display()))?;

    info!(config_file = %path.display(), "loaded testbed config");
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<TestbedConfig> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, TestbedConfig::default());
        assert_eq!(config.image.release, "15.04");
        assert_eq!(config.image.channel, "stable");
        assert_eq!(config.ssh.port, 8022);
        assert_eq!(config.wait.timeout(), Duration::from_secs(300));
        assert_eq!(config.wait.sleep(), Duration::from_secs(10));
        assert_eq!(config.vm.qemu(), QemuConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config = parse_config(
            r#"
            [ssh]
            user = "tester"
            private_key = "/home/tester/.ssh/id_testbed"

            [vm]
            memory_mib = 1024
            arch = "aarch64"

            [wait]
            sleep_secs = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.ssh.user, "tester");
        assert_eq!(config.ssh.port, 8022);
        assert_eq!(
            config.ssh.private_key.as_deref(),
            Some(Path::new("/home/tester/.ssh/id_testbed"))
        );
        let qemu = config.vm.qemu();
        assert_eq!(qemu.memory_mib, 1024);
        assert_eq!(qemu.program(), "qemu-system-aarch64");
        assert_eq!(config.wait.timeout_secs, 300);
        assert_eq!(config.wait.sleep_secs, 2);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(parse_config("[ssh]\nusername = \"typo\"\n").is_err());
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        assert!(find_config_file(Some(Path::new("/nonexistent/snapbed/testbed.toml"))).is_err());
    }

    #[test]
    fn test_config_candidates_end_with_system_config() {
        let candidates = config_candidates();
        assert_eq!(
            candidates.last().map(PathBuf::as_path),
            Some(Path::new("/etc/snapbed/testbed.toml"))
        );
        assert!(candidates.len() <= 3);
    }

    #[test]
    fn test_unknown_sudo_user_is_skipped() {
        assert_eq!(sudo_user_home("snapbed-no-such-user"), None);
    }
}
