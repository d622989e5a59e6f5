use anyhow::{Context, Result};

use crate::cli::{CopyArgs, ExecArgs, LoginArgs};
use crate::config::TestbedConfig;
use crate::remote::{RemoteAccess, RemoteCommand, RemoteShell};

/// Build a shell for `host`, with flags taking precedence over the config.
pub fn shell_for(host: &str, login: &LoginArgs, config: &TestbedConfig) -> RemoteShell {
    RemoteShell::new(
        host,
        login.port.unwrap_or(config.ssh.port),
        login.user.clone().unwrap_or_else(|| config.ssh.user.clone()),
    )
    .with_private_key(login.key.clone().or_else(|| config.ssh.private_key.clone()))
}

pub async fn cmd_exec(args: ExecArgs, config: &TestbedConfig) -> Result<()> {
    let shell = shell_for(&args.host, &args.login, config);
    let output = shell
        .run_command(RemoteCommand::from(args.command))
        .await
        .with_context(|| format!("running command on {}", args.host))?;
    print!("{}", output);
    Ok(())
}

pub async fn cmd_copy(args: CopyArgs, config: &TestbedConfig) -> Result<()> {
    let shell = shell_for(&args.host, &args.login, config);
    shell
        .copy_file(&args.local, &args.remote)
        .await
        .with_context(|| format!("copying {} to {}", args.local.display(), args.host))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_flags_override_config() {
        let mut config = TestbedConfig::default();
        config.ssh.private_key = Some(PathBuf::from("/etc/snapbed/id"));

        let login = LoginArgs {
            port: Some(2222),
            user: None,
            key: None,
        };
        let shell = shell_for("10.0.0.5", &login, &config);
        assert_eq!(shell.port(), 2222);
        assert_eq!(shell.user(), "ubuntu");
        assert_eq!(shell.private_key(), Some(Path::new("/etc/snapbed/id")));
    }
}
