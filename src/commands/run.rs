use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::config::TestbedConfig;
use crate::error::CommandError;
use crate::remote::RemoteCommand;
use crate::testbed::Testbed;

/// Boot the image, wait for SSH, run the command and always delete the VM.
pub async fn cmd_run(args: RunArgs, config: &TestbedConfig) -> Result<()> {
    let port = args.login.port.unwrap_or(config.ssh.port);
    let user = args.login.user.clone().unwrap_or_else(|| config.ssh.user.clone());
    let key = args.login.key.clone().or_else(|| config.ssh.private_key.clone());
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.wait.timeout());
    let sleep = args
        .sleep
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.wait.sleep());

    let mut testbed = Testbed::new(&args.image, port, user, key).with_qemu(config.vm.qemu());
    testbed.create().context("starting virtual machine")?;

    let result = run_in_testbed(&testbed, RemoteCommand::from(args.command), timeout, sleep).await;

    let output = settle(result, testbed.delete())?;
    print!("{}", output);
    Ok(())
}

/// Combine the command outcome with the teardown outcome. A failed command
/// wins over a failed teardown, which is only logged then.
fn settle(result: Result<String>, deleted: Result<(), CommandError>) -> Result<String> {
    match (result, deleted) {
        (Ok(output), Ok(())) => Ok(output),
        (Ok(_), Err(e)) => Err(e).context("stopping virtual machine"),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(delete_err)) => {
            warn!(target: "testbed", "failed to stop virtual machine: {}", delete_err);
            Err(e)
        }
    }
}

async fn run_in_testbed(
    testbed: &Testbed,
    command: RemoteCommand,
    timeout: Duration,
    sleep: Duration,
) -> Result<String> {
    testbed
        .wait(timeout, sleep)
        .await
        .context("waiting for ssh in the testbed")?;
    info!(target: "testbed", command = ?command.tokens(), "testbed ready, running command");
    testbed
        .run_command(command)
        .await
        .context("running command in the testbed")
}
