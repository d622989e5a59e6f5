use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "snapbed", version, about = "Disposable QEMU testbeds driven over SSH")]
pub struct Cli {
    /// Config file (default: SUDO_USER's ~/.config/snapbed/testbed.toml, then yours, then /etc/snapbed/testbed.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Flash a developer-mode core image (needs sudo)
    Image(ImageArgs),
    /// Boot an image, wait for SSH, run one command and tear the VM down
    Run(RunArgs),
    /// Run a command on a host over SSH
    Exec(ExecArgs),
    /// Copy a local file to a host over SCP
    Copy(CopyArgs),
    /// Print the apt sources list for an architecture and release
    Sources(SourcesArgs),
    /// Fix symlinks, setuid/setgid bits and python shebangs in a staged root
    Fixup(FixupArgs),
    /// Install missing host build packages
    BuildPackages(BuildPackagesArgs),
}

#[derive(Args, Debug)]
pub struct ImageArgs {
    /// Directory to write snappy.img into
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Core release to flash
    #[arg(long)]
    pub release: Option<String>,

    /// Release channel
    #[arg(long)]
    pub channel: Option<String>,
}

/// SSH login settings shared by the remote commands
#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// Forwarded SSH port
    #[arg(long)]
    pub port: Option<u16>,

    /// Remote user
    #[arg(long)]
    pub user: Option<String>,

    /// Private key for authentication
    #[arg(long)]
    pub key: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image to boot
    #[arg(long)]
    pub image: PathBuf,

    #[command(flatten)]
    pub login: LoginArgs,

    /// Seconds to wait for SSH
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Seconds between SSH attempts
    #[arg(long)]
    pub sleep: Option<u64>,

    /// Command to run in the guest
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    #[arg(long)]
    pub host: String,

    #[command(flatten)]
    pub login: LoginArgs,

    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CopyArgs {
    #[arg(long)]
    pub host: String,

    #[command(flatten)]
    pub login: LoginArgs,

    pub local: PathBuf,

    pub remote: String,
}

#[derive(Args, Debug)]
pub struct SourcesArgs {
    /// Debian architecture (amd64, armhf, arm64, ...)
    #[arg(long)]
    pub arch: String,

    /// Release codename
    #[arg(long)]
    pub release: String,

    /// Template file (default: built-in Ubuntu sources)
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Skip the geo-IP mirror lookup
    #[arg(long)]
    pub no_geoip: bool,
}

#[derive(Args, Debug)]
pub struct FixupArgs {
    /// Staged root directory
    pub root: PathBuf,
}

#[derive(Args, Debug)]
pub struct BuildPackagesArgs {
    #[arg(required = true)]
    pub packages: Vec<String>,
}
