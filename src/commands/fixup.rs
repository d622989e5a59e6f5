use anyhow::{bail, Result};

use crate::cli::FixupArgs;
use crate::repo::fix_staged_root;

pub async fn cmd_fixup(args: FixupArgs) -> Result<()> {
    if !args.root.is_dir() {
        bail!("staged root {} is not a directory", args.root.display());
    }

    let root = args.root.clone();
    let report = tokio::task::spawn_blocking(move || fix_staged_root(&root)).await??;
    println!(
        "{}: {} symlinks, {} file modes, {} shebangs fixed",
        args.root.display(),
        report.symlinks,
        report.modes,
        report.shebangs
    );
    Ok(())
}
