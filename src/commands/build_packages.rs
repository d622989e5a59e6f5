use anyhow::Result;

use crate::cli::BuildPackagesArgs;
use crate::repo::{install_build_packages, AptCache, AptInstaller};

pub async fn cmd_build_packages(args: BuildPackagesArgs) -> Result<()> {
    let installed = install_build_packages(&args.packages, &AptCache, &AptInstaller).await?;
    if installed.is_empty() {
        println!("All build packages are already installed");
    } else {
        println!("Installed: {}", installed.join(" "));
    }
    Ok(())
}
