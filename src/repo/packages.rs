//! Host build-package installation.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::{BuildPackagesError, CacheError, CommandError};
use crate::process;

/// What the package cache knows about a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageStatus {
    pub installed: bool,
}

#[async_trait::async_trait]
pub trait PackageCache: Send + Sync {
    /// Look `name` up. Unknown packages fail with [`CacheError::NotFound`].
    async fn lookup(&self, name: &str) -> Result<PackageStatus, CacheError>;
}

#[async_trait::async_trait]
pub trait PackageInstaller: Send + Sync {
    async fn install(&self, packages: &[String]) -> Result<(), CommandError>;
}

/// Host apt cache, queried through `apt-cache` and `dpkg-query`.
#[derive(Debug, Default)]
pub struct AptCache;

#[async_trait::async_trait]
impl PackageCache for AptCache {
    async fn lookup(&self, name: &str) -> Result<PackageStatus, CacheError> {
        let args = vec!["show".to_string(), "--no-all-versions".to_string(), name.to_string()];
        match process::run_captured("apt-cache", &args).await {
            Ok(_) => {}
            Err(CommandError::Failed { .. }) => return Err(CacheError::NotFound(name.to_string())),
            Err(e) => return Err(e.into()),
        }

        let args = vec!["-W".to_string(), "--showformat=${Status}".to_string(), name.to_string()];
        let installed = match process::run_captured("dpkg-query", &args).await {
            Ok(status) => status.trim_end().ends_with(" installed"),
            // dpkg-query exits non-zero for packages it has never seen
            Err(CommandError::Failed { .. }) => false,
            Err(e) => return Err(e.into()),
        };

        debug!(target: "packages", package = %name, installed, "looked up package");
        Ok(PackageStatus { installed })
    }
}

/// Installs with `sudo apt-get`.
#[derive(Debug, Default)]
pub struct AptInstaller;

#[async_trait::async_trait]
impl PackageInstaller for AptInstaller {
    async fn install(&self, packages: &[String]) -> Result<(), CommandError> {
        let mut args = vec![
            "apt-get".to_string(),
            "--no-install-recommends".to_string(),
            "-y".to_string(),
            "install".to_string(),
        ];
        args.extend(packages.iter().cloned());
        process::run_inherited("sudo", &args).await
    }
}

/// Install the packages in `packages` that are not installed yet.
///
/// Every package is looked up before anything is installed, so one unknown
/// name fails the whole request. Returns the packages handed to the
/// installer, sorted and without duplicates.
pub async fn install_build_packages<C, I>(
    packages: &[String],
    cache: &C,
    installer: &I,
) -> Result<Vec<String>, BuildPackagesError>
where
    C: PackageCache + ?Sized,
    I: PackageInstaller + ?Sized,
{
    let unique: BTreeSet<&str> = packages.iter().map(String::as_str).collect();
    let mut new_packages = Vec::new();

    for name in unique {
        match cache.lookup(name).await {
            Ok(status) if status.installed => {}
            Ok(_) => new_packages.push(name.to_string()),
            Err(e @ CacheError::NotFound(_)) => return Err(BuildPackagesError::MissingPackage(e)),
            Err(e) => return Err(BuildPackagesError::Cache(e)),
        }
    }

    if !new_packages.is_empty() {
        info!(target: "packages", "installing build dependencies: {}", new_packages.join(" "));
        installer.install(&new_packages).await?;
    }

    Ok(new_packages)
}
