pub mod fixups;
pub mod packages;
pub mod sources;

pub use fixups::{fix_shebangs, fix_staged_root, fix_symlinks, FixupReport};
pub use packages::{install_build_packages, AptCache, AptInstaller, PackageCache, PackageInstaller};
pub use sources::{format_sources_list, GeoIpLookup, MirrorLookup, NoMirror, DEFAULT_SOURCES};
