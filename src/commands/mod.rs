pub mod build_packages;
pub mod fixup;
pub mod image;
pub mod remote;
pub mod run;
pub mod sources;

// Re-export command functions
pub use build_packages::cmd_build_packages;
pub use fixup::cmd_fixup;
pub use image::cmd_image;
pub use remote::{cmd_copy, cmd_exec};
pub use run::cmd_run;
pub use sources::cmd_sources;
