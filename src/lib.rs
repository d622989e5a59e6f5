pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod process;
pub mod remote;
pub mod repo;
pub mod testbed;

// Re-export core types for convenience
pub use error::{BuildPackagesError, CacheError, CommandError};
pub use remote::{RemoteAccess, RemoteCommand, RemoteShell};
pub use testbed::{create_image, wait_for_ssh, Testbed, TestbedState};
