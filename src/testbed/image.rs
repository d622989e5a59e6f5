use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::CommandError;
use crate::process;

/// File name of the flashed image inside the output directory
pub const IMAGE_FILE_NAME: &str = "snappy.img";

const FLASH_PROGRAM: &str = "ubuntu-device-flash";

/// OS release and channel requested from the flashing tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub release: String,
    pub channel: String,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            release: "15.04".to_string(),
            channel: "stable".to_string(),
        }
    }
}

impl ImageSpec {
    /// Arguments for `sudo` to flash a developer-mode core image to `image_path`.
    pub fn flash_args(&self, image_path: &Path) -> Vec<String> {
        vec![
            FLASH_PROGRAM.to_string(),
            "--verbose".to_string(),
            "core".to_string(),
            self.release.clone(),
            "--channel".to_string(),
            self.channel.clone(),
            "--output".to_string(),
            image_path.to_string_lossy().into_owned(),
            "--developer-mode".to_string(),
        ]
    }
}

/// Flash the default core image into `output_directory` and return its path.
///
/// Needs root: the flashing tool is run through `sudo`.
pub async fn create_image(output_directory: &Path) -> Result<PathBuf, CommandError> {
    create_image_with(output_directory, &ImageSpec::default()).await
}

pub async fn create_image_with(
    output_directory: &Path,
    spec: &ImageSpec,
) -> Result<PathBuf, CommandError> {
    info!(target: "image", release = %spec.release, channel = %spec.channel,
        "creating a snappy image to run the tests");

    let image_path = output_directory.join(IMAGE_FILE_NAME);
    process::run_inherited("sudo", &spec.flash_args(&image_path)).await?;
    Ok(image_path)
}
