use anyhow::{Context, Result};

use crate::cli::ImageArgs;
use crate::config::TestbedConfig;
use crate::testbed::create_image_with;

pub async fn cmd_image(args: ImageArgs, config: &TestbedConfig) -> Result<()> {
    let mut spec = config.image.spec();
    if let Some(release) = args.release {
        spec.release = release;
    }
    if let Some(channel) = args.channel {
        spec.channel = channel;
    }

    let output = match args.output.or_else(|| config.image.output_dir.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolving current directory")?,
    };
    std::fs::create_dir_all(&output)
        .with_context(|| format!("creating output directory {}", output.display()))?;

    let image_path = create_image_with(&output, &spec)
        .await
        .context("flashing image")?;
    println!("{}", image_path.display());
    Ok(())
}
