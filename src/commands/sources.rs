use anyhow::{Context, Result};

use crate::cli::SourcesArgs;
use crate::repo::sources::{format_sources_list, GeoIpLookup, MirrorLookup, NoMirror, DEFAULT_SOURCES};

pub async fn cmd_sources(args: SourcesArgs) -> Result<()> {
    let template = match &args.template {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading sources template {}", path.display()))?,
        None => DEFAULT_SOURCES.to_string(),
    };

    let lookup: Box<dyn MirrorLookup> = if args.no_geoip {
        Box::new(NoMirror)
    } else {
        Box::new(GeoIpLookup::default())
    };

    let sources = format_sources_list(&template, &args.arch, &args.release, lookup.as_ref())
        .await
        .context("formatting sources list")?;
    print!("{}", sources);
    Ok(())
}
