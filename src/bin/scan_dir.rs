//! Moderate every image in a directory and print the verdicts as JSON
//! Run with: cargo run --release --bin scan_dir -- <directory>

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use nsfw_detector::{
    core::types::{Item, LegacyVerdict},
    utils::has_image_extension,
    BatchOrchestrator, Collaborators, Config, Metrics,
};

fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && has_image_extension(&path) {
            paths.push(path);
        }
    }
    // read_dir order is platform-defined
    paths.sort();
    Ok(paths)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("nsfw_detector=info")
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let dir = match std::env::args().nth(1) {
        Some(dir) => PathBuf::from(dir),
        None => bail!("usage: scan_dir <directory>"),
    };
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }

    let config = Arc::new(Config::new()?);
    let collaborators = {
        let config = config.clone();
        let handle = tokio::runtime::Handle::current();
        tokio::task::spawn_blocking(move || Collaborators::from_config(&config, handle)).await??
    };
    let orchestrator = BatchOrchestrator::new(config, collaborators, Metrics::new());

    let paths = collect_images(&dir)?;
    info!("Found {} images in {}", paths.len(), dir.display());
    if paths.is_empty() {
        println!("[]");
        return Ok(());
    }

    let items: Vec<Item> = paths
        .into_iter()
        .enumerate()
        .map(|(index, path)| Item::from_path(index, path))
        .collect();

    let result = orchestrator.process_batch(items).await?;
    let verdicts: Vec<LegacyVerdict> = result.predictions.iter().map(LegacyVerdict::from).collect();
    println!("{}", serde_json::to_string_pretty(&verdicts)?);

    Ok(())
}
