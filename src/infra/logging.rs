// ============================================================
// Layer 6 — Logging Setup
// ============================================================
// Every run logs twice:
//   - to stdout, coloured, for the person watching
//   - to logs/<YYYY-MM-DD_HH-MM-SS>-Log.log, plain text, as a
//     permanent record of hyperparameters and epoch metrics
//
// Verbosity follows RUST_LOG; the default is info for this crate.

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}, sync::Mutex};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(log_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Cannot create log directory '{}'", log_dir.display()))?;

    let name = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S-Log.log").to_string();
    let path = log_dir.join(name);
    let file = fs::File::create(&path)
        .with_context(|| format!("Cannot create log file '{}'", path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("resnet_mil=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(path)
}
