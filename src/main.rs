use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use suno_unfollow::bot::UnfollowBot;
use suno_unfollow::browser::chromium::ChromiumLauncher;
use suno_unfollow::config::Config;
use suno_unfollow::suno::SunoRest;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Opens the log for appending, so a resumed run keeps the earlier output.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

fn init_logging(config: &Config) -> Result<()> {
    let log_file = open_log_file(&config.logging.file)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stderr.and(Arc::new(log_file)))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_default()?;
    init_logging(&config)?;
    tracing::info!("starting suno-unfollow");

    let api = Arc::new(SunoRest::new(&config.platform.api_base));
    let mut bot = UnfollowBot::new(&config, Box::new(ChromiumLauncher), api)?;

    let outcome = tokio::select! {
        result = bot.run() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    if outcome.is_none() {
        tracing::warn!("interrupted, cleaning up");
    }
    bot.cleanup().await;
    match outcome {
        Some(Err(e)) => Err(e.into()),
        _ => {
            tracing::info!("done");
            Ok(())
        }
    }
}
