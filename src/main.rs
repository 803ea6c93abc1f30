// src/main.rs

use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;
use vfs_channel::{Config, Connection, FsChannel, InProcessChannel, LocalDirDispatcher};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <backing_dir> [config.json]", args[0]);
        return Ok(());
    }

    let backing_dir = PathBuf::from(&args[1]);
    let config = match args.get(2) {
        Some(path) => Config::load(PathBuf::from(path).as_path())?,
        None => Config::default(),
    };

    tracing::info!("Backing directory: {}", backing_dir.display());
    tracing::info!("Database: {}", config.database_path.display());

    // ========== OPEN METADATA STORE ==========
    if let Some(db_dir) = config.database_path.parent() {
        std::fs::create_dir_all(db_dir)?;
    }
    let address = config
        .database_path
        .to_str()
        .ok_or_else(|| anyhow!("Database path is not valid UTF-8"))?;
    let store = Connection::open_with(address, &config.store_options())?;
    {
        let guard = store.lock()?;
        let mut stmt = guard.prepare("PRAGMA user_version")?;
        if stmt.step()? {
            tracing::info!("✓ Store opened (user_version {})", stmt.column_u64(0)?);
        }
    }

    // ========== START CHANNEL ==========
    let channel = InProcessChannel::new(
        LocalDirDispatcher::new(backing_dir),
        config.content_cache_capacity,
    );
    channel.start(config.read_only, config.negative_path_caching)?;
    tracing::info!("✓ Channel running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;

    // ========== SHUTDOWN ==========
    channel.stop()?;
    let stop_data = channel.stop_future().await?;
    tracing::info!(
        "Channel stopped after {} request(s)",
        stop_data.requests_serviced
    );

    store.close();
    tracing::info!("vfs-channel shut down");
    Ok(())
}
