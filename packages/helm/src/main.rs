use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use stream_session::{
    CommandCoalescer, LoopbackConfig, LoopbackEngine, MediaSurface, SessionManager, SurfaceHost,
    SurfaceId, ViewBinder, paint_command,
};

mod config;

use config::{FileConfig, load_config};

#[derive(Parser)]
#[command(name = "helm")]
#[command(about = "Remote stream session supervisor (loopback demo)")]
struct Cli {
    /// Directory containing config.toml (defaults to the current directory)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Remote session identity to attach to (overrides config)
    #[arg(long)]
    session_id: Option<String>,
}

/// Headless stand-in for a mounted page: logs attach/detach instead of
/// rendering.
#[derive(Default)]
struct ConsoleHost {
    children: Vec<MediaSurface>,
}

impl SurfaceHost for ConsoleHost {
    fn clear(&mut self) {
        self.children.clear();
    }

    fn attach(&mut self, surface: MediaSurface) {
        info!(surface = %surface.id, fit = ?surface.fit, "surface attached to view");
        self.children.push(surface);
    }

    fn detach(&mut self, id: SurfaceId) -> bool {
        let before = self.children.len();
        self.children.retain(|s| s.id != id);
        if self.children.len() != before {
            info!(surface = %id, "surface detached from view");
            true
        } else {
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,stream_session=debug"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let config_dir = cli
        .config_dir
        .unwrap_or_else(|| PathBuf::from("."));
    let file_config: FileConfig = load_config(&config_dir)
        .extract()
        .context("invalid configuration")?;
    let session_id = cli
        .session_id
        .or_else(|| file_config.session.id.clone())
        .unwrap_or_else(|| "showroom-demo".to_string());

    let engine = Arc::new(LoopbackEngine::new(LoopbackConfig::default()));
    let manager = SessionManager::new(engine, file_config.policy.to_policy())?;

    // Log every transition the way a UI would render its indicator.
    let mut events = manager.subscribe();
    tokio::spawn(async move {
        while let Ok(change) = events.recv().await {
            info!(state = %change.state, connected = change.connected, "session state changed");
        }
    });

    info!(session = %session_id, "attaching to remote session");
    manager.initialize(&session_id).await?;

    // Mount the video surface into our stand-in view.
    let binder = ViewBinder::new(manager.clone());
    let mut view = ConsoleHost::default();
    if !binder.bind(&mut view).await {
        warn!("no surface yet, would rebind on the connected notification");
    }

    // Drive a burst of paint edits the way a color picker drag would.
    let coalescer = CommandCoalescer::new(manager.clone());
    for color in ["pearl", "sapphire", "midnight"] {
        let (key, payload) = paint_command("hull", color);
        coalescer.enqueue(key, payload).await;
    }
    let (key, payload) = paint_command("superstructure", "ivory");
    coalescer.enqueue(key, payload).await;

    info!("session running, press ctrl-c to disconnect");
    tokio::signal::ctrl_c().await?;

    coalescer.flush().await;
    binder.unbind(&mut view).await;
    manager.disconnect().await;
    info!("disconnected");
    Ok(())
}
