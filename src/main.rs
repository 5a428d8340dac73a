use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use tokio::sync::mpsc;

use cabana::campaign::{AdSlot, CampaignClient, SlotKind};
use cabana::config::Config;
use cabana::engagement::activity::{IdleConfig, IdleMonitor};
use cabana::engagement::history::SessionHistory;
use cabana::engagement::preferences::PreferenceTracker;
use cabana::engagement::screensaver::{
    ActivationTrigger, ScreensaverController, ScreensaverSettings,
};
use cabana::runtime::Kiosk;
use cabana::storage::{keys, Store, StoreError};

/// Get the config directory path (~/.config/cabana/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("cabana"))
}

#[derive(Parser, Debug)]
#[command(name = "cabana", about = "In-room resort guide kiosk runtime")]
struct Args {
    /// Clear all persisted engine state (history, preferences, screensaver
    /// settings and stats)
    #[arg(long)]
    reset_state: bool,

    /// Start directly on the ambient screensaver surface (preview semantics:
    /// activation stats are not counted)
    #[arg(long)]
    preview_screensaver: bool,

    /// Override the data directory (default ~/.config/cabana)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Set up the data directory
    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        println!("Created data directory: {}", data_dir.display());
    }

    // User-only access on Unix: the store holds guest behavior data
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&data_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&data_dir, perms) {
                    tracing::warn!(
                        path = %data_dir.display(),
                        error = %e,
                        "Failed to set data directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %data_dir.display(),
                    error = %e,
                    "Failed to read data directory metadata"
                );
            }
        }
    }

    let config = Config::load(&data_dir.join("config.toml"))?;

    // Open the record store
    let store_path = data_dir.join("cabana.db");
    let store_path_str = store_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in store path"))?;
    let store = match Store::open(store_path_str).await {
        Ok(store) => store,
        Err(StoreError::InstanceLocked) => {
            eprintln!(
                "Error: Another cabana instance appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open record store: {}", e));
        }
    };

    // Handle --reset-state flag
    if args.reset_state {
        for key in [
            keys::SESSION_HISTORY,
            keys::GUEST_PREFERENCES,
            keys::SCREENSAVER_SETTINGS,
            keys::SCREENSAVER_STATS,
        ] {
            store
                .delete_record(key)
                .await
                .with_context(|| format!("Failed to clear record '{}'", key))?;
        }
        println!("Engine state reset.");
    }

    // Engine components. Config values seed the durable records on first
    // run; after that the store is authoritative.
    let history = SessionHistory::load(store.clone()).await;
    let prefs = PreferenceTracker::load(store.clone(), &config.language).await;

    let settings_seed = ScreensaverSettings {
        timeout_secs: config.idle_timeout_secs,
        rotation_secs: config.campaign_rotation_secs,
        enabled: true,
    };
    let mut controller = ScreensaverController::load(store.clone(), settings_seed).await;

    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let monitor = IdleMonitor::spawn(
        IdleConfig {
            timeout: Duration::from_secs(controller.settings().timeout_secs),
            enabled: controller.settings().enabled,
            excluded_prefixes: config.excluded_paths.clone(),
        },
        signal_tx,
    );

    // Sponsored campaign surface, when a backend is configured.
    // Env var takes precedence over the config file for the device token.
    let ads = match &config.backend_url {
        Some(base_url) => {
            let token = std::env::var("CABANA_DEVICE_TOKEN")
                .ok()
                .or_else(|| config.device_token.clone())
                .map(SecretString::from);
            match CampaignClient::new(base_url.clone(), token) {
                Ok(client) => Some(
                    AdSlot::mount(
                        Arc::new(client),
                        SlotKind::Screensaver,
                        None,
                        Duration::from_secs(controller.settings().rotation_secs),
                    )
                    .await,
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "Campaign surface disabled");
                    None
                }
            }
        }
        None => {
            tracing::info!("No backend configured, campaign surface disabled");
            None
        }
    };

    if args.preview_screensaver {
        controller.enter_ambient(ActivationTrigger::Preview).await;
    }

    let mut kiosk = Kiosk {
        store,
        monitor,
        signals: signal_rx,
        controller,
        history,
        prefs,
        ads,
        excluded_prefixes: config.excluded_paths,
    };

    cabana::runtime::run(&mut kiosk).await?;

    println!("Kiosk stopped.");
    Ok(())
}
