//! `fanout` command line interface.
//!
//! Lists render devices, routes the system mix to several of them until
//! Ctrl+C, and edits the saved device selection.

use std::error::Error;
use std::process::ExitCode;
use std::time::Duration;

use audio_fanout::{
    event_channel, list_render_devices, DeviceId, JsonSettingsStore, Router, RouterConfig,
    RouterEvent, RouterOptions, Settings, SettingsStore,
};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn Error>>;

/// Event channel capacity; events are rare outside overflow bursts.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(name = "fanout")]
#[command(version)]
#[command(about = "Play the system audio on several output devices at once", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List render devices
    #[command(alias = "ls")]
    List,

    /// Route the system mix to the given devices until Ctrl+C
    Route {
        /// Device names (see `fanout list`); uses the saved selection if omitted
        devices: Vec<String>,

        /// Save the selection after routing stops
        #[arg(long)]
        save: bool,

        /// Per-device buffer length in milliseconds
        #[arg(long, value_name = "MS")]
        buffer_ms: Option<u64>,
    },

    /// Route the saved selection if auto-start is enabled
    Auto,

    /// Show or edit the saved settings
    #[command(alias = "cfg")]
    Config {
        /// Enable or disable auto-start
        #[arg(long, value_name = "BOOL")]
        auto_start: Option<bool>,

        /// Delete the saved settings
        #[arg(long, conflicts_with = "auto_start")]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::List => list(),
        Commands::Route {
            devices,
            save,
            buffer_ms,
        } => route(devices, save, buffer_ms).await,
        Commands::Auto => auto().await,
        Commands::Config { auto_start, clear } => config(auto_start, clear),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn list() -> CliResult {
    let devices = list_render_devices()?;
    if devices.is_empty() {
        println!("No render devices found");
        return Ok(());
    }

    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        println!("{marker} {}", device.name);
    }
    Ok(())
}

async fn route(devices: Vec<String>, save: bool, buffer_ms: Option<u64>) -> CliResult {
    let store = JsonSettingsStore::default_location()?;
    let mut settings = store.load_or_default();

    let config = if devices.is_empty() {
        settings.router_config()?
    } else {
        RouterConfig::new(devices)?
    };

    let mut options = RouterOptions::default();
    if let Some(ms) = buffer_ms {
        options.buffer_duration = Duration::from_millis(ms);
    }

    run(&config, options).await?;

    if save {
        settings.selected_device_ids = config.device_ids().to_vec();
        store.save(&mut settings)?;
        println!("Saved selection to {}", store.path().display());
    }
    Ok(())
}

async fn auto() -> CliResult {
    let store = JsonSettingsStore::default_location()?;
    let settings = store.load_or_default();
    if !settings.auto_start {
        println!("Auto-start is disabled; enable it with `fanout config --auto-start true`");
        return Ok(());
    }

    let config = settings.router_config()?;
    run(&config, RouterOptions::default()).await
}

fn config(auto_start: Option<bool>, clear: bool) -> CliResult {
    let store = JsonSettingsStore::default_location()?;

    if clear {
        store.clear()?;
        println!("Cleared {}", store.path().display());
        return Ok(());
    }

    let mut settings = store.load_or_default();
    if let Some(enabled) = auto_start {
        settings.auto_start = enabled;
        store.save(&mut settings)?;
    }
    print_settings(&store, &settings);
    Ok(())
}

fn print_settings(store: &JsonSettingsStore, settings: &Settings) {
    println!("Settings file: {}", store.path().display());
    println!("Auto-start:    {}", settings.auto_start);
    println!("Devices:");
    for id in &settings.selected_device_ids {
        println!("  {id}");
    }
    if let Some(saved) = settings.last_saved {
        println!("Last saved:    {}", saved.to_rfc3339());
    }
}

/// Routes until Ctrl+C or until the session dies.
async fn run(config: &RouterConfig, options: RouterOptions) -> CliResult {
    let (events, mut rx) = event_channel(EVENT_CHANNEL_CAPACITY);
    let router = Router::builder(config.device_ids().iter().cloned())
        .options(options)
        .event_callback(events)
        .build()?;

    let report = router.start()?;
    for skipped in &report.skipped_devices {
        eprintln!("Skipped {}: {}", skipped.device_id, skipped.error);
    }
    let format = router
        .format()
        .map_or_else(|| "audio".to_string(), |f| f.to_string());
    println!(
        "Routing {format} to {} device(s). Press Ctrl+C to stop.",
        report.started_count
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut session_lost = None;
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                info!("interrupted");
                break;
            }
            Some(event) = rx.recv() => {
                if let RouterEvent::FatalDeviceError { device_id: None, cause } = &event {
                    error!("routing failed: {cause}");
                    session_lost = Some(cause.clone());
                    break;
                }
                log_event(&event);
            }
        }
    }

    let stats = router.stats();
    // Stopping joins the audio threads
    tokio::task::spawn_blocking(move || router.stop()).await?;
    info!(
        blocks = stats.blocks_captured,
        bytes = stats.bytes_captured,
        overflow_drops = stats.overflow_drops,
        "routing stopped"
    );

    match session_lost {
        Some(cause) => Err(format!("routing failed: {cause}").into()),
        None => Ok(()),
    }
}

fn log_event(event: &RouterEvent) {
    match event {
        RouterEvent::OverflowDropped {
            device_id,
            dropped_blocks,
            dropped_bytes,
        } => warn!(device = %device_id, dropped_blocks, dropped_bytes, "device falling behind"),
        RouterEvent::FatalDeviceError {
            device_id: Some(device_id),
            cause,
        } => {
            warn!(device = %device_id, "output lost: {cause}");
            eprintln!("Lost {device_id}: {cause}");
        }
        RouterEvent::SinkStarted { device_id } => info!(device = %device_id, "output started"),
        RouterEvent::SinkSkipped { device_id, reason } => {
            warn!(device = %device_id, "output skipped: {reason}");
        }
        other => info!(?other, "router event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_route_with_devices() {
        let cli = Cli::try_parse_from(["fanout", "route", "A", "B", "--save", "--buffer-ms", "500"])
            .unwrap();
        match cli.command {
            Commands::Route {
                devices,
                save,
                buffer_ms,
            } => {
                assert_eq!(devices, ["A", "B"]);
                assert!(save);
                assert_eq!(buffer_ms, Some(500));
            }
            _ => panic!("expected route"),
        }
    }

    #[test]
    fn test_parse_config_flags() {
        let cli = Cli::try_parse_from(["fanout", "config", "--auto-start", "true"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                auto_start: Some(true),
                clear: false
            }
        ));

        assert!(Cli::try_parse_from(["fanout", "config", "--clear", "--auto-start", "false"]).is_err());
    }

    #[test]
    fn test_device_ids_from_args() {
        let config = RouterConfig::new(vec!["A".to_string(), "B".to_string()]).unwrap();
        assert_eq!(config.device_ids(), [DeviceId::new("A"), DeviceId::new("B")]);
    }
}
