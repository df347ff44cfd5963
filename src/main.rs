use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{MissedTickBehavior, interval};

use camera_remote_lib::camera::{BleTransport, BluestTransport, ScanOrchestrator};
use camera_remote_lib::{AppConfig, logging};

async fn execute(command: &str, orchestrator: &ScanOrchestrator<BluestTransport>) -> bool {
    let session = orchestrator.session();
    let result = match command {
        "trigger" => session.trigger().await,
        "focus" => session.focus().await,
        "release" => session.release().await,
        "status" => {
            let status = session.status();
            let report = serde_json::json!({
                "state": session.state(),
                "connected": session.is_connected(),
                "focus_acquired": status.focus_acquired(),
                "shutter_active": status.shutter_active(),
                "camera": status,
            });
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Failed to serialize status: {}", e),
            }
            Ok(())
        }
        "quit" | "exit" => return false,
        "" => Ok(()),
        other => {
            warn!("Unknown command '{}' (trigger, focus, release, status, quit)", other);
            Ok(())
        }
    };
    if let Err(e) = result {
        error!("{} failed: {}", command, e);
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    if logging::ConsoleLogger::init(log::Level::Info).is_err() {
        // Only fall back to env_logger when the console logger could not be installed
        env_logger::builder()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(AppConfig::default_path);
    let config = match &config_path {
        Some(path) => AppConfig::load_or_create(path).await?,
        None => {
            warn!("No config directory available, using default config.");
            AppConfig::default()
        }
    };
    logging::apply_level(&config.logging.level);

    let transport = Arc::new(BluestTransport::new(config.connection.max_clients).await?);
    transport.set_tx_power(config.connection.tx_power_dbm);

    let settings = config.connection.session_settings(&config.timing);
    let mut orchestrator = ScanOrchestrator::new(Arc::clone(&transport), config.scan.clone(), settings);
    orchestrator.start().await?;
    info!("Waiting for a camera. Commands: trigger, focus, release, status, quit");

    let mut ticker = interval(config.timing.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                orchestrator.poll().await;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !execute(line.trim(), &orchestrator).await {
                        break;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    orchestrator.session_mut().disconnect().await;
    transport.stop_scan().await;
    info!("Camera remote bridge stopped");
    Ok(())
}
