use color_eyre::{eyre::eyre, Result};
use padbridge::bridge::SerialSource;
use padbridge::{run_guarded, BridgeConfig, GuardError, RecordingLink, SerialConfig};
use std::fs;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const CONFIG_ENV: &str = "PADBRIDGE_CONFIG";

#[cfg(windows)]
const DEFAULT_PORT: &str = "COM3";
#[cfg(not(windows))]
const DEFAULT_PORT: &str = "/dev/ttyUSB0";

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = load_config()?;
    info!(
        "Bridging {} at {} baud to a dry-run controller link",
        config.serial.port, config.serial.baud_rate
    );

    let source = SerialSource::open(&config.serial.port, config.serial.baud_rate)
        .map_err(|e| eyre!("Failed to open serial port {}: {}", config.serial.port, e))?;
    let link = RecordingLink::new().with_shutdown_grace(config.shutdown_grace());

    let host_stop = CancellationToken::new();
    let stop = host_stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping bridge");
                stop.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let bridge_stop = host_stop.clone();
    let result = run_guarded(
        source,
        link,
        config.guard_settings(),
        host_stop,
        || async move {
            info!("Bridge active, press Ctrl-C to stop");
            bridge_stop.cancelled().await;
            Ok::<(), std::io::Error>(())
        },
    )
    .await;

    match result {
        Ok(()) | Err(GuardError::HostStopped) => {
            info!("Bridge stopped");
            Ok(())
        }
        Err(e) => Err(eyre!("Bridge failed: {}", e)),
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

fn load_config() -> Result<BridgeConfig> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            let content = fs::read_to_string(&path)
                .map_err(|e| eyre!("Failed to read config {}: {}", path, e))?;
            let config = BridgeConfig::from_toml_str(&content)?;
            info!("Loaded config from {}", path);
            Ok(config)
        }
        Err(_) => {
            warn!("{} not set, using defaults", CONFIG_ENV);
            Ok(BridgeConfig::new(SerialConfig::new(DEFAULT_PORT)))
        }
    }
}
