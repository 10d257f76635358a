use clap::{Parser, Subcommand};
use serde::Serialize;
use serial_port_reader::config::{Config, ConfigLoader};
use serial_port_reader::logging::init_logging;
use serial_port_reader::{ReaderConfig, SerialPortReader, SessionHandlers, SessionOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Watch serial ports and print what they send.",
    long_about = "Lists the serial ports on this machine and monitors one of them, printing each received chunk with a timestamp. Configuration is read from serial-reader.toml or the user config directory and can be overridden with SERIAL_READER_* environment variables."
)]
struct Cli {
    /// Configuration file to use instead of the standard locations.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging for this tool.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the serial ports the platform reports.
    List {
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print everything a port sends until Ctrl-C.
    Monitor {
        /// Port name or alias. Defaults to the configured port, then the highest-numbered one.
        port: Option<String>,

        #[arg(short, long)]
        baud: Option<u32>,

        /// Delay between polls in milliseconds; 0 polls every tick.
        #[arg(short, long)]
        interval_ms: Option<u64>,

        #[arg(long)]
        no_timestamps: bool,
    },
}

#[derive(Serialize)]
struct PortListing {
    ports: Vec<String>,
    highest: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => ConfigLoader::load_from(path),
        None => ConfigLoader::load(),
    };
    let (config, config_error) = match loaded {
        Ok(loader) => (loader.into_config(), None),
        Err(e) => (Config::default(), Some(e)),
    };

    if let Err(e) = init_logging(&config.logging, cli.verbose) {
        eprintln!("Failed to initialise logging: {e}");
    }
    if let Some(e) = config_error {
        warn!(error = %e, "Using default configuration");
    }

    let reader = SerialPortReader::system(ReaderConfig::from(&config.serial));

    let result = match cli.command {
        Command::List { json } => list_ports(&reader, json),
        Command::Monitor {
            port,
            baud,
            interval_ms,
            no_timestamps,
        } => {
            let options = MonitorOptions {
                port,
                baud: baud.unwrap_or(config.serial.default_baud),
                poll_interval: interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| config.serial.poll_interval()),
                timestamps: config.monitor.show_timestamps && !no_timestamps,
            };
            monitor(&reader, &config, options).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn list_ports(reader: &SerialPortReader, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut ports = reader.available_ports()?;
    ports.sort();
    let highest = reader.highest_numbered_port()?;
    let highest = (!highest.is_empty()).then_some(highest);

    if json {
        let listing = PortListing { ports, highest };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in &ports {
        let marker = if highest.as_ref() == Some(port) { "  (highest)" } else { "" };
        println!("{port}{marker}");
    }
    Ok(())
}

struct MonitorOptions {
    port: Option<String>,
    baud: u32,
    poll_interval: Duration,
    timestamps: bool,
}

async fn monitor(
    reader: &SerialPortReader,
    config: &Config,
    options: MonitorOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let requested = options.port.or_else(|| config.monitor.port.clone());
    let port = match requested {
        Some(name) => config.serial.resolve_port(&name),
        None if config.monitor.use_highest_port => {
            let highest = reader.highest_numbered_port()?;
            if highest.is_empty() {
                return Err(format!(
                    "no port named {}<n> is available; pass a port name",
                    config.serial.port_prefix
                )
                .into());
            }
            info!(port = %highest, "Using highest-numbered port");
            highest
        }
        None => return Err("no port given and use_highest_port is disabled".into()),
    };

    let timestamps = options.timestamps;
    let (opened_port, closed_port) = (port.clone(), port.clone());
    let handlers = SessionHandlers::new()
        .on_opened(move || eprintln!("Monitoring {opened_port}. Press Ctrl-C to stop."))
        .on_data(move |chunk| print_chunk(chunk, timestamps))
        .on_closed(move || eprintln!("Closed {closed_port}."));

    reader.create_with(
        SessionOptions::new(port.as_str(), options.baud).with_poll_interval(options.poll_interval),
        handlers,
    )?;

    shutdown_signal().await;

    reader.remove(&port).await?;
    reader.shutdown().await?;
    Ok(())
}

fn print_chunk(chunk: &str, timestamps: bool) {
    if timestamps {
        println!("[{}]: {chunk}", chrono::Local::now().format("%H:%M:%S"));
    } else {
        println!("{chunk}");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Signal received, closing port");
}
