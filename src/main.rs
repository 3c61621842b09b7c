//! grab-daq binary - camera acquisition demo against the mock backend

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use grab_daq::backend::mock::{MockBackend, MockCameraConfig};
use grab_daq::{logging, AcquisitionStrategy, GrabConfig, SessionManager};

/// grab-daq - camera sessions with permit-paced frame delivery
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, default_value = "config/grab-daq.toml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List enumerated cameras
    List,

    /// Grab a number of frames and print a line per frame
    Grab {
        /// Camera name (default camera or first available if omitted)
        #[arg(long)]
        camera: Option<String>,

        /// Frames to grab
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
        count: u64,

        /// Interval between permits (free-run) or software triggers (triggered)
        #[arg(long, default_value_t = 10)]
        pace_ms: u64,
    },

    /// Print the feature nodes of a camera
    Nodes {
        /// Camera name (default camera or first available if omitted)
        #[arg(long)]
        camera: Option<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = GrabConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config = config.with_log_level(level).context("invalid --log-level")?;
    }
    logging::init(&config.application.log_level);

    if config.mock.cameras.is_empty() {
        config.mock.cameras.push(MockCameraConfig::named("mock-cam-0"));
    }
    info!(app = %config.application.name, cameras = config.mock.cameras.len(), "Starting");

    let backend = Arc::new(MockBackend::new(config.mock.cameras.clone()));
    let manager = SessionManager::new(backend, &config)?;

    match cli.command {
        Command::List => {
            for name in manager.device_list() {
                let accessible = manager.is_accessible(&name);
                match manager.device_info(&name) {
                    Some(info) => println!(
                        "{name}\t{}\t{}\t{}",
                        info.model_name,
                        info.serial_number,
                        if accessible { "accessible" } else { "busy" }
                    ),
                    None => println!("{name}"),
                }
            }
        }
        Command::Grab {
            camera,
            count,
            pace_ms,
        } => {
            let session = manager.create_session();
            session.open(camera.as_deref())?;
            session.subscribe(|frame| {
                println!(
                    "#{:<5} block {:<6} {}x{} {} {} bytes",
                    frame.sequence(),
                    frame.image().block_id,
                    frame.width(),
                    frame.height(),
                    frame.pixel_format().as_str(),
                    frame.data().len()
                );
            });

            session.try_grab(count)?;
            let triggered =
                session.acquisition_stats().strategy == Some(AcquisitionStrategy::Triggered);
            let pace = Duration::from_millis(pace_ms.max(1));
            while session.wait_until_idle(pace).is_err() {
                if triggered {
                    session.execute_command("TriggerSoftware")?;
                } else {
                    session.ready();
                }
            }

            let stats = session.acquisition_stats();
            info!(delivered = stats.delivered, target = stats.target, "Grab complete");
            manager.remove_session(&session);
        }
        Command::Nodes { camera, json } => {
            let session = manager.create_session();
            session.open(camera.as_deref())?;
            let nodes = session.nodes()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                for node in nodes.iter().filter(|node| node.access.readable) {
                    if let Some(line) = node.describe() {
                        println!("{line}");
                    }
                }
            }
            manager.remove_session(&session);
        }
    }

    manager.shutdown();
    Ok(())
}
