//! Command-line front-end driving a real sensor over a serial port.
//!
//! Set the environment variable `RUST_LOG=debug` for protocol-level logging.

mod serial_transport;

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fprint_driver::{Driver, DriverConfig};

/// Drive a serial fingerprint-sensor module.
#[derive(Parser)]
struct Cmdline {
    /// Serial port path.
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,
    /// Baud rate.
    #[arg(short, long, default_value_t = 57_600)]
    baud: u32,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enroll a new fingerprint into a template location.
    Enroll { location: u16 },
    /// Verify a finger against every enrolled template.
    Verify,
    /// Delete a template.
    Delete { location: u16 },
    /// Wipe the on-sensor database.
    Clear,
    /// Print the number of enrolled templates.
    Count,
    /// Print the sensor's system parameters.
    SysParams,
    /// Print the sensor's info page.
    InfoPage,
    /// Download a template to a file.
    Backup {
        location: u16,
        /// Output path for the raw template bytes.
        output: PathBuf,
    },
    /// Upload a template from a file.
    Restore {
        location: u16,
        /// Input path holding raw template bytes.
        input: PathBuf,
    },
    /// Check whether a template location is occupied.
    CheckExists { location: u16 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let Cmdline { port, baud, command } = Cmdline::parse();

    let (reader, writer) =
        serial_transport::open(&port, baud).with_context(|| format!("failed to open serial port {port}"))?;
    let driver = Driver::new(Box::new(reader), Box::new(writer), DriverConfig::default());

    match command {
        Command::Enroll { location } => {
            driver.enroll(location).await.context("enroll failed")?;
            println!("enrolled template {location}");
        }
        Command::Verify => {
            let info = driver.verify().await.context("verify failed")?;
            println!("match: template {} (page {}), score {}", info.template_id, info.page_id, info.score);
        }
        Command::Delete { location } => {
            driver.delete(location).await.context("delete failed")?;
            println!("deleted template {location}");
        }
        Command::Clear => {
            driver.clear_database().await.context("clear failed")?;
            println!("database cleared");
        }
        Command::Count => {
            let count = driver.count().await.context("count failed")?;
            println!("{count} templates enrolled");
        }
        Command::SysParams => {
            let params = driver.read_system_parameters().await.context("read-system-parameters failed")?;
            println!("{params:#?}");
        }
        Command::InfoPage => {
            let page = driver.read_info_page().await.context("read-info-page failed")?;
            println!("{} bytes (complete: {})", page.size(), page.is_complete);
        }
        Command::Backup { location, output } => {
            let template = driver.backup(location).await.context("backup failed")?;
            fs::write(&output, &template.data).with_context(|| format!("failed to write {}", output.display()))?;
            println!("wrote {} bytes to {}", template.size(), output.display());
        }
        Command::Restore { location, input } => {
            let bytes = fs::read(&input).with_context(|| format!("failed to read {}", input.display()))?;
            driver.restore(location, &bytes).await.context("restore failed")?;
            println!("restored template {location} from {}", input.display());
        }
        Command::CheckExists { location } => {
            let exists = driver.check_exists(location).await.context("check-exists failed")?;
            println!("{}", if exists { "occupied" } else { "free" });
        }
    }

    Ok(())
}
