//! USBODE command-line front end
//!
//! Scans a bus for USBODE virtual optical drives, lists the disc images a
//! device offers, and makes one of them the active emulated disc.
//!
//! Usage:
//!   usbode scan              # List every responding bus position
//!   usbode list              # List disc images on the first USBODE device
//!   usbode mount 3           # Make image 3 the active disc
//!   usbode init-settings     # Write the default settings file
//!
//! The bus is simulated from the `virtual_bus` section of the settings file.

mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use usbode_client::{Session, SessionEvent};
use usbode_detect::Transport;
use usbode_protocol::CatalogEntry;
use usbode_sim::VirtualBus;

use settings::Settings;

/// USBODE virtual optical drive client
#[derive(Parser, Debug)]
#[command(name = "usbode")]
#[command(about = "Browse and mount disc images on USBODE devices")]
struct Args {
    /// Settings file (defaults to $XDG_CONFIG_HOME/usbode/settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the bus and show every responding target
    Scan,
    /// List the disc images on the first USBODE device
    List,
    /// Make a disc image the device's active disc
    Mount {
        /// Catalog index of the image
        index: u8,
    },
    /// Write the current settings to disk
    InitSettings,
}

fn main() -> Result<()> {
    // Logs go to stderr so listings on stdout stay clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "usbode=info,usbode_protocol=info,usbode_detect=info,usbode_client=info,usbode_sim=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.settings.as_deref());

    if let Command::InitSettings = args.command {
        let path = settings
            .save(args.settings.as_deref())
            .context("saving settings")?;
        println!("Settings written to {}", path.display());
        return Ok(());
    }

    let bus = VirtualBus::from_config(&settings.virtual_bus);
    let mut session = Session::with_config(bus, settings.session_config());
    info!("Starting USBODE client");

    let outcome = match args.command {
        Command::Scan => {
            println!("{}", session.scan_report());
            Ok(())
        }
        Command::List => list(&mut session),
        Command::Mount { index } => mount(&mut session, index),
        Command::InitSettings => Ok(()),
    };

    log_events(&mut session);
    outcome
}

fn list<T: Transport>(session: &mut Session<T>) -> Result<()> {
    let address = session.connect().context("looking for a USBODE device")?;
    let catalog = session.refresh().context("reading the disc catalog")?;

    println!("USBODE device at {}", address);
    if catalog.is_empty() {
        println!("No discs available.");
        return Ok(());
    }
    for entry in catalog {
        println!("{}", catalog_line(entry));
    }
    Ok(())
}

/// One catalog listing line: `"<index>. <name>  (<size>)"`
fn catalog_line(entry: &CatalogEntry) -> String {
    format!("{}. {}  ({})", entry.index, entry.name(), entry.size_display())
}

fn mount<T: Transport>(session: &mut Session<T>, index: u8) -> Result<()> {
    session.connect().context("looking for a USBODE device")?;
    session.refresh().context("reading the disc catalog")?;

    session
        .activate(index)
        .with_context(|| format!("mounting disc {}", index))?;

    match session.active_entry() {
        Some(entry) => println!("Mounted {}. {}", entry.index, entry.name()),
        None => println!("Mounted index {} (not in the current catalog)", index),
    }
    Ok(())
}

fn log_events<T: Transport>(session: &mut Session<T>) {
    for event in session.drain_events() {
        match event {
            SessionEvent::CapacityExceeded { reported, kept } => {
                warn!("Device reports {} discs; only the first {} are shown", reported, kept)
            }
            SessionEvent::DeviceLost(address) => warn!("Lost device at {}", address),
            SessionEvent::Error(message) => error!("{}", message),
            other => debug!("{:?}", other),
        }
    }
}
