//! USBODE Bus Detection Library
//!
//! This crate provides bus access and device discovery for USBODE
//! virtual optical drives:
//!
//! - [`Transport`]: the synchronous open/select/command/read/complete channel
//! - [`Bus`]: serializes exchanges over one transport
//! - [`DeviceProber`]: liveness test for a single position
//! - [`BusScanner`]: ascending, lazy scan of every position except the host
//!
//! # Example
//!
//! ```rust,no_run
//! use usbode_detect::{Bus, BusScanner, Transport};
//!
//! fn first_device<T: Transport>(transport: T) {
//!     let bus = Bus::new(transport);
//!     let scanner = BusScanner::new();
//!
//!     for entry in scanner.scan(&bus) {
//!         println!("{}: compliant = {}", entry.address, entry.is_compliant());
//!     }
//! }
//! ```

pub mod error;
pub mod probe;
pub mod scanner;
pub mod transport;

pub use error::{DetectError, TransportError};
pub use probe::{Compliance, DeviceProber, ProbeConfig};
pub use scanner::{BusScan, BusScanner, ScanEntry, ScanReport, ScannerConfig};
pub use transport::{Bus, BusAddress, Exchange, Transport};
