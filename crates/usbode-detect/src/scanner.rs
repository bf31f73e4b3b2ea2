//! Bus scanner
//!
//! Walks bus positions in ascending order, skipping the host, and probes
//! every target that answers selection. The scan is a lazy iterator so a
//! caller looking for one device can stop at the first compliant entry.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::probe::{Compliance, DeviceProber};
use crate::transport::{Bus, BusAddress, Transport};

/// One responding bus position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    /// Position of the target
    pub address: BusAddress,
    /// Probe outcome
    pub compliance: Compliance,
}

impl ScanEntry {
    /// Whether this target is a compliant device
    pub fn is_compliant(&self) -> bool {
        self.compliance.is_compliant()
    }
}

/// Bus scanner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Position occupied by the host; never scanned
    pub host_address: BusAddress,
    /// Additional positions to leave alone
    #[serde(default)]
    pub skip_addresses: Vec<BusAddress>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            host_address: BusAddress::HOST,
            skip_addresses: Vec::new(),
        }
    }
}

/// Bus scanner
#[derive(Debug, Clone, Default)]
pub struct BusScanner {
    config: ScannerConfig,
    prober: DeviceProber,
}

impl BusScanner {
    /// Create a scanner with default configuration and a permissive prober
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self {
            config,
            prober: DeviceProber::new(),
        }
    }

    /// Replace the prober used for each responding target
    pub fn with_prober(mut self, prober: DeviceProber) -> Self {
        self.prober = prober;
        self
    }

    /// Current configuration
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Prober used by this scanner
    pub fn prober(&self) -> &DeviceProber {
        &self.prober
    }

    /// Positions this scanner visits, ascending
    pub fn addresses(&self) -> Vec<BusAddress> {
        BusAddress::all()
            .filter(|a| !self.should_skip(*a))
            .collect()
    }

    /// Start a lazy scan. Each call restarts from the lowest address.
    pub fn scan<'a, T: Transport>(&'a self, bus: &'a Bus<T>) -> BusScan<'a, T> {
        debug!("Scanning bus...");
        BusScan {
            bus,
            prober: &self.prober,
            remaining: self.addresses().into_iter(),
        }
    }

    /// Scan until the first compliant device
    pub fn find_first_compliant<T: Transport>(&self, bus: &Bus<T>) -> Option<BusAddress> {
        let found = self
            .scan(bus)
            .find(ScanEntry::is_compliant)
            .map(|e| e.address);

        match found {
            Some(address) => info!("Found USBODE device at {}", address),
            None => info!("No USBODE device found on bus"),
        }
        found
    }

    /// Run a full scan and collect it into a report
    pub fn report<T: Transport>(&self, bus: &Bus<T>, active: Option<BusAddress>) -> ScanReport {
        let entries: Vec<_> = self.scan(bus).collect();
        info!("Bus scan found {} device(s)", entries.len());
        ScanReport { entries, active }
    }

    /// Check if a position should be skipped
    fn should_skip(&self, address: BusAddress) -> bool {
        address == self.config.host_address || self.config.skip_addresses.contains(&address)
    }
}

/// Lazy scan over the bus
pub struct BusScan<'a, T> {
    bus: &'a Bus<T>,
    prober: &'a DeviceProber,
    remaining: std::vec::IntoIter<BusAddress>,
}

impl<T: Transport> Iterator for BusScan<'_, T> {
    type Item = ScanEntry;

    fn next(&mut self) -> Option<Self::Item> {
        for address in self.remaining.by_ref() {
            // The addressing transaction is completed before probing so
            // exchanges never nest.
            if let Err(e) = self.bus.select(address) {
                debug!("{} unaddressable: {}", address, e);
                continue;
            }

            let compliance = self.prober.classify(self.bus, address);
            info!("Device found at {} ({:?})", address, compliance);
            return Some(ScanEntry {
                address,
                compliance,
            });
        }
        None
    }
}

/// Collected results of a full bus scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Every responding position, ascending
    pub entries: Vec<ScanEntry>,
    /// Position of the session's current device, if any
    pub active: Option<BusAddress>,
}

impl ScanReport {
    /// Number of responding targets
    pub fn device_count(&self) -> usize {
        self.entries.len()
    }

    /// Compliant positions, ascending
    pub fn compliant(&self) -> impl Iterator<Item = BusAddress> + '_ {
        self.entries
            .iter()
            .filter(|e| e.is_compliant())
            .map(|e| e.address)
    }

    /// Display label for one entry
    pub fn label(&self, entry: &ScanEntry) -> &'static str {
        match entry.compliance {
            Compliance::Compliant if self.active == Some(entry.address) => "USBODE (active)",
            Compliance::Compliant => "USBODE Device",
            Compliance::NotCompliant => "Unknown Device",
        }
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device Scan:")?;
        writeln!(f)?;
        for entry in &self.entries {
            writeln!(f, "{}: {}", entry.address, self.label(entry))?;
        }
        if self.entries.is_empty() {
            write!(f, "No devices found.")
        } else {
            writeln!(f)?;
            write!(f, "Total: {}", self.device_count())
        }
    }
}
