//! Session state
//!
//! A [`Session`] owns the bus and everything the client believes about the
//! attached device: its address, the latest catalog snapshot, and the
//! believed active entry. The presentation layer holds one session and
//! passes it into every call; there is no global state.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use usbode_detect::{
    Bus, BusAddress, BusScanner, DeviceProber, ProbeConfig, ScanReport, ScannerConfig, Transport,
};
use usbode_protocol::{Catalog, CatalogEntry};

use crate::catalog::{CatalogClient, ItemCount};
use crate::error::ClientError;
use crate::events::SessionEvent;
use crate::selector::DiscSelector;

/// Session configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Bus scanning configuration
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// Liveness probe configuration
    #[serde(default)]
    pub probe: ProbeConfig,
}

/// A compliant device attached to the session
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    address: BusAddress,
    catalog: Catalog,
    generation: u64,
}

impl DeviceHandle {
    /// Create a handle with an empty catalog
    pub fn new(address: BusAddress) -> Self {
        Self {
            address,
            catalog: Catalog::new(),
            generation: 0,
        }
    }

    /// Bus position of the device
    pub fn address(&self) -> BusAddress {
        self.address
    }

    /// Latest catalog snapshot
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Number of catalog refreshes so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the catalog wholesale
    fn replace_catalog(&mut self, catalog: Catalog) {
        self.catalog = catalog;
        self.generation += 1;
    }
}

/// Protocol client session
pub struct Session<T> {
    bus: Bus<T>,
    scanner: BusScanner,
    catalog_client: CatalogClient,
    selector: DiscSelector,
    device: Option<DeviceHandle>,
    events: Vec<SessionEvent>,
}

impl<T: Transport> Session<T> {
    /// Create a session with default configuration
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    /// Create a session with custom configuration
    pub fn with_config(transport: T, config: SessionConfig) -> Self {
        let scanner = BusScanner::with_config(config.scanner)
            .with_prober(DeviceProber::with_config(config.probe));

        Self {
            bus: Bus::new(transport),
            scanner,
            catalog_client: CatalogClient::new(),
            selector: DiscSelector::new(),
            device: None,
            events: Vec::new(),
        }
    }

    /// The underlying bus
    pub fn bus(&self) -> &Bus<T> {
        &self.bus
    }

    /// The scanner used by [`Self::connect`]
    pub fn scanner(&self) -> &BusScanner {
        &self.scanner
    }

    /// Scan for the first compliant device and attach to it.
    ///
    /// Any previously attached device is dropped first. The new handle
    /// starts with an empty catalog; call [`Self::refresh`] to fill it.
    pub fn connect(&mut self) -> Result<BusAddress, ClientError> {
        self.device = None;
        self.selector.invalidate();

        match self.scanner.find_first_compliant(&self.bus) {
            Some(address) => {
                self.device = Some(DeviceHandle::new(address));
                self.events.push(SessionEvent::DeviceFound(address));
                Ok(address)
            }
            None => {
                self.events
                    .push(SessionEvent::Error(ClientError::NoDevice.to_string()));
                Err(ClientError::NoDevice)
            }
        }
    }

    /// Drop the attached device without touching the bus
    pub fn disconnect(&mut self) {
        self.device = None;
        self.selector.invalidate();
    }

    /// Re-read the catalog from the attached device.
    ///
    /// The believed active entry is cleared. On a communication failure the
    /// device is dropped and [`ClientError::DeviceLost`] is returned.
    pub fn refresh(&mut self) -> Result<&Catalog, ClientError> {
        let address = self.require_device()?;
        self.selector.invalidate();

        let (count, catalog) = match self.catalog_client.fetch(&self.bus, address) {
            Ok(fetched) => fetched,
            Err(e) => return Err(self.handle_failure(e)),
        };
        self.note_count(count);

        let entries = catalog.len();
        info!("Catalog refreshed from {}: {} entries", address, entries);
        self.events.push(SessionEvent::CatalogRefreshed {
            address,
            count: entries,
        });

        match self.device.as_mut() {
            Some(device) => {
                device.replace_catalog(catalog);
                Ok(device.catalog())
            }
            None => Err(ClientError::NoDevice),
        }
    }

    /// Send a raw set-active command for `index`.
    ///
    /// The index is not checked against the catalog.
    pub fn activate(&mut self, index: u8) -> Result<(), ClientError> {
        let address = self.require_device()?;
        let previous = self.selector.active();

        if let Err(e) = self.selector.activate(&self.bus, address, index) {
            return Err(self.handle_failure(e));
        }

        self.events.push(SessionEvent::ActiveEntryChanged {
            from: previous,
            to: index,
        });
        Ok(())
    }

    /// Activate an entry taken from the current catalog snapshot
    pub fn activate_entry(&mut self, entry: &CatalogEntry) -> Result<(), ClientError> {
        let in_snapshot = self
            .device
            .as_ref()
            .is_some_and(|d| d.catalog().contains(entry));
        if !in_snapshot {
            return Err(ClientError::NotInCatalog { index: entry.index });
        }
        self.activate(entry.index)
    }

    /// Run a full bus scan, marking the attached device as active
    pub fn scan_report(&self) -> ScanReport {
        let active = self.device.as_ref().map(DeviceHandle::address);
        self.scanner.report(&self.bus, active)
    }

    /// Attached device, if any
    pub fn device(&self) -> Option<&DeviceHandle> {
        self.device.as_ref()
    }

    /// Latest catalog snapshot, if a device is attached
    pub fn catalog(&self) -> Option<&Catalog> {
        self.device.as_ref().map(DeviceHandle::catalog)
    }

    /// Index believed to be active
    pub fn active_index(&self) -> Option<u8> {
        self.selector.active()
    }

    /// Catalog entry believed to be active
    pub fn active_entry(&self) -> Option<&CatalogEntry> {
        let index = self.selector.active()?;
        self.catalog()?.find(index)
    }

    /// Take all pending events
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    fn require_device(&self) -> Result<BusAddress, ClientError> {
        self.device
            .as_ref()
            .map(DeviceHandle::address)
            .ok_or(ClientError::NoDevice)
    }

    fn note_count(&mut self, count: ItemCount) {
        if count.is_clamped() {
            self.events.push(SessionEvent::CapacityExceeded {
                reported: count.reported,
                kept: count.usable(),
            });
        }
    }

    /// Turn a communication failure into a lost device
    fn handle_failure(&mut self, error: ClientError) -> ClientError {
        let error = match error {
            ClientError::DeviceCommunication { address, cause } => {
                warn!("Lost device at {}: {}", address, cause);
                self.device = None;
                self.selector.invalidate();
                self.events.push(SessionEvent::DeviceLost(address));
                ClientError::DeviceLost { address, cause }
            }
            other => other,
        };
        self.events.push(SessionEvent::Error(error.to_string()));
        error
    }
}
