//! Virtual USBODE device
//!
//! Answers the vendor command set from an in-memory list of disc images.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use usbode_protocol::{CatalogEntry, CommandBlock, EncodeRecord, Opcode};

/// Why the virtual device rejected a command
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceReject {
    /// Opcode outside the vendor command set
    #[error("illegal request: opcode 0x{0:02X}")]
    IllegalRequest(u8),

    /// Known opcode the device does not implement
    #[error("unsupported command: {0}")]
    Unsupported(Opcode),
}

/// One disc image offered by a virtual device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDiscConfig {
    /// Image name
    pub name: String,
    /// Media kind tag
    #[serde(default)]
    pub kind: u8,
    /// Image size in bytes
    pub size_bytes: u64,
}

/// Configuration for creating a virtual device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDeviceConfig {
    /// Images in catalog order; indices are assigned from 0
    #[serde(default)]
    pub discs: Vec<VirtualDiscConfig>,
    /// Count byte to report instead of the real number of images
    #[serde(default)]
    pub reported_count: Option<u8>,
    /// Image active at power-on
    #[serde(default)]
    pub active_index: Option<u8>,
}

/// A simulated USBODE device
#[derive(Debug, Clone, Default)]
pub struct VirtualDevice {
    entries: Vec<CatalogEntry>,
    reported_count: Option<u8>,
    active_index: Option<u8>,
    received: Vec<CommandBlock>,
}

impl VirtualDevice {
    /// Create a device with no images
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a device from configuration
    pub fn from_config(config: &VirtualDeviceConfig) -> Self {
        let mut device = Self {
            reported_count: config.reported_count,
            active_index: config.active_index,
            ..Self::default()
        };
        for disc in &config.discs {
            device.add_disc(&disc.name, disc.kind, disc.size_bytes);
        }
        device
    }

    /// Append an image, returning its index.
    ///
    /// Indices saturate at 255; later images share that index.
    pub fn add_disc(&mut self, name: &str, kind: u8, size_bytes: u64) -> u8 {
        let index = u8::try_from(self.entries.len()).unwrap_or(u8::MAX);
        self.entries
            .push(CatalogEntry::new(index, kind, name, size_bytes));
        index
    }

    /// Append a pre-built entry as-is
    pub fn add_entry(&mut self, entry: CatalogEntry) {
        self.entries.push(entry);
    }

    /// Images in catalog order
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Remove every image
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Override the count byte returned by item-count queries
    pub fn set_reported_count(&mut self, count: Option<u8>) {
        self.reported_count = count;
    }

    /// Index last set by a set-active command
    pub fn active_index(&self) -> Option<u8> {
        self.active_index
    }

    /// Every command block this device accepted or rejected
    pub fn received_commands(&self) -> &[CommandBlock] {
        &self.received
    }

    /// Count byte for item-count queries
    pub fn item_count(&self) -> u8 {
        self.reported_count
            .unwrap_or_else(|| self.entries.len().min(u8::MAX as usize) as u8)
    }

    /// Execute a command, returning the data-in payload
    pub fn handle_command(&mut self, block: &CommandBlock) -> Result<Vec<u8>, DeviceReject> {
        self.received.push(*block);

        let opcode = block
            .opcode()
            .map_err(|_| DeviceReject::IllegalRequest(block.opcode_byte()))?;

        match opcode {
            Opcode::ItemCount => {
                debug!("Virtual device reports {} items", self.item_count());
                Ok(vec![self.item_count()])
            }
            Opcode::ListItems => {
                let mut payload = Vec::with_capacity(self.entries.len() * usbode_protocol::ENTRY_LEN);
                for entry in &self.entries {
                    entry.encode_to(&mut payload);
                }
                Ok(payload)
            }
            Opcode::SetActiveItem => {
                info!("Virtual device now emulating entry {}", block.parameter());
                self.active_index = Some(block.parameter());
                Ok(Vec::new())
            }
            Opcode::ListDevices | Opcode::ListFiles => Err(DeviceReject::Unsupported(opcode)),
        }
    }
}
