//! Disc selection
//!
//! Activation is a single set-active command with no response payload.
//! The selector remembers the last index it activated successfully; that
//! marker is advisory only and is cleared whenever the catalog is refreshed
//! or the device is lost. The index is sent as-is without checking it
//! against any catalog.

use tracing::info;
use usbode_detect::{Bus, BusAddress, Transport};
use usbode_protocol::CommandBlock;

use crate::error::ClientError;

/// Issues set-active commands and tracks the believed active entry
#[derive(Debug, Clone, Default)]
pub struct DiscSelector {
    active: Option<u8>,
}

impl DiscSelector {
    /// Create a selector with no believed active entry
    pub fn new() -> Self {
        Self::default()
    }

    /// Make entry `index` the device's active disc
    pub fn activate<T: Transport>(
        &mut self,
        bus: &Bus<T>,
        address: BusAddress,
        index: u8,
    ) -> Result<(), ClientError> {
        bus.exchange(address, &CommandBlock::set_active_item(index), &mut [])
            .map_err(|e| ClientError::communication(address, e))?;

        info!("Activated entry {} on {}", index, address);
        self.active = Some(index);
        Ok(())
    }

    /// Index believed to be active, if any
    pub fn active(&self) -> Option<u8> {
        self.active
    }

    /// Forget the believed active entry
    pub fn invalidate(&mut self) {
        self.active = None;
    }
}
