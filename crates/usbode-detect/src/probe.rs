//! Liveness probing for USBODE devices
//!
//! A target is classified compliant when an item-count query completes
//! without a transport error. By default the returned count is not
//! inspected: a device that answers this query is compliant even if it
//! rejects every other command. [`ProbeConfig::max_item_count`] tightens
//! the check for callers that want it.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use usbode_protocol::CommandBlock;

use crate::transport::{Bus, BusAddress, Transport};

/// Outcome of probing one responding target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compliance {
    /// Target completed the liveness exchange
    Compliant,
    /// Target answered selection but failed the liveness exchange
    NotCompliant,
}

impl Compliance {
    /// Whether the target speaks the USBODE command set
    pub fn is_compliant(self) -> bool {
        matches!(self, Compliance::Compliant)
    }
}

/// Configuration for probing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// When set, the probe must return one byte no greater than this value
    #[serde(default)]
    pub max_item_count: Option<u8>,
}

/// USBODE device prober
#[derive(Debug, Clone, Default)]
pub struct DeviceProber {
    config: ProbeConfig,
}

impl DeviceProber {
    /// Create a permissive prober
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a prober with custom configuration
    pub fn with_config(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Current configuration
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Whether the target at `address` is a compliant device
    pub fn probe<T: Transport>(&self, bus: &Bus<T>, address: BusAddress) -> bool {
        self.classify(bus, address).is_compliant()
    }

    /// Run the liveness exchange against `address`
    pub fn classify<T: Transport>(&self, bus: &Bus<T>, address: BusAddress) -> Compliance {
        let mut response = [0u8; 1];
        let read = match bus.exchange(address, &CommandBlock::item_count(), &mut response) {
            Ok(n) => n,
            Err(e) => {
                debug!("{} failed liveness probe: {}", address, e);
                return Compliance::NotCompliant;
            }
        };
        trace!("{} probe response: {:02X?}", address, &response[..read]);

        match self.config.max_item_count {
            None => Compliance::Compliant,
            Some(max) if read >= 1 && response[0] <= max => Compliance::Compliant,
            Some(max) => {
                debug!(
                    "{} probe response out of range ({} bytes, count {}, max {})",
                    address, read, response[0], max
                );
                Compliance::NotCompliant
            }
        }
    }
}
