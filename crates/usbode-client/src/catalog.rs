//! Catalog queries
//!
//! The catalog is fetched in two round trips: an item-count query sizes the
//! read, then a list query transfers every record in one go. The count from
//! the most recent successful query is authoritative for sizing; any
//! mismatch with what the list query returns is a communication error.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use usbode_detect::{Bus, BusAddress, Transport};
use usbode_protocol::{Catalog, CommandBlock, ENTRY_LEN, MAX_CATALOG_ENTRIES};

use crate::error::{ClientError, CommunicationFailure};

/// Item count as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCount {
    /// Raw count byte
    pub reported: u8,
}

impl ItemCount {
    /// Count usable for sizing the list read, clamped to the catalog capacity
    pub fn usable(&self) -> usize {
        usize::from(self.reported).min(MAX_CATALOG_ENTRIES)
    }

    /// Whether the device reported more entries than the client stores
    pub fn is_clamped(&self) -> bool {
        usize::from(self.reported) > MAX_CATALOG_ENTRIES
    }
}

/// Issues count and list queries
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogClient;

impl CatalogClient {
    /// Create a catalog client
    pub fn new() -> Self {
        Self
    }

    /// Query the number of catalog entries
    pub fn query_count<T: Transport>(
        &self,
        bus: &Bus<T>,
        address: BusAddress,
    ) -> Result<ItemCount, ClientError> {
        let mut response = [0u8; 1];
        let read = bus
            .exchange(address, &CommandBlock::item_count(), &mut response)
            .map_err(|e| ClientError::communication(address, e))?;

        if read < 1 {
            return Err(ClientError::communication(
                address,
                CommunicationFailure::ShortRead {
                    expected: 1,
                    actual: read,
                },
            ));
        }

        let count = ItemCount {
            reported: response[0],
        };
        if count.is_clamped() {
            warn!(
                "{} reports {} entries, keeping the first {}",
                address,
                count.reported,
                MAX_CATALOG_ENTRIES
            );
        }
        debug!("{} reports {} catalog entries", address, count.reported);
        Ok(count)
    }

    /// Read `count` catalog records in one transfer.
    ///
    /// `count` is clamped to the catalog capacity. A zero count returns an
    /// empty catalog without touching the bus. Partially read data is
    /// discarded on any failure.
    pub fn query_list<T: Transport>(
        &self,
        bus: &Bus<T>,
        address: BusAddress,
        count: usize,
    ) -> Result<Catalog, ClientError> {
        let count = count.min(MAX_CATALOG_ENTRIES);
        if count == 0 {
            debug!("{} has no catalog entries, skipping list query", address);
            return Ok(Catalog::new());
        }

        let expected = count * ENTRY_LEN;
        let mut payload = vec![0u8; expected];
        let read = bus
            .exchange(address, &CommandBlock::list_items(), &mut payload)
            .map_err(|e| ClientError::communication(address, e))?;

        if read < expected {
            return Err(ClientError::communication(
                address,
                CommunicationFailure::ShortRead {
                    expected,
                    actual: read,
                },
            ));
        }

        let catalog =
            Catalog::decode(&payload, count).map_err(|e| ClientError::communication(address, e))?;
        info!("Read {} catalog entries from {}", catalog.len(), address);
        Ok(catalog)
    }

    /// Query the count, then the list sized by that count
    pub fn fetch<T: Transport>(
        &self,
        bus: &Bus<T>,
        address: BusAddress,
    ) -> Result<(ItemCount, Catalog), ClientError> {
        let count = self.query_count(bus, address)?;
        let catalog = self.query_list(bus, address, count.usable())?;
        Ok((count, catalog))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_count_clamp() {
        let small = ItemCount { reported: 3 };
        assert_eq!(small.usable(), 3);
        assert!(!small.is_clamped());

        let at_capacity = ItemCount { reported: 100 };
        assert_eq!(at_capacity.usable(), 100);
        assert!(!at_capacity.is_clamped());

        let large = ItemCount { reported: 150 };
        assert_eq!(large.usable(), 100);
        assert!(large.is_clamped());
    }
}
