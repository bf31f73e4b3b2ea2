//! Session events
//!
//! The presentation layer drains these after each call to render status
//! and error states without inspecting session internals.

use usbode_detect::BusAddress;

/// Events emitted by a [`Session`](crate::Session)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A compliant device was attached to the session
    DeviceFound(BusAddress),

    /// The session's device stopped answering and was dropped
    DeviceLost(BusAddress),

    /// The catalog was replaced
    CatalogRefreshed {
        /// Device the catalog came from
        address: BusAddress,
        /// Number of entries in the new snapshot
        count: usize,
    },

    /// The device reported more entries than the catalog can hold
    CapacityExceeded {
        /// Count as reported by the device
        reported: u8,
        /// Count kept by the client
        kept: usize,
    },

    /// The believed active entry changed
    ActiveEntryChanged {
        /// Previously believed active entry
        from: Option<u8>,
        /// Newly activated entry
        to: u8,
    },

    /// An operation failed
    Error(String),
}
