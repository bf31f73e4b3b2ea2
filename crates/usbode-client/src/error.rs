//! Error types for the protocol client

use thiserror::Error;
use usbode_detect::{BusAddress, TransportError};
use usbode_protocol::ParseError;

/// Why a round trip to a compliant device failed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommunicationFailure {
    /// Transport reported an error at some stage of the exchange
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Exchange completed but returned fewer bytes than required
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// Response could not be decoded
    #[error("malformed response: {0}")]
    Decode(#[from] ParseError),
}

/// Errors that can occur in the protocol client
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// A round trip to an identified device failed
    #[error("communication with {address} failed: {cause}")]
    DeviceCommunication {
        address: BusAddress,
        #[source]
        cause: CommunicationFailure,
    },

    /// No compliant device is attached to the session
    #[error("no USBODE device found")]
    NoDevice,

    /// The session's device stopped answering and was dropped
    #[error("device at {address} lost: {cause}")]
    DeviceLost {
        address: BusAddress,
        #[source]
        cause: CommunicationFailure,
    },

    /// Entry does not belong to the current catalog snapshot
    #[error("entry {index} is not in the current catalog")]
    NotInCatalog { index: u8 },
}

impl ClientError {
    /// Build a communication error for `address`
    pub(crate) fn communication(address: BusAddress, cause: impl Into<CommunicationFailure>) -> Self {
        Self::DeviceCommunication {
            address,
            cause: cause.into(),
        }
    }

    /// Whether the device should be treated as unreachable
    pub fn is_device_unreachable(&self) -> bool {
        matches!(
            self,
            Self::DeviceCommunication { .. } | Self::DeviceLost { .. } | Self::NoDevice
        )
    }
}
