//! Error types for bus access and detection

use thiserror::Error;

use crate::transport::BusAddress;

/// Failures reported by a [`Transport`](crate::Transport) implementation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Could not gain access to the bus
    #[error("bus arbitration failed: {0}")]
    Arbitration(String),

    /// Target did not answer selection
    #[error("selection of {address} failed: {reason}")]
    Selection { address: BusAddress, reason: String },

    /// Target rejected or did not accept the command block
    #[error("command 0x{opcode:02X} failed: {reason}")]
    Command { opcode: u8, reason: String },

    /// Data-in phase failed
    #[error("read failed: {0}")]
    Read(String),

    /// Transaction did not complete cleanly
    #[error("completion failed: {0}")]
    Complete(String),

    /// Transport timed out waiting for the target
    #[error("timeout after {0}ms")]
    Timeout(u64),
}

/// Errors that can occur during detection
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectError {
    /// Bus address outside the addressable range
    #[error("invalid bus address {0}: must be 0..=7")]
    InvalidAddress(u8),

    /// Opening or addressing a bus position failed
    #[error("{address} unreachable: {source}")]
    AddressUnreachable {
        address: BusAddress,
        #[source]
        source: TransportError,
    },
}
