//! Error types for USBODE wire decoding

use thiserror::Error;

/// Errors that can occur while decoding protocol data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Opcode is not part of the USBODE command set
    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),

    /// Command block shorter than the fixed wire length
    #[error("short command block: need {expected} bytes, got {actual}")]
    ShortCommand { expected: usize, actual: usize },

    /// Catalog payload ended before the requested number of records
    #[error("truncated catalog: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}
