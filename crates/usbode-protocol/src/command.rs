//! USBODE command blocks
//!
//! Every command is sent as a fixed 12-byte block regardless of opcode:
//!
//! ```text
//! [OP] [PARAM] [00] [00] [00] [00] [00] [00] [00] [00] [00] [00]
//! ```
//!
//! - Byte 0: Opcode
//! - Byte 1: Parameter (entry index for set-active, otherwise zero)
//! - Bytes 2-11: Always zero

use std::fmt;

use crate::error::ParseError;

/// Fixed length of every command block on the wire
pub const COMMAND_LEN: usize = 12;

/// USBODE vendor command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Opcode {
    /// List files on the device storage (unused by the client)
    ListFiles = 0xD0,
    /// Query the image catalog (response: packed 40-byte records)
    ListItems = 0xD7,
    /// Select the image to emulate next (parameter: entry index)
    SetActiveItem = 0xD8,
    /// List emulated devices (unused by the client)
    ListDevices = 0xD9,
    /// Query the number of catalog entries (response: 1 byte)
    ItemCount = 0xDA,
}

impl Opcode {
    /// Raw opcode byte
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable command name
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::ListFiles => "list files",
            Opcode::ListItems => "query item list",
            Opcode::SetActiveItem => "set active item",
            Opcode::ListDevices => "list devices",
            Opcode::ItemCount => "query item count",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0xD0 => Ok(Self::ListFiles),
            0xD7 => Ok(Self::ListItems),
            0xD8 => Ok(Self::SetActiveItem),
            0xD9 => Ok(Self::ListDevices),
            0xDA => Ok(Self::ItemCount),
            _ => Err(ParseError::UnknownOpcode(value)),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.as_u8())
    }
}

/// An immutable 12-byte command block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBlock([u8; COMMAND_LEN]);

impl CommandBlock {
    /// Build a command block for a known opcode
    pub fn new(opcode: Opcode, parameter: u8) -> Self {
        Self::raw(opcode.as_u8(), parameter)
    }

    /// Build a command block from a raw opcode byte
    pub fn raw(opcode: u8, parameter: u8) -> Self {
        let mut bytes = [0u8; COMMAND_LEN];
        bytes[0] = opcode;
        bytes[1] = parameter;
        Self(bytes)
    }

    /// Item count query
    pub fn item_count() -> Self {
        Self::new(Opcode::ItemCount, 0)
    }

    /// Catalog list query
    pub fn list_items() -> Self {
        Self::new(Opcode::ListItems, 0)
    }

    /// Set-active command carrying the raw entry index
    pub fn set_active_item(index: u8) -> Self {
        Self::new(Opcode::SetActiveItem, index)
    }

    /// Parse a block received from the bus.
    ///
    /// Only the first [`COMMAND_LEN`] bytes are considered; the trailing
    /// ten bytes are carried as-is.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < COMMAND_LEN {
            return Err(ParseError::ShortCommand {
                expected: COMMAND_LEN,
                actual: bytes.len(),
            });
        }

        let mut block = [0u8; COMMAND_LEN];
        block.copy_from_slice(&bytes[..COMMAND_LEN]);
        Ok(Self(block))
    }

    /// Raw opcode byte
    pub fn opcode_byte(&self) -> u8 {
        self.0[0]
    }

    /// Decoded opcode, if known
    pub fn opcode(&self) -> Result<Opcode, ParseError> {
        Opcode::try_from(self.0[0])
    }

    /// Parameter byte
    pub fn parameter(&self) -> u8 {
        self.0[1]
    }

    /// Wire bytes
    pub fn as_bytes(&self) -> &[u8; COMMAND_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for CommandBlock {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Build a command block (opcode at offset 0, parameter at offset 1, zeros elsewhere)
pub fn build(opcode: Opcode, parameter: u8) -> CommandBlock {
    CommandBlock::new(opcode, parameter)
}
