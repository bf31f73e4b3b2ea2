//! USBODE Protocol Library
//!
//! This crate provides encoding and decoding for the vendor command set
//! spoken by USBODE virtual optical drives:
//!
//! - **Command blocks**: fixed 12-byte blocks, opcode in byte 0, parameter in byte 1
//! - **Catalog records**: packed 40-byte entries returned by the list-items query
//!
//! The crate is pure: no I/O happens here. Bus access lives in `usbode-detect`.
//!
//! # Example
//!
//! ```rust
//! use usbode_protocol::{build, Catalog, CatalogEntry, Opcode};
//!
//! let block = build(Opcode::SetActiveItem, 3);
//! assert_eq!(&block.as_bytes()[..2], &[0xD8u8, 0x03]);
//!
//! let entry = CatalogEntry::new(3, 1, "Marathon", 1_048_576);
//! let catalog = Catalog::decode(&entry.encode(), 1).unwrap();
//! assert_eq!(catalog.find(3).map(|e| e.size_display()), Some("1 MB".to_string()));
//! ```

pub mod catalog;
pub mod command;
pub mod error;

pub use catalog::{
    decode_size, Catalog, CatalogEntry, ENTRY_LEN, MAX_CATALOG_ENTRIES, NAME_FIELD_LEN,
    NAME_MAX_LEN, SIZE_FIELD_LEN,
};
pub use command::{build, CommandBlock, Opcode, COMMAND_LEN};
pub use error::ParseError;

/// Trait for catalog records that can be appended to a response payload
pub trait EncodeRecord {
    /// Encode this value to its wire format
    fn encode_to(&self, out: &mut Vec<u8>);
}

impl EncodeRecord for CatalogEntry {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.encode());
    }
}
