//! Catalog records returned by the list-items query
//!
//! # Record Format
//! Each entry is a fixed 40-byte record:
//! ```text
//! [IDX] [KIND] [NAME x 33] [SIZE x 5]
//! ```
//!
//! - Byte 0: Entry index (used as the set-active parameter)
//! - Byte 1: Media kind tag (opaque)
//! - Bytes 2-34: Name, C string, at most 32 meaningful bytes
//! - Bytes 35-39: Size, big-endian. Only the low four bytes are decoded;
//!   the most significant byte is ignored.
//!
//! Records are packed back to back with no framing.

use tracing::trace;

use crate::error::ParseError;

/// Length of one packed catalog record
pub const ENTRY_LEN: usize = 40;

/// Width of the name field on the wire (32 bytes + terminator)
pub const NAME_FIELD_LEN: usize = 33;

/// Maximum number of meaningful name bytes
pub const NAME_MAX_LEN: usize = 32;

/// Width of the size field on the wire
pub const SIZE_FIELD_LEN: usize = 5;

/// Client-side catalog capacity
pub const MAX_CATALOG_ENTRIES: usize = 100;

const NAME_OFFSET: usize = 2;
const SIZE_OFFSET: usize = NAME_OFFSET + NAME_FIELD_LEN;

/// One emulatable disc image
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CatalogEntry {
    /// Index used to select this entry on the device
    pub index: u8,
    /// Media kind tag (passed through for display)
    pub kind: u8,
    /// Raw name bytes, bounded to 32 bytes and without the terminator
    name: heapless::Vec<u8, NAME_MAX_LEN>,
    /// Image size in bytes
    pub size_bytes: u64,
}

impl CatalogEntry {
    /// Create an entry. Names longer than 32 bytes are truncated.
    pub fn new(index: u8, kind: u8, name: impl AsRef<[u8]>, size_bytes: u64) -> Self {
        Self {
            index,
            kind,
            name: name_buffer(name.as_ref()),
            size_bytes,
        }
    }

    /// Decode one 40-byte record
    pub fn decode(record: &[u8; ENTRY_LEN]) -> Self {
        let name_field = &record[NAME_OFFSET..SIZE_OFFSET];
        let mut size_field = [0u8; SIZE_FIELD_LEN];
        size_field.copy_from_slice(&record[SIZE_OFFSET..]);

        let entry = Self {
            index: record[0],
            kind: record[1],
            name: name_buffer(name_field),
            size_bytes: u64::from(decode_size(&size_field)),
        };
        trace!("Decoded catalog entry {}: {:?}", entry.index, entry.name());
        entry
    }

    /// Encode this entry as a 40-byte record.
    ///
    /// The name field is always zero-terminated. Sizes above 32 bits are
    /// written in full but only the low 32 bits survive decoding.
    pub fn encode(&self) -> [u8; ENTRY_LEN] {
        let mut record = [0u8; ENTRY_LEN];
        record[0] = self.index;
        record[1] = self.kind;

        let name = bounded_name(&self.name);
        record[NAME_OFFSET..NAME_OFFSET + name.len()].copy_from_slice(name);

        let size = self.size_bytes.to_be_bytes();
        record[SIZE_OFFSET..].copy_from_slice(&size[8 - SIZE_FIELD_LEN..]);
        record
    }

    /// Name bytes as sent by the device
    pub fn name_bytes(&self) -> &[u8] {
        &self.name
    }

    /// Name for display (invalid UTF-8 is replaced)
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    /// Size in whole megabytes (floors)
    pub fn size_mb(&self) -> u64 {
        self.size_bytes / (1024 * 1024)
    }

    /// Size formatted as `"<n> MB"`
    pub fn size_display(&self) -> String {
        format!("{} MB", self.size_mb())
    }
}

/// Bound an untrusted name field: stop at the first NUL or after 32 bytes
fn bounded_name(field: &[u8]) -> &[u8] {
    let limit = field.len().min(NAME_MAX_LEN);
    let field = &field[..limit];
    match field.iter().position(|&b| b == 0) {
        Some(end) => &field[..end],
        None => field,
    }
}

/// Copy a bounded name into fixed-capacity storage
fn name_buffer(field: &[u8]) -> heapless::Vec<u8, NAME_MAX_LEN> {
    // bounded_name never yields more than NAME_MAX_LEN bytes
    heapless::Vec::from_slice(bounded_name(field)).unwrap_or_default()
}

/// Decode the 5-byte size field, dropping the most significant byte
pub fn decode_size(field: &[u8; SIZE_FIELD_LEN]) -> u32 {
    let [_, b1, b2, b3, b4] = *field;
    u32::from_be_bytes([b1, b2, b3, b4])
}

/// A snapshot of the device catalog, never larger than [`MAX_CATALOG_ENTRIES`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: heapless::Vec<CatalogEntry, MAX_CATALOG_ENTRIES>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode exactly `count` packed records from `payload`.
    ///
    /// `count` is clamped to the catalog capacity. A payload shorter than
    /// `count * ENTRY_LEN` is rejected as a whole; no partial catalog is built.
    pub fn decode(payload: &[u8], count: usize) -> Result<Self, ParseError> {
        let count = count.min(MAX_CATALOG_ENTRIES);
        let expected = count * ENTRY_LEN;
        if payload.len() < expected {
            return Err(ParseError::Truncated {
                expected,
                actual: payload.len(),
            });
        }

        let mut catalog = Self::new();
        let mut record = [0u8; ENTRY_LEN];
        for chunk in payload[..expected].chunks_exact(ENTRY_LEN) {
            record.copy_from_slice(chunk);
            // count is already clamped, so the push cannot overflow
            let _ = catalog.push(CatalogEntry::decode(&record));
        }
        Ok(catalog)
    }

    /// Append an entry, handing it back if the catalog is full
    pub fn push(&mut self, entry: CatalogEntry) -> Result<(), CatalogEntry> {
        self.entries.push(entry)
    }

    /// Look up an entry by its wire index
    pub fn find(&self, index: u8) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.index == index)
    }

    /// Whether this snapshot contains `entry` exactly
    pub fn contains(&self, entry: &CatalogEntry) -> bool {
        self.entries.iter().any(|e| e == entry)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Capacity of every catalog
    pub const fn capacity() -> usize {
        MAX_CATALOG_ENTRIES
    }

    /// Iterate entries in device order
    pub fn iter(&self) -> std::slice::Iter<'_, CatalogEntry> {
        self.entries.iter()
    }

    /// Entries as a slice
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a CatalogEntry;
    type IntoIter = std::slice::Iter<'a, CatalogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
