//! Bus transport abstraction
//!
//! A [`Transport`] moves one command block to one target and optionally
//! reads a response. Every exchange follows the same sequence:
//!
//! ```text
//! open -> select(target) -> send_command(block) -> [read(buf)] -> complete
//! ```
//!
//! [`Exchange`] guarantees that `complete` runs on every exit path once
//! `open` succeeded, and [`Bus`] serializes exchanges behind a mutex since
//! the wire protocol has no request tagging.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use usbode_protocol::CommandBlock;

use crate::error::{DetectError, TransportError};

/// A target position on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BusAddress(u8);

impl BusAddress {
    /// Highest addressable id
    pub const MAX_ID: u8 = 7;

    /// Lowest bus position
    pub const MIN: BusAddress = BusAddress(0);

    /// Position conventionally occupied by the host itself
    pub const HOST: BusAddress = BusAddress(Self::MAX_ID);

    /// Create an address, rejecting ids above [`Self::MAX_ID`]
    pub fn new(id: u8) -> Result<Self, DetectError> {
        if id > Self::MAX_ID {
            return Err(DetectError::InvalidAddress(id));
        }
        Ok(Self(id))
    }

    /// Raw id
    pub fn id(self) -> u8 {
        self.0
    }

    /// Every addressable position, ascending
    pub fn all() -> impl Iterator<Item = BusAddress> {
        (0..=Self::MAX_ID).map(BusAddress)
    }

    /// Positions scanned by default: lowest up to, not including, the host
    pub fn scan_range() -> impl Iterator<Item = BusAddress> {
        (Self::MIN.0..Self::HOST.0).map(BusAddress)
    }
}

impl TryFrom<u8> for BusAddress {
    type Error = DetectError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BusAddress> for u8 {
    fn from(address: BusAddress) -> Self {
        address.0
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID {}", self.0)
    }
}

/// Synchronous request/response channel to the bus
pub trait Transport {
    /// Gain access to the bus
    fn open(&mut self) -> Result<(), TransportError>;

    /// Address a target
    fn select(&mut self, target: BusAddress) -> Result<(), TransportError>;

    /// Send a command block to the selected target
    fn send_command(&mut self, block: &CommandBlock) -> Result<(), TransportError>;

    /// Read the response into `buf`, returning the number of bytes transferred
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Finish the transaction and release the bus
    fn complete(&mut self) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn select(&mut self, target: BusAddress) -> Result<(), TransportError> {
        (**self).select(target)
    }

    fn send_command(&mut self, block: &CommandBlock) -> Result<(), TransportError> {
        (**self).send_command(block)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read(buf)
    }

    fn complete(&mut self) -> Result<(), TransportError> {
        (**self).complete()
    }
}

/// One open transaction against a selected target
///
/// Dropping an unfinished exchange completes it.
pub struct Exchange<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    address: BusAddress,
    finished: bool,
}

impl<'a, T: Transport + ?Sized> Exchange<'a, T> {
    /// Open the bus and select `address`.
    ///
    /// If opening fails nothing needs completing. If selection fails the
    /// transaction is completed before the error is returned.
    pub fn begin(transport: &'a mut T, address: BusAddress) -> Result<Self, TransportError> {
        transport.open()?;

        let mut exchange = Self {
            transport,
            address,
            finished: false,
        };
        exchange.transport.select(address)?;
        Ok(exchange)
    }

    /// Target of this exchange
    pub fn address(&self) -> BusAddress {
        self.address
    }

    /// Send a command block
    pub fn command(&mut self, block: &CommandBlock) -> Result<(), TransportError> {
        trace!("{} <- {:02X?}", self.address, block.as_bytes());
        self.transport.send_command(block)
    }

    /// Read a response
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = self.transport.read(buf)?;
        trace!("{} -> {:02X?}", self.address, &buf[..n.min(buf.len())]);
        Ok(n)
    }

    /// Complete the transaction, reporting completion errors
    pub fn finish(mut self) -> Result<(), TransportError> {
        self.finished = true;
        self.transport.complete()
    }
}

impl<T: Transport + ?Sized> Drop for Exchange<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.transport.complete() {
                warn!("Failed to complete exchange with {}: {}", self.address, e);
            }
        }
    }
}

/// Exclusive owner of a transport
///
/// Each call holds the lock for exactly one exchange, so concurrent
/// callers never interleave commands on the wire.
pub struct Bus<T> {
    transport: Mutex<T>,
}

impl<T: Transport> Bus<T> {
    /// Wrap a transport
    pub fn new(transport: T) -> Self {
        Self {
            transport: Mutex::new(transport),
        }
    }

    /// Run one full exchange: select `address`, send `block`, and read into
    /// `response` unless it is empty. Returns the number of bytes read.
    pub fn exchange(
        &self,
        address: BusAddress,
        block: &CommandBlock,
        response: &mut [u8],
    ) -> Result<usize, TransportError> {
        let mut transport = self.transport.lock();
        debug!(
            "Exchange with {}: opcode 0x{:02X} param 0x{:02X}",
            address,
            block.opcode_byte(),
            block.parameter()
        );

        let mut exchange = Exchange::begin(&mut *transport, address)?;
        exchange.command(block)?;

        let read = if response.is_empty() {
            0
        } else {
            exchange.read(response)?
        };

        exchange.finish()?;
        Ok(read)
    }

    /// Open the bus and select `address` without sending a command
    pub fn select(&self, address: BusAddress) -> Result<(), TransportError> {
        let mut transport = self.transport.lock();
        let exchange = Exchange::begin(&mut *transport, address)?;
        exchange.finish()
    }

    /// Run `f` with exclusive access to the underlying transport
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.transport.lock())
    }

    /// Unwrap the transport
    pub fn into_inner(self) -> T {
        self.transport.into_inner()
    }
}
