//! USBODE Simulation Library
//!
//! This crate provides a simulation layer for exercising the protocol
//! client without real hardware:
//!
//! - **VirtualBus**: implements `Transport` over eight simulated positions
//! - **VirtualDevice**: answers the vendor command set from an in-memory catalog
//!
//! # Example
//!
//! ```rust
//! use usbode_detect::{Bus, BusAddress, BusScanner};
//! use usbode_sim::{VirtualBus, VirtualDevice};
//!
//! let mut device = VirtualDevice::new();
//! device.add_disc("Myst", 1, 512 * 1024 * 1024);
//!
//! let mut virtual_bus = VirtualBus::new();
//! virtual_bus.attach_device(BusAddress::new(3).unwrap(), device);
//!
//! let bus = Bus::new(virtual_bus);
//! let found = BusScanner::new().find_first_compliant(&bus);
//! assert_eq!(found.map(|a| a.id()), Some(3));
//! ```

pub mod bus;
pub mod device;

pub use bus::{Faults, Target, TargetConfig, VirtualBus, VirtualBusConfig, VirtualTargetConfig};
pub use device::{DeviceReject, VirtualDevice, VirtualDeviceConfig, VirtualDiscConfig};
