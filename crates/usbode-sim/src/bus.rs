//! Virtual bus
//!
//! Implements [`Transport`] over eight simulated positions. Each position
//! is empty, holds a foreign target that answers selection but rejects
//! vendor commands, or holds a [`VirtualDevice`].
//!
//! The bus enforces the open/select/command/read/complete sequence and
//! rejects out-of-order calls, so tests can assert scoped acquisition by
//! comparing [`VirtualBus::open_count`] and [`VirtualBus::complete_count`].

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use usbode_detect::{BusAddress, Transport, TransportError};
use usbode_protocol::{CommandBlock, Opcode, ENTRY_LEN};

use crate::device::{VirtualDevice, VirtualDeviceConfig};

/// What occupies a bus position
#[derive(Debug, Clone, Default)]
pub enum Target {
    /// Nothing answers selection
    #[default]
    Empty,
    /// Some other peripheral
    Foreign,
    /// A USBODE device
    Device(VirtualDevice),
}

/// Serializable description of a bus position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetConfig {
    /// Some other peripheral
    Foreign,
    /// A USBODE device
    Device(VirtualDeviceConfig),
}

/// One occupied position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualTargetConfig {
    /// Position on the bus
    pub address: BusAddress,
    /// Occupant
    pub target: TargetConfig,
}

/// Configuration for creating a virtual bus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualBusConfig {
    /// Occupied positions; anything not listed is empty
    #[serde(default)]
    pub targets: Vec<VirtualTargetConfig>,
}

/// Fault injection switches
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Bus arbitration always fails
    pub fail_open: bool,
    /// List transfers deliver this many entries and then fail
    pub fail_list_after: Option<usize>,
    /// Every command after this many accepted commands times out
    pub fail_commands_after: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Open,
    Selected(BusAddress),
    DataIn {
        address: BusAddress,
        opcode: u8,
        payload: Vec<u8>,
    },
}

/// A simulated bus with up to eight targets
#[derive(Debug, Clone)]
pub struct VirtualBus {
    targets: Vec<Target>,
    phase: Phase,
    faults: Faults,
    log: Vec<(BusAddress, CommandBlock)>,
    accepted_commands: usize,
    opens: usize,
    completes: usize,
}

impl Default for VirtualBus {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualBus {
    /// Create a bus with every position empty
    pub fn new() -> Self {
        Self {
            targets: BusAddress::all().map(|_| Target::Empty).collect(),
            phase: Phase::Idle,
            faults: Faults::default(),
            log: Vec::new(),
            accepted_commands: 0,
            opens: 0,
            completes: 0,
        }
    }

    /// Create a bus from configuration
    pub fn from_config(config: &VirtualBusConfig) -> Self {
        let mut bus = Self::new();
        for target in &config.targets {
            match &target.target {
                TargetConfig::Foreign => bus.attach_foreign(target.address),
                TargetConfig::Device(device) => {
                    bus.attach_device(target.address, VirtualDevice::from_config(device))
                }
            }
        }
        bus
    }

    /// Place a USBODE device at `address`
    pub fn attach_device(&mut self, address: BusAddress, device: VirtualDevice) {
        self.targets[usize::from(address.id())] = Target::Device(device);
    }

    /// Place a foreign peripheral at `address`
    pub fn attach_foreign(&mut self, address: BusAddress) {
        self.targets[usize::from(address.id())] = Target::Foreign;
    }

    /// Empty `address`
    pub fn detach(&mut self, address: BusAddress) -> Target {
        std::mem::take(&mut self.targets[usize::from(address.id())])
    }

    /// Occupant of `address`
    pub fn target(&self, address: BusAddress) -> &Target {
        &self.targets[usize::from(address.id())]
    }

    /// Device at `address`, if any
    pub fn device(&self, address: BusAddress) -> Option<&VirtualDevice> {
        match self.target(address) {
            Target::Device(device) => Some(device),
            _ => None,
        }
    }

    /// Mutable device at `address`, if any
    pub fn device_mut(&mut self, address: BusAddress) -> Option<&mut VirtualDevice> {
        match &mut self.targets[usize::from(address.id())] {
            Target::Device(device) => Some(device),
            _ => None,
        }
    }

    /// Fault injection switches
    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    /// Every command block sent, with its target
    pub fn command_log(&self) -> &[(BusAddress, CommandBlock)] {
        &self.log
    }

    /// Commands sent to `address`
    pub fn commands_to(&self, address: BusAddress) -> Vec<CommandBlock> {
        self.log
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, block)| *block)
            .collect()
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.opens
    }

    /// Number of completions
    pub fn complete_count(&self) -> usize {
        self.completes
    }

    /// Whether no transaction is in progress
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    fn commands_exhausted(&self) -> bool {
        self.faults
            .fail_commands_after
            .is_some_and(|limit| self.accepted_commands >= limit)
    }
}

impl Transport for VirtualBus {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.faults.fail_open {
            return Err(TransportError::Arbitration("arbitration lost".into()));
        }
        if self.phase != Phase::Idle {
            return Err(TransportError::Arbitration("bus busy".into()));
        }
        self.opens += 1;
        self.phase = Phase::Open;
        Ok(())
    }

    fn select(&mut self, target: BusAddress) -> Result<(), TransportError> {
        if self.phase != Phase::Open {
            return Err(TransportError::Selection {
                address: target,
                reason: "bus not arbitrated".into(),
            });
        }

        if matches!(self.target(target), Target::Empty) {
            return Err(TransportError::Selection {
                address: target,
                reason: "selection timeout".into(),
            });
        }

        trace!("Selected {}", target);
        self.phase = Phase::Selected(target);
        Ok(())
    }

    fn send_command(&mut self, block: &CommandBlock) -> Result<(), TransportError> {
        let address = match self.phase {
            Phase::Selected(address) => address,
            _ => {
                return Err(TransportError::Command {
                    opcode: block.opcode_byte(),
                    reason: "no target selected".into(),
                })
            }
        };
        self.log.push((address, *block));

        if self.commands_exhausted() {
            debug!("{} stopped responding", address);
            return Err(TransportError::Timeout(250));
        }

        let payload = match &mut self.targets[usize::from(address.id())] {
            Target::Device(device) => {
                device
                    .handle_command(block)
                    .map_err(|e| TransportError::Command {
                        opcode: block.opcode_byte(),
                        reason: e.to_string(),
                    })?
            }
            Target::Foreign => {
                return Err(TransportError::Command {
                    opcode: block.opcode_byte(),
                    reason: "illegal request".into(),
                })
            }
            Target::Empty => {
                return Err(TransportError::Command {
                    opcode: block.opcode_byte(),
                    reason: "target disconnected".into(),
                })
            }
        };

        self.accepted_commands += 1;
        self.phase = Phase::DataIn {
            address,
            opcode: block.opcode_byte(),
            payload,
        };
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let (address, opcode, payload) = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::DataIn {
                address,
                opcode,
                payload,
            } => (address, opcode, payload),
            other => {
                self.phase = other;
                return Err(TransportError::Read("no data phase".into()));
            }
        };
        self.phase = Phase::Selected(address);

        let n = buf.len().min(payload.len());
        if opcode == Opcode::ListItems.as_u8() {
            if let Some(entries) = self.faults.fail_list_after {
                let partial = n.min(entries * ENTRY_LEN);
                buf[..partial].copy_from_slice(&payload[..partial]);
                return Err(TransportError::Read(format!(
                    "transfer aborted after {} bytes",
                    partial
                )));
            }
        }

        buf[..n].copy_from_slice(&payload[..n]);
        Ok(n)
    }

    fn complete(&mut self) -> Result<(), TransportError> {
        if self.phase == Phase::Idle {
            return Err(TransportError::Complete("no transaction in progress".into()));
        }
        self.completes += 1;
        self.phase = Phase::Idle;
        Ok(())
    }
}
