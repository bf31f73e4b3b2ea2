//! Integration tests for the USBODE protocol client
//!
//! These tests drive the client against the simulated bus and verify:
//! - Scan ordering and compliance classification
//! - Catalog count/list round trips, clamping and size decoding
//! - Pass-through activation and the believed active entry
//! - Device-lost handling and discarded partial catalogs
//! - Open/complete pairing on every exit path

use usbode_client::{
    CatalogClient, ClientError, CommunicationFailure, DiscSelector, Session, SessionConfig,
    SessionEvent,
};
use usbode_detect::{
    Bus, BusAddress, BusScanner, Compliance, ProbeConfig, ScanEntry, TransportError,
};
use usbode_protocol::{CatalogEntry, Opcode, MAX_CATALOG_ENTRIES};
use usbode_sim::{VirtualBus, VirtualDevice};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub fn addr(id: u8) -> BusAddress {
        BusAddress::new(id).unwrap()
    }

    /// Device with three images; the first and last have a size field whose top byte is set
    pub fn three_disc_device() -> VirtualDevice {
        let mut device = VirtualDevice::new();
        device.add_entry(CatalogEntry::new(0, 1, "System 7.5.3", 0xFF_0010_0000));
        device.add_entry(CatalogEntry::new(1, 1, "Myst", 512 * 1024 * 1024));
        device.add_entry(CatalogEntry::new(2, 2, "Marathon", 0x80_0020_0000));
        device
    }

    /// Device with `n` images named by index
    pub fn device_with(n: usize) -> VirtualDevice {
        let mut device = VirtualDevice::new();
        for i in 0..n {
            device.add_disc(&format!("Disc {}", i), 1, 1024 * 1024);
        }
        device
    }

    /// Bus with a foreign target at 1 and a three-image device at 4
    pub fn standard_bus() -> VirtualBus {
        let mut bus = VirtualBus::new();
        bus.attach_foreign(addr(1));
        bus.attach_device(addr(4), three_disc_device());
        bus
    }

    /// Assert every opened transaction was completed and the bus is idle
    pub fn assert_balanced(bus: &Bus<VirtualBus>) {
        bus.with_transport(|t| {
            assert_eq!(t.open_count(), t.complete_count());
            assert!(t.is_idle());
        });
    }

    /// Opcodes sent to `address`
    pub fn opcodes_to(bus: &Bus<VirtualBus>, address: BusAddress) -> Vec<u8> {
        bus.with_transport(|t| {
            t.commands_to(address)
                .iter()
                .map(|b| b.opcode_byte())
                .collect()
        })
    }
}

use helpers::addr;

// ============================================================================
// Bus Scan Tests
// ============================================================================

mod scan_tests {
    use super::*;

    #[test]
    fn scan_returns_compliant_subset_in_order() {
        let mut virtual_bus = VirtualBus::new();
        virtual_bus.attach_device(addr(5), helpers::device_with(1));
        virtual_bus.attach_foreign(addr(0));
        virtual_bus.attach_device(addr(2), helpers::device_with(0));
        virtual_bus.attach_foreign(addr(3));
        let bus = Bus::new(virtual_bus);

        let entries: Vec<ScanEntry> = BusScanner::new().scan(&bus).collect();
        let summary: Vec<(u8, bool)> = entries
            .iter()
            .map(|e| (e.address.id(), e.is_compliant()))
            .collect();

        assert_eq!(
            summary,
            vec![(0, false), (2, true), (3, false), (5, true)]
        );
        helpers::assert_balanced(&bus);
    }

    #[test]
    fn scan_continues_past_unaddressable_positions() {
        let mut virtual_bus = VirtualBus::new();
        virtual_bus.attach_device(addr(6), helpers::device_with(2));
        let bus = Bus::new(virtual_bus);

        let entries: Vec<_> = BusScanner::new().scan(&bus).collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, addr(6));
        assert_eq!(entries[0].compliance, Compliance::Compliant);
    }

    #[test]
    fn scan_with_failed_arbitration_finds_nothing() {
        let mut virtual_bus = helpers::standard_bus();
        virtual_bus.faults_mut().fail_open = true;
        let bus = Bus::new(virtual_bus);

        assert_eq!(BusScanner::new().scan(&bus).count(), 0);
        helpers::assert_balanced(&bus);
    }

    #[test]
    fn first_compliant_stops_early() {
        let mut virtual_bus = VirtualBus::new();
        virtual_bus.attach_device(addr(1), helpers::device_with(1));
        virtual_bus.attach_device(addr(5), helpers::device_with(1));
        let bus = Bus::new(virtual_bus);

        assert_eq!(BusScanner::new().find_first_compliant(&bus), Some(addr(1)));
        assert!(helpers::opcodes_to(&bus, addr(5)).is_empty());
    }

    #[test]
    fn permissive_probe_accepts_any_count() {
        let mut device = helpers::device_with(0);
        device.set_reported_count(Some(250));
        let mut virtual_bus = VirtualBus::new();
        virtual_bus.attach_device(addr(3), device);
        let bus = Bus::new(virtual_bus);

        assert_eq!(BusScanner::new().find_first_compliant(&bus), Some(addr(3)));
    }

    #[test]
    fn strict_probe_rejects_insane_count() {
        let mut device = helpers::device_with(0);
        device.set_reported_count(Some(250));
        let mut virtual_bus = VirtualBus::new();
        virtual_bus.attach_device(addr(3), device);

        let config = SessionConfig {
            probe: ProbeConfig {
                max_item_count: Some(100),
            },
            ..Default::default()
        };
        let mut session = Session::with_config(virtual_bus, config);

        assert_eq!(session.connect(), Err(ClientError::NoDevice));
        let report = session.scan_report();
        assert_eq!(report.entries[0].compliance, Compliance::NotCompliant);
    }
}

// ============================================================================
// Catalog Client Tests
// ============================================================================

mod catalog_tests {
    use super::*;

    #[test]
    fn count_then_list_yields_three_entries() {
        let bus = Bus::new(helpers::standard_bus());
        let client = CatalogClient::new();

        let count = client.query_count(&bus, addr(4)).unwrap();
        assert_eq!(count.reported, 3);

        let catalog = client.query_list(&bus, addr(4), count.usable()).unwrap();
        assert_eq!(catalog.len(), 3);

        let first = catalog.find(0).unwrap();
        assert_eq!(first.size_bytes, 0x0010_0000);
        assert_eq!(first.size_bytes, 1_048_576);
        assert_eq!(first.size_display(), "1 MB");
        assert_eq!(catalog.find(1).unwrap().size_display(), "512 MB");
        let last = catalog.find(2).unwrap();
        assert_eq!(last.name(), "Marathon");
        assert_eq!(last.size_bytes, 2 * 1024 * 1024);
        assert_eq!(last.size_display(), "2 MB");
        helpers::assert_balanced(&bus);
    }

    #[test]
    fn zero_count_list_skips_bulk_read() {
        let bus = Bus::new(helpers::standard_bus());
        let client = CatalogClient::new();

        let catalog = client.query_list(&bus, addr(4), 0).unwrap();
        assert!(catalog.is_empty());
        assert!(helpers::opcodes_to(&bus, addr(4)).is_empty());
    }

    #[test]
    fn empty_device_fetch() {
        let mut virtual_bus = VirtualBus::new();
        virtual_bus.attach_device(addr(0), helpers::device_with(0));
        let bus = Bus::new(virtual_bus);

        let (count, catalog) = CatalogClient::new().fetch(&bus, addr(0)).unwrap();
        assert_eq!(count.reported, 0);
        assert!(catalog.is_empty());
        assert_eq!(
            helpers::opcodes_to(&bus, addr(0)),
            vec![Opcode::ItemCount.as_u8()]
        );
    }

    #[test]
    fn oversized_count_is_clamped() {
        let mut device = helpers::device_with(150);
        device.set_reported_count(Some(150));
        let mut virtual_bus = VirtualBus::new();
        virtual_bus.attach_device(addr(2), device);
        let bus = Bus::new(virtual_bus);

        let (count, catalog) = CatalogClient::new().fetch(&bus, addr(2)).unwrap();
        assert_eq!(count.reported, 150);
        assert!(count.is_clamped());
        assert_eq!(catalog.len(), MAX_CATALOG_ENTRIES);
        assert_eq!(catalog.entries().last().map(|e| e.index), Some(99));
    }

    #[test]
    fn transfer_failure_discards_partial_catalog() {
        let mut virtual_bus = helpers::standard_bus();
        virtual_bus.faults_mut().fail_list_after = Some(1);
        let bus = Bus::new(virtual_bus);

        let err = CatalogClient::new()
            .query_list(&bus, addr(4), 3)
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::DeviceCommunication {
                cause: CommunicationFailure::Transport(TransportError::Read(_)),
                ..
            }
        ));
        helpers::assert_balanced(&bus);
    }

    #[test]
    fn short_list_is_communication_error() {
        // Device reports five images but only holds three
        let mut virtual_bus = helpers::standard_bus();
        if let Some(device) = virtual_bus.device_mut(addr(4)) {
            device.set_reported_count(Some(5));
        }
        let bus = Bus::new(virtual_bus);

        let err = CatalogClient::new().fetch(&bus, addr(4)).unwrap_err();
        assert_eq!(
            err,
            ClientError::DeviceCommunication {
                address: addr(4),
                cause: CommunicationFailure::ShortRead {
                    expected: 200,
                    actual: 120,
                },
            }
        );
    }

    #[test]
    fn count_on_foreign_target_fails() {
        let bus = Bus::new(helpers::standard_bus());
        let err = CatalogClient::new().query_count(&bus, addr(1)).unwrap_err();
        assert!(err.is_device_unreachable());
        helpers::assert_balanced(&bus);
    }
}

// ============================================================================
// Disc Selector Tests
// ============================================================================

mod selector_tests {
    use super::*;

    #[test]
    fn activate_sends_raw_index() {
        let bus = Bus::new(helpers::standard_bus());
        let mut selector = DiscSelector::new();

        // 77 is not in the catalog; it is sent anyway
        selector.activate(&bus, addr(4), 77).unwrap();

        assert_eq!(selector.active(), Some(77));
        bus.with_transport(|t| {
            let blocks = t.commands_to(addr(4));
            assert_eq!(blocks.len(), 1);
            assert_eq!(blocks[0].opcode(), Ok(Opcode::SetActiveItem));
            assert_eq!(blocks[0].parameter(), 77);
            assert_eq!(t.device(addr(4)).unwrap().active_index(), Some(77));
        });
    }

    #[test]
    fn failed_activate_keeps_previous_marker() {
        let bus = Bus::new(helpers::standard_bus());
        let mut selector = DiscSelector::new();
        selector.activate(&bus, addr(4), 1).unwrap();

        bus.with_transport(|t| {
            t.detach(addr(4));
        });
        assert!(selector.activate(&bus, addr(4), 2).is_err());
        assert_eq!(selector.active(), Some(1));
        helpers::assert_balanced(&bus);
    }
}

// ============================================================================
// Session Tests
// ============================================================================

mod session_tests {
    use super::*;

    fn connected_session() -> Session<VirtualBus> {
        let mut session = Session::new(helpers::standard_bus());
        session.connect().unwrap();
        session.drain_events();
        session
    }

    #[test]
    fn connect_attaches_first_compliant_device() {
        let mut session = Session::new(helpers::standard_bus());

        assert_eq!(session.connect(), Ok(addr(4)));
        let device = session.device().unwrap();
        assert_eq!(device.address(), addr(4));
        assert!(device.catalog().is_empty());
        assert_eq!(session.drain_events(), vec![SessionEvent::DeviceFound(addr(4))]);
    }

    #[test]
    fn connect_without_device() {
        let mut virtual_bus = VirtualBus::new();
        virtual_bus.attach_foreign(addr(2));
        let mut session = Session::new(virtual_bus);

        assert_eq!(session.connect(), Err(ClientError::NoDevice));
        assert!(session.device().is_none());
        assert_eq!(session.refresh().unwrap_err(), ClientError::NoDevice);
        assert_eq!(session.activate(0), Err(ClientError::NoDevice));
    }

    #[test]
    fn refresh_replaces_catalog() {
        let mut session = connected_session();

        assert_eq!(session.refresh().unwrap().len(), 3);
        assert_eq!(session.device().unwrap().generation(), 1);

        session.bus().with_transport(|t| {
            if let Some(device) = t.device_mut(addr(4)) {
                device.clear();
                device.add_disc("Only", 1, 4096);
            }
        });

        let catalog = session.refresh().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.find(0).unwrap().name(), "Only");
        assert_eq!(session.device().unwrap().generation(), 2);

        let events = session.drain_events();
        assert!(events.contains(&SessionEvent::CatalogRefreshed {
            address: addr(4),
            count: 1
        }));
    }

    #[test]
    fn activate_entry_updates_marker() {
        let mut session = connected_session();
        let entry = session.refresh().unwrap().find(1).cloned().unwrap();
        session.drain_events();

        session.activate_entry(&entry).unwrap();

        assert_eq!(session.active_index(), Some(1));
        assert_eq!(session.active_entry().map(|e| e.name()), Some("Myst".into()));
        assert_eq!(
            session.drain_events(),
            vec![SessionEvent::ActiveEntryChanged { from: None, to: 1 }]
        );
    }

    #[test]
    fn refresh_clears_active_marker() {
        let mut session = connected_session();
        session.refresh().unwrap();
        session.activate(2).unwrap();
        assert_eq!(session.active_index(), Some(2));

        session.refresh().unwrap();
        assert_eq!(session.active_index(), None);
        assert!(session.active_entry().is_none());
    }

    #[test]
    fn stale_entry_is_rejected() {
        let mut session = connected_session();
        let stale = session.refresh().unwrap().find(2).cloned().unwrap();

        session.bus().with_transport(|t| {
            if let Some(device) = t.device_mut(addr(4)) {
                device.clear();
                device.add_disc("Replacement", 1, 1024);
            }
        });
        session.refresh().unwrap();

        assert_eq!(
            session.activate_entry(&stale),
            Err(ClientError::NotInCatalog { index: 2 })
        );
        session.bus().with_transport(|t| {
            let sent = t.commands_to(addr(4));
            assert!(sent
                .iter()
                .all(|b| b.opcode() != Ok(Opcode::SetActiveItem)));
        });
    }

    #[test]
    fn raw_activate_is_pass_through() {
        let mut session = connected_session();
        session.refresh().unwrap();

        session.activate(200).unwrap();
        assert_eq!(session.active_index(), Some(200));
        assert!(session.active_entry().is_none());
    }

    #[test]
    fn failed_list_loses_device() {
        let mut session = connected_session();
        session.bus().with_transport(|t| t.faults_mut().fail_list_after = Some(1));

        let err = session.refresh().unwrap_err();
        assert!(matches!(err, ClientError::DeviceLost { address, .. } if address == addr(4)));
        assert!(session.device().is_none());
        assert!(session.catalog().is_none());

        let events = session.drain_events();
        assert!(events.contains(&SessionEvent::DeviceLost(addr(4))));
        helpers::assert_balanced(session.bus());
    }

    #[test]
    fn vanished_device_between_count_and_list() {
        let mut session = connected_session();
        session.refresh().unwrap();
        session.activate(0).unwrap();

        // Allow the count query of the next refresh, then stop answering
        session.bus().with_transport(|t| {
            let accepted = t
                .command_log()
                .iter()
                .filter(|(a, _)| *a == addr(4))
                .count();
            t.faults_mut().fail_commands_after = Some(accepted + 1);
        });

        let err = session.refresh().unwrap_err();
        assert!(matches!(
            err,
            ClientError::DeviceLost {
                cause: CommunicationFailure::Transport(TransportError::Timeout(_)),
                ..
            }
        ));
        assert_eq!(session.active_index(), None);
        helpers::assert_balanced(session.bus());
    }

    #[test]
    fn failed_activate_loses_device() {
        let mut session = connected_session();
        session.refresh().unwrap();
        session.bus().with_transport(|t| {
            t.detach(addr(4));
        });

        assert!(matches!(
            session.activate(1),
            Err(ClientError::DeviceLost { .. })
        ));
        assert!(session.device().is_none());
    }

    #[test]
    fn rescan_after_device_lost() {
        let mut session = connected_session();
        session.bus().with_transport(|t| {
            t.detach(addr(4));
            t.attach_device(addr(6), helpers::device_with(2));
        });
        assert!(session.refresh().is_err());

        assert_eq!(session.connect(), Ok(addr(6)));
        assert_eq!(session.refresh().unwrap().len(), 2);
    }

    #[test]
    fn capacity_exceeded_event() {
        let mut device = helpers::device_with(120);
        device.set_reported_count(Some(120));
        let mut virtual_bus = VirtualBus::new();
        virtual_bus.attach_device(addr(0), device);

        let mut session = Session::new(virtual_bus);
        session.connect().unwrap();
        assert_eq!(session.refresh().unwrap().len(), 100);

        let events = session.drain_events();
        assert!(events.contains(&SessionEvent::CapacityExceeded {
            reported: 120,
            kept: 100
        }));
    }

    #[test]
    fn scan_report_marks_active_device() {
        let session = connected_session();
        let report = session.scan_report();

        assert_eq!(
            report.to_string(),
            "Device Scan:\n\nID 1: Unknown Device\nID 4: USBODE (active)\n\nTotal: 2"
        );
    }
}

// ============================================================================
// Concurrency Tests
// ============================================================================

mod concurrency_tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_callers_never_interleave() {
        let bus = Arc::new(Bus::new(helpers::standard_bus()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bus = Arc::clone(&bus);
                thread::spawn(move || {
                    let client = CatalogClient::new();
                    for _ in 0..10 {
                        let (_, catalog) = client.fetch(&bus, addr(4)).unwrap();
                        assert_eq!(catalog.len(), 3);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        helpers::assert_balanced(&bus);
        bus.with_transport(|t| assert_eq!(t.open_count(), 80));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    // Each of positions 0..=6 is empty, foreign, or a device
    fn occupancy() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(0u8..3, 7)
    }

    proptest! {
        #[test]
        fn scan_matches_occupancy(slots in occupancy()) {
            let mut virtual_bus = VirtualBus::new();
            let mut expected = Vec::new();
            for (id, kind) in slots.iter().enumerate() {
                let address = addr(id as u8);
                match kind {
                    1 => {
                        virtual_bus.attach_foreign(address);
                        expected.push((id as u8, false));
                    }
                    2 => {
                        virtual_bus.attach_device(address, helpers::device_with(1));
                        expected.push((id as u8, true));
                    }
                    _ => {}
                }
            }
            let bus = Bus::new(virtual_bus);

            let found: Vec<(u8, bool)> = BusScanner::new()
                .scan(&bus)
                .map(|e| (e.address.id(), e.is_compliant()))
                .collect();
            prop_assert_eq!(found, expected);
        }

        #[test]
        fn catalog_length_never_exceeds_capacity(n in 0usize..=160) {
            let mut device = helpers::device_with(n);
            device.set_reported_count(Some(n.min(255) as u8));
            let mut virtual_bus = VirtualBus::new();
            virtual_bus.attach_device(addr(0), device);
            let bus = Bus::new(virtual_bus);

            let (_, catalog) = CatalogClient::new().fetch(&bus, addr(0)).unwrap();
            prop_assert_eq!(catalog.len(), n.min(MAX_CATALOG_ENTRIES));
        }

        #[test]
        fn size_decode_independent_of_position(
            position in 0usize..8,
            top in any::<u8>(),
            low in any::<u32>(),
        ) {
            let mut device = VirtualDevice::new();
            for i in 0..8u8 {
                let size = if usize::from(i) == position {
                    (u64::from(top) << 32) | u64::from(low)
                } else {
                    1024 * 1024
                };
                device.add_entry(CatalogEntry::new(i, 1, format!("Disc {}", i), size));
            }
            let mut virtual_bus = VirtualBus::new();
            virtual_bus.attach_device(addr(0), device);
            let bus = Bus::new(virtual_bus);

            let (_, catalog) = CatalogClient::new().fetch(&bus, addr(0)).unwrap();
            for entry in &catalog {
                let expected = if usize::from(entry.index) == position {
                    u64::from(low)
                } else {
                    1024 * 1024
                };
                prop_assert_eq!(entry.size_bytes, expected);
            }
        }

        #[test]
        fn activate_transmits_any_index(index in any::<u8>()) {
            let bus = Bus::new(helpers::standard_bus());
            let mut selector = DiscSelector::new();
            selector.activate(&bus, addr(4), index).unwrap();

            let sent = bus.with_transport(|t| t.commands_to(addr(4)));
            prop_assert_eq!(sent.len(), 1);
            prop_assert_eq!(sent[0].parameter(), index);
        }
    }
}
