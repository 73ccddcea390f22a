mod common;

use common::*;
use tsdemux_core::psi::datetime::{decode_mjd, decode_utc_time};
use tsdemux_core::psi::nit::DeliverySystem;
use tsdemux_core::psi::Table;
use tsdemux_core::{DecodeError, DemuxCore, DemuxEvent, DemuxOptions};

fn core() -> DemuxCore {
    DemuxCore::new(DemuxOptions {
        packet_size: Some(188),
        ..DemuxOptions::default()
    })
}

fn tables(events: &[DemuxEvent]) -> Vec<&Table> {
    events
        .iter()
        .filter_map(|e| match e {
            DemuxEvent::Table { table, .. } => Some(table),
            _ => None,
        })
        .collect()
}

fn service_descriptor(service_type: u8, provider: &str, name: &str) -> Vec<u8> {
    let mut d = vec![0x48, (3 + provider.len() + name.len()) as u8, service_type];
    d.push(provider.len() as u8);
    d.extend(provider.as_bytes());
    d.push(name.len() as u8);
    d.extend(name.as_bytes());
    d
}

fn short_event(name: &str, text: &str) -> Vec<u8> {
    let mut d = vec![0x4D, (5 + name.len() + text.len()) as u8];
    d.extend(b"eng");
    d.push(name.len() as u8);
    d.extend(name.as_bytes());
    d.push(text.len() as u8);
    d.extend(text.as_bytes());
    d
}

fn eit_pf(service_id: u16, section_number: u8, event_id: u16, name: &str) -> Vec<u8> {
    let descriptors = short_event(name, "");
    let mut body = vec![0x00, 0x07, 0x00, 0x01, 0x01, 0x4E];
    body.extend(event_id.to_be_bytes());
    // 1993-10-13 12:45:00, 01:45:30 long
    body.extend([0xC0, 0x79, 0x12, 0x45, 0x00, 0x01, 0x45, 0x30]);
    let status = (4u16 << 13) | descriptors.len() as u16;
    body.extend(status.to_be_bytes());
    body.extend(descriptors);
    long_section(0x4E, service_id, 0, section_number, 1, &body)
}

#[test]
fn pmt_spanning_two_packets_decodes_exactly() {
    let streams: Vec<(u8, u16)> = (0..45).map(|i| (0x1B, 0x200 + i)).collect();
    let section = pmt(9, 3, 0x200, &streams);
    let mut pat_cc = 0;
    let mut pmt_cc = 0;
    let mut packets = packetize(0, &pat(1, 0, &[(9, 0x1F0)]), &mut pat_cc);
    let pmt_packets = packetize(0x1F0, &section, &mut pmt_cc);
    assert_eq!(pmt_packets.len(), 2);
    packets.extend(pmt_packets);

    let mut core = core();
    let events = core.push(&packets.concat());
    let Some(Table::Pmt(decoded)) = tables(&events).into_iter().find(|t| matches!(t, Table::Pmt(_)))
    else {
        panic!("no PMT decoded: {events:?}");
    };
    assert_eq!(decoded.program_number, 9);
    assert_eq!(decoded.version, 3);
    assert_eq!(decoded.pcr_pid, 0x200);
    assert_eq!(decoded.streams.len(), 45);
    for (stream, (stream_type, pid)) in decoded.streams.iter().zip(&streams) {
        assert_eq!(stream.stream_type, *stream_type);
        assert_eq!(stream.elementary_pid, *pid);
        assert_eq!(stream.stream_type_name, "H.264");
    }
}

#[test]
fn repeated_table_is_delivered_once() {
    let mut cc = 0;
    let section = pat(1, 4, &[(1, 0x100)]);
    let mut packets = packetize(0, &section, &mut cc);
    packets.extend(packetize(0, &section, &mut cc));

    let mut core = core();
    let events = core.push(&packets.concat());
    assert_eq!(tables(&events).len(), 1);
    assert_eq!(core.stats().duplicate_sections, 1);
    assert_eq!(core.stats().sections, 1);
}

#[test]
fn discontinuity_drops_partial_section_then_recovers() {
    let section = pmt(1, 0, 0x101, &[(0x02, 0x101)]);
    let mut cc = 0;
    let mut pat_cc = 0;
    let pat_packets = packetize(0, &pat(1, 0, &[(1, 0x100)]), &mut pat_cc);
    let broken = packetize_into(0x100, &section, 3, &mut cc);
    let retry = packetize_into(0x100, &section, 3, &mut cc);

    let mut core = core();
    core.push(&pat_packets.concat());
    // middle packet lost
    let events = core.push(&[broken[0].clone(), broken[2].clone()].concat());
    assert!(tables(&events).is_empty());

    let events = core.push(&retry.concat());
    assert!(matches!(tables(&events)[..], [Table::Pmt(_)]));
    assert!(core.directory().is_pes_pid(0x101));
}

#[test]
fn flipped_bit_fails_crc_and_keeps_directory() {
    let mut cc = 0;
    let good = pat(1, 0, &[(1, 0x100)]);
    let mut bad = pat(1, 1, &[(2, 0x200)]);
    bad[9] ^= 0x04;

    let mut core = core();
    core.push(&packetize(0, &good, &mut cc).concat());
    let events = core.push(&packetize(0, &bad, &mut cc).concat());

    assert!(matches!(
        events[..],
        [DemuxEvent::TableRejected {
            pid: 0,
            table_id: 0,
            error: DecodeError::CrcMismatch { .. }
        }]
    ));
    assert_eq!(core.directory().program_numbers(), vec![1]);
    assert_eq!(core.stats().crc_errors, 1);
}

#[test]
fn malformed_table_is_rejected_without_side_effects() {
    // program loop cut short: 3 bytes where 4 are needed
    let section = long_section(0x00, 1, 0, 0, 0, &[0x00, 0x01, 0xE1]);
    let mut cc = 0;
    let mut core = core();
    let events = core.push(&packetize(0, &section, &mut cc).concat());
    assert!(matches!(
        events[..],
        [DemuxEvent::TableRejected { error: DecodeError::LoopMismatch { .. }, .. }]
    ));
    assert!(core.directory().program_numbers().is_empty());
    assert_eq!(core.stats().decode_errors, 1);
}

#[test]
fn nit_with_cable_delivery_round_trips() {
    let mut name = vec![0x40, 7];
    name.extend(b"TestNet");
    let cable = [
        0x44, 11, 0x03, 0x46, 0x00, 0x00, 0xFF, 0xF2, 0x03, 0x00, 0x68, 0x75, 0x03,
    ];
    let mut body = vec![0xF0, name.len() as u8];
    body.extend(&name);
    let entry_len = 6 + cable.len();
    body.extend([0xF0, entry_len as u8]);
    body.extend([0x00, 0x07, 0x00, 0x01, 0xF0, cable.len() as u8]);
    body.extend(cable);
    let section = long_section(0x40, 0x3001, 2, 0, 0, &body);

    let mut cc = 0;
    let mut core = core();
    let events = core.push(&packetize(0x10, &section, &mut cc).concat());
    let decoded = tables(&events);
    let [Table::Nit(nit)] = decoded[..] else {
        panic!("expected one NIT: {events:?}");
    };
    assert_eq!(nit.network_id, 0x3001);
    assert_eq!(nit.version, 2);
    assert!(nit.actual_network);
    assert_eq!(nit.name.as_deref(), Some("TestNet"));
    assert_eq!(nit.transports.len(), 1);
    let transport = &nit.transports[0];
    assert_eq!(transport.transport_stream_id, 7);
    assert_eq!(transport.original_network_id, 1);
    let Some(DeliverySystem::Cable(cable)) = &transport.delivery else {
        panic!("expected cable delivery");
    };
    assert_eq!(cable.frequency, 346_000_000);
    assert_eq!(cable.modulation, "QAM64");
    assert_eq!(cable.symbol_rate, 6_875_000);

    assert!(core.si_cache().networks.contains_key(&(0x3001, true)));
}

#[test]
fn sdt_and_eit_fill_the_si_cache() {
    let mut services = Vec::new();
    for (sid, name) in [(1u16, "One"), (2, "Two")] {
        let descriptors = service_descriptor(0x01, "Prov", name);
        services.extend(sid.to_be_bytes());
        services.push(0xFD);
        let status = (4u16 << 13) | descriptors.len() as u16;
        services.extend(status.to_be_bytes());
        services.extend(descriptors);
    }
    let mut body = vec![0x00, 0x01, 0xFF];
    body.extend(services);
    let sdt = long_section(0x42, 7, 0, 0, 0, &body);

    let mut sdt_cc = 0;
    let mut pat_cc = 0;
    let mut eit_cc = 0;
    let mut packets = packetize(0, &pat(7, 0, &[(1, 0x100), (2, 0x200), (5, 0x500)]), &mut pat_cc);
    packets.extend(packetize(0x11, &sdt, &mut sdt_cc));
    packets.extend(packetize(0x12, &eit_pf(1, 0, 100, "News"), &mut eit_cc));
    packets.extend(packetize(0x12, &eit_pf(1, 1, 101, "Weather"), &mut eit_cc));

    let mut core = core();
    let events = core.push(&packets.concat());
    let names: Vec<&str> = tables(&events).iter().map(|t| t.name()).collect();
    assert_eq!(names, ["PAT", "SDT", "EIT", "EIT"]);

    let cache = core.si_cache();
    assert_eq!(cache.actual_transport_stream_id, Some(7));
    assert_eq!(cache.service_name(2), Some("Two"));
    let pf = &cache.present_following[&1];
    let present = pf.present.as_ref().expect("present event");
    assert_eq!(present.name.as_deref(), Some("News"));
    assert_eq!(present.duration, 3600 + 45 * 60 + 30);
    assert_eq!(
        present.start_time.to_datetime().map(|t| t.to_string()).as_deref(),
        Some("1993-10-13 12:45:00")
    );
    assert_eq!(pf.following.as_ref().and_then(|e| e.name.as_deref()), Some("Weather"));

    assert_eq!(cache.services_missing_from_sdt(&core.directory().program_numbers()), vec![5]);
}

#[test]
fn tdt_updates_stream_time() {
    let tdt = [0x70, 0x70, 0x05, 0xC0, 0x79, 0x12, 0x45, 0x00];
    let mut cc = 0;
    let mut core = core();
    let events = core.push(&packetize(0x14, &tdt, &mut cc).concat());
    assert!(matches!(tables(&events)[..], [Table::Time(t)] if !t.is_tot()));
    assert_eq!(
        core.si_cache().time.as_ref().map(|t| t.utc_time),
        Some(decode_utc_time(&[0xC0, 0x79, 0x12, 0x45, 0x00]))
    );
}

#[test]
fn mjd_fixture_decodes_to_march_first_2000() {
    assert_eq!(decode_mjd(51604), (2000, 3, 1));
    let t = decode_utc_time(&[0xC9, 0x94, 0x00, 0x00, 0x00]);
    assert_eq!((t.year, t.month, t.day, t.hour, t.minute, t.second), (2000, 3, 1, 0, 0, 0));
}
