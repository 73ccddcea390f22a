//! Synthetic transport stream builders shared by the integration tests.
#![allow(dead_code)]

use tsdemux_core::psi::crc::append_crc;

pub const TS: usize = 188;

/// Long-form section with a valid CRC-32.
pub fn long_section(
    table_id: u8,
    extension: u16,
    version: u8,
    section_number: u8,
    last_section_number: u8,
    body: &[u8],
) -> Vec<u8> {
    let section_length = 5 + body.len() + 4;
    let mut s = vec![
        table_id,
        0xB0 | (section_length >> 8) as u8,
        section_length as u8,
        (extension >> 8) as u8,
        extension as u8,
        0xC1 | (version & 0x1F) << 1,
        section_number,
        last_section_number,
    ];
    s.extend_from_slice(body);
    append_crc(&mut s);
    s
}

pub fn pat(transport_stream_id: u16, version: u8, programs: &[(u16, u16)]) -> Vec<u8> {
    let body: Vec<u8> = programs
        .iter()
        .flat_map(|&(number, pid)| {
            [(number >> 8) as u8, number as u8, 0xE0 | (pid >> 8) as u8, pid as u8]
        })
        .collect();
    long_section(0x00, transport_stream_id, version, 0, 0, &body)
}

pub fn pmt(program_number: u16, version: u8, pcr_pid: u16, streams: &[(u8, u16)]) -> Vec<u8> {
    let mut body = vec![0xE0 | (pcr_pid >> 8) as u8, pcr_pid as u8, 0xF0, 0x00];
    for &(stream_type, pid) in streams {
        body.extend([stream_type, 0xE0 | (pid >> 8) as u8, pid as u8, 0xF0, 0x00]);
    }
    long_section(0x02, program_number, version, 0, 0, &body)
}

/// 188-byte packet. Short payloads are right-aligned behind adaptation
/// field stuffing so no filler ends up in the payload.
pub fn ts_packet(pid: u16, pusi: bool, cc: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= 184, "payload too large for one packet");
    let mut p = Vec::with_capacity(TS);
    p.push(0x47);
    p.push(((pid >> 8) as u8 & 0x1F) | if pusi { 0x40 } else { 0 });
    p.push(pid as u8);
    if payload.len() == 184 {
        p.push(0x10 | (cc & 0x0F));
    } else {
        p.push(0x30 | (cc & 0x0F));
        let af_len = 183 - payload.len();
        p.push(af_len as u8);
        if af_len > 0 {
            p.push(0x00);
            p.resize(5 + af_len, 0xFF);
        }
    }
    p.extend_from_slice(payload);
    debug_assert_eq!(p.len(), TS);
    p
}

pub fn null_packet() -> Vec<u8> {
    ts_packet(0x1FFF, false, 0, &[0xFF; 184])
}

/// Splits `section` into exactly `count` packets on `pid`, starting at `*cc`.
pub fn packetize_into(pid: u16, section: &[u8], count: usize, cc: &mut u8) -> Vec<Vec<u8>> {
    let mut payload = vec![0u8];
    payload.extend_from_slice(section);
    let chunk = payload.len().div_ceil(count);
    payload
        .chunks(chunk)
        .enumerate()
        .map(|(i, part)| {
            let p = ts_packet(pid, i == 0, *cc, part);
            *cc = (*cc + 1) & 0x0F;
            p
        })
        .collect()
}

/// Splits `section` into as few packets as it fits in.
pub fn packetize(pid: u16, section: &[u8], cc: &mut u8) -> Vec<Vec<u8>> {
    packetize_into(pid, section, (section.len() + 1).div_ceil(184), cc)
}

/// Payload packet filled with a recognizable pattern.
pub fn payload_packet(pid: u16, pusi: bool, cc: u8, seed: u8) -> Vec<u8> {
    let body: Vec<u8> = (0..184u16).map(|i| seed.wrapping_add(i as u8)).collect();
    ts_packet(pid, pusi, cc, &body)
}

/// Re-frames 188-byte packets to `size`. M2TS units get a 4-byte arrival
/// timestamp in front; 204/208 frames get a zeroed trailer.
pub fn resize_packets(packets: &[Vec<u8>], size: usize) -> Vec<u8> {
    packets
        .iter()
        .enumerate()
        .flat_map(|(i, p)| {
            let mut framed = Vec::with_capacity(size);
            if size == 192 {
                let timestamp = 0x1000_0000u32 + i as u32 * 0x200;
                framed.extend(timestamp.to_be_bytes());
            }
            framed.extend_from_slice(p);
            framed.resize(size, 0x00);
            framed
        })
        .collect()
}

/// Appends null packets so packet size detection has enough data.
pub fn with_detection_tail(mut packets: Vec<Vec<u8>>) -> Vec<u8> {
    packets.extend((0..4).map(|_| null_packet()));
    packets.concat()
}
