// psi/nit.rs
//! Network Information Table (actual 0x40 / other 0x41).

use serde::Serialize;

use crate::constants::table_id;
use crate::error::DecodeError;
use crate::psi::descriptor::{
    parse_descriptors, CableDelivery, Descriptor, LogicalChannelEntry, SatelliteDelivery,
    TerrestrialDelivery,
};
use crate::psi::section::TableHeader;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "system", rename_all = "snake_case")]
pub enum DeliverySystem {
    Satellite(SatelliteDelivery),
    Terrestrial(TerrestrialDelivery),
    Cable(CableDelivery),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NitSection {
    pub network_id: u16,
    pub version: u8,
    pub current_next: bool,
    pub actual_network: bool,
    pub section_number: u8,
    pub last_section_number: u8,
    pub name: Option<String>,
    pub descriptors: Vec<Descriptor>,
    pub transports: Vec<Transport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transport {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub delivery: Option<DeliverySystem>,
    pub channels: Vec<LogicalChannelEntry>,
    pub frequencies: Vec<u32>,
    pub descriptors: Vec<Descriptor>,
}

impl Transport {
    fn new(transport_stream_id: u16, original_network_id: u16, descriptors: Vec<Descriptor>) -> Self {
        let mut satellite = None;
        let mut terrestrial = None;
        let mut cable = None;
        let mut channels = Vec::new();
        let mut frequencies = Vec::new();
        for d in &descriptors {
            match d {
                Descriptor::SatelliteDelivery(s) => satellite = satellite.or(Some(s)),
                Descriptor::TerrestrialDelivery(t) => terrestrial = terrestrial.or(Some(t)),
                Descriptor::CableDelivery(c) => cable = cable.or(Some(c)),
                Descriptor::LogicalChannel { channels: lcn } => channels.extend(lcn.iter().cloned()),
                Descriptor::FrequencyList {
                    frequencies: list, ..
                } => frequencies.extend(list.iter().copied()),
                _ => {}
            }
        }
        // one delivery system per transport; satellite wins, then terrestrial
        let delivery = satellite
            .cloned()
            .map(DeliverySystem::Satellite)
            .or_else(|| terrestrial.cloned().map(DeliverySystem::Terrestrial))
            .or_else(|| cable.cloned().map(DeliverySystem::Cable));

        Self {
            transport_stream_id,
            original_network_id,
            delivery,
            channels,
            frequencies,
            descriptors,
        }
    }
}

pub fn parse_nit(data: &[u8]) -> Result<NitSection, DecodeError> {
    let (hdr, mut r) = TableHeader::read("NIT", data, 23)?;
    if hdr.table_id != table_id::NIT_ACTUAL && hdr.table_id != table_id::NIT_OTHER {
        return Err(DecodeError::UnexpectedTableId {
            table: "NIT",
            table_id: hdr.table_id,
        });
    }
    let end = hdr.body_end();

    let network_descriptors_length = r.read_length12("network_descriptors_length")?;
    if r.position() + network_descriptors_length > end {
        return Err(DecodeError::Truncated {
            what: "network descriptors",
        });
    }
    let descriptors = parse_descriptors(r.take(network_descriptors_length, "network descriptors")?)?;
    let name = descriptors.iter().find_map(|d| match d {
        Descriptor::NetworkName { name } => Some(name.clone()),
        _ => None,
    });

    let mut loop_length = r.read_length12("transport_stream_loop_length")?;
    if r.position() + loop_length > end {
        return Err(DecodeError::Truncated {
            what: "transport stream loop",
        });
    }

    let mut transports = Vec::new();
    while loop_length > 0 {
        let entry_begin = r.position();
        let transport_stream_id = r.read_u16("transport_stream_id")?;
        let original_network_id = r.read_u16("original_network_id")?;
        let descriptors_length = r.read_length12("transport_descriptors_length")?;
        let entry = parse_descriptors(r.take(descriptors_length, "transport descriptors")?)?;
        transports.push(Transport::new(transport_stream_id, original_network_id, entry));

        loop_length = loop_length
            .checked_sub(r.position() - entry_begin)
            .ok_or(DecodeError::LoopMismatch { table: "NIT" })?;
    }
    if r.position() != end {
        return Err(DecodeError::LoopMismatch { table: "NIT" });
    }

    Ok(NitSection {
        network_id: hdr.extension,
        version: hdr.version_number,
        current_next: hdr.current_next_indicator,
        actual_network: hdr.table_id == table_id::NIT_ACTUAL,
        section_number: hdr.section_number,
        last_section_number: hdr.last_section_number,
        name,
        descriptors,
        transports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::crc::append_crc;

    fn nit(table_id: u8, network: &[u8], transports: &[(u16, u16, Vec<u8>)]) -> Vec<u8> {
        let mut body = (0xF000 | network.len() as u16).to_be_bytes().to_vec();
        body.extend_from_slice(network);
        let mut ts_loop = Vec::new();
        for (tsid, onid, desc) in transports {
            ts_loop.extend(tsid.to_be_bytes());
            ts_loop.extend(onid.to_be_bytes());
            ts_loop.extend((0xF000 | desc.len() as u16).to_be_bytes());
            ts_loop.extend_from_slice(desc);
        }
        body.extend((0xF000 | ts_loop.len() as u16).to_be_bytes());
        body.extend(ts_loop);
        let len = 5 + body.len() + 4;
        let mut s = vec![table_id, 0xF0 | (len >> 8) as u8, len as u8, 0x30, 0x39, 0xC3, 0, 0];
        s.extend(body);
        append_crc(&mut s);
        s
    }

    fn cable_and_terrestrial() -> Vec<u8> {
        let mut d = vec![0x44, 11, 0x03, 0x46, 0x00, 0x00, 0xFF, 0xF2, 0x03, 0x00, 0x69, 0x00, 0x05];
        d.extend([0x5A, 11]);
        d.extend(49_800_000u32.to_be_bytes());
        d.extend([0x1F, 0x81, 0x02, 0xFF, 0xFF, 0xFF, 0xFF]);
        d.extend([0x83, 4, 0x00, 0x01, 0xFC, 0x05]);
        d
    }

    #[test]
    fn decodes_network_and_transports() {
        let s = nit(
            0x40,
            &[0x40, 0x04, b'T', b'e', b's', b't'],
            &[(1, 0x233A, cable_and_terrestrial()), (2, 0x233A, vec![])],
        );
        let nit = parse_nit(&s).expect("NIT");
        assert_eq!(nit.network_id, 12345);
        assert!(nit.actual_network);
        assert_eq!(nit.version, 1);
        assert_eq!(nit.name.as_deref(), Some("Test"));
        assert_eq!(nit.transports.len(), 2);

        let first = &nit.transports[0];
        assert_eq!(first.original_network_id, 0x233A);
        assert!(matches!(first.delivery, Some(DeliverySystem::Terrestrial(_))));
        assert_eq!(first.channels[0].logical_channel_number, 5);
        assert!(nit.transports[1].delivery.is_none());
    }

    #[test]
    fn other_network_flag() {
        let nit = parse_nit(&nit(0x41, &[], &[(1, 1, vec![]), (2, 1, vec![])])).expect("NIT");
        assert!(!nit.actual_network);
        assert!(nit.name.is_none());
    }

    #[test]
    fn short_table_rejected() {
        let s = nit(0x40, &[], &[]);
        assert!(matches!(parse_nit(&s), Err(DecodeError::TooShort { min: 23, .. })));
    }

    #[test]
    fn entry_overrunning_loop_length_fails() {
        let mut s = nit(0x40, &[], &[(1, 1, vec![0x83, 0x00]), (2, 1, vec![])]);
        // loop length at offset 10..12 shrunk to end inside the first entry
        s[11] = 4;
        s.truncate(s.len() - 4);
        append_crc(&mut s);
        assert!(parse_nit(&s).is_err());
    }
}
