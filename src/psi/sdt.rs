// psi/sdt.rs
use serde::Serialize;

use crate::constants::table_id;
use crate::error::DecodeError;
use crate::psi::descriptor::{parse_descriptors, Descriptor};
use crate::psi::section::TableHeader;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SdtSection {
    pub transport_stream_id: u16,
    pub version: u8,
    pub current_next: bool,
    pub original_network_id: u16,
    pub actual_transport_stream: bool,
    pub section_number: u8,
    pub last_section_number: u8,
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub service_id: u16,
    pub eit_schedule: bool,
    pub eit_present_following: bool,
    pub running_status: u8,
    pub running_status_name: &'static str,
    pub scrambled: bool,
    pub service_type: Option<u8>,
    pub name: Option<String>,
    pub provider_name: Option<String>,
    pub descriptors: Vec<Descriptor>,
}

pub fn running_status_name(status: u8) -> &'static str {
    match status {
        0 => "undefined",
        1 => "not running",
        2 => "starts in a few seconds",
        3 => "pausing",
        4 => "running",
        _ => "reserved",
    }
}

/// SDT (table_id 0x42 actual / 0x46 other TS).
pub fn parse_sdt(data: &[u8]) -> Result<SdtSection, DecodeError> {
    let (hdr, mut r) = TableHeader::read("SDT", data, 14)?;
    if hdr.table_id != table_id::SDT_ACTUAL && hdr.table_id != table_id::SDT_OTHER {
        return Err(DecodeError::UnexpectedTableId {
            table: "SDT",
            table_id: hdr.table_id,
        });
    }
    let end = hdr.body_end();

    let original_network_id = r.read_u16("original_network_id")?;
    r.skip(1, "reserved_future_use")?;

    let mut services = Vec::new();
    while r.position() + 5 <= end {
        let service_id = r.read_u16("service_id")?;
        let flags = r.read_u8("EIT flags")?;
        let status = r.read_u16("running_status")?;
        let descriptors_loop_length = (status & 0x0FFF) as usize;
        if r.position() + descriptors_loop_length > end {
            return Err(DecodeError::Truncated {
                what: "service descriptors",
            });
        }
        let descriptors = parse_descriptors(r.take(descriptors_loop_length, "service descriptors")?)?;
        let running_status = (status >> 13) as u8;

        let mut service = Service {
            service_id,
            eit_schedule: flags & 0x02 != 0,
            eit_present_following: flags & 0x01 != 0,
            running_status,
            running_status_name: running_status_name(running_status),
            scrambled: status & 0x1000 != 0,
            service_type: None,
            name: None,
            provider_name: None,
            descriptors: Vec::new(),
        };
        if let Some(Descriptor::Service {
            service_type,
            provider_name,
            service_name,
        }) = descriptors
            .iter()
            .find(|d| matches!(d, Descriptor::Service { .. }))
        {
            service.service_type = Some(*service_type);
            service.name = Some(service_name.clone());
            service.provider_name = Some(provider_name.clone());
        }
        service.descriptors = descriptors;
        services.push(service);
    }
    if r.position() != end {
        return Err(DecodeError::LoopMismatch { table: "SDT" });
    }

    Ok(SdtSection {
        transport_stream_id: hdr.extension,
        version: hdr.version_number,
        current_next: hdr.current_next_indicator,
        original_network_id,
        actual_transport_stream: hdr.table_id == table_id::SDT_ACTUAL,
        section_number: hdr.section_number,
        last_section_number: hdr.last_section_number,
        services,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::crc::append_crc;

    fn sdt(table_id: u8, services: &[(u16, u8, u16, Vec<u8>)]) -> Vec<u8> {
        let mut body = vec![0x23, 0x3A, 0xFF];
        for (sid, flags, status, desc) in services {
            body.extend(sid.to_be_bytes());
            body.push(0xFC | flags);
            body.extend(((status << 12) | desc.len() as u16).to_be_bytes());
            body.extend_from_slice(desc);
        }
        let len = 5 + body.len() + 4;
        let mut s = vec![table_id, 0xF0 | (len >> 8) as u8, len as u8, 0x00, 0x07, 0xC1, 0, 0];
        s.extend(body);
        append_crc(&mut s);
        s
    }

    fn service_descriptor(provider: &str, name: &str) -> Vec<u8> {
        let mut d = vec![0x48, (3 + provider.len() + name.len()) as u8, 0x01];
        d.push(provider.len() as u8);
        d.extend(provider.bytes());
        d.push(name.len() as u8);
        d.extend(name.bytes());
        d
    }

    #[test]
    fn decodes_services() {
        let s = sdt(
            0x42,
            &[
                (0x0101, 0x03, 0x8, service_descriptor("ACME", "News")),
                (0x0102, 0x01, 0x3, vec![]),
            ],
        );
        let sdt = parse_sdt(&s).expect("SDT");
        assert_eq!(sdt.transport_stream_id, 7);
        assert_eq!(sdt.original_network_id, 0x233A);
        assert!(sdt.actual_transport_stream);

        let news = &sdt.services[0];
        assert_eq!(news.service_id, 0x0101);
        assert!(news.eit_schedule && news.eit_present_following);
        assert_eq!(news.running_status, 4);
        assert_eq!(news.running_status_name, "running");
        assert!(!news.scrambled);
        assert_eq!(news.name.as_deref(), Some("News"));
        assert_eq!(news.provider_name.as_deref(), Some("ACME"));
        assert_eq!(news.service_type, Some(1));

        let other = &sdt.services[1];
        assert_eq!(other.running_status_name, "not running");
        assert!(other.scrambled);
        assert!(other.name.is_none());
    }

    #[test]
    fn inconsistent_service_descriptor_is_ignored() {
        let mut desc = service_descriptor("ACME", "News");
        desc[3] = 40;
        let sdt = parse_sdt(&sdt(0x46, &[(1, 0, 0x8, desc)])).expect("SDT");
        assert!(!sdt.actual_transport_stream);
        assert!(sdt.services[0].name.is_none());
        assert!(matches!(sdt.services[0].descriptors[0], Descriptor::Unknown { tag: 0x48, .. }));
    }
}
