// psi/pmt.rs
use serde::Serialize;

use crate::constants::{stream_type_name, table_id};
use crate::error::DecodeError;
use crate::psi::descriptor::{parse_descriptors, Descriptor};
use crate::psi::section::TableHeader;

/// ─────────── PMT ───────────
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PmtSection {
    pub program_number: u16,
    pub version: u8,
    pub current_next: bool,
    pub pcr_pid: u16,
    pub descriptors: Vec<Descriptor>,
    pub streams: Vec<StreamInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataBroadcastInfo {
    pub id: u16,
    pub component_tag: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamInfo {
    pub stream_type: u8,
    pub stream_type_name: &'static str,
    pub elementary_pid: u16,
    pub descriptors: Vec<Descriptor>,
    pub has_ac3: bool,
    pub data_broadcast_id: Option<u16>,
    pub data_broadcast: Option<DataBroadcastInfo>,
    pub carousel_id: Option<u32>,
    pub component_tag: Option<u8>,
    pub language: Option<String>,
}

impl StreamInfo {
    fn new(stream_type: u8, elementary_pid: u16, descriptors: Vec<Descriptor>) -> Self {
        let mut info = Self {
            stream_type,
            stream_type_name: stream_type_name(stream_type),
            elementary_pid,
            descriptors: Vec::new(),
            has_ac3: false,
            data_broadcast_id: None,
            data_broadcast: None,
            carousel_id: None,
            component_tag: None,
            language: None,
        };
        for d in &descriptors {
            match d {
                Descriptor::Ac3 { .. } => info.has_ac3 = true,
                Descriptor::DataBroadcastId {
                    data_broadcast_id, ..
                } => info.data_broadcast_id = Some(*data_broadcast_id),
                Descriptor::DataBroadcast {
                    data_broadcast_id,
                    component_tag,
                    ..
                } => {
                    info.data_broadcast = Some(DataBroadcastInfo {
                        id: *data_broadcast_id,
                        component_tag: *component_tag,
                    })
                }
                Descriptor::CarouselIdentifier { carousel_id } => {
                    info.carousel_id = Some(*carousel_id)
                }
                Descriptor::StreamIdentifier { component_tag } => {
                    info.component_tag = Some(*component_tag)
                }
                Descriptor::Iso639Language { entries } => {
                    info.language = entries.first().map(|e| e.language.clone())
                }
                _ => {}
            }
        }
        info.descriptors = descriptors;
        info
    }
}

pub fn parse_pmt(data: &[u8]) -> Result<PmtSection, DecodeError> {
    let (hdr, mut r) = TableHeader::read("PMT", data, 16)?;
    if hdr.table_id != table_id::PMT {
        return Err(DecodeError::UnexpectedTableId {
            table: "PMT",
            table_id: hdr.table_id,
        });
    }
    let end = hdr.body_end();

    let pcr_pid = r.read_pid("PCR_PID")?;
    let program_info_length = r.read_length12("program_info_length")?;
    if r.position() + program_info_length > end {
        return Err(DecodeError::Truncated {
            what: "program descriptors",
        });
    }
    let descriptors = parse_descriptors(r.take(program_info_length, "program descriptors")?)?;

    let mut streams = Vec::new();
    while r.position() + 5 <= end {
        let stream_type = r.read_u8("stream_type")?;
        let elementary_pid = r.read_pid("elementary_PID")?;
        let es_info_length = r.read_length12("ES_info_length")?;
        if r.position() + es_info_length > end {
            return Err(DecodeError::Truncated {
                what: "ES descriptors",
            });
        }
        let es_descriptors = parse_descriptors(r.take(es_info_length, "ES descriptors")?)?;
        streams.push(StreamInfo::new(stream_type, elementary_pid, es_descriptors));
    }
    if r.position() != end {
        return Err(DecodeError::LoopMismatch { table: "PMT" });
    }

    Ok(PmtSection {
        program_number: hdr.extension,
        version: hdr.version_number,
        current_next: hdr.current_next_indicator,
        pcr_pid,
        descriptors,
        streams,
    })
}
