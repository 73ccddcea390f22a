// psi/tdt.rs
//! TDT (0x70, no CRC) and TOT (0x73, CRC checked here).

use serde::Serialize;

use crate::constants::{table_id, CRC_LEN, SECTION_HEADER_LEN};
use crate::error::DecodeError;
use crate::psi::crc;
use crate::psi::datetime::{decode_utc_time, EventTime};
use crate::psi::descriptor::{parse_descriptors, Descriptor};
use crate::psi::section::SectionReader;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSection {
    pub table_id: u8,
    pub utc_time: EventTime,
    /// TOT only (local time offset and friends).
    pub descriptors: Vec<Descriptor>,
}

impl TimeSection {
    pub fn is_tot(&self) -> bool {
        self.table_id == table_id::TOT
    }
}

pub fn parse_tdt_tot(data: &[u8]) -> Result<TimeSection, DecodeError> {
    let mut r = SectionReader::new(data);
    let tid = r.read_u8("table_id")?;
    let section_length = r.read_length12("section_length")?;
    if section_length + SECTION_HEADER_LEN != data.len() {
        return Err(DecodeError::SectionLength {
            declared: section_length,
            actual: data.len(),
        });
    }
    let utc: [u8; 5] = r
        .take(5, "UTC_time")?
        .try_into()
        .map_err(|_| DecodeError::Truncated { what: "UTC_time" })?;

    match tid {
        table_id::TDT => Ok(TimeSection {
            table_id: tid,
            utc_time: decode_utc_time(&utc),
            descriptors: Vec::new(),
        }),
        table_id::TOT => {
            if !crc::validate(data) {
                return Err(DecodeError::CrcMismatch {
                    table_id: tid,
                    crc: crc::CRC_MPEG.checksum(data),
                });
            }
            let loop_length = r.read_length12("descriptors_loop_length")?;
            if r.position() + loop_length + CRC_LEN != data.len() {
                return Err(DecodeError::LoopMismatch { table: "TOT" });
            }
            let descriptors = parse_descriptors(r.take(loop_length, "TOT descriptors")?)?;
            Ok(TimeSection {
                table_id: tid,
                utc_time: decode_utc_time(&utc),
                descriptors,
            })
        }
        _ => Err(DecodeError::UnexpectedTableId {
            table: "TDT/TOT",
            table_id: tid,
        }),
    }
}
