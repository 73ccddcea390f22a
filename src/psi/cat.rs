use serde::Serialize;

use crate::constants::table_id;
use crate::error::DecodeError;
use crate::psi::descriptor::{parse_descriptors, Descriptor};
use crate::psi::section::TableHeader;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatSection {
    pub version: u8,
    pub current_next: bool,
    pub descriptors: Vec<Descriptor>,
}

impl CatSection {
    /// `(CA_system_id, EMM PID)` pairs.
    pub fn ca_pids(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.descriptors.iter().filter_map(|d| match d {
            Descriptor::Ca {
                ca_system_id,
                ca_pid,
                ..
            } => Some((*ca_system_id, *ca_pid)),
            _ => None,
        })
    }
}

pub fn parse_cat(data: &[u8]) -> Result<CatSection, DecodeError> {
    let (hdr, mut r) = TableHeader::read("CAT", data, 12)?;
    if hdr.table_id != table_id::CAT {
        return Err(DecodeError::UnexpectedTableId {
            table: "CAT",
            table_id: hdr.table_id,
        });
    }
    let len = hdr.body_end() - r.position();
    let descriptors = parse_descriptors(r.take(len, "CA descriptors")?)?;
    Ok(CatSection {
        version: hdr.version_number,
        current_next: hdr.current_next_indicator,
        descriptors,
    })
}
