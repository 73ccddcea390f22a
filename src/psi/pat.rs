// psi/pat.rs
use serde::Serialize;

use crate::constants::table_id;
use crate::error::DecodeError;
use crate::psi::section::TableHeader;

/// ─────────── PAT ───────────
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatSection {
    pub transport_stream_id: u16,
    pub version: u8,
    pub current_next: bool,
    /// PID announced by program 0, if any.
    pub network_pid: Option<u16>,
    pub programs: Vec<PatEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatEntry {
    pub program_number: u16,
    pub pmt_pid: u16,
}

pub fn parse_pat(data: &[u8]) -> Result<PatSection, DecodeError> {
    let (hdr, mut r) = TableHeader::read("PAT", data, 12)?;
    if hdr.table_id != table_id::PAT {
        return Err(DecodeError::UnexpectedTableId {
            table: "PAT",
            table_id: hdr.table_id,
        });
    }

    let end = hdr.body_end();
    let mut network_pid = None;
    let mut programs = Vec::new();
    while r.position() + 4 <= end {
        let program_number = r.read_u16("program_number")?;
        let pid = r.read_pid("program_map_PID")?;
        if program_number == 0 {
            network_pid = Some(pid);
        } else {
            programs.push(PatEntry {
                program_number,
                pmt_pid: pid,
            });
        }
    }
    if r.position() != end {
        return Err(DecodeError::LoopMismatch { table: "PAT" });
    }

    Ok(PatSection {
        transport_stream_id: hdr.extension,
        version: hdr.version_number,
        current_next: hdr.current_next_indicator,
        network_pid,
        programs,
    })
}
