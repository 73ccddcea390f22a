//! CRC-32/MPEG-2 check for long-form sections.

use crc::{Crc, CRC_32_MPEG_2};

use crate::constants::table_id;
use crate::error::DecodeError;

pub const CRC_MPEG: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// TDT, RST, ST and TOT are exempt from the generic check.
/// (TOT carries a CRC but it is verified by its own decoder.)
pub fn has_crc(tid: u8) -> bool {
    !(table_id::TDT..=table_id::TOT).contains(&tid)
}

/// Running the CRC over a whole section, trailer included, leaves zero.
pub fn validate(section: &[u8]) -> bool {
    CRC_MPEG.checksum(section) == 0
}

pub fn verify(tid: u8, section: &[u8]) -> Result<(), DecodeError> {
    if !has_crc(tid) {
        return Ok(());
    }
    match CRC_MPEG.checksum(section) {
        0 => Ok(()),
        crc => Err(DecodeError::CrcMismatch { table_id: tid, crc }),
    }
}

/// Appends the CRC trailer. Used to build sections in tests and tools.
pub fn append_crc(section: &mut Vec<u8>) {
    let crc = CRC_MPEG.checksum(section);
    section.extend_from_slice(&crc.to_be_bytes());
}
