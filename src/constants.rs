//! Constants for MPEG-TS demultiplexing

/// MPEG-TS packet constants
pub const TS_SYNC_BYTE: u8 = 0x47;
pub const TS_PACKET_SIZE: usize = 188;
pub const M2TS_PACKET_SIZE: usize = 192;
pub const DVB_ASI_PACKET_SIZE: usize = 204;
pub const ATSC_PACKET_SIZE: usize = 208;
pub const MAX_PACKET_SIZE: usize = ATSC_PACKET_SIZE;

/// Packet sizes tried by auto-detection, in order
pub const PACKET_SIZES: [usize; 4] = [
    TS_PACKET_SIZE,
    M2TS_PACKET_SIZE,
    DVB_ASI_PACKET_SIZE,
    ATSC_PACKET_SIZE,
];

/// Number of sync bytes that must line up before a packet size is accepted
pub const SYNC_CONFIRMATIONS: usize = 4;

/// M2TS frames carry a 4-byte timestamp header in front of the sync byte
pub const M2TS_HEADER_SIZE: usize = 4;

/// Offset of the sync byte inside one frame of `packet_size` bytes
pub fn sync_offset(packet_size: usize) -> usize {
    if packet_size == M2TS_PACKET_SIZE {
        M2TS_HEADER_SIZE
    } else {
        0
    }
}

/// PID space (13 bits)
pub const PID_COUNT: usize = 0x2000;
pub const NULL_PID: u16 = 0x1FFF;

/// Section constants
pub const SECTION_HEADER_LEN: usize = 3;
pub const LONG_HEADER_LEN: usize = 8;
pub const CRC_LEN: usize = 4;
pub const STUFFING_TABLE_ID: u8 = 0xFF;

/// Well-known PIDs
pub mod pid {
    pub const PAT: u16 = 0x0000;
    pub const CAT: u16 = 0x0001;
    pub const TSDT: u16 = 0x0002;
    pub const NIT: u16 = 0x0010;
    pub const SDT: u16 = 0x0011; // SDT/BAT
    pub const EIT: u16 = 0x0012;
    pub const TDT: u16 = 0x0014; // TDT/TOT
}

/// Table IDs
pub mod table_id {
    pub const PAT: u8 = 0x00;
    pub const CAT: u8 = 0x01;
    pub const PMT: u8 = 0x02;
    pub const TSDT: u8 = 0x03;
    pub const NIT_ACTUAL: u8 = 0x40;
    pub const NIT_OTHER: u8 = 0x41;
    pub const SDT_ACTUAL: u8 = 0x42;
    pub const SDT_OTHER: u8 = 0x46;
    pub const BAT: u8 = 0x4A;
    pub const EIT_PF_ACTUAL: u8 = 0x4E;
    pub const EIT_PF_OTHER: u8 = 0x4F;
    pub const EIT_SCHEDULE_FIRST: u8 = 0x50;
    pub const EIT_SCHEDULE_ACTUAL_LAST: u8 = 0x5F;
    pub const EIT_SCHEDULE_LAST: u8 = 0x6F;
    pub const TDT: u8 = 0x70;
    pub const RST: u8 = 0x71;
    pub const ST: u8 = 0x72;
    pub const TOT: u8 = 0x73;
}

/// PIDs that carry tables from the start, before any PAT is seen
pub const SYSTEM_PIDS: &[u16] = &[
    pid::PAT,
    pid::CAT,
    pid::TSDT,
    pid::NIT,
    pid::SDT,
    pid::EIT,
    pid::TDT,
];

/// Table IDs that mark an unknown PID as carrying PSI/SI sections.
pub fn is_si_table_id(table_id: u8) -> bool {
    matches!(
        table_id,
        table_id::PAT
            | table_id::CAT
            | table_id::TSDT
            | table_id::NIT_ACTUAL
            | table_id::NIT_OTHER
            | table_id::SDT_ACTUAL
            | table_id::SDT_OTHER
            | table_id::BAT
            | table_id::EIT_PF_ACTUAL
            | table_id::EIT_PF_OTHER
            | table_id::EIT_SCHEDULE_FIRST..=table_id::EIT_SCHEDULE_LAST
            | table_id::TDT
            | table_id::TOT
    )
}

/// Human readable name for common ISO/IEC 13818-1 stream types
pub fn stream_type_name(stream_type: u8) -> &'static str {
    match stream_type {
        0x01 => "MPEG-1 Video",
        0x02 => "MPEG-2 Video",
        0x03 => "MPEG-1 Audio",
        0x04 => "MPEG-2 Audio",
        0x05 => "Private Sections",
        0x06 => "Private PES",
        0x0B => "DSM-CC U-N",
        0x0F => "AAC ADTS",
        0x11 => "AAC LATM",
        0x1B => "H.264",
        0x24 => "HEVC",
        0x81 => "AC-3",
        0x87 => "E-AC-3",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn si_allow_list_covers_eit_schedule_range() {
        assert!(is_si_table_id(0x50));
        assert!(is_si_table_id(0x6F));
        assert!(is_si_table_id(table_id::TOT));
        assert!(!is_si_table_id(table_id::PMT));
        assert!(!is_si_table_id(0x72));
        assert!(!is_si_table_id(0xFF));
    }
}
