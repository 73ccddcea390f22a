//! Error types for table decoding and packet parsing

use thiserror::Error;

/// Why a table update was rejected. The directory keeps its previous state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{table} section too short ({len} bytes, need at least {min})")]
    TooShort {
        table: &'static str,
        len: usize,
        min: usize,
    },

    #[error("{what} runs past the end of the section")]
    Truncated { what: &'static str },

    #[error("{table} loop does not end at the CRC")]
    LoopMismatch { table: &'static str },

    #[error("descriptor 0x{tag:02x} length {len} overruns loop ({remaining} bytes left)")]
    DescriptorOverrun { tag: u8, len: usize, remaining: usize },

    #[error("unexpected table_id 0x{table_id:02x} for {table}")]
    UnexpectedTableId { table: &'static str, table_id: u8 },

    #[error("section_length {declared} does not match {actual} buffered bytes")]
    SectionLength { declared: usize, actual: usize },

    #[error("CRC-32 mismatch on table_id 0x{table_id:02x} (residue 0x{crc:08x})")]
    CrcMismatch { table_id: u8, crc: u32 },
}

/// Reasons a single TS packet is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet too short ({0} bytes)")]
    TooShort(usize),

    #[error("invalid sync_byte (expected 0x47, found 0x{0:02x})")]
    InvalidSyncByte(u8),

    #[error("PID {pid} adaptation field length {len} overflows the packet")]
    AdaptationOverrun { pid: u16, len: usize },
}
