// psi/section.rs
//! Reassembled PSI / SI sections and a bounds-checked reader over their bytes.

use bytes::Bytes;
use serde::Serialize;

use crate::constants::{table_id, CRC_LEN, LONG_HEADER_LEN, SECTION_HEADER_LEN};
use crate::error::DecodeError;
use crate::psi::crc;

/// One complete table section, header fields already extracted.
/// `data` holds the whole section from `table_id` through the CRC trailer.
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub pid: u16,
    pub table_id: u8,
    pub section_syntax_indicator: bool,
    pub subtable_extension: u16,
    pub section_length: u16,
    pub version_number: u8,
    pub current_next_indicator: bool,
    pub section_number: u8,
    pub last_section_number: u8,
    pub complete: bool,
    #[serde(skip)]
    pub data: Bytes,
}

/// Subtable key rule shared by the reassembler and [`Section::parse`]:
/// short-form sections and the PAT have extension 0.
pub(crate) fn subtable_extension(bytes: &[u8]) -> u16 {
    if bytes.len() < 5 || bytes[1] & 0x80 == 0 || bytes[0] == table_id::PAT {
        0
    } else {
        u16::from_be_bytes([bytes[3], bytes[4]])
    }
}

impl Section {
    /// Reads the common header. Returns `None` when the buffer cannot even
    /// hold the header its syntax indicator promises.
    pub fn parse(pid: u16, data: Bytes) -> Option<Self> {
        if data.len() < SECTION_HEADER_LEN {
            return None;
        }
        let section_syntax_indicator = data[1] & 0x80 != 0;
        let section_length = u16::from_be_bytes([data[1], data[2]]) & 0x0FFF;

        let (version_number, current_next_indicator, section_number, last_section_number) =
            if section_syntax_indicator {
                if data.len() < LONG_HEADER_LEN {
                    return None;
                }
                ((data[5] >> 1) & 0x1F, data[5] & 0x01 != 0, data[6], data[7])
            } else {
                (0, true, 0, 0)
            };

        Some(Self {
            pid,
            table_id: data[0],
            section_syntax_indicator,
            subtable_extension: subtable_extension(&data),
            section_length,
            version_number,
            current_next_indicator,
            section_number,
            last_section_number,
            complete: true,
            data,
        })
    }

    pub fn has_crc(&self) -> bool {
        crc::has_crc(self.table_id)
    }

    pub fn verify_crc(&self) -> Result<(), DecodeError> {
        crc::verify(self.table_id, &self.data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Forward-only cursor. Every read is bounds checked and reports what was
/// being read when the data runs out.
pub struct SectionReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SectionReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::Truncated { what });
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn skip(&mut self, len: usize, what: &'static str) -> Result<(), DecodeError> {
        self.take(len, what).map(|_| ())
    }

    pub fn read_u8(&mut self, what: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, what)?[0])
    }

    pub fn read_u16(&mut self, what: &'static str) -> Result<u16, DecodeError> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u24(&mut self, what: &'static str) -> Result<u32, DecodeError> {
        let b = self.take(3, what)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn read_u32(&mut self, what: &'static str) -> Result<u32, DecodeError> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// 13-bit PID behind 3 reserved bits.
    pub fn read_pid(&mut self, what: &'static str) -> Result<u16, DecodeError> {
        Ok(self.read_u16(what)? & 0x1FFF)
    }

    /// 12-bit length behind 4 reserved bits.
    pub fn read_length12(&mut self, what: &'static str) -> Result<usize, DecodeError> {
        Ok((self.read_u16(what)? & 0x0FFF) as usize)
    }
}

/// Fixed long-form header, as every table decoder needs it.
#[derive(Debug, Clone, Copy)]
pub struct TableHeader {
    pub table_id: u8,
    pub section_length: usize,
    pub extension: u16,
    pub version_number: u8,
    pub current_next_indicator: bool,
    pub section_number: u8,
    pub last_section_number: u8,
}

impl TableHeader {
    /// Checks the minimum size and that `section_length` accounts for
    /// exactly the buffered bytes, then reads the 8 header bytes.
    /// The returned reader is positioned right after the header.
    pub fn read<'a>(
        table: &'static str,
        data: &'a [u8],
        min: usize,
    ) -> Result<(Self, SectionReader<'a>), DecodeError> {
        if data.len() < min.max(LONG_HEADER_LEN + CRC_LEN) {
            return Err(DecodeError::TooShort {
                table,
                len: data.len(),
                min,
            });
        }
        let mut r = SectionReader::new(data);
        let table_id = r.read_u8("table_id")?;
        let section_length = r.read_length12("section_length")?;
        if section_length + SECTION_HEADER_LEN != data.len() {
            return Err(DecodeError::SectionLength {
                declared: section_length,
                actual: data.len(),
            });
        }
        let extension = r.read_u16("table_id_extension")?;
        let flags = r.read_u8("version_number")?;
        let section_number = r.read_u8("section_number")?;
        let last_section_number = r.read_u8("last_section_number")?;
        Ok((
            Self {
                table_id,
                section_length,
                extension,
                version_number: (flags >> 1) & 0x1F,
                current_next_indicator: flags & 0x01 != 0,
                section_number,
                last_section_number,
            },
            r,
        ))
    }

    /// Offset of the CRC trailer; loops must stop here.
    pub fn body_end(&self) -> usize {
        self.section_length + SECTION_HEADER_LEN - CRC_LEN
    }
}
