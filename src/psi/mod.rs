//! PSI / SI tables: reassembly, CRC and the per-table decoders.

pub mod assembler;
pub mod bcd;
pub mod cat;
pub mod crc;
pub mod datetime;
pub mod descriptor;
pub mod eit;
pub mod nit;
pub mod pat;
pub mod pmt;
pub mod sdt;
pub mod section;
pub mod tdt;
pub mod text;

use serde::Serialize;

use crate::constants::table_id;
use crate::error::DecodeError;

pub use assembler::{SectionAssembler, SectionPush};
pub use cat::{parse_cat, CatSection};
pub use descriptor::{parse_descriptors, Descriptor};
pub use eit::{parse_eit, EitSection};
pub use nit::{parse_nit, NitSection};
pub use pat::{parse_pat, PatEntry, PatSection};
pub use pmt::{parse_pmt, PmtSection, StreamInfo};
pub use sdt::{parse_sdt, SdtSection};
pub use section::Section;
pub use tdt::{parse_tdt_tot, TimeSection};

/// A decoded table, ready for the directory or the SI cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "table", content = "body", rename_all = "snake_case")]
pub enum Table {
    Pat(PatSection),
    Cat(CatSection),
    Pmt(PmtSection),
    Nit(NitSection),
    Sdt(SdtSection),
    Eit(EitSection),
    Time(TimeSection),
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Pat(_) => "PAT",
            Table::Cat(_) => "CAT",
            Table::Pmt(_) => "PMT",
            Table::Nit(_) => "NIT",
            Table::Sdt(_) => "SDT",
            Table::Eit(_) => "EIT",
            Table::Time(t) if t.is_tot() => "TOT",
            Table::Time(_) => "TDT",
        }
    }
}

/// Decodes a complete section by table id.
///
/// `Ok(None)` for table ids without a decoder (BAT, TSDT, private tables).
/// The generic CRC check is the caller's job; TOT checks its own.
pub fn decode_section(section: &Section) -> Result<Option<Table>, DecodeError> {
    let data = section.as_bytes();
    let table = match section.table_id {
        table_id::PAT => Table::Pat(parse_pat(data)?),
        table_id::CAT => Table::Cat(parse_cat(data)?),
        table_id::PMT => Table::Pmt(parse_pmt(data)?),
        table_id::NIT_ACTUAL | table_id::NIT_OTHER => Table::Nit(parse_nit(data)?),
        table_id::SDT_ACTUAL | table_id::SDT_OTHER => Table::Sdt(parse_sdt(data)?),
        table_id::EIT_PF_ACTUAL..=table_id::EIT_SCHEDULE_LAST => Table::Eit(parse_eit(data)?),
        table_id::TDT | table_id::TOT => Table::Time(parse_tdt_tot(data)?),
        _ => return Ok(None),
    };
    Ok(Some(table))
}
