// psi/assembler.rs
//! Per-PID section reassembly with continuity checking and version
//! de-duplication.

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::constants::{PID_COUNT, SECTION_HEADER_LEN, STUFFING_TABLE_ID};
use crate::packetizer::TransportPacket;
use crate::psi::section::Section;

/// Section numbers received for one version, one bit each.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeenSections([u64; 4]);

impl SeenSections {
    pub fn contains(&self, section_number: u8) -> bool {
        self.0[section_number as usize / 64] & (1 << (section_number % 64)) != 0
    }

    fn insert(&mut self, section_number: u8) {
        self.0[section_number as usize / 64] |= 1 << (section_number % 64);
    }

    fn remove(&mut self, section_number: u8) {
        self.0[section_number as usize / 64] &= !(1 << (section_number % 64));
    }

    fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }
}

/// Last processed version of one `(table_id, subtable_extension)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtableVersion {
    pub table_id: u8,
    pub subtable_extension: u16,
    pub version: Option<u8>,
    pub seen: SeenSections,
    previous: Option<(u8, SeenSections)>,
}

#[derive(Debug, Default)]
pub struct PidStreamState {
    /// `Some` while a section is being accumulated.
    continuity_counter: Option<u8>,
    accumulator: BytesMut,
    section_length: usize,
    current_table_id: Option<u8>,
    subtables: Vec<SubtableVersion>,
}

impl PidStreamState {
    fn reset_accumulator(&mut self) {
        self.continuity_counter = None;
        self.accumulator.clear();
        self.section_length = 0;
    }

    fn subtable_mut(&mut self, table_id: u8, ext: u16) -> &mut SubtableVersion {
        let idx = match self
            .subtables
            .iter()
            .position(|s| s.table_id == table_id && s.subtable_extension == ext)
        {
            Some(idx) => idx,
            None => {
                self.subtables.push(SubtableVersion {
                    table_id,
                    subtable_extension: ext,
                    version: None,
                    seen: SeenSections::default(),
                    previous: None,
                });
                self.subtables.len() - 1
            }
        };
        &mut self.subtables[idx]
    }

    pub fn subtables(&self) -> &[SubtableVersion] {
        &self.subtables
    }
}

/// Outcome of feeding one packet to the assembler.
#[derive(Debug)]
pub enum SectionPush {
    /// Packet ignored: no payload, bad pointer, stuffing or discontinuity.
    Dropped,
    /// Bytes accepted, section not finished yet.
    Incomplete,
    /// Section finished but is a repeat or not yet current.
    NotApplicable {
        table_id: u8,
        subtable_extension: u16,
        version_number: u8,
        current_next_indicator: bool,
    },
    Complete(Section),
}

pub struct SectionAssembler {
    streams: Vec<Option<PidStreamState>>,
}

impl Default for SectionAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionAssembler {
    pub fn new() -> Self {
        Self {
            streams: (0..PID_COUNT).map(|_| None).collect(),
        }
    }

    pub fn stream(&self, pid: u16) -> Option<&PidStreamState> {
        self.streams.get(pid as usize).and_then(Option::as_ref)
    }

    /// Table id of the last section started on `pid`.
    pub fn current_table_id(&self, pid: u16) -> Option<u8> {
        self.stream(pid).and_then(|s| s.current_table_id)
    }

    pub fn push_section(&mut self, packet: &TransportPacket) -> SectionPush {
        let Some(payload) = packet.payload() else {
            return SectionPush::Dropped;
        };
        let pid = packet.pid;
        let cc = packet.continuity_counter;
        let slot = &mut self.streams[pid as usize & (PID_COUNT - 1)];

        if packet.payload_unit_start_indicator {
            let Some((&pointer, rest)) = payload.split_first() else {
                return SectionPush::Dropped;
            };
            let pointer = pointer as usize;
            if pointer > rest.len() {
                debug!(pid, pointer, "pointer_field past end of payload");
                return SectionPush::Dropped;
            }
            let data = &rest[pointer..];
            let state = slot.get_or_insert_with(PidStreamState::default);
            if state.continuity_counter.is_some() {
                debug!(pid, "section start before previous section finished");
                state.reset_accumulator();
            }
            if data.len() < SECTION_HEADER_LEN || data[0] == STUFFING_TABLE_ID {
                return SectionPush::Dropped;
            }

            state.section_length = (u16::from_be_bytes([data[1], data[2]]) & 0x0FFF) as usize;
            state.current_table_id = Some(data[0]);
            state.accumulator.extend_from_slice(data);
            state.continuity_counter = Some(cc);
        } else {
            let Some(state) = slot.as_mut() else {
                return SectionPush::Dropped;
            };
            match state.continuity_counter {
                Some(last) if (last + 1) & 0x0F == cc => {
                    state.accumulator.extend_from_slice(payload);
                    state.continuity_counter = Some(cc);
                }
                Some(last) => {
                    debug!(pid, expected = (last + 1) & 0x0F, got = cc, "continuity discontinuity");
                    state.reset_accumulator();
                    return SectionPush::Dropped;
                }
                None => return SectionPush::Dropped,
            }
        }

        let Some(state) = slot.as_mut() else {
            return SectionPush::Dropped;
        };
        let total = state.section_length + SECTION_HEADER_LEN;
        if state.accumulator.len() < total {
            return SectionPush::Incomplete;
        }

        let bytes: Bytes = state.accumulator.split_to(total).freeze();
        state.reset_accumulator();
        let Some(section) = Section::parse(pid, bytes) else {
            debug!(pid, "section too short for its header");
            return SectionPush::Dropped;
        };

        if !section.section_syntax_indicator {
            return SectionPush::Complete(section);
        }

        let not_applicable = SectionPush::NotApplicable {
            table_id: section.table_id,
            subtable_extension: section.subtable_extension,
            version_number: section.version_number,
            current_next_indicator: section.current_next_indicator,
        };
        if !section.current_next_indicator {
            trace!(pid, table_id = section.table_id, "section not yet applicable");
            return not_applicable;
        }
        let subtable = state.subtable_mut(section.table_id, section.subtable_extension);
        if subtable.version == Some(section.version_number) {
            if subtable.seen.contains(section.section_number) {
                trace!(pid, table_id = section.table_id, version = section.version_number, "repeated section");
                return not_applicable;
            }
        } else {
            subtable.previous = subtable.version.map(|v| (v, subtable.seen));
            subtable.version = Some(section.version_number);
            subtable.seen = SeenSections::default();
        }
        subtable.seen.insert(section.section_number);
        SectionPush::Complete(section)
    }

    /// Forgets the version recorded for a section the decoder rejected,
    /// so the next broadcast of the same version is tried again.
    pub fn revert_version(&mut self, section: &Section) {
        let Some(state) = self.streams[section.pid as usize & (PID_COUNT - 1)].as_mut() else {
            return;
        };
        if let Some(subtable) = state.subtables.iter_mut().find(|s| {
            s.table_id == section.table_id && s.subtable_extension == section.subtable_extension
        }) {
            if subtable.version == Some(section.version_number) {
                subtable.seen.remove(section.section_number);
                if subtable.seen.is_empty() {
                    let (version, seen) = subtable.previous.take().unzip();
                    subtable.version = version;
                    subtable.seen = seen.unwrap_or_default();
                }
            }
        }
    }

    pub fn remove_stream(&mut self, pid: u16) {
        if let Some(slot) = self.streams.get_mut(pid as usize) {
            *slot = None;
        }
    }

    pub fn clear(&mut self) {
        self.streams.iter_mut().for_each(|slot| *slot = None);
    }
}
