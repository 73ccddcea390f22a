//! Main packet processing logic: framing, table reassembly and decoding,
//! directory updates and payload routing for one demux instance.
//!
//! Everything runs inline in [`DemuxCore::push`]. The core is not shared
//! between threads; an embedder that needs to must wrap it in one mutex.

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::constants::{pid, NULL_PID};
use crate::directory::{Directory, RouteChange, RouteId};
use crate::error::DecodeError;
use crate::packetizer::{PacketResult, Packetizer, TransportPacket};
use crate::psi::{decode_section, Section, SectionAssembler, SectionPush, Table};
use crate::si_cache::SiCache;

#[derive(Debug, Clone)]
pub struct DemuxOptions {
    /// Reject long-form sections whose CRC-32 does not check out.
    pub check_crc: bool,
    /// Force a packet size instead of auto-detecting it.
    pub packet_size: Option<usize>,
    /// Route every program a PAT announces until a selection is made.
    pub select_all: bool,
}

impl Default for DemuxOptions {
    fn default() -> Self {
        Self {
            check_crc: true,
            packet_size: None,
            select_all: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DemuxEvent {
    Table {
        pid: u16,
        table: Table,
    },
    TableRejected {
        pid: u16,
        table_id: u8,
        error: DecodeError,
    },
    RouteAdded {
        program_number: u16,
        route: RouteId,
    },
    RouteRemoved {
        program_number: u16,
        route: RouteId,
    },
    /// A payload packet, forwarded unmodified to one owning program.
    Payload {
        pid: u16,
        program_number: u16,
        route: RouteId,
        stream_type: Option<u8>,
        packet: Bytes,
    },
}

impl From<RouteChange> for DemuxEvent {
    fn from(change: RouteChange) -> Self {
        match change {
            RouteChange::Added {
                program_number,
                route,
            } => DemuxEvent::RouteAdded {
                program_number,
                route,
            },
            RouteChange::Removed {
                program_number,
                route,
            } => DemuxEvent::RouteRemoved {
                program_number,
                route,
            },
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DemuxStats {
    pub packets: u64,
    pub bad_packets: u64,
    pub errored_packets: u64,
    pub skipped_bytes: u64,
    pub sections: u64,
    pub duplicate_sections: u64,
    pub crc_errors: u64,
    pub decode_errors: u64,
    pub payload_packets: u64,
}

pub struct DemuxCore {
    options: DemuxOptions,
    packetizer: Packetizer,
    assembler: SectionAssembler,
    directory: Directory,
    si_cache: SiCache,
    stats: DemuxStats,
}

impl Default for DemuxCore {
    fn default() -> Self {
        Self::new(DemuxOptions::default())
    }
}

impl DemuxCore {
    pub fn new(options: DemuxOptions) -> Self {
        let packetizer = match options.packet_size {
            Some(size) => Packetizer::with_packet_size(size).unwrap_or_else(|| {
                warn!(size, "unsupported packet size, falling back to detection");
                Packetizer::new()
            }),
            None => Packetizer::new(),
        };
        Self {
            directory: Directory::new(options.select_all),
            options,
            packetizer,
            assembler: SectionAssembler::new(),
            si_cache: SiCache::default(),
            stats: DemuxStats::default(),
        }
    }

    /// Feeds raw bytes; returns everything they produced, in stream order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<DemuxEvent> {
        let mut events = Vec::new();
        self.packetizer.push(bytes);
        let skipped_before = self.packetizer.skipped_bytes();

        loop {
            match self.packetizer.next_packet() {
                PacketResult::Ready(packet) => self.process_packet(&packet, &mut events),
                PacketResult::Bad(err) => {
                    self.stats.bad_packets += 1;
                    debug!(%err, "skipping bad packet");
                }
                PacketResult::NeedMoreData => break,
            }
        }

        let skipped = self.packetizer.skipped_bytes().saturating_sub(skipped_before);
        if skipped > 0 {
            debug!(skipped, "discarded bytes while searching for sync");
            self.stats.skipped_bytes += skipped;
        }
        events
    }

    /// Handles one framed packet.
    pub fn process_packet(&mut self, packet: &TransportPacket, events: &mut Vec<DemuxEvent>) {
        self.stats.packets += 1;
        let pid = packet.pid;
        if pid == NULL_PID {
            return;
        }
        if packet.transport_error_indicator {
            self.stats.errored_packets += 1;
            debug!(pid, "transport_error_indicator set, packet dropped");
            return;
        }

        let table_id_hint = if packet.payload_unit_start_indicator {
            packet.payload().and_then(|payload| {
                let pointer = *payload.first()? as usize;
                payload.get(1 + pointer).copied()
            })
        } else {
            self.assembler.current_table_id(pid)
        };

        if self.directory.carries_table(pid, table_id_hint) {
            match self.assembler.push_section(packet) {
                SectionPush::Complete(section) => self.handle_section(section, events),
                SectionPush::NotApplicable { .. } => self.stats.duplicate_sections += 1,
                SectionPush::Incomplete | SectionPush::Dropped => {}
            }
            return;
        }

        let routes = self.directory.routes_for_pid(pid);
        if routes.is_empty() {
            trace!(pid, "no route for payload packet");
            return;
        }
        self.stats.payload_packets += 1;
        for route in routes {
            events.push(DemuxEvent::Payload {
                pid,
                program_number: route.program_number,
                route: route.route,
                stream_type: route.stream_type,
                packet: packet.bytes(),
            });
        }
    }

    fn reject(&mut self, section: &Section, error: DecodeError, events: &mut Vec<DemuxEvent>) {
        warn!(pid = section.pid, table_id = section.table_id, %error, "table rejected");
        self.assembler.revert_version(section);
        events.push(DemuxEvent::TableRejected {
            pid: section.pid,
            table_id: section.table_id,
            error,
        });
    }

    /// Checks, decodes and applies one reassembled section.
    pub fn handle_section(&mut self, section: Section, events: &mut Vec<DemuxEvent>) {
        self.stats.sections += 1;
        if self.options.check_crc {
            if let Err(error) = section.verify_crc() {
                self.stats.crc_errors += 1;
                self.reject(&section, error, events);
                return;
            }
        }

        let table = match decode_section(&section) {
            Ok(Some(table)) => table,
            Ok(None) => {
                trace!(pid = section.pid, table_id = section.table_id, "no decoder for table");
                return;
            }
            Err(error) => {
                self.stats.decode_errors += 1;
                self.reject(&section, error, events);
                return;
            }
        };

        match &table {
            Table::Pat(pat) => {
                if section.pid != pid::PAT {
                    debug!(pid = section.pid, "PAT outside PID 0 ignored");
                    return;
                }
                let update = self.directory.apply_pat(pat);
                for stale in &update.discarded_streams {
                    self.assembler.remove_stream(*stale);
                }
                events.push(DemuxEvent::Table {
                    pid: section.pid,
                    table,
                });
                events.extend(update.routes.into_iter().map(DemuxEvent::from));
            }
            Table::Pmt(pmt) => {
                if !self.directory.apply_pmt(section.pid, pmt.clone()) {
                    self.assembler.remove_stream(section.pid);
                    return;
                }
                debug!(
                    pid = section.pid,
                    program_number = pmt.program_number,
                    streams = pmt.streams.len(),
                    "PMT applied"
                );
                events.push(DemuxEvent::Table {
                    pid: section.pid,
                    table,
                });
            }
            _ => {
                self.si_cache.update(&table);
                events.push(DemuxEvent::Table {
                    pid: section.pid,
                    table,
                });
            }
        }
    }

    /// Routes exactly `program_numbers`; returns the route changes.
    pub fn select_programs(&mut self, program_numbers: &[u16]) -> Vec<DemuxEvent> {
        self.directory
            .select_programs(program_numbers)
            .into_iter()
            .map(DemuxEvent::from)
            .collect()
    }

    pub fn select_all_programs(&mut self) -> Vec<DemuxEvent> {
        self.directory
            .select_all_programs()
            .into_iter()
            .map(DemuxEvent::from)
            .collect()
    }

    /// Drops all packet, section, directory and SI state. Safe at any point,
    /// including mid-section; calling it twice is the same as once. Returns
    /// removals for routes that were active.
    pub fn reset(&mut self) -> Vec<DemuxEvent> {
        self.packetizer.clear();
        self.assembler.clear();
        self.si_cache.clear();
        self.stats = DemuxStats::default();
        self.directory
            .reset()
            .into_iter()
            .map(DemuxEvent::from)
            .collect()
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn si_cache(&self) -> &SiCache {
        &self.si_cache
    }

    pub fn stats(&self) -> DemuxStats {
        self.stats
    }

    pub fn packet_size(&self) -> Option<usize> {
        self.packetizer.packet_size()
    }

    pub fn options(&self) -> &DemuxOptions {
        &self.options
    }
}
