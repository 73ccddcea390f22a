//! Last applied SI tables, kept for consumers that query metadata.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::psi::eit::Event;
use crate::psi::{CatSection, EitSection, NitSection, SdtSection, Table, TimeSection};

/// Present and following events of one service.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PresentFollowing {
    pub present: Option<Event>,
    pub following: Option<Event>,
}

/// Not serialized directly (tuple keys); see `report` for the JSON view.
#[derive(Debug, Default, Clone)]
pub struct SiCache {
    pub cat: Option<CatSection>,
    /// Keyed by `(network_id, actual_network)`.
    pub networks: BTreeMap<(u16, bool), NitSection>,
    /// Keyed by `(transport_stream_id, service_id)`.
    pub services: BTreeMap<(u16, u16), ServiceRecord>,
    /// Actual-TS present/following, keyed by service id.
    pub present_following: BTreeMap<u16, PresentFollowing>,
    pub time: Option<TimeSection>,
    pub actual_transport_stream_id: Option<u16>,
    /// Last SDT version seen per transport stream id.
    sdt_versions: BTreeMap<u16, u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceRecord {
    pub original_network_id: u16,
    pub actual_transport_stream: bool,
    pub service: crate::psi::sdt::Service,
}

impl SiCache {
    /// Stores a decoded table. PAT and PMT belong to the directory and are
    /// ignored here. Returns true when something was stored.
    pub fn update(&mut self, table: &Table) -> bool {
        match table {
            Table::Cat(cat) => self.cat = Some(cat.clone()),
            Table::Nit(nit) => {
                self.networks
                    .insert((nit.network_id, nit.actual_network), nit.clone());
            }
            Table::Sdt(sdt) => self.update_sdt(sdt),
            Table::Eit(eit) => return self.update_eit(eit),
            Table::Time(time) => self.time = Some(time.clone()),
            Table::Pat(_) | Table::Pmt(_) => return false,
        }
        true
    }

    fn update_sdt(&mut self, sdt: &SdtSection) {
        if sdt.actual_transport_stream {
            self.actual_transport_stream_id = Some(sdt.transport_stream_id);
        }
        let tsid = sdt.transport_stream_id;
        let previous = self.sdt_versions.insert(tsid, sdt.version);
        if previous.is_some_and(|v| v != sdt.version) {
            let dropped: Vec<u16> = self
                .services
                .keys()
                .filter(|(t, _)| *t == tsid)
                .map(|&(_, sid)| sid)
                .collect();
            self.services.retain(|(t, _), _| *t != tsid);
            if sdt.actual_transport_stream {
                let listed: HashSet<u16> = sdt.services.iter().map(|s| s.service_id).collect();
                for sid in dropped.iter().filter(|sid| !listed.contains(sid)) {
                    self.present_following.remove(sid);
                }
            }
            debug!(tsid, version = sdt.version, dropped = dropped.len(), "SDT version changed");
        }
        // each SDT section fully describes its own services
        for service in &sdt.services {
            self.services.insert(
                (sdt.transport_stream_id, service.service_id),
                ServiceRecord {
                    original_network_id: sdt.original_network_id,
                    actual_transport_stream: sdt.actual_transport_stream,
                    service: service.clone(),
                },
            );
        }
    }

    fn update_eit(&mut self, eit: &EitSection) -> bool {
        if !(eit.present_following && eit.actual_transport_stream) {
            return false;
        }
        let entry = self.present_following.entry(eit.service_id).or_default();
        let event = eit.events.first().cloned();
        match eit.section_number {
            0 => entry.present = event,
            1 => entry.following = event,
            _ => return false,
        }
        true
    }

    pub fn service_name(&self, service_id: u16) -> Option<&str> {
        self.services
            .iter()
            .filter(|(_, r)| r.actual_transport_stream)
            .find(|((_, sid), _)| *sid == service_id)
            .and_then(|(_, r)| r.service.name.as_deref())
    }

    /// PAT program numbers without a matching service in the actual-TS SDT.
    ///
    /// Empty until an actual SDT has been seen.
    pub fn services_missing_from_sdt(&self, program_numbers: &[u16]) -> Vec<u16> {
        let Some(tsid) = self.actual_transport_stream_id else {
            return Vec::new();
        };
        let known: HashSet<u16> = self
            .services
            .keys()
            .filter(|(t, _)| *t == tsid)
            .map(|(_, sid)| *sid)
            .collect();
        program_numbers
            .iter()
            .copied()
            .filter(|pn| !known.contains(pn))
            .collect()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
