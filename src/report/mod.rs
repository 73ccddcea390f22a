//! Report generation for demux state snapshots

use std::collections::HashMap;

use crate::directory::{ProgramEntry, Selection};
use crate::processor::DemuxCore;
use crate::psi::eit::Event;
use crate::si_cache::SiCache;
use crate::types::{DemuxReport, NetworkReport, ProgramReport, ServiceReport, StreamReport};

/// Report generator for the directory and SI cache of one [`DemuxCore`]
pub struct Reporter;

impl Reporter {
    /// Generate a structured DemuxReport for API consumers.
    ///
    /// `forwarded` counts payload packets delivered per program number.
    pub fn create_report(core: &DemuxCore, forwarded: &HashMap<u16, u64>) -> DemuxReport {
        let si = core.si_cache();
        let directory = core.directory();

        let listed: Vec<u16> = directory
            .programs()
            .filter(|p| p.pmt_pid.is_some())
            .map(|p| p.program_number)
            .collect();
        let programs = directory
            .programs()
            .map(|program| program_report(program, si, forwarded))
            .collect();

        DemuxReport {
            timestamp: chrono::Utc::now().to_rfc3339(),
            packet_size: core.packet_size(),
            stream_time: si
                .time
                .as_ref()
                .and_then(|t| t.utc_time.to_datetime())
                .map(|t| t.and_utc().to_rfc3339()),
            stats: core.stats(),
            programs,
            services: service_reports(si),
            networks: network_reports(si),
            missing_services: si.services_missing_from_sdt(&listed),
            ca_pids: si
                .cat
                .as_ref()
                .map(|cat| cat.ca_pids().map(|(_, pid)| pid).collect())
                .unwrap_or_default(),
        }
    }

    /// Generate pretty-printed JSON string for CLI output
    pub fn generate_json_report(core: &DemuxCore, forwarded: &HashMap<u16, u64>) -> String {
        let report = Self::create_report(core, forwarded);
        serde_json::to_string_pretty(&report)
            .unwrap_or_else(|_| "{\"error\": \"JSON serialization failed\"}".to_string())
    }
}

fn program_report(
    program: &ProgramEntry,
    si: &SiCache,
    forwarded: &HashMap<u16, u64>,
) -> ProgramReport {
    let streams = program
        .pmt
        .as_ref()
        .map(|pmt| {
            pmt.streams
                .iter()
                .map(|s| StreamReport {
                    pid: s.elementary_pid,
                    stream_type: s.stream_type,
                    stream_type_name: s.stream_type_name,
                    language: s.language.clone(),
                    component_tag: s.component_tag,
                })
                .collect()
        })
        .unwrap_or_default();

    ProgramReport {
        program_number: program.program_number,
        pmt_pid: program.pmt_pid,
        pcr_pid: program.pcr_pid,
        pmt_version: program.pmt.as_ref().map(|pmt| pmt.version),
        selected: program.selection == Selection::Selected,
        route: program.route,
        service_name: si.service_name(program.program_number).map(str::to_owned),
        forwarded_packets: forwarded.get(&program.program_number).copied().unwrap_or(0),
        streams,
    }
}

fn event_title(event: Option<&Event>) -> Option<String> {
    event.and_then(|e| e.name.clone())
}

fn service_reports(si: &SiCache) -> Vec<ServiceReport> {
    si.services
        .iter()
        .map(|(&(transport_stream_id, service_id), record)| {
            let pf = record
                .actual_transport_stream
                .then(|| si.present_following.get(&service_id))
                .flatten();
            ServiceReport {
                transport_stream_id,
                original_network_id: record.original_network_id,
                service_id,
                actual: record.actual_transport_stream,
                name: record.service.name.clone(),
                provider: record.service.provider_name.clone(),
                service_type: record.service.service_type,
                running_status: record.service.running_status_name,
                scrambled: record.service.scrambled,
                present: pf.and_then(|pf| event_title(pf.present.as_ref())),
                following: pf.and_then(|pf| event_title(pf.following.as_ref())),
            }
        })
        .collect()
}

fn network_reports(si: &SiCache) -> Vec<NetworkReport> {
    si.networks
        .values()
        .map(|nit| NetworkReport {
            network_id: nit.network_id,
            actual: nit.actual_network,
            name: nit.name.clone(),
            transport_streams: nit.transports.iter().map(|t| t.transport_stream_id).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::DemuxOptions;
    use crate::psi::crc::append_crc;

    fn pat_packet() -> Vec<u8> {
        let mut s = vec![0x00, 0xB0, 0x0D, 0x00, 0x07, 0xC1, 0, 0, 0x00, 0x01, 0xE1, 0x00];
        append_crc(&mut s);
        let mut p = vec![0x47, 0x40, 0x00, 0x10, 0x00];
        p.extend(s);
        p.resize(188, 0xFF);
        p
    }

    #[test]
    fn report_lists_programs_from_pat() {
        let mut core = DemuxCore::new(DemuxOptions {
            packet_size: Some(188),
            ..DemuxOptions::default()
        });
        core.push(&pat_packet());
        let forwarded = HashMap::from([(1u16, 5u64)]);
        let report = Reporter::create_report(&core, &forwarded);

        assert_eq!(report.programs.len(), 1);
        let program = &report.programs[0];
        assert_eq!(program.program_number, 1);
        assert_eq!(program.pmt_pid, Some(0x100));
        assert!(program.selected);
        assert_eq!(program.forwarded_packets, 5);
        assert!(program.streams.is_empty());
        assert!(report.missing_services.is_empty());

        let json = Reporter::generate_json_report(&core, &forwarded);
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["programs"][0]["pmt_pid"], 256);
        assert_eq!(value["stats"]["sections"], 1);
    }
}
