use serde::Serialize;

use crate::directory::RouteId;
use crate::network::InputSource;
use crate::processor::{DemuxOptions, DemuxStats};

/// Elementary stream of one program, as reported
#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub pid: u16,
    pub stream_type: u8,
    pub stream_type_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_tag: Option<u8>,
}

/// One PAT program with its PMT contents (public API)
#[derive(Debug, Clone, Serialize)]
pub struct ProgramReport {
    pub program_number: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmt_pid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pcr_pid: Option<u16>,
    /// PMT version for change tracking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmt_version: Option<u8>,
    pub selected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    pub forwarded_packets: u64,
    pub streams: Vec<StreamReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub service_id: u16,
    pub actual: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<u8>,
    pub running_status: &'static str,
    pub scrambled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub present: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub following: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    pub network_id: u16,
    pub actual: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub transport_streams: Vec<u16>,
}

/// Complete snapshot of the demux state
#[derive(Debug, Clone, Serialize)]
pub struct DemuxReport {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_size: Option<usize>,
    /// Stream time from the last TDT/TOT
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_time: Option<String>,
    pub stats: DemuxStats,
    pub programs: Vec<ProgramReport>,
    pub services: Vec<ServiceReport>,
    pub networks: Vec<NetworkReport>,
    /// PAT programs the actual-TS SDT does not describe
    pub missing_services: Vec<u16>,
    pub ca_pids: Vec<u16>,
}

/// Configuration for the command line runner
#[derive(Debug, Clone)]
pub struct Options {
    pub input: InputSource,
    pub refresh_secs: u64,
    /// Restrict routing to these programs; `None` routes everything.
    pub programs: Option<Vec<u16>>,
    pub demux: DemuxOptions,
}
