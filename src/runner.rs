//! Drives a [`DemuxCore`] from an input source and prints JSON snapshots.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info};

use crate::network::Input;
use crate::processor::{DemuxCore, DemuxEvent};
use crate::psi::Table;
use crate::report::Reporter;
use crate::types::Options;

/// Big enough for a jumbo datagram and a healthy file read.
const READ_BUF_SIZE: usize = 64 * 1024;

/// Async entry-point; returns at end of input, on Ctrl-C or on an I/O error.
pub async fn run(opts: Options) -> anyhow::Result<()> {
    let mut core = DemuxCore::new(opts.demux.clone());
    let mut forwarded: HashMap<u16, u64> = HashMap::new();

    if let Some(programs) = &opts.programs {
        info!(?programs, "restricting output to selected programs");
        let events = core.select_programs(programs);
        log_events(&events, &mut forwarded);
    }

    let mut input = Input::open(&opts.input).await?;
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut refresh = tokio::time::interval(Duration::from_secs(opts.refresh_secs.max(1)));
    refresh.tick().await;

    loop {
        tokio::select! {
            read = input.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    info!("end of input");
                    break;
                }
                let events = core.push(&buf[..n]);
                log_events(&events, &mut forwarded);
            }
            _ = refresh.tick() => {
                println!("{}", Reporter::generate_json_report(&core, &forwarded));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    println!("{}", Reporter::generate_json_report(&core, &forwarded));
    Ok(())
}

fn log_events(events: &[DemuxEvent], forwarded: &mut HashMap<u16, u64>) {
    for event in events {
        match event {
            DemuxEvent::Table { pid, table } => log_table(*pid, table),
            // already logged by the core
            DemuxEvent::TableRejected { .. } => {}
            DemuxEvent::RouteAdded {
                program_number,
                route,
            } => info!(program_number, route = route.0, "route added"),
            DemuxEvent::RouteRemoved {
                program_number,
                route,
            } => info!(program_number, route = route.0, "route removed"),
            DemuxEvent::Payload { program_number, .. } => {
                *forwarded.entry(*program_number).or_default() += 1;
            }
        }
    }
}

fn log_table(pid: u16, table: &Table) {
    match table {
        Table::Pat(pat) => info!(
            pid,
            transport_stream_id = pat.transport_stream_id,
            version = pat.version,
            programs = pat.programs.len(),
            "PAT"
        ),
        Table::Pmt(pmt) => info!(
            pid,
            program_number = pmt.program_number,
            version = pmt.version,
            pcr_pid = pmt.pcr_pid,
            streams = pmt.streams.len(),
            "PMT"
        ),
        Table::Sdt(sdt) => info!(
            pid,
            transport_stream_id = sdt.transport_stream_id,
            actual = sdt.actual_transport_stream,
            services = sdt.services.len(),
            "SDT"
        ),
        Table::Nit(nit) => info!(
            pid,
            network_id = nit.network_id,
            name = nit.name.as_deref().unwrap_or(""),
            transports = nit.transports.len(),
            "NIT"
        ),
        other => debug!(pid, table = other.name(), "table"),
    }
}
