use clap::Parser;
use tracing_subscriber::EnvFilter;
use tsdemux_core::demux::{run, InputSource, Options};
use tsdemux_core::DemuxOptions;

#[derive(Parser)]
#[clap(about = "Demultiplex an MPEG-2 transport stream and report its PSI/SI tables")]
struct Opt {
    /// Transport stream file to read, or `-` for stdin
    #[clap(long, conflicts_with = "addr", required_unless_present = "addr")]
    input: Option<String>,

    /// UDP socket to bind + listen (IPv4, multicast groups are joined)
    #[clap(long)]
    addr: Option<String>,

    /// Only route these program numbers (comma separated)
    #[clap(long, value_delimiter = ',')]
    programs: Option<Vec<u16>>,

    /// Accept sections with a bad CRC-32
    #[clap(long, default_value_t = false)]
    no_crc: bool,

    /// Force the packet size (188, 192, 204 or 208) instead of detecting it
    #[clap(long, value_parser = clap::builder::PossibleValuesParser::new(["188", "192", "204", "208"]))]
    packet_size: Option<String>,

    /// Refresh interval for the JSON snapshot
    #[clap(long, default_value_t = 2)]
    refresh: u64,

    /// Log filter, e.g. `debug` or `tsdemux_core=trace` (RUST_LOG wins when set)
    #[clap(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&opt.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let input = match (&opt.input, &opt.addr) {
        (Some(path), _) => InputSource::from_path(path),
        (None, Some(addr)) => InputSource::Udp(addr.parse()?),
        (None, None) => anyhow::bail!("one of --input or --addr is required"),
    };
    let packet_size = opt.packet_size.as_deref().map(str::parse).transpose()?;

    run(Options {
        input,
        refresh_secs: opt.refresh,
        programs: opt.programs,
        demux: DemuxOptions {
            check_crc: !opt.no_crc,
            packet_size,
            ..DemuxOptions::default()
        },
    })
    .await
}
