// src/lib.rs
//! MPEG-2 transport stream demux core: packet framing, PSI/SI section
//! reassembly and decoding, and a program directory that routes payload
//! packets to selected programs.
//!
//! The library is I/O free; feed bytes to [`DemuxCore::push`] and act on the
//! returned [`DemuxEvent`]s.

pub mod demux {
    pub use crate::network::InputSource;
    pub use crate::types::Options;

    /// Async entry-point; returns at end of input or when stopped (Ctrl-C or socket error)
    pub async fn run(opts: Options) -> anyhow::Result<()> {
        crate::runner::run(opts).await
    }
}

pub mod constants;
pub mod directory;
pub mod error;
pub mod network;
pub mod packetizer;
pub mod processor;
pub mod psi;
pub mod report;
pub mod si_cache;
pub mod types;

mod runner;

pub use error::{DecodeError, PacketError};
pub use processor::{DemuxCore, DemuxEvent, DemuxOptions, DemuxStats};
