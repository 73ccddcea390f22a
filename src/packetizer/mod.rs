//! Packet framing: turns an arbitrary byte stream into fixed-size TS packets.
//!
//! The packet size is auto-detected once (188/192/204/208 bytes) and never
//! changes afterwards; a format change requires [`Packetizer::clear`].
//! Loss of sync is recovered by discarding single bytes until the next
//! sync byte lines up again.

use bitstream_io::{BigEndian, BitRead, BitReader};
use bytes::{Buf, Bytes, BytesMut};
use serde::Serialize;
use tracing::{debug, trace};

use crate::constants::*;
use crate::error::PacketError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdaptationFieldControl {
    Reserved,
    PayloadOnly,
    AdaptationFieldOnly,
    AdaptationFieldAndPayload,
}

impl AdaptationFieldControl {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Reserved,
            1 => Self::PayloadOnly,
            2 => Self::AdaptationFieldOnly,
            _ => Self::AdaptationFieldAndPayload,
        }
    }

    pub fn has_payload(self) -> bool {
        matches!(self, Self::PayloadOnly | Self::AdaptationFieldAndPayload)
    }

    pub fn has_adaptation_field(self) -> bool {
        matches!(self, Self::AdaptationFieldOnly | Self::AdaptationFieldAndPayload)
    }
}

/// One fixed-size frame. Holds the whole frame (M2TS timestamp header or
/// trailing FEC bytes included) so payload packets can be forwarded
/// unmodified.
#[derive(Debug, Clone)]
pub struct TransportPacket {
    pub pid: u16,
    pub payload_unit_start_indicator: bool,
    pub transport_error_indicator: bool,
    pub scrambling_control: u8,
    pub adaptation_field_control: AdaptationFieldControl,
    pub continuity_counter: u8,
    data: Bytes,
    /// Start of the 188-byte TS packet inside `data`.
    ts_start: usize,
    payload_offset: Option<usize>,
}

struct Header {
    transport_error_indicator: bool,
    payload_unit_start_indicator: bool,
    pid: u16,
    scrambling_control: u8,
    adaptation_field_control: u8,
    continuity_counter: u8,
}

fn read_header(bytes: &[u8]) -> std::io::Result<Header> {
    let mut br = BitReader::endian(bytes, BigEndian);
    let transport_error_indicator = br.read_bit()?;
    let payload_unit_start_indicator = br.read_bit()?;
    let _transport_priority = br.read_bit()?;
    let pid = br.read::<13, u16>()?;
    let scrambling_control = br.read::<2, u8>()?;
    let adaptation_field_control = br.read::<2, u8>()?;
    let continuity_counter = br.read::<4, u8>()?;
    Ok(Header {
        transport_error_indicator,
        payload_unit_start_indicator,
        pid,
        scrambling_control,
        adaptation_field_control,
        continuity_counter,
    })
}

impl TransportPacket {
    /// Parses the TS header and skips the adaptation field.
    ///
    /// The frame length selects the layout: a 192-byte frame starts with
    /// the M2TS timestamp header, every other size starts at the sync byte.
    /// Only 188 bytes from the sync byte on are interpreted.
    pub fn parse(data: Bytes) -> Result<Self, PacketError> {
        let ts_start = sync_offset(data.len());
        if data.len() < ts_start + TS_PACKET_SIZE {
            return Err(PacketError::TooShort(data.len()));
        }
        let ts_end = ts_start + TS_PACKET_SIZE;
        if data[ts_start] != TS_SYNC_BYTE {
            return Err(PacketError::InvalidSyncByte(data[ts_start]));
        }
        let header = read_header(&data[ts_start + 1..ts_start + 4])
            .map_err(|_| PacketError::TooShort(data.len()))?;
        let afc = AdaptationFieldControl::from_bits(header.adaptation_field_control);

        let mut offset = ts_start + 4;
        if afc.has_adaptation_field() {
            let length = data[offset] as usize;
            offset += 1;
            if afc == AdaptationFieldControl::AdaptationFieldOnly {
                if length != 183 {
                    debug!(pid = header.pid, length, "adaptation-only packet with length != 183");
                }
            } else if length > 182 {
                debug!(pid = header.pid, length, "adaptation field length > 182");
            }
            if offset + length > ts_end {
                return Err(PacketError::AdaptationOverrun {
                    pid: header.pid,
                    len: length,
                });
            }
            offset += length;
        }

        Ok(Self {
            pid: header.pid,
            payload_unit_start_indicator: header.payload_unit_start_indicator,
            transport_error_indicator: header.transport_error_indicator,
            scrambling_control: header.scrambling_control,
            adaptation_field_control: afc,
            continuity_counter: header.continuity_counter,
            payload_offset: afc.has_payload().then_some(offset),
            ts_start,
            data,
        })
    }

    /// Payload bytes, `None` when the packet carries an adaptation field only.
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload_offset
            .map(|start| &self.data[start..self.ts_start + TS_PACKET_SIZE])
    }

    /// The whole frame as received.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The 188-byte TS packet without M2TS header or FEC trailer.
    pub fn ts_bytes(&self) -> &[u8] {
        &self.data[self.ts_start..self.ts_start + TS_PACKET_SIZE]
    }

    /// Cheap handle on the whole frame, for forwarding.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }
}

/// Result of [`Packetizer::next_packet`].
#[derive(Debug)]
pub enum PacketResult {
    NeedMoreData,
    Bad(PacketError),
    Ready(TransportPacket),
}

#[derive(Debug, Default)]
pub struct Packetizer {
    queue: BytesMut,
    packet_size: Option<usize>,
    forced_size: Option<usize>,
    skipped_bytes: u64,
}

impl Packetizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packetizer with a fixed packet size; auto-detection is skipped.
    ///
    /// Returns `None` unless `size` is one of [`PACKET_SIZES`].
    pub fn with_packet_size(size: usize) -> Option<Self> {
        PACKET_SIZES.contains(&size).then(|| Self {
            packet_size: Some(size),
            forced_size: Some(size),
            ..Self::default()
        })
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.queue.extend_from_slice(bytes);
    }

    pub fn packet_size(&self) -> Option<usize> {
        self.packet_size
    }

    /// Bytes discarded so far while looking for sync.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    pub fn buffered(&self) -> usize {
        self.queue.len()
    }

    /// Finds the first frame start `i` where some candidate size puts a
    /// sync byte at `i + offset + n * size` for four consecutive frames.
    ///
    /// Every start with a full detection window behind it is scanned.
    /// Returns `None` until enough data is buffered and a size matches;
    /// scanned starts without a match are dropped, the unscanned tail is
    /// kept for the next call.
    pub fn try_discover_packet_size(&mut self) -> Option<usize> {
        if self.packet_size.is_some() {
            return self.packet_size;
        }
        let window_len = MAX_PACKET_SIZE * SYNC_CONFIRMATIONS;
        if self.queue.len() < window_len {
            return None;
        }

        let queue = &self.queue[..];
        let starts = queue.len() - window_len + 1;
        let found = (0..starts).find_map(|start| {
            PACKET_SIZES
                .iter()
                .copied()
                .find(|&size| {
                    let sync = start + sync_offset(size);
                    (0..SYNC_CONFIRMATIONS).all(|n| queue[sync + n * size] == TS_SYNC_BYTE)
                })
                .map(|size| (start, size))
        });

        match found {
            Some((start, size)) => {
                self.queue.advance(start);
                self.skipped_bytes += start as u64;
                self.packet_size = Some(size);
                debug!(packet_size = size, skipped = start, "packet size detected");
                Some(size)
            }
            None => {
                self.queue.advance(starts);
                self.skipped_bytes += starts as u64;
                trace!(skipped = starts, "no sync pattern found yet");
                None
            }
        }
    }

    pub fn has_packet(&self) -> bool {
        self.packet_size
            .is_some_and(|size| self.queue.len() >= size)
    }

    pub fn next_packet(&mut self) -> PacketResult {
        let Some(size) = self.try_discover_packet_size() else {
            return PacketResult::NeedMoreData;
        };

        let sync = sync_offset(size);
        while self.queue.len() >= size {
            if self.queue[sync] != TS_SYNC_BYTE {
                trace!(byte = self.queue[sync], "lost sync");
                self.queue.advance(1);
                self.skipped_bytes += 1;
                continue;
            }

            let data = self.queue.split_to(size).freeze();
            return match TransportPacket::parse(data) {
                Ok(packet) => PacketResult::Ready(packet),
                Err(err) => {
                    debug!(%err, "bad packet");
                    PacketResult::Bad(err)
                }
            };
        }
        PacketResult::NeedMoreData
    }

    /// Drops buffered bytes and, unless the size was forced, the detected size.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.packet_size = self.forced_size;
        self.skipped_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(size: usize, pid: u16, pusi: bool, cc: u8) -> Vec<u8> {
        let mut p = vec![0xFFu8; size];
        let at = sync_offset(size);
        if at > 0 {
            // arrival timestamp
            p[..at].copy_from_slice(&[0x00, 0x00, 0x10, cc]);
        }
        p[at] = TS_SYNC_BYTE;
        p[at + 1] = ((pid >> 8) as u8 & 0x1F) | if pusi { 0x40 } else { 0 };
        p[at + 2] = pid as u8;
        p[at + 3] = 0x10 | (cc & 0x0F);
        p
    }

    fn stream(size: usize, count: usize) -> Vec<u8> {
        (0..count)
            .flat_map(|i| packet(size, 0x100 + i as u16, i % 2 == 0, i as u8))
            .collect()
    }

    #[test]
    fn frames_every_supported_size() {
        for size in PACKET_SIZES {
            let mut packetizer = Packetizer::new();
            packetizer.push(&stream(size, 8));

            for i in 0..8 {
                match packetizer.next_packet() {
                    PacketResult::Ready(p) => {
                        assert_eq!(p.pid, 0x100 + i as u16);
                        assert_eq!(p.payload_unit_start_indicator, i % 2 == 0);
                        assert_eq!(p.continuity_counter, i as u8);
                        assert_eq!(p.as_bytes().len(), size);
                        assert_eq!(p.payload().map(<[u8]>::len), Some(184));
                    }
                    other => panic!("size {size} packet {i}: {other:?}"),
                }
            }
            assert!(matches!(packetizer.next_packet(), PacketResult::NeedMoreData));
            assert_eq!(packetizer.packet_size(), Some(size));
        }
    }

    #[test]
    fn waits_for_four_packets_worth_of_data() {
        let mut packetizer = Packetizer::new();
        packetizer.push(&stream(188, 3));
        assert!(matches!(packetizer.next_packet(), PacketResult::NeedMoreData));
        assert_eq!(packetizer.packet_size(), None);
        assert!(!packetizer.has_packet());
    }

    #[test]
    fn skips_leading_garbage() {
        let mut data = vec![0x00, 0x12, 0x34];
        data.extend(stream(188, 6));
        let mut packetizer = Packetizer::new();
        packetizer.push(&data);

        let mut count = 0;
        while let PacketResult::Ready(_) = packetizer.next_packet() {
            count += 1;
        }
        assert_eq!(count, 6);
        assert_eq!(packetizer.skipped_bytes(), 3);
    }

    #[test]
    fn m2ts_frames_start_at_the_timestamp_header() {
        let data = stream(192, 6);
        let mut packetizer = Packetizer::new();
        packetizer.push(&data);

        for (i, unit) in data.chunks(192).enumerate() {
            match packetizer.next_packet() {
                PacketResult::Ready(p) => {
                    assert_eq!(p.as_bytes(), unit);
                    assert_eq!(p.ts_bytes(), &unit[4..]);
                    assert_eq!(p.pid, 0x100 + i as u16);
                }
                other => panic!("unit {i}: {other:?}"),
            }
        }
        assert_eq!(packetizer.buffered(), 0);
        assert_eq!(packetizer.skipped_bytes(), 0);
    }

    #[test]
    fn long_leading_garbage_is_scanned_in_one_call() {
        let mut data = vec![0x00; 300];
        data.extend(stream(188, 6));
        let mut packetizer = Packetizer::new();
        packetizer.push(&data);

        let mut count = 0;
        while let PacketResult::Ready(_) = packetizer.next_packet() {
            count += 1;
        }
        assert_eq!(count, 6);
        assert_eq!(packetizer.packet_size(), Some(188));
        assert_eq!(packetizer.skipped_bytes(), 300);
    }

    #[test]
    fn garbage_without_sync_keeps_the_unscanned_tail() {
        let mut packetizer = Packetizer::new();
        packetizer.push(&[0x00; 900]);
        assert!(matches!(packetizer.next_packet(), PacketResult::NeedMoreData));
        assert_eq!(packetizer.buffered(), MAX_PACKET_SIZE * SYNC_CONFIRMATIONS - 1);
        assert_eq!(packetizer.skipped_bytes(), 900 - 831);
    }

    #[test]
    fn forced_size_must_be_supported() {
        assert!(Packetizer::with_packet_size(0).is_none());
        assert!(Packetizer::with_packet_size(189).is_none());
        for size in PACKET_SIZES {
            let packetizer = Packetizer::with_packet_size(size).expect("supported size");
            assert_eq!(packetizer.packet_size(), Some(size));
        }
    }

    #[test]
    fn resyncs_mid_stream() {
        let mut packetizer = Packetizer::with_packet_size(188).expect("supported size");
        let mut data = packet(188, 0x20, true, 0);
        data.extend([0x01, 0x02]);
        data.extend(packet(188, 0x21, false, 1));
        packetizer.push(&data);

        let pids: Vec<u16> = std::iter::from_fn(|| match packetizer.next_packet() {
            PacketResult::Ready(p) => Some(p.pid),
            _ => None,
        })
        .collect();
        assert_eq!(pids, vec![0x20, 0x21]);
        assert_eq!(packetizer.skipped_bytes(), 2);
    }

    #[test]
    fn adaptation_overrun_is_bad_but_not_fatal() {
        let mut packetizer = Packetizer::with_packet_size(188).expect("supported size");
        let mut bad = packet(188, 0x30, false, 0);
        bad[3] = 0x30;
        bad[4] = 190;
        packetizer.push(&bad);
        packetizer.push(&packet(188, 0x31, false, 1));

        assert!(matches!(
            packetizer.next_packet(),
            PacketResult::Bad(PacketError::AdaptationOverrun { pid: 0x30, .. })
        ));
        assert!(matches!(packetizer.next_packet(), PacketResult::Ready(p) if p.pid == 0x31));
    }

    #[test]
    fn adaptation_only_packet_has_no_payload() {
        let mut raw = packet(188, 0x40, false, 0);
        raw[3] = 0x20;
        raw[4] = 183;
        let p = TransportPacket::parse(Bytes::from(raw)).expect("valid packet");
        assert!(p.payload().is_none());
    }

    #[test]
    fn clear_forgets_detected_size() {
        let mut packetizer = Packetizer::new();
        packetizer.push(&stream(204, 5));
        assert!(matches!(packetizer.next_packet(), PacketResult::Ready(_)));
        packetizer.clear();
        packetizer.clear();
        assert_eq!(packetizer.packet_size(), None);
        assert_eq!(packetizer.buffered(), 0);
    }
}
