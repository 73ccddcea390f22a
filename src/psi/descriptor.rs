// psi/descriptor.rs
//! Descriptor loops and the descriptors the table decoders understand.

use bitstream_io::{BigEndian, BitRead, BitReader};
use serde::Serialize;

use crate::error::DecodeError;
use crate::psi::bcd;
use crate::psi::text::decode_text;

pub mod tag {
    pub const CAROUSEL_IDENTIFIER: u8 = 0x13;
    pub const CA: u8 = 0x09;
    pub const ISO_639_LANGUAGE: u8 = 0x0A;
    pub const NETWORK_NAME: u8 = 0x40;
    pub const SATELLITE_DELIVERY: u8 = 0x43;
    pub const CABLE_DELIVERY: u8 = 0x44;
    pub const SERVICE: u8 = 0x48;
    pub const SHORT_EVENT: u8 = 0x4D;
    pub const EXTENDED_EVENT: u8 = 0x4E;
    pub const COMPONENT: u8 = 0x50;
    pub const STREAM_IDENTIFIER: u8 = 0x52;
    pub const TERRESTRIAL_DELIVERY: u8 = 0x5A;
    pub const FREQUENCY_LIST: u8 = 0x62;
    pub const DATA_BROADCAST: u8 = 0x64;
    pub const DATA_BROADCAST_ID: u8 = 0x66;
    pub const AC3: u8 = 0x6A;
    pub const ENHANCED_AC3: u8 = 0x7A;
    pub const LOGICAL_CHANNEL: u8 = 0x83;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtendedEventItem {
    pub description: String,
    pub item: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageEntry {
    pub language: String,
    pub audio_type: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicalChannelEntry {
    pub service_id: u16,
    pub logical_channel_number: u16,
}

/// Satellite delivery system. Frequency in kHz, symbol rate in symbols/s.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SatelliteDelivery {
    pub frequency: u32,
    pub orbital_position: f32,
    pub west_east: &'static str,
    pub polarization: &'static str,
    pub modulation: &'static str,
    pub symbol_rate: u32,
    pub inner_fec: &'static str,
}

/// Cable delivery system. Frequency in Hz, symbol rate in symbols/s.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CableDelivery {
    pub frequency: u32,
    pub outer_fec: u8,
    pub modulation: &'static str,
    pub symbol_rate: u32,
    pub inner_fec: &'static str,
}

/// Terrestrial delivery system. Frequency in Hz, bandwidth in MHz.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerrestrialDelivery {
    pub frequency: u32,
    pub bandwidth: u8,
    pub constellation: &'static str,
    pub hierarchy: u8,
    pub code_rate_hp: &'static str,
    pub code_rate_lp: &'static str,
    /// Guard interval as 1/N.
    pub guard_interval: u8,
    pub transmission_mode: &'static str,
    pub other_frequency: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "descriptor", rename_all = "snake_case")]
pub enum Descriptor {
    NetworkName {
        name: String,
    },
    Service {
        service_type: u8,
        provider_name: String,
        service_name: String,
    },
    ShortEvent {
        language: String,
        event_name: String,
        text: String,
    },
    ExtendedEvent {
        descriptor_number: u8,
        last_descriptor_number: u8,
        language: String,
        items: Vec<ExtendedEventItem>,
        text: String,
    },
    Component {
        stream_content: u8,
        component_type: u8,
        component_tag: u8,
        language: String,
        text: String,
    },
    StreamIdentifier {
        component_tag: u8,
    },
    Ac3 {
        enhanced: bool,
    },
    DataBroadcast {
        data_broadcast_id: u16,
        component_tag: u8,
        language: String,
        text: String,
    },
    DataBroadcastId {
        data_broadcast_id: u16,
        selector: Vec<u8>,
    },
    CarouselIdentifier {
        carousel_id: u32,
    },
    SatelliteDelivery(SatelliteDelivery),
    CableDelivery(CableDelivery),
    TerrestrialDelivery(TerrestrialDelivery),
    FrequencyList {
        coding_type: u8,
        frequencies: Vec<u32>,
    },
    LogicalChannel {
        channels: Vec<LogicalChannelEntry>,
    },
    /// Conditional access entry. Surfaced only, never acted upon.
    Ca {
        ca_system_id: u16,
        ca_pid: u16,
        private_data: Vec<u8>,
    },
    Iso639Language {
        entries: Vec<LanguageEntry>,
    },
    Unknown {
        tag: u8,
        data: Vec<u8>,
    },
}

/// Walks a `(tag, length, body)` loop covering exactly `data`.
///
/// A length byte pointing past the end fails the whole loop; a body too
/// short for its decoded form is kept as [`Descriptor::Unknown`].
pub fn parse_descriptors(data: &[u8]) -> Result<Vec<Descriptor>, DecodeError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        if pos + 2 > data.len() {
            return Err(DecodeError::Truncated {
                what: "descriptor header",
            });
        }
        let tag = data[pos];
        let len = data[pos + 1] as usize;
        let remaining = data.len() - pos - 2;
        if len > remaining {
            return Err(DecodeError::DescriptorOverrun {
                tag,
                len,
                remaining,
            });
        }
        out.push(Descriptor::decode(tag, &data[pos + 2..pos + 2 + len]));
        pos += 2 + len;
    }
    Ok(out)
}

fn language(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Reads `len`-prefixed text at `*pos`, advancing past it.
fn prefixed_text(body: &[u8], pos: &mut usize) -> Option<String> {
    let len = *body.get(*pos)? as usize;
    let text = body.get(*pos + 1..*pos + 1 + len)?;
    *pos += 1 + len;
    Some(decode_text(text))
}

impl Descriptor {
    pub fn decode(tag: u8, body: &[u8]) -> Self {
        let decoded = match tag {
            tag::NETWORK_NAME => Some(Self::NetworkName {
                name: decode_text(body),
            }),
            tag::SERVICE => decode_service(body),
            tag::SHORT_EVENT => decode_short_event(body),
            tag::EXTENDED_EVENT => decode_extended_event(body),
            tag::COMPONENT => decode_component(body),
            tag::STREAM_IDENTIFIER => body.first().map(|&component_tag| Self::StreamIdentifier {
                component_tag,
            }),
            tag::AC3 => Some(Self::Ac3 { enhanced: false }),
            tag::ENHANCED_AC3 => Some(Self::Ac3 { enhanced: true }),
            tag::DATA_BROADCAST => decode_data_broadcast(body),
            tag::DATA_BROADCAST_ID => (body.len() >= 2).then(|| Self::DataBroadcastId {
                data_broadcast_id: u16::from_be_bytes([body[0], body[1]]),
                selector: body[2..].to_vec(),
            }),
            tag::CAROUSEL_IDENTIFIER => (body.len() >= 4).then(|| Self::CarouselIdentifier {
                carousel_id: u32::from_be_bytes([body[0], body[1], body[2], body[3]]),
            }),
            tag::SATELLITE_DELIVERY => decode_satellite(body).map(Self::SatelliteDelivery),
            tag::CABLE_DELIVERY => decode_cable(body).map(Self::CableDelivery),
            tag::TERRESTRIAL_DELIVERY => decode_terrestrial(body).map(Self::TerrestrialDelivery),
            tag::FREQUENCY_LIST => decode_frequency_list(body),
            tag::LOGICAL_CHANNEL => Some(Self::LogicalChannel {
                channels: body
                    .chunks_exact(4)
                    .map(|c| LogicalChannelEntry {
                        service_id: u16::from_be_bytes([c[0], c[1]]),
                        logical_channel_number: u16::from_be_bytes([c[2], c[3]]) & 0x03FF,
                    })
                    .collect(),
            }),
            tag::CA => (body.len() >= 4).then(|| Self::Ca {
                ca_system_id: u16::from_be_bytes([body[0], body[1]]),
                ca_pid: u16::from_be_bytes([body[2], body[3]]) & 0x1FFF,
                private_data: body[4..].to_vec(),
            }),
            tag::ISO_639_LANGUAGE => Some(Self::Iso639Language {
                entries: body
                    .chunks_exact(4)
                    .map(|c| LanguageEntry {
                        language: language(&c[..3]),
                        audio_type: c[3],
                    })
                    .collect(),
            }),
            _ => None,
        };
        decoded.unwrap_or_else(|| Self::Unknown {
            tag,
            data: body.to_vec(),
        })
    }

    pub fn tag(&self) -> u8 {
        match self {
            Self::NetworkName { .. } => tag::NETWORK_NAME,
            Self::Service { .. } => tag::SERVICE,
            Self::ShortEvent { .. } => tag::SHORT_EVENT,
            Self::ExtendedEvent { .. } => tag::EXTENDED_EVENT,
            Self::Component { .. } => tag::COMPONENT,
            Self::StreamIdentifier { .. } => tag::STREAM_IDENTIFIER,
            Self::Ac3 { enhanced: false } => tag::AC3,
            Self::Ac3 { enhanced: true } => tag::ENHANCED_AC3,
            Self::DataBroadcast { .. } => tag::DATA_BROADCAST,
            Self::DataBroadcastId { .. } => tag::DATA_BROADCAST_ID,
            Self::CarouselIdentifier { .. } => tag::CAROUSEL_IDENTIFIER,
            Self::SatelliteDelivery(_) => tag::SATELLITE_DELIVERY,
            Self::CableDelivery(_) => tag::CABLE_DELIVERY,
            Self::TerrestrialDelivery(_) => tag::TERRESTRIAL_DELIVERY,
            Self::FrequencyList { .. } => tag::FREQUENCY_LIST,
            Self::LogicalChannel { .. } => tag::LOGICAL_CHANNEL,
            Self::Ca { .. } => tag::CA,
            Self::Iso639Language { .. } => tag::ISO_639_LANGUAGE,
            Self::Unknown { tag, .. } => *tag,
        }
    }
}

fn decode_service(body: &[u8]) -> Option<Descriptor> {
    let service_type = *body.first()?;
    let mut pos = 1;
    let provider_name = prefixed_text(body, &mut pos)?;
    let service_name = prefixed_text(body, &mut pos)?;
    Some(Descriptor::Service {
        service_type,
        provider_name,
        service_name,
    })
}

fn decode_short_event(body: &[u8]) -> Option<Descriptor> {
    let lang = language(body.get(..3)?);
    let mut pos = 3;
    let event_name = prefixed_text(body, &mut pos)?;
    let text = prefixed_text(body, &mut pos)?;
    Some(Descriptor::ShortEvent {
        language: lang,
        event_name,
        text,
    })
}

fn decode_extended_event(body: &[u8]) -> Option<Descriptor> {
    let numbers = *body.first()?;
    let lang = language(body.get(1..4)?);
    let items_len = *body.get(4)? as usize;
    let items_raw = body.get(5..5 + items_len)?;

    let mut items = Vec::new();
    let mut pos = 0;
    while pos < items_raw.len() {
        let description = prefixed_text(items_raw, &mut pos)?;
        let item = prefixed_text(items_raw, &mut pos)?;
        items.push(ExtendedEventItem { description, item });
    }

    let mut pos = 5 + items_len;
    let text = prefixed_text(body, &mut pos)?;
    Some(Descriptor::ExtendedEvent {
        descriptor_number: numbers >> 4,
        last_descriptor_number: numbers & 0x0F,
        language: lang,
        items,
        text,
    })
}

fn decode_component(body: &[u8]) -> Option<Descriptor> {
    if body.len() < 6 {
        return None;
    }
    Some(Descriptor::Component {
        stream_content: body[0] & 0x0F,
        component_type: body[1],
        component_tag: body[2],
        language: language(&body[3..6]),
        text: decode_text(&body[6..]),
    })
}

fn decode_data_broadcast(body: &[u8]) -> Option<Descriptor> {
    let data_broadcast_id = u16::from_be_bytes([*body.first()?, *body.get(1)?]);
    let component_tag = *body.get(2)?;
    let selector_len = *body.get(3)? as usize;
    let mut pos = 4 + selector_len;
    let lang = language(body.get(pos..pos + 3)?);
    pos += 3;
    let text = prefixed_text(body, &mut pos)?;
    Some(Descriptor::DataBroadcast {
        data_broadcast_id,
        component_tag,
        language: lang,
        text,
    })
}

fn decode_frequency_list(body: &[u8]) -> Option<Descriptor> {
    let coding_type = body.first()? & 0x03;
    let frequencies = body[1..]
        .chunks_exact(4)
        .map(|f| match coding_type {
            1 => bcd::decode(f, 8) * 10,
            2 => bcd::decode(f, 8) * 100,
            _ => u32::from_be_bytes([f[0], f[1], f[2], f[3]]).wrapping_mul(10),
        })
        .collect();
    Some(Descriptor::FrequencyList {
        coding_type,
        frequencies,
    })
}

pub fn fec_name(code: u8) -> &'static str {
    match code {
        0 => "undefined",
        1 => "1/2",
        2 => "2/3",
        3 => "3/4",
        4 => "5/6",
        5 => "7/8",
        6 => "8/9",
        0x0F => "none",
        _ => "reserved",
    }
}

fn decode_satellite(body: &[u8]) -> Option<SatelliteDelivery> {
    if body.len() < 11 {
        return None;
    }
    let mut br = BitReader::endian(&body[6..7], BigEndian);
    let west_east = br.read_bit().ok()?;
    let polarization = br.read::<2, u8>().ok()?;
    let _roll_off = br.read::<2, u8>().ok()?;
    let _modulation_system = br.read_bit().ok()?;
    let modulation = br.read::<2, u8>().ok()?;

    Some(SatelliteDelivery {
        frequency: bcd::decode(&body[0..4], 8) * 10,
        orbital_position: bcd::decode(&body[4..6], 4) as f32 / 10.0,
        west_east: if west_east { "east" } else { "west" },
        polarization: ["horizontal", "vertical", "left", "right"][polarization as usize],
        modulation: ["auto", "QPSK", "8PSK", "QAM16"][modulation as usize],
        symbol_rate: bcd::decode(&body[7..11], 7) * 100,
        inner_fec: fec_name(body[10] & 0x0F),
    })
}

fn decode_cable(body: &[u8]) -> Option<CableDelivery> {
    if body.len() < 11 {
        return None;
    }
    Some(CableDelivery {
        frequency: bcd::decode(&body[0..4], 8) * 100,
        outer_fec: body[5] & 0x0F,
        modulation: match body[6] {
            0 => "undefined",
            1 => "QAM16",
            2 => "QAM32",
            3 => "QAM64",
            4 => "QAM128",
            5 => "QAM256",
            _ => "reserved",
        },
        symbol_rate: bcd::decode(&body[7..11], 7) * 100,
        inner_fec: fec_name(body[10] & 0x0F),
    })
}

fn code_rate_name(code: u8) -> &'static str {
    match code {
        0 => "1/2",
        1 => "2/3",
        2 => "3/4",
        3 => "5/6",
        4 => "7/8",
        _ => "reserved",
    }
}

fn decode_terrestrial(body: &[u8]) -> Option<TerrestrialDelivery> {
    let mut br = BitReader::endian(body, BigEndian);
    let frequency = br.read::<32, u32>().ok()?;
    let bandwidth = br.read::<3, u8>().ok()?;
    br.skip(5).ok()?;
    let constellation = br.read::<2, u8>().ok()?;
    let hierarchy = br.read::<3, u8>().ok()?;
    let code_rate_hp = br.read::<3, u8>().ok()?;
    let code_rate_lp = br.read::<3, u8>().ok()?;
    let guard_interval = br.read::<2, u8>().ok()?;
    let transmission_mode = br.read::<2, u8>().ok()?;
    let other_frequency = br.read_bit().ok()?;

    Some(TerrestrialDelivery {
        frequency: frequency.wrapping_mul(10),
        bandwidth: if bandwidth <= 2 { 8 - bandwidth } else { 0 },
        constellation: match constellation {
            0 => "QPSK",
            1 => "QAM16",
            2 => "QAM64",
            _ => "reserved",
        },
        hierarchy: match hierarchy {
            0..=2 => hierarchy,
            3 => 4,
            _ => 0,
        },
        code_rate_hp: code_rate_name(code_rate_hp),
        code_rate_lp: code_rate_name(code_rate_lp),
        guard_interval: [32, 16, 8, 4][guard_interval as usize],
        transmission_mode: match transmission_mode {
            0 => "2k",
            1 => "8k",
            _ => "reserved",
        },
        other_frequency,
    })
}
