// psi/eit.rs
//! Event Information Table: present/following (0x4E/0x4F) and schedule
//! (0x50..=0x6F).

use serde::Serialize;

use crate::constants::table_id;
use crate::error::DecodeError;
use crate::psi::datetime::{decode_duration, decode_utc_time, EventTime};
use crate::psi::descriptor::{parse_descriptors, Descriptor, ExtendedEventItem};
use crate::psi::section::TableHeader;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EitSection {
    pub service_id: u16,
    pub table_id: u8,
    pub version: u8,
    pub current_next: bool,
    pub section_number: u8,
    pub last_section_number: u8,
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub segment_last_section_number: u8,
    pub last_table_id: u8,
    pub actual_transport_stream: bool,
    pub present_following: bool,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentInfo {
    Video {
        component_tag: u8,
        aspect_ratio: &'static str,
        pan_vectors: bool,
        frequency: u8,
        high_definition: bool,
        language: String,
        text: String,
    },
    Audio {
        component_tag: u8,
        mode: &'static str,
        language: String,
        text: String,
    },
    Subtitle {
        component_tag: u8,
        subtitle_type: &'static str,
        language: String,
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub event_id: u16,
    pub start_time: EventTime,
    /// Seconds.
    pub duration: u32,
    pub running_status: u8,
    pub free_ca_mode: bool,
    pub name: Option<String>,
    pub description: Option<String>,
    pub extended_items: Vec<ExtendedEventItem>,
    pub extended_text: Option<String>,
    pub components: Vec<ComponentInfo>,
    pub descriptors: Vec<Descriptor>,
}

fn audio_mode(component_type: u8) -> &'static str {
    match component_type {
        0x01 => "single channel mono",
        0x02 => "dual channel mono",
        0x03 => "stereo",
        0x04 => "multi-channel multi-lingual",
        0x05 => "surround",
        0x40 => "audio description for the visually impaired",
        0x41 => "audio for the hard of hearing",
        _ => "undefined",
    }
}

fn subtitle_type(component_type: u8) -> &'static str {
    match component_type {
        0x01 => "EBU Teletext subtitles",
        0x02 => "associated EBU Teletext",
        0x03 => "VBI data",
        0x10 => "Normal DVB subtitles",
        0x11 => "Normal DVB subtitles for 4:3",
        0x12 => "Normal DVB subtitles for 16:9",
        0x13 => "Normal DVB subtitles for 2.21:1",
        0x20 => "Hard of hearing DVB subtitles",
        0x21 => "Hard of hearing DVB subtitles for 4:3",
        0x22 => "Hard of hearing DVB subtitles for 16:9",
        0x23 => "Hard of hearing DVB subtitles for 2.21:1",
        _ => "reserved",
    }
}

fn component_info(descriptor: &Descriptor) -> Option<ComponentInfo> {
    let Descriptor::Component {
        stream_content,
        component_type,
        component_tag,
        language,
        text,
    } = descriptor
    else {
        return None;
    };
    let (component_tag, language, text) = (*component_tag, language.clone(), text.clone());
    match (*stream_content, *component_type) {
        (0x01, ct @ 0x01..=0x10) => {
            let index = ct - 1;
            Some(ComponentInfo::Video {
                component_tag,
                aspect_ratio: ["4:3", "16:9", "16:9", "> 16:9"][(index % 4) as usize],
                pan_vectors: index % 4 == 1,
                frequency: if (index / 4) % 2 == 0 { 25 } else { 30 },
                high_definition: ct >= 0x09,
                language,
                text,
            })
        }
        (0x02, ct) => Some(ComponentInfo::Audio {
            component_tag,
            mode: audio_mode(ct),
            language,
            text,
        }),
        (0x03, ct) => Some(ComponentInfo::Subtitle {
            component_tag,
            subtitle_type: subtitle_type(ct),
            language,
            text,
        }),
        _ => None,
    }
}

impl Event {
    fn new(
        event_id: u16,
        start_time: EventTime,
        duration: u32,
        status: u16,
        descriptors: Vec<Descriptor>,
    ) -> Self {
        let mut name = None;
        let mut description = None;
        let mut fragments: Vec<(u8, &str, &[ExtendedEventItem])> = Vec::new();
        let mut components = Vec::new();

        for d in &descriptors {
            match d {
                Descriptor::ShortEvent {
                    event_name, text, ..
                } => {
                    name.get_or_insert_with(|| event_name.clone());
                    description.get_or_insert_with(|| text.clone());
                }
                Descriptor::ExtendedEvent {
                    descriptor_number,
                    items,
                    text,
                    ..
                } => fragments.push((*descriptor_number, text.as_str(), items.as_slice())),
                other => components.extend(component_info(other)),
            }
        }

        // fragments may be broadcast in any order within the section
        fragments.sort_by_key(|(number, _, _)| *number);
        let extended_items = fragments
            .iter()
            .flat_map(|(_, _, items)| items.iter().cloned())
            .collect();
        let extended_text = (!fragments.is_empty())
            .then(|| fragments.iter().map(|(_, text, _)| *text).collect::<String>());

        Self {
            event_id,
            start_time,
            duration,
            running_status: (status >> 13) as u8,
            free_ca_mode: status & 0x1000 != 0,
            name,
            description,
            extended_items,
            extended_text,
            components,
            descriptors,
        }
    }
}

pub fn parse_eit(data: &[u8]) -> Result<EitSection, DecodeError> {
    let (hdr, mut r) = TableHeader::read("EIT", data, 18)?;
    let tid = hdr.table_id;
    if !(table_id::EIT_PF_ACTUAL..=table_id::EIT_SCHEDULE_LAST).contains(&tid) {
        return Err(DecodeError::UnexpectedTableId {
            table: "EIT",
            table_id: tid,
        });
    }
    let end = hdr.body_end();

    let transport_stream_id = r.read_u16("transport_stream_id")?;
    let original_network_id = r.read_u16("original_network_id")?;
    let segment_last_section_number = r.read_u8("segment_last_section_number")?;
    let last_table_id = r.read_u8("last_table_id")?;

    let mut events = Vec::new();
    while r.position() + 12 <= end {
        let event_id = r.read_u16("event_id")?;
        let start: [u8; 5] = r
            .take(5, "start_time")?
            .try_into()
            .map_err(|_| DecodeError::Truncated { what: "start_time" })?;
        let duration: [u8; 3] = r
            .take(3, "duration")?
            .try_into()
            .map_err(|_| DecodeError::Truncated { what: "duration" })?;
        let status = r.read_u16("running_status")?;
        let descriptors_loop_length = (status & 0x0FFF) as usize;
        if r.position() + descriptors_loop_length > end {
            return Err(DecodeError::Truncated {
                what: "event descriptors",
            });
        }
        let descriptors = parse_descriptors(r.take(descriptors_loop_length, "event descriptors")?)?;
        events.push(Event::new(
            event_id,
            decode_utc_time(&start),
            decode_duration(&duration),
            status,
            descriptors,
        ));
    }
    if r.position() != end {
        return Err(DecodeError::LoopMismatch { table: "EIT" });
    }

    Ok(EitSection {
        service_id: hdr.extension,
        table_id: tid,
        version: hdr.version_number,
        current_next: hdr.current_next_indicator,
        section_number: hdr.section_number,
        last_section_number: hdr.last_section_number,
        transport_stream_id,
        original_network_id,
        segment_last_section_number,
        last_table_id,
        actual_transport_stream: tid == table_id::EIT_PF_ACTUAL
            || (table_id::EIT_SCHEDULE_FIRST..=table_id::EIT_SCHEDULE_ACTUAL_LAST).contains(&tid),
        present_following: tid == table_id::EIT_PF_ACTUAL || tid == table_id::EIT_PF_OTHER,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::crc::append_crc;

    fn eit(table_id: u8, events: &[(u16, [u8; 5], [u8; 3], Vec<u8>)]) -> Vec<u8> {
        let mut body = vec![0x00, 0x07, 0x23, 0x3A, 0x00, table_id];
        for (id, start, duration, desc) in events {
            body.extend(id.to_be_bytes());
            body.extend(start);
            body.extend(duration);
            body.extend((0x8000 | desc.len() as u16).to_be_bytes());
            body.extend_from_slice(desc);
        }
        let len = 5 + body.len() + 4;
        let mut s = vec![table_id, 0xF0 | (len >> 8) as u8, len as u8, 0x01, 0x01, 0xC1, 0, 0];
        s.extend(body);
        append_crc(&mut s);
        s
    }

    fn short_event(name: &str, text: &str) -> Vec<u8> {
        let mut d = vec![0x4D, (5 + name.len() + text.len()) as u8, b'e', b'n', b'g'];
        d.push(name.len() as u8);
        d.extend(name.bytes());
        d.push(text.len() as u8);
        d.extend(text.bytes());
        d
    }

    fn extended_event(number: u8, last: u8, text: &str) -> Vec<u8> {
        let mut d = vec![0x4E, (6 + text.len()) as u8, (number << 4) | last, b'e', b'n', b'g', 0];
        d.push(text.len() as u8);
        d.extend(text.bytes());
        d
    }

    #[test]
    fn decodes_present_following_event() {
        let mut desc = short_event("News", "Headlines");
        desc.extend([0x50, 0x06, 0xF1, 0x03, 0x01, b'e', b'n', b'g']);
        desc.extend([0x50, 0x06, 0xF2, 0x03, 0x02, b'd', b'e', b'u']);
        let s = eit(0x4E, &[(0x1234, [0xC0, 0x79, 0x12, 0x45, 0x00], [0x01, 0x30, 0x00], desc)]);

        let eit = parse_eit(&s).expect("EIT");
        assert_eq!(eit.service_id, 0x0101);
        assert!(eit.actual_transport_stream);
        assert!(eit.present_following);
        assert_eq!(eit.last_table_id, 0x4E);

        let event = &eit.events[0];
        assert_eq!(event.event_id, 0x1234);
        assert_eq!((event.start_time.year, event.start_time.month, event.start_time.day), (1993, 10, 13));
        assert_eq!(event.start_time.hour, 12);
        assert_eq!(event.duration, 5400);
        assert_eq!(event.running_status, 4);
        assert_eq!(event.name.as_deref(), Some("News"));
        assert_eq!(event.description.as_deref(), Some("Headlines"));
        assert_eq!(
            event.components[0],
            ComponentInfo::Video {
                component_tag: 1,
                aspect_ratio: "16:9",
                pan_vectors: false,
                frequency: 25,
                high_definition: false,
                language: "eng".into(),
                text: String::new(),
            }
        );
        assert!(matches!(
            &event.components[1],
            ComponentInfo::Audio { mode: "dual channel mono", language, .. } if language == "deu"
        ));
    }

    #[test]
    fn extended_text_ordered_by_fragment_number() {
        let mut desc = extended_event(1, 1, "world");
        desc.extend(extended_event(0, 1, "hello "));
        let s = eit(0x50, &[(1, [0xFF; 5], [0; 3], desc)]);
        let eit = parse_eit(&s).expect("EIT");
        assert!(!eit.present_following);
        assert!(eit.actual_transport_stream);
        assert_eq!(eit.events[0].extended_text.as_deref(), Some("hello world"));
        assert_eq!(eit.events[0].start_time.year, 1900);
    }

    #[test]
    fn other_schedule_range() {
        let eit = parse_eit(&eit(0x61, &[])).expect("EIT");
        assert!(!eit.actual_transport_stream);
        assert!(!eit.present_following);
        assert!(eit.events.is_empty());
    }

    #[test]
    fn event_descriptors_overrun() {
        let mut s = eit(0x4E, &[(1, [0; 5], [0; 3], vec![0x4D, 0x00])]);
        // descriptors_loop_length low byte
        s[25] = 0x10;
        s.truncate(s.len() - 4);
        append_crc(&mut s);
        assert!(matches!(
            parse_eit(&s),
            Err(DecodeError::Truncated { what: "event descriptors" })
        ));
    }
}
