//! DVB text fields (EN 300 468 Annex A) to UTF-8.
//!
//! The first byte selects the character table. Emphasis and line-break
//! control codes become `<b>`, `</b>` and `\n`; other control codes are
//! dropped.

use encoding_rs::{Encoding, BIG5, EUC_KR, GBK, UTF_8};

enum Charset {
    Iso6937,
    SingleByte(&'static Encoding),
    Ucs2,
    MultiByte(&'static Encoding),
    Utf8,
}

fn select(bytes: &[u8]) -> (Charset, usize) {
    let label = |n: u16| {
        Encoding::for_label(format!("iso-8859-{n}").as_bytes())
            .map(Charset::SingleByte)
            .unwrap_or(Charset::Utf8)
    };
    match bytes[0] {
        0x20.. => (Charset::Iso6937, 0),
        n @ 0x01..=0x0B => (label(n as u16 + 4), 1),
        0x10 if bytes.len() >= 3 => (label(u16::from_be_bytes([bytes[1], bytes[2]])), 3),
        0x11 => (Charset::Ucs2, 1),
        0x12 => (Charset::MultiByte(EUC_KR), 1),
        0x13 => (Charset::MultiByte(GBK), 1),
        0x14 => (Charset::MultiByte(BIG5), 1),
        0x15 => (Charset::Utf8, 1),
        0x1F if bytes.len() >= 2 => (Charset::Utf8, 2),
        _ => (Charset::Utf8, 1),
    }
}

fn control_markup(code: u8) -> Option<&'static str> {
    match code {
        0x86 => Some("<b>"),
        0x87 => Some("</b>"),
        0x8A => Some("\n"),
        _ => None,
    }
}

pub fn decode_text(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    let (charset, skip) = select(bytes);
    let body = &bytes[skip.min(bytes.len())..];

    match charset {
        Charset::Iso6937 => decode_single_byte(body, decode_iso6937),
        Charset::SingleByte(encoding) => decode_single_byte(body, |run, out| {
            out.push_str(&encoding.decode_without_bom_handling(run).0)
        }),
        Charset::Ucs2 => decode_ucs2(body),
        Charset::MultiByte(encoding) => encoding.decode_without_bom_handling(body).0.into_owned(),
        Charset::Utf8 => {
            let decoded = UTF_8.decode_without_bom_handling(body).0;
            let mut out = String::with_capacity(decoded.len());
            for c in decoded.chars() {
                match c as u32 {
                    code @ 0x80..=0x9F => {
                        if let Some(markup) = control_markup(code as u8) {
                            out.push_str(markup);
                        }
                    }
                    _ => out.push(c),
                }
            }
            out
        }
    }
}

/// Decodes runs of printable bytes with `decode_run`, replacing the
/// 0x80..=0x9F control range in between.
fn decode_single_byte(body: &[u8], decode_run: impl Fn(&[u8], &mut String)) -> String {
    let mut out = String::with_capacity(body.len());
    let mut start = 0;
    for (i, &b) in body.iter().enumerate() {
        if (0x80..=0x9F).contains(&b) {
            decode_run(&body[start..i], &mut out);
            if let Some(markup) = control_markup(b) {
                out.push_str(markup);
            }
            start = i + 1;
        }
    }
    decode_run(&body[start..], &mut out);
    out
}

fn decode_ucs2(body: &[u8]) -> String {
    let mut out = String::with_capacity(body.len() / 2);
    let mut run: Vec<u16> = Vec::new();
    for pair in body.chunks_exact(2) {
        let unit = u16::from_be_bytes([pair[0], pair[1]]);
        if (0xE080..=0xE09F).contains(&unit) {
            out.push_str(&String::from_utf16_lossy(&run));
            run.clear();
            if let Some(markup) = control_markup((unit & 0xFF) as u8) {
                out.push_str(markup);
            }
        } else {
            run.push(unit);
        }
    }
    out.push_str(&String::from_utf16_lossy(&run));
    out
}

/// ISO/IEC 6937 upper half. `None` marks unassigned positions.
const ISO6937_HIGH: [Option<char>; 96] = [
    // 0xA0
    Some('\u{A0}'), Some('¡'), Some('¢'), Some('£'), Some('$'), Some('¥'), Some('#'), Some('§'),
    Some('¤'), Some('‘'), Some('“'), Some('«'), Some('←'), Some('↑'), Some('→'), Some('↓'),
    // 0xB0
    Some('°'), Some('±'), Some('²'), Some('³'), Some('×'), Some('µ'), Some('¶'), Some('·'),
    Some('÷'), Some('’'), Some('”'), Some('»'), Some('¼'), Some('½'), Some('¾'), Some('¿'),
    // 0xC0: non-spacing diacritics, applied to the following character
    None, Some('\u{300}'), Some('\u{301}'), Some('\u{302}'), Some('\u{303}'), Some('\u{304}'),
    Some('\u{306}'), Some('\u{307}'), Some('\u{308}'), None, Some('\u{30A}'), Some('\u{327}'),
    Some('\u{332}'), Some('\u{30B}'), Some('\u{328}'), Some('\u{30C}'),
    // 0xD0
    Some('―'), Some('¹'), Some('®'), Some('©'), Some('™'), Some('♪'), Some('¬'), Some('¦'),
    None, None, None, None, Some('⅛'), Some('⅜'), Some('⅝'), Some('⅞'),
    // 0xE0
    Some('Ω'), Some('Æ'), Some('Đ'), Some('ª'), Some('Ħ'), None, Some('Ĳ'), Some('Ŀ'),
    Some('Ł'), Some('Ø'), Some('Œ'), Some('º'), Some('Þ'), Some('Ŧ'), Some('Ŋ'), Some('ŉ'),
    // 0xF0
    Some('ĸ'), Some('æ'), Some('đ'), Some('ð'), Some('ħ'), Some('ı'), Some('ĳ'), Some('ŀ'),
    Some('ł'), Some('ø'), Some('œ'), Some('ß'), Some('þ'), Some('ŧ'), Some('ŋ'), Some('\u{AD}'),
];

fn decode_iso6937(run: &[u8], out: &mut String) {
    let mut pending_diacritic: Option<char> = None;
    for &b in run {
        let c = match b {
            0x00..=0x7F => Some(b as char),
            0xA0..=0xFF => ISO6937_HIGH[(b - 0xA0) as usize],
            _ => None,
        };
        let Some(c) = c else { continue };
        if (0xC1..=0xCF).contains(&b) {
            pending_diacritic = Some(c);
            continue;
        }
        out.push(c);
        if let Some(mark) = pending_diacritic.take() {
            out.push(mark);
        }
    }
}
