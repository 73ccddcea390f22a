//! MJD + BCD time fields used by EIT, TDT and TOT.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::psi::bcd;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl EventTime {
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?
            .and_hms_opt(self.hour, self.minute, self.second)
    }
}

/// Modified Julian Date to (year, month, day), EN 300 468 Annex C.
///
/// 0xFFFF marks an undefined date and yields (1900, 0, 0).
pub fn decode_mjd(mjd: u16) -> (i32, u32, u32) {
    if mjd == 0xFFFF {
        return (1900, 0, 0);
    }
    let mjd = mjd as f64;
    let mut year = ((mjd - 15078.2) / 365.25).floor();
    let mut month = ((mjd - 14956.1 - (year * 365.25).floor()) / 30.6001).floor();
    let day = mjd - 14956.0 - (year * 365.25).floor() - (month * 30.6001).floor();
    if month == 14.0 || month == 15.0 {
        year += 1.0;
        month -= 13.0;
    } else {
        month -= 1.0;
    }
    (year as i32 + 1900, month as u32, day as u32)
}

/// 40-bit UTC field: 16-bit MJD followed by six BCD digits hh:mm:ss.
pub fn decode_utc_time(bytes: &[u8; 5]) -> EventTime {
    let mjd = u16::from_be_bytes([bytes[0], bytes[1]]);
    let (year, month, day) = decode_mjd(mjd);
    if mjd == 0xFFFF {
        return EventTime {
            year,
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0,
        };
    }
    EventTime {
        year,
        month,
        day,
        hour: bcd::byte(bytes[2]),
        minute: bcd::byte(bytes[3]),
        second: bcd::byte(bytes[4]),
    }
}

/// 24-bit BCD duration in seconds.
pub fn decode_duration(bytes: &[u8; 3]) -> u32 {
    bcd::byte(bytes[0]) * 3600 + bcd::byte(bytes[1]) * 60 + bcd::byte(bytes[2])
}
