//! Feed timestamps
//!
//! Trailing suffix after ETX:
//!   [century][year][month][day][hour][minute][second]            7 bytes
//!   [century][year][month][day][hour][minute][second][ms lo][ms hi]  9 bytes
//!
//! Every byte after the century is offset by 64. The century byte is 20
//! (DC4) for every date this feed produces, so it also marks the suffix.
//! All feed times are exchange-local (US Central).

use crate::price::parse_int;
use crate::protocol::DC4;
use byteorder::{ByteOrder, LittleEndian};
use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Timelike, Utc,
    Weekday,
};

pub const SUFFIX_LEN: usize = 7;
pub const SUFFIX_LEN_MILLIS: usize = 9;
const SUFFIX_SHIFT: u8 = 64;

const CENTRAL_STANDARD_SECS: i32 = -6 * 3600;
const CENTRAL_DAYLIGHT_SECS: i32 = -5 * 3600;

pub fn local_datetime(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    millis: u32,
) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_milli_opt(hour, minute, second, millis)
}

/// Decode the bytes following ETX. Returns `None` when there is no suffix.
/// Milliseconds outside 0..=999 are read as zero.
pub fn parse_suffix(suffix: &[u8]) -> Option<NaiveDateTime> {
    if suffix.len() < SUFFIX_LEN || suffix[0] != DC4 {
        return None;
    }
    let field = |i: usize| suffix[i].checked_sub(SUFFIX_SHIFT).map(u32::from);

    let year = i32::from(suffix[0]) * 100 + field(1)? as i32;
    let millis = if suffix.len() >= SUFFIX_LEN_MILLIS {
        let raw = u32::from(LittleEndian::read_u16(&suffix[SUFFIX_LEN..SUFFIX_LEN_MILLIS]));
        if raw <= 999 {
            raw
        } else {
            0
        }
    } else {
        0
    };

    local_datetime(year, field(2)?, field(3)?, field(4)?, field(5)?, field(6)?, millis)
}

/// Build a suffix for `ts`. Used by the frame generator and tests.
pub fn encode_suffix(ts: &NaiveDateTime, with_millis: bool) -> Vec<u8> {
    let shifted = |v: u32| v as u8 + SUFFIX_SHIFT;
    let year = ts.year();
    let mut out = vec![
        (year / 100) as u8,
        shifted((year % 100) as u32),
        shifted(ts.month()),
        shifted(ts.day()),
        shifted(ts.hour()),
        shifted(ts.minute()),
        shifted(ts.second()),
    ];
    if with_millis {
        let mut millis = [0u8; 2];
        LittleEndian::write_u16(&mut millis, (ts.nanosecond() / 1_000_000) as u16);
        out.extend_from_slice(&millis);
    }
    out
}

/// `YYYYMMDDHHMMSS`, with a 3-digit millisecond tail when non-zero.
pub fn format_compact(ts: &NaiveDateTime) -> String {
    let millis = ts.nanosecond() / 1_000_000;
    if millis == 0 {
        ts.format("%Y%m%d%H%M%S").to_string()
    } else {
        format!("{}{:03}", ts.format("%Y%m%d%H%M%S"), millis)
    }
}

pub fn parse_compact(text: &str) -> Option<NaiveDateTime> {
    let b = text.as_bytes();
    if b.len() != 14 && b.len() != 17 {
        return None;
    }
    let num = |start: usize, len: usize| parse_int(b, start, len).ok().and_then(|v| u32::try_from(v).ok());
    let millis = if b.len() == 17 { num(14, 3)? } else { 0 };
    local_datetime(
        num(0, 4)? as i32,
        num(4, 2)?,
        num(6, 2)?,
        num(8, 2)?,
        num(10, 2)?,
        num(12, 2)?,
        millis,
    )
}

/// UTC offset in effect for a US Central wall-clock time.
pub fn central_offset(local: &NaiveDateTime) -> FixedOffset {
    let transition = |month: u32, nth: u8| {
        NaiveDate::from_weekday_of_month_opt(local.year(), month, Weekday::Sun, nth)
            .and_then(|d| d.and_hms_opt(2, 0, 0))
    };
    let daylight = match (transition(3, 2), transition(11, 1)) {
        (Some(start), Some(end)) => *local >= start && *local < end,
        _ => false,
    };
    let secs = if daylight {
        CENTRAL_DAYLIGHT_SECS
    } else {
        CENTRAL_STANDARD_SECS
    };
    FixedOffset::east_opt(secs).unwrap_or_else(|| Utc.fix())
}

pub fn to_utc(local: &NaiveDateTime) -> DateTime<Utc> {
    let offset = central_offset(local);
    match offset.from_local_datetime(local).single() {
        Some(dt) => dt.with_timezone(&Utc),
        None => Utc.from_utc_datetime(local),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, ms: u32) -> NaiveDateTime {
        local_datetime(y, mo, d, h, mi, s, ms).unwrap()
    }

    #[test]
    fn test_suffix_with_millis() {
        let expected = ts(2009, 10, 28, 14, 30, 15, 250);
        let suffix = encode_suffix(&expected, true);
        assert_eq!(suffix.len(), SUFFIX_LEN_MILLIS);
        assert_eq!(suffix[0], DC4);
        assert_eq!(parse_suffix(&suffix), Some(expected));
    }

    #[test]
    fn test_suffix_without_millis() {
        let expected = ts(2021, 1, 4, 8, 0, 59, 0);
        let suffix = encode_suffix(&expected, false);
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert_eq!(parse_suffix(&suffix), Some(expected));
    }

    #[test]
    fn test_out_of_range_millis_become_zero() {
        let mut suffix = encode_suffix(&ts(2020, 6, 1, 9, 15, 0, 0), false);
        suffix.extend_from_slice(&[0xE8, 0x03]); // 1000
        assert_eq!(parse_suffix(&suffix), Some(ts(2020, 6, 1, 9, 15, 0, 0)));
    }

    #[test]
    fn test_missing_or_foreign_suffix() {
        assert_eq!(parse_suffix(&[]), None);
        assert_eq!(parse_suffix(b"abcdefg"), None);
    }

    #[test]
    fn test_compact_format() {
        let plain = ts(2009, 10, 28, 14, 30, 15, 0);
        assert_eq!(format_compact(&plain), "20091028143015");
        assert_eq!(parse_compact("20091028143015"), Some(plain));

        let millis = ts(2009, 10, 28, 14, 30, 15, 7);
        assert_eq!(format_compact(&millis), "20091028143015007");
        assert_eq!(parse_compact("20091028143015007"), Some(millis));

        assert_eq!(parse_compact("2009102814"), None);
        assert_eq!(parse_compact("20091328143015"), None);
    }

    #[test]
    fn test_central_time_conversion() {
        // January: CST, UTC-6
        let winter = to_utc(&ts(2021, 1, 15, 9, 30, 0, 0));
        assert_eq!(winter.naive_utc(), ts(2021, 1, 15, 15, 30, 0, 0));
        // July: CDT, UTC-5
        let summer = to_utc(&ts(2021, 7, 15, 9, 30, 0, 0));
        assert_eq!(summer.naive_utc(), ts(2021, 7, 15, 14, 30, 0, 0));
        // 2021 DST began March 14 at 02:00
        assert_eq!(central_offset(&ts(2021, 3, 14, 1, 59, 0, 0)).local_minus_utc(), -6 * 3600);
        assert_eq!(central_offset(&ts(2021, 3, 14, 3, 0, 0, 0)).local_minus_utc(), -5 * 3600);
    }
}
