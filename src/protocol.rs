//! DDF wire vocabulary
//!
//! Tokenized frame:
//!   SOH <record> <symbol> ',' <subrecord> STX <base> <exchange> <delay:2> <payload> ETX [suffix]
//!
//! Snapshot frame:
//!   ['%'] '<' QUOTE | BOOK | CV ... '>'
//!
//! The record byte selects the family, the subrecord byte the message within
//! it. Prices travel as ASCII digits scaled by the symbol's base code.

use std::fmt;

pub const SOH: u8 = 0x01;
pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
/// Century byte of the trailing timestamp (20), doubles as its sentinel.
pub const DC4: u8 = 0x14;
pub const SNAPSHOT_MARKER: u8 = b'%';

/// Price levels carried per side of a depth record.
pub const BOOK_LEVELS: usize = 10;
/// Depth letters at or after the anchor are bids (`K` = best bid); letters
/// before it are asks counted backwards (`J` = best ask).
pub const BOOK_LEVEL_ANCHOR: u8 = b'K';

/// Form-T / extended-hours trading, tracked apart from the combined session.
pub const SESSION_ELECTRONIC: char = 'T';
/// Pit session; its refreshes must not overwrite combined statistics.
pub const SESSION_PIT: char = 'R';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    /// `#`: date/time beacon.
    Timestamp,
    /// `!`: legacy beacon, ignored.
    LegacyBeacon,
    /// `2`: live quote traffic.
    Quote,
    /// `C`: alternate quote record, same layout as `2`.
    QuoteAlt,
    /// `S`: spread record, rewritten to `2` before decoding.
    Spread,
    /// `3`: depth and end-of-day traffic.
    BookAndSummary,
}

impl Record {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            b'#' => Some(Record::Timestamp),
            b'!' => Some(Record::LegacyBeacon),
            b'2' => Some(Record::Quote),
            b'C' => Some(Record::QuoteAlt),
            b'S' => Some(Record::Spread),
            b'3' => Some(Record::BookAndSummary),
            _ => None,
        }
    }
}

pub mod subrecord {
    pub const REFRESH: u8 = b'0';
    pub const TRADE: u8 = b'7';
    pub const TOP_OF_BOOK: u8 = b'8';
    pub const MARKET_CONDITION: u8 = b'9';

    pub const DEPTH_REPLACE: u8 = b'B';
    pub const DEPTH_MERGE: u8 = b'b';
    pub const EOD_COMMODITY: u8 = b'C';
    pub const EOD_STOCK: u8 = b'S';
    pub const EOD_PRIOR_DAY: u8 = b'I';

    pub fn is_parameter(sub: u8) -> bool {
        (b'1'..=b'6').contains(&sub)
    }
}

/// Subrecords the server emits as routine chatter. They decode to nothing
/// and are never logged.
const SILENT_QUOTE_SUBRECORDS: &[u8] = b"DdX";
const SILENT_BOOK_SUBRECORDS: &[u8] = b"EFT";

pub fn is_silent(record: Record, sub: u8) -> bool {
    match record {
        Record::LegacyBeacon => true,
        Record::Quote | Record::QuoteAlt | Record::Spread => SILENT_QUOTE_SUBRECORDS.contains(&sub),
        Record::BookAndSummary => SILENT_BOOK_SUBRECORDS.contains(&sub),
        Record::Timestamp => false,
    }
}

/// Single-character price format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaseCode(u8);

impl BaseCode {
    pub const UNITLESS: BaseCode = BaseCode(b'*');

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            b'2'..=b'9' | b'A'..=b'F' | b'*' => Some(BaseCode(v)),
            _ => None,
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        u8::try_from(c).ok().and_then(Self::from_u8)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    pub fn as_char(self) -> char {
        self.0 as char
    }

    /// Numeric unit code: negative values select a fractional base
    /// (-1 = eighths .. -6 = 256ths), non-negative values a decimal count.
    pub fn unit_code(self) -> i32 {
        match self.0 {
            b'2'..=b'7' => -i32::from(self.0 - b'1'),
            b'8' | b'9' => i32::from(self.0 - b'8'),
            b'A'..=b'F' => i32::from(self.0 - b'A') + 2,
            _ => 0,
        }
    }
}

impl Default for BaseCode {
    fn default() -> Self {
        BaseCode::UNITLESS
    }
}

impl fmt::Display for BaseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// `'1'..'9'` -> 1..9, `'0'` -> 10, `'A'..'U'` -> 11..31.
pub fn day_code_to_int(code: char) -> Option<u8> {
    match code {
        '1'..='9' => Some(code as u8 - b'0'),
        '0' => Some(10),
        'A'..='U' => Some(code as u8 - b'A' + 11),
        _ => None,
    }
}

pub fn day_code_from_int(day: u8) -> Option<char> {
    match day {
        1..=9 => Some((b'0' + day) as char),
        10 => Some('0'),
        11..=31 => Some((b'A' + day - 11) as char),
        _ => None,
    }
}

/// Render a frame for log output: control bytes become `<SOH>` style tags,
/// anything else non-printable becomes `\xNN`.
pub fn printable(frame: &[u8]) -> String {
    let mut out = String::with_capacity(frame.len() + 16);
    for &b in frame {
        match b {
            SOH => out.push_str("<SOH>"),
            STX => out.push_str("<STX>"),
            ETX => out.push_str("<ETX>"),
            DC4 => out.push_str("<DC4>"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_conversion() {
        assert_eq!(Record::from_u8(b'2'), Some(Record::Quote));
        assert_eq!(Record::from_u8(b'#'), Some(Record::Timestamp));
        assert_eq!(Record::from_u8(b'S'), Some(Record::Spread));
        assert_eq!(Record::from_u8(b'x'), None);
    }

    #[test]
    fn test_unit_codes() {
        let expected = [
            ('2', -1),
            ('3', -2),
            ('4', -3),
            ('5', -4),
            ('6', -5),
            ('7', -6),
            ('8', 0),
            ('9', 1),
            ('A', 2),
            ('B', 3),
            ('C', 4),
            ('D', 5),
            ('E', 6),
            ('F', 7),
            ('*', 0),
        ];
        for (c, unit) in expected {
            assert_eq!(BaseCode::from_char(c).unwrap().unit_code(), unit, "base code {}", c);
        }
        assert_eq!(BaseCode::from_char('G'), None);
        assert_eq!(BaseCode::from_char('1'), None);
    }

    #[test]
    fn test_day_codes() {
        assert_eq!(day_code_to_int('1'), Some(1));
        assert_eq!(day_code_to_int('0'), Some(10));
        assert_eq!(day_code_to_int('A'), Some(11));
        assert_eq!(day_code_to_int('U'), Some(31));
        assert_eq!(day_code_to_int('V'), None);
        for day in 1..=31 {
            let code = day_code_from_int(day).unwrap();
            assert_eq!(day_code_to_int(code), Some(day));
        }
    }

    #[test]
    fn test_silent_subrecords() {
        assert!(is_silent(Record::LegacyBeacon, b'0'));
        assert!(is_silent(Record::Quote, b'X'));
        assert!(is_silent(Record::BookAndSummary, b'T'));
        assert!(!is_silent(Record::Quote, b'7'));
        assert!(!is_silent(Record::BookAndSummary, b'B'));
    }

    #[test]
    fn test_printable() {
        assert_eq!(printable(b"\x012AB,7\x02C\x03"), "<SOH>2AB,7<STX>C<ETX>");
        assert_eq!(printable(&[0x80]), "\\x80");
    }
}
