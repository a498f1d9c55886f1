//! DDF message decoder
//!
//! Takes one raw frame and produces a typed `DecodedMessage`. Stateless: the
//! same frame always decodes to the same value. Known server chatter decodes
//! to nothing without an error; anything else that cannot be decoded is
//! logged once and dropped.

use crate::markup::{self, MarkupError};
use crate::message::*;
use crate::model::{BookQuote, CumulativeVolume, Quote};
use crate::price::{optional_long, optional_price, parse_int, PriceError};
use crate::protocol::*;
use crate::spread::rewrite_spread;
use crate::timestamp::{local_datetime, parse_suffix, to_utc, SUFFIX_LEN, SUFFIX_LEN_MILLIS};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    #[error("unknown frame marker {0:#04x}")]
    UnknownMarker(u8),

    #[error("unknown record {0:?}")]
    UnknownRecord(char),

    #[error("unknown subrecord {subrecord:?} for record {record:?}")]
    UnknownSubrecord { record: char, subrecord: char },

    #[error("missing {0}")]
    MissingDelimiter(&'static str),

    #[error("missing ETX terminator")]
    MissingTerminator,

    #[error("unknown base code {0:?}")]
    UnknownBaseCode(char),

    #[error("malformed payload: {0}")]
    MalformedPayload(&'static str),

    #[error("unknown element/modifier {element:?}/{modifier:?}")]
    UnknownElement { element: char, modifier: char },

    #[error("invalid spread: {0}")]
    InvalidSpread(&'static str),

    #[error("invalid timestamp")]
    InvalidTimestamp,

    #[error("unknown snapshot root <{0}>")]
    UnknownSnapshot(String),

    #[error("bad numeric field: {0}")]
    Price(#[from] PriceError),

    #[error("bad snapshot markup: {0}")]
    Markup(#[from] MarkupError),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// `SOH # YYYYMMDDHHMMSS`, the ETX is not required.
const BEACON_LEN: usize = 16;

pub struct Decoder;

impl Decoder {
    /// Decode one frame. Failures are logged and yield `None`, as do the
    /// intentionally silent subrecords.
    pub fn decode(frame: &[u8]) -> Option<DecodedMessage> {
        match Self::try_decode(frame) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, frame = %printable(frame), "failed to decode frame");
                None
            }
        }
    }

    /// Like [`Decoder::decode`] but hands the error back. `Ok(None)` means
    /// the frame is known chatter.
    pub fn try_decode(frame: &[u8]) -> DecodeResult<Option<DecodedMessage>> {
        let first = *frame
            .first()
            .ok_or(DecodeError::BufferTooSmall { need: 1, have: 0 })?;

        match first {
            SNAPSHOT_MARKER | b'<' => decode_snapshot(frame).map(Some),
            SOH => decode_tokenized(frame),
            other => Err(DecodeError::UnknownMarker(other)),
        }
    }

    /// Split `buffer` into frames and decode each; stops early if the
    /// callback returns false. Returns the number of messages delivered.
    pub fn decode_stream<F>(buffer: &[u8], mut callback: F) -> usize
    where
        F: FnMut(&DecodedMessage) -> bool,
    {
        let (frames, _) = Self::split_frames(buffer);
        let mut count = 0;
        for frame in frames {
            if let Some(message) = Self::decode(frame) {
                count += 1;
                if !callback(&message) {
                    break;
                }
            }
        }
        count
    }

    /// Split a captured byte stream into frames.
    ///
    /// Tokenized frames run from SOH through ETX plus a DC4-led timestamp
    /// suffix when one follows. Snapshot frames run to the end of the line.
    /// Returns the frames and the number of bytes consumed; an unterminated
    /// tokenized frame at the end is left unconsumed.
    pub fn split_frames(buffer: &[u8]) -> (Vec<&[u8]>, usize) {
        let mut frames = Vec::new();
        let mut pos = 0;

        while pos < buffer.len() {
            match buffer[pos] {
                SOH => {
                    let Some(etx) = find(buffer, pos + 1, ETX) else {
                        return (frames, pos);
                    };
                    let end = etx + 1 + suffix_len(buffer, etx + 1);
                    frames.push(&buffer[pos..end]);
                    pos = end;
                }
                SNAPSHOT_MARKER | b'<' => {
                    let end = find(buffer, pos, b'\n').unwrap_or(buffer.len());
                    let mut line = &buffer[pos..end];
                    if let Some(stripped) = line.strip_suffix(b"\r") {
                        line = stripped;
                    }
                    frames.push(line);
                    pos = (end + 1).min(buffer.len());
                }
                _ => pos += 1,
            }
        }

        (frames, pos)
    }
}

fn find(buffer: &[u8], from: usize, byte: u8) -> Option<usize> {
    buffer
        .get(from..)?
        .iter()
        .position(|&b| b == byte)
        .map(|i| from + i)
}

fn is_boundary(buffer: &[u8], pos: usize) -> bool {
    match buffer.get(pos) {
        None => true,
        Some(&b) => matches!(b, SOH | SNAPSHOT_MARKER | b'<' | b'\r' | b'\n'),
    }
}

/// Length of the timestamp suffix starting at `pos`, zero when absent.
fn suffix_len(buffer: &[u8], pos: usize) -> usize {
    if buffer.get(pos) != Some(&DC4) {
        return 0;
    }
    let available = buffer.len() - pos;
    if available >= SUFFIX_LEN_MILLIS && is_boundary(buffer, pos + SUFFIX_LEN_MILLIS) {
        SUFFIX_LEN_MILLIS
    } else if available >= SUFFIX_LEN && is_boundary(buffer, pos + SUFFIX_LEN) {
        SUFFIX_LEN
    } else {
        available.min(SUFFIX_LEN_MILLIS)
    }
}

fn decode_snapshot(frame: &[u8]) -> DecodeResult<DecodedMessage> {
    let mut body = frame;
    // the server occasionally doubles the marker
    for _ in 0..2 {
        if let Some(rest) = body.strip_prefix(&[SNAPSHOT_MARKER]) {
            body = rest;
        }
    }
    let text = std::str::from_utf8(body)
        .map_err(|_| DecodeError::MalformedPayload("snapshot is not UTF-8"))?
        .trim_end();

    let root = markup::parse(text)?;
    let raw = frame.to_vec();
    let message = match root.name.as_str() {
        "QUOTE" => DecodedMessage::QuoteSnapshot(Snapshot {
            raw,
            value: Box::new(Quote::from_markup(&root)?),
        }),
        "BOOK" => DecodedMessage::BookSnapshot(Snapshot {
            raw,
            value: BookQuote::from_markup(&root)?,
        }),
        "CV" => DecodedMessage::VolumeSnapshot(Snapshot {
            raw,
            value: CumulativeVolume::from_markup(&root)?,
        }),
        other => return Err(DecodeError::UnknownSnapshot(other.to_string())),
    };
    Ok(message)
}

fn decode_tokenized(frame: &[u8]) -> DecodeResult<Option<DecodedMessage>> {
    if frame.len() < 2 {
        return Err(DecodeError::BufferTooSmall {
            need: 2,
            have: frame.len(),
        });
    }
    let record = Record::from_u8(frame[1]).ok_or(DecodeError::UnknownRecord(frame[1] as char))?;

    match record {
        Record::LegacyBeacon => Ok(None),
        Record::Timestamp => decode_beacon(frame).map(Some),
        Record::Spread => {
            let sub = subrecord_of(frame)?;
            if is_silent(record, sub) {
                return Ok(None);
            }
            let etx = find(frame, 2, ETX).ok_or(DecodeError::MissingTerminator)?;
            let rewrite = rewrite_spread(frame)?;
            let etx = rewrite
                .shift(etx)
                .filter(|&i| rewrite.frame.get(i) == Some(&ETX))
                .ok_or(DecodeError::InvalidSpread("terminator moved"))?;
            let parts = FrameParts::split(&rewrite.frame, etx, frame)?;
            let mut message = decode_quote(parts)?;
            if let Some(header) = header_mut(&mut message) {
                header.spread = Some(rewrite.info);
            }
            Ok(Some(message))
        }
        Record::Quote | Record::QuoteAlt | Record::BookAndSummary => {
            let sub = subrecord_of(frame)?;
            if is_silent(record, sub) {
                return Ok(None);
            }
            let etx = find(frame, 2, ETX).ok_or(DecodeError::MissingTerminator)?;
            let parts = FrameParts::split(frame, etx, frame)?;
            if record == Record::BookAndSummary {
                decode_book_or_summary(parts).map(Some)
            } else {
                decode_quote(parts).map(Some)
            }
        }
    }
}

fn subrecord_of(frame: &[u8]) -> DecodeResult<u8> {
    let comma = find(frame, 2, b',').ok_or(DecodeError::MissingDelimiter("symbol comma"))?;
    frame
        .get(comma + 1)
        .copied()
        .ok_or(DecodeError::BufferTooSmall {
            need: comma + 2,
            have: frame.len(),
        })
}

/// `SOH # YYYY MM DD HH MM SS ETX`
fn decode_beacon(frame: &[u8]) -> DecodeResult<DecodedMessage> {
    if frame.len() < BEACON_LEN {
        return Err(DecodeError::BufferTooSmall {
            need: BEACON_LEN,
            have: frame.len(),
        });
    }
    let two = |offset: usize| -> DecodeResult<u32> {
        u32::try_from(parse_int(frame, offset, 2)?).map_err(|_| DecodeError::InvalidTimestamp)
    };
    let local = local_datetime(
        parse_int(frame, 2, 4)?,
        two(6)?,
        two(8)?,
        two(10)?,
        two(12)?,
        two(14)?,
        0,
    )
    .ok_or(DecodeError::InvalidTimestamp)?;

    Ok(DecodedMessage::Timestamp(TimestampBeacon {
        raw: frame.to_vec(),
        local,
        utc: to_utc(&local),
    }))
}

/// The pieces of a tokenized frame every subrecord shares.
struct FrameParts<'a> {
    record: u8,
    symbol: &'a str,
    sub: u8,
    /// Everything between STX and ETX.
    body: &'a [u8],
    suffix: &'a [u8],
    raw: &'a [u8],
}

impl<'a> FrameParts<'a> {
    fn split(frame: &'a [u8], etx: usize, raw: &'a [u8]) -> DecodeResult<Self> {
        let comma = find(frame, 2, b',').ok_or(DecodeError::MissingDelimiter("symbol comma"))?;
        if comma + 2 >= etx || frame[comma + 2] != STX {
            return Err(DecodeError::MissingDelimiter("STX"));
        }
        let symbol = std::str::from_utf8(&frame[2..comma])
            .map_err(|_| DecodeError::MalformedPayload("symbol is not text"))?;
        if symbol.is_empty() {
            return Err(DecodeError::MalformedPayload("empty symbol"));
        }
        Ok(FrameParts {
            record: frame[1],
            symbol,
            sub: frame[comma + 1],
            body: &frame[comma + 3..etx],
            suffix: &frame[etx + 1..],
            raw,
        })
    }

    /// Header for the `base exch delay2` layout; returns it with the payload.
    fn quote_header(&self) -> DecodeResult<(MessageHeader, &'a [u8])> {
        if self.body.len() < 4 {
            return Err(DecodeError::BufferTooSmall {
                need: 4,
                have: self.body.len(),
            });
        }
        let mut header = self.header(self.body[0], self.body[1])?;
        header.delay = parse_int(self.body, 2, 2)?;
        Ok((header, &self.body[4..]))
    }

    fn header(&self, base: u8, exchange: u8) -> DecodeResult<MessageHeader> {
        let base_code = BaseCode::from_u8(base).ok_or(DecodeError::UnknownBaseCode(base as char))?;
        Ok(MessageHeader {
            record: self.record as char,
            subrecord: self.sub as char,
            symbol: self.symbol.to_string(),
            base_code,
            exchange: exchange as char,
            delay: 0,
            day: None,
            session: ' ',
            timestamp: parse_suffix(self.suffix),
            spread: None,
            raw: self.raw.to_vec(),
        })
    }
}

fn header_mut(message: &mut DecodedMessage) -> Option<&mut MessageHeader> {
    match message {
        DecodedMessage::Parameter(m) => Some(&mut m.header),
        DecodedMessage::Refresh(m) => Some(&mut m.header),
        DecodedMessage::Trade(m) => Some(&mut m.header),
        DecodedMessage::TopOfBook(m) => Some(&mut m.header),
        DecodedMessage::Condition(m) => Some(&mut m.header),
        DecodedMessage::Depth(m) => Some(&mut m.header),
        DecodedMessage::EndOfDay(m) => Some(&mut m.header),
        _ => None,
    }
}

/// Split a comma payload, requiring exactly `count` fields. The last field
/// is the day/session pair, which is applied to `header`.
fn fields<'a>(
    payload: &'a [u8],
    count: usize,
    header: &mut MessageHeader,
) -> DecodeResult<Vec<&'a [u8]>> {
    let mut fields: Vec<&[u8]> = payload.split(|&b| b == b',').collect();
    if fields.len() != count {
        return Err(DecodeError::MalformedPayload("unexpected field count"));
    }
    let day_session = fields.pop().unwrap_or_default();
    apply_day_session(day_session, header)?;
    Ok(fields)
}

fn apply_day_session(field: &[u8], header: &mut MessageHeader) -> DecodeResult<()> {
    if field.len() > 2 {
        return Err(DecodeError::MalformedPayload("day/session field too long"));
    }
    header.day = match field.first() {
        Some(&b) if day_code_to_int(b as char).is_some() => Some(b as char),
        Some(_) => return Err(DecodeError::MalformedPayload("day code")),
        None => None,
    };
    header.session = field.get(1).map(|&b| b as char).unwrap_or(' ');
    Ok(())
}

fn decode_quote(parts: FrameParts<'_>) -> DecodeResult<DecodedMessage> {
    let (mut header, payload) = parts.quote_header()?;
    let unit = header.unit_code();

    let message = match parts.sub {
        subrecord::REFRESH => {
            let f = fields(payload, 15, &mut header)?;
            let price = |i: usize| optional_price(f[i], unit);
            DecodedMessage::Refresh(MarketRefresh {
                open: price(0)?,
                high: price(1)?,
                low: price(2)?,
                last: price(3)?,
                bid: price(4)?,
                ask: price(5)?,
                open2: price(6)?,
                previous: price(7)?,
                close: price(8)?,
                close2: price(9)?,
                settlement: price(10)?,
                previous_volume: optional_long(f[11])?,
                open_interest: optional_long(f[12])?,
                volume: optional_long(f[13])?,
                header,
            })
        }
        sub if subrecord::is_parameter(sub) => {
            let (value, codes) = match payload.iter().position(|&b| b == b',') {
                Some(i) => (&payload[..i], &payload[i + 1..]),
                None => return Err(DecodeError::MissingDelimiter("parameter comma")),
            };
            if codes.len() < 2 || codes.len() > 4 {
                return Err(DecodeError::MalformedPayload("bad element/modifier field"));
            }
            let (element, modifier) = (codes[0], codes[1]);
            apply_day_session(&codes[2..], &mut header)?;
            let kind = ParameterKind::from_codes(element, modifier).ok_or(
                DecodeError::UnknownElement {
                    element: element as char,
                    modifier: modifier as char,
                },
            )?;
            let value = if kind.is_integer() {
                optional_long(value)?.map_or(ParameterValue::Empty, ParameterValue::Integer)
            } else {
                optional_price(value, unit)?.map_or(ParameterValue::Empty, ParameterValue::Price)
            };
            DecodedMessage::Parameter(ParameterUpdate {
                header,
                kind,
                element: element as char,
                modifier: modifier as char,
                value,
            })
        }
        subrecord::TRADE => {
            let f = fields(payload, 3, &mut header)?;
            DecodedMessage::Trade(TradeUpdate {
                price: optional_price(f[0], unit)?,
                size: optional_long(f[1])?,
                header,
            })
        }
        subrecord::TOP_OF_BOOK => {
            let f = fields(payload, 5, &mut header)?;
            let bid = optional_price(f[0], unit)?;
            let ask = optional_price(f[2], unit)?;
            DecodedMessage::TopOfBook(TopOfBookUpdate {
                bid,
                bid_size: if bid.is_some() { optional_long(f[1])? } else { None },
                ask,
                ask_size: if ask.is_some() { optional_long(f[3])? } else { None },
                header,
            })
        }
        subrecord::MARKET_CONDITION => {
            let f = fields(payload, 2, &mut header)?;
            let code = match f[0] {
                [c] => *c as char,
                _ => return Err(DecodeError::MalformedPayload("condition code")),
            };
            DecodedMessage::Condition(MarketCondition { header, code })
        }
        sub => {
            return Err(DecodeError::UnknownSubrecord {
                record: parts.record as char,
                subrecord: sub as char,
            })
        }
    };
    Ok(message)
}

fn decode_book_or_summary(parts: FrameParts<'_>) -> DecodeResult<DecodedMessage> {
    match parts.sub {
        subrecord::DEPTH_REPLACE | subrecord::DEPTH_MERGE => decode_depth(parts),
        subrecord::EOD_COMMODITY | subrecord::EOD_STOCK | subrecord::EOD_PRIOR_DAY => {
            decode_end_of_day(parts)
        }
        sub => Err(DecodeError::UnknownSubrecord {
            record: parts.record as char,
            subrecord: sub as char,
        }),
    }
}

fn depth_count(b: u8) -> DecodeResult<usize> {
    match b {
        b'0'..=b'9' => Ok(usize::from(b - b'0')),
        b'A' => Ok(BOOK_LEVELS),
        _ => Err(DecodeError::MalformedPayload("bad depth count")),
    }
}

/// `base exch bidDepth askDepth STX price LETTER size (, price LETTER size)*`
fn decode_depth(parts: FrameParts<'_>) -> DecodeResult<DecodedMessage> {
    let body = parts.body;
    if body.len() < 5 {
        return Err(DecodeError::BufferTooSmall {
            need: 5,
            have: body.len(),
        });
    }
    if body[4] != STX {
        return Err(DecodeError::MissingDelimiter("depth STX"));
    }
    let header = parts.header(body[0], body[1])?;
    let unit = header.unit_code();

    let mut update = DepthUpdate {
        replace: parts.sub == subrecord::DEPTH_REPLACE,
        bid_depth: depth_count(body[2])?,
        ask_depth: depth_count(body[3])?,
        bids: [DepthCell::default(); BOOK_LEVELS],
        asks: [DepthCell::default(); BOOK_LEVELS],
        header,
    };

    for entry in body[5..].split(|&b| b == b',').filter(|e| !e.is_empty()) {
        let at = entry
            .iter()
            .position(|b| (b'A'..=b'T').contains(b))
            .ok_or(DecodeError::MalformedPayload("depth entry without level letter"))?;
        let letter = entry[at];
        let cell = DepthCell {
            price: optional_price(&entry[..at], unit)?,
            size: optional_long(&entry[at + 1..])?,
        };
        if letter >= BOOK_LEVEL_ANCHOR {
            update.bids[usize::from(letter - BOOK_LEVEL_ANCHOR)] = cell;
        } else {
            update.asks[usize::from(BOOK_LEVEL_ANCHOR - 1 - letter)] = cell;
        }
    }

    Ok(DecodedMessage::Depth(update))
}

fn decode_end_of_day(parts: FrameParts<'_>) -> DecodeResult<DecodedMessage> {
    let (mut header, payload) = parts.quote_header()?;
    let unit = header.unit_code();

    let summary = match parts.sub {
        subrecord::EOD_COMMODITY | subrecord::EOD_STOCK => {
            let stock = parts.sub == subrecord::EOD_STOCK;
            let f = fields(payload, if stock { 6 } else { 5 }, &mut header)?;
            EndOfDaySummary {
                kind: if stock {
                    EndOfDayKind::Stock
                } else {
                    EndOfDayKind::Commodity
                },
                open: optional_price(f[0], unit)?,
                high: optional_price(f[1], unit)?,
                low: optional_price(f[2], unit)?,
                close: optional_price(f[3], unit)?,
                volume: if stock { optional_long(f[4])? } else { None },
                open_interest: None,
                header,
            }
        }
        _ => {
            let f = fields(payload, 3, &mut header)?;
            EndOfDaySummary {
                kind: EndOfDayKind::PriorDay,
                open: None,
                high: None,
                low: None,
                close: None,
                volume: optional_long(f[0])?,
                open_interest: optional_long(f[1])?,
                header,
            }
        }
    };
    Ok(DecodedMessage::EndOfDay(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_too_small() {
        assert!(matches!(
            Decoder::try_decode(&[]),
            Err(DecodeError::BufferTooSmall { .. })
        ));
        assert!(matches!(
            Decoder::try_decode(&[SOH]),
            Err(DecodeError::BufferTooSmall { .. })
        ));
        assert_eq!(Decoder::decode(&[]), None);
    }

    #[test]
    fn test_unknown_marker_and_record() {
        assert_eq!(Decoder::try_decode(b"x"), Err(DecodeError::UnknownMarker(b'x')));
        assert_eq!(
            Decoder::try_decode(b"\x01?AB,7\x02\x03"),
            Err(DecodeError::UnknownRecord('?'))
        );
    }

    #[test]
    fn test_silent_chatter() {
        assert_eq!(Decoder::try_decode(b"\x01!anything"), Ok(None));
        assert_eq!(Decoder::try_decode(b"\x012HOZ9,D\x02CJ10\x03"), Ok(None));
        assert_eq!(Decoder::try_decode(b"\x013HOZ9,T\x02garbage\x03"), Ok(None));
    }

    #[test]
    fn test_missing_terminator() {
        assert_eq!(
            Decoder::try_decode(b"\x012HOZ9,7\x02CJ1021371,5,SG"),
            Err(DecodeError::MissingTerminator)
        );
    }

    #[test]
    fn test_unknown_subrecord() {
        assert_eq!(
            Decoder::try_decode(b"\x012HOZ9,Q\x02CJ10\x03"),
            Err(DecodeError::UnknownSubrecord {
                record: '2',
                subrecord: 'Q'
            })
        );
    }

    #[test]
    fn test_split_frames_with_suffix_and_snapshot() {
        let mut stream = b"\x012A,7\x02AJ10100,1,SG\x03".to_vec();
        stream.extend_from_slice(&[DC4, 0x55, 0x4A, 0x5C, 0x4E, 0x5E, 0x4F, 0x03, 0x00]);
        stream.extend_from_slice(b"\n%<CV symbol=\"A\"/>\r\n");
        stream.extend_from_slice(b"\x012B,7\x02AJ10");

        let (frames, consumed) = Decoder::split_frames(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 19 + SUFFIX_LEN_MILLIS);
        assert_eq!(frames[1], b"%<CV symbol=\"A\"/>");
        assert_eq!(&stream[consumed..], b"\x012B,7\x02AJ10");
    }
}
