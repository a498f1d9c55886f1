//! Decoded message types
//!
//! One variant per record/subrecord family. Every tokenized variant embeds
//! the same `MessageHeader`; snapshot variants carry the model value they
//! describe.

use crate::model::{BookQuote, CumulativeVolume, Quote};
use crate::protocol::{day_code_to_int, BaseCode, BOOK_LEVELS};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Legs stripped from a spread frame before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadInfo {
    pub spread_type: String,
    pub legs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeader {
    pub record: char,
    pub subrecord: char,
    pub symbol: String,
    pub base_code: BaseCode,
    pub exchange: char,
    pub delay: i32,
    pub day: Option<char>,
    pub session: char,
    pub timestamp: Option<NaiveDateTime>,
    pub spread: Option<SpreadInfo>,
    /// The frame as received, before any spread rewrite.
    pub raw: Vec<u8>,
}

impl MessageHeader {
    pub fn unit_code(&self) -> i32 {
        self.base_code.unit_code()
    }

    pub fn day_number(&self) -> Option<u8> {
        self.day.and_then(day_code_to_int)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimestampBeacon {
    pub raw: Vec<u8>,
    pub local: NaiveDateTime,
    pub utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub raw: Vec<u8>,
    pub value: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Last,
    Bid,
    Ask,
    Open,
    Open2,
    High,
    Low,
    Close,
    Close2,
    Previous,
    Settlement,
    PreliminarySettlement,
    Volume,
    PreviousVolume,
    OpenInterest,
    Vwap,
}

impl ParameterKind {
    /// Map an element/modifier pair to the field it updates.
    pub fn from_codes(element: u8, modifier: u8) -> Option<Self> {
        let kind = match (element, modifier) {
            (b'0', b'0') => ParameterKind::Last,
            (b'0', b'B') => ParameterKind::Bid,
            (b'0', b'A') => ParameterKind::Ask,
            (b'1', b'0') => ParameterKind::Close,
            (b'1', b'1') => ParameterKind::Close2,
            (b'2', b'0') => ParameterKind::Previous,
            (b'5', _) => ParameterKind::High,
            (b'6', _) => ParameterKind::Low,
            (b'7', b'1') => ParameterKind::PreviousVolume,
            (b'7', b'6') => ParameterKind::Volume,
            (b'A', b'1') => ParameterKind::Open2,
            (b'A', _) => ParameterKind::Open,
            (b'C', b'1') => ParameterKind::OpenInterest,
            (b'D', b'0') => ParameterKind::Settlement,
            (b'd', b'0') => ParameterKind::PreliminarySettlement,
            (b'V', b'0') => ParameterKind::Vwap,
            _ => return None,
        };
        Some(kind)
    }

    /// Volume and open interest travel as plain integers, the rest as prices.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ParameterKind::Volume | ParameterKind::PreviousVolume | ParameterKind::OpenInterest
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    Price(f64),
    Integer(i64),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterUpdate {
    pub header: MessageHeader,
    pub kind: ParameterKind,
    pub element: char,
    pub modifier: char,
    pub value: ParameterValue,
}

/// Subrecord 0: every field is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketRefresh {
    pub header: MessageHeader,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub last: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub open2: Option<f64>,
    pub previous: Option<f64>,
    pub close: Option<f64>,
    pub close2: Option<f64>,
    pub settlement: Option<f64>,
    pub previous_volume: Option<i64>,
    pub open_interest: Option<i64>,
    pub volume: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeUpdate {
    pub header: MessageHeader,
    pub price: Option<f64>,
    pub size: Option<i64>,
}

/// Each side is independently absent.
#[derive(Debug, Clone, PartialEq)]
pub struct TopOfBookUpdate {
    pub header: MessageHeader,
    pub bid: Option<f64>,
    pub bid_size: Option<i64>,
    pub ask: Option<f64>,
    pub ask_size: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketCondition {
    pub header: MessageHeader,
    pub code: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthCell {
    pub price: Option<f64>,
    pub size: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepthUpdate {
    pub header: MessageHeader,
    /// `B` replaces the book, `b` merges into it.
    pub replace: bool,
    pub bid_depth: usize,
    pub ask_depth: usize,
    /// Index 0 is the best bid.
    pub bids: [DepthCell; BOOK_LEVELS],
    /// Index 0 is the best ask.
    pub asks: [DepthCell; BOOK_LEVELS],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfDayKind {
    Commodity,
    Stock,
    PriorDay,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndOfDaySummary {
    pub header: MessageHeader,
    pub kind: EndOfDayKind,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
    pub open_interest: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    Timestamp(TimestampBeacon),
    QuoteSnapshot(Snapshot<Box<Quote>>),
    BookSnapshot(Snapshot<BookQuote>),
    VolumeSnapshot(Snapshot<CumulativeVolume>),
    Parameter(ParameterUpdate),
    Refresh(MarketRefresh),
    Trade(TradeUpdate),
    TopOfBook(TopOfBookUpdate),
    Condition(MarketCondition),
    Depth(DepthUpdate),
    EndOfDay(EndOfDaySummary),
}

impl DecodedMessage {
    pub fn header(&self) -> Option<&MessageHeader> {
        match self {
            DecodedMessage::Parameter(m) => Some(&m.header),
            DecodedMessage::Refresh(m) => Some(&m.header),
            DecodedMessage::Trade(m) => Some(&m.header),
            DecodedMessage::TopOfBook(m) => Some(&m.header),
            DecodedMessage::Condition(m) => Some(&m.header),
            DecodedMessage::Depth(m) => Some(&m.header),
            DecodedMessage::EndOfDay(m) => Some(&m.header),
            DecodedMessage::Timestamp(_)
            | DecodedMessage::QuoteSnapshot(_)
            | DecodedMessage::BookSnapshot(_)
            | DecodedMessage::VolumeSnapshot(_) => None,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            DecodedMessage::Timestamp(_) => None,
            DecodedMessage::QuoteSnapshot(s) => Some(s.value.symbol()),
            DecodedMessage::BookSnapshot(s) => Some(&s.value.symbol),
            DecodedMessage::VolumeSnapshot(s) => Some(&s.value.symbol),
            _ => self.header().map(|h| h.symbol.as_str()),
        }
    }

    pub fn raw(&self) -> &[u8] {
        match self {
            DecodedMessage::Timestamp(t) => &t.raw,
            DecodedMessage::QuoteSnapshot(s) => &s.raw,
            DecodedMessage::BookSnapshot(s) => &s.raw,
            DecodedMessage::VolumeSnapshot(s) => &s.raw,
            _ => self.header().map(|h| h.raw.as_slice()).unwrap_or_default(),
        }
    }

    /// Short name for logs and stats.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodedMessage::Timestamp(_) => "timestamp",
            DecodedMessage::QuoteSnapshot(_) => "quote_snapshot",
            DecodedMessage::BookSnapshot(_) => "book_snapshot",
            DecodedMessage::VolumeSnapshot(_) => "volume_snapshot",
            DecodedMessage::Parameter(_) => "parameter",
            DecodedMessage::Refresh(_) => "refresh",
            DecodedMessage::Trade(_) => "trade",
            DecodedMessage::TopOfBook(_) => "top_of_book",
            DecodedMessage::Condition(_) => "condition",
            DecodedMessage::Depth(_) => "depth",
            DecodedMessage::EndOfDay(_) => "end_of_day",
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(
            self,
            DecodedMessage::QuoteSnapshot(_)
                | DecodedMessage::BookSnapshot(_)
                | DecodedMessage::VolumeSnapshot(_)
        )
    }
}
