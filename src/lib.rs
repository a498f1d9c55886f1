/// DDF Feed - Market Data Codec and State Engine
///
/// Decodes the DDF market data protocol and folds the decoded stream into
/// per-symbol market state. Features include:
/// - Tokenized frame decoding (records 2, 3, C, S and timestamp beacons)
/// - Snapshot markup for quotes, books and cumulative volume
/// - Per-symbol quotes with combined, previous, electronic and auxiliary sessions
/// - Ten-level depth books and price-level cumulative volume
/// - Single-writer processing with snapshot refresh requests
/// - Comprehensive performance statistics

pub mod protocol;
pub mod price;
pub mod timestamp;
pub mod markup;
pub mod message;
pub mod spread;
pub mod decoder;
pub mod model;
pub mod feed_event;
pub mod recovery;
pub mod config;
pub mod data_master;
pub mod processor;
pub mod stats;

pub use protocol::{BaseCode, Record};
pub use price::{format_price, parse_price, PriceError};
pub use markup::{Element, MarkupError};
pub use message::{
    DecodedMessage, DepthCell, DepthUpdate, EndOfDayKind, EndOfDaySummary, MarketCondition,
    MarketRefresh, MessageHeader, ParameterKind, ParameterUpdate, ParameterValue, Snapshot,
    SpreadInfo, TimestampBeacon, TopOfBookUpdate, TradeUpdate,
};
pub use decoder::{DecodeError, DecodeResult, Decoder};
pub use model::{
    BookDepth, BookQuote, CumulativeVolume, MarketEvent, MarketEventKind, Ohlc, Quote, Session,
    SymbolInfo,
};
pub use feed_event::FeedEvent;
pub use recovery::{NoRefresh, RefreshRequester, RefreshTracker};
pub use config::{ConfigError, EngineConfig};
pub use data_master::{DataMaster, FoldError, SessionTarget};
pub use processor::{FeedProcessor, FrameSender, ProcessorError};
pub use stats::{FeedStats, LatencyStats};
