//! Per-symbol state engine
//!
//! Folds decoded messages into quotes, books and cumulative volume and
//! reports each change as a `FeedEvent`. Not thread-safe on its own; the
//! `FeedProcessor` gives it a single writer.

use crate::config::EngineConfig;
use crate::decoder::Decoder;
use crate::feed_event::FeedEvent;
use crate::message::{
    DecodedMessage, DepthUpdate, EndOfDayKind, EndOfDaySummary, MarketRefresh, MessageHeader,
    ParameterKind, ParameterUpdate, ParameterValue,
};
use crate::model::{
    BookQuote, CumulativeVolume, MarketEvent, MarketEventKind, Ohlc, Quote, Session, SymbolInfo,
};
use crate::protocol::{day_code_to_int, printable, SESSION_ELECTRONIC, SESSION_PIT};
use crate::recovery::{NoRefresh, RefreshRequester, RefreshTracker};
use crate::stats::FeedStats;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FoldError {
    #[error("{kind} message has an empty symbol")]
    EmptySymbol { kind: &'static str },

    #[error("fold panicked: {0}")]
    Panicked(String),
}

/// Which session view of a quote a message lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTarget {
    Combined,
    Previous,
    Electronic,
    Aux { day: char, session: char },
}

impl SessionTarget {
    /// Only combined-session updates raise market events and feed
    /// cumulative volume.
    pub fn is_live(self) -> bool {
        self == SessionTarget::Combined
    }

    /// Top of book belongs to today's views only.
    fn is_current(self) -> bool {
        matches!(self, SessionTarget::Combined | SessionTarget::Electronic)
    }
}

/// Outcome of matching a message's day against a quote's sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub target: SessionTarget,
    pub rolled: bool,
}

/// Pick the session for `header`, rolling the quote to a new day if the
/// message's day has advanced.
///
/// A day code more than `wrap_window` days behind the combined day is read
/// as the month wrapping (30 -> 1). This is a calendar approximation.
pub fn resolve_session(quote: &mut Quote, header: &MessageHeader, wrap_window: u8) -> Resolution {
    let same_day = |session: char| Resolution {
        target: if session == SESSION_ELECTRONIC {
            SessionTarget::Electronic
        } else {
            SessionTarget::Combined
        },
        rolled: false,
    };

    let Some(day) = header.day else {
        return same_day(header.session);
    };
    let current = match quote.combined.day {
        None => {
            quote.combined.day = Some(day);
            quote.electronic.day = Some(day);
            return same_day(header.session);
        }
        Some(current) if current == day => return same_day(header.session),
        Some(current) => current,
    };
    if quote.previous.day == Some(day) {
        return Resolution {
            target: SessionTarget::Previous,
            rolled: false,
        };
    }

    let (Some(incoming), Some(combined)) = (day_code_to_int(day), day_code_to_int(current)) else {
        return same_day(header.session);
    };
    let advanced = incoming > combined || combined - incoming > wrap_window;
    if !advanced {
        return Resolution {
            target: SessionTarget::Aux {
                day,
                session: header.session,
            },
            rolled: false,
        };
    }

    if quote.combined.last().is_none() {
        // nothing traded yet, the old day is not worth keeping
        quote.combined.day = Some(day);
        quote.electronic.day = Some(day);
        return same_day(header.session);
    }

    quote.roll(day);
    Resolution {
        rolled: true,
        ..same_day(header.session)
    }
}

fn session_mut(quote: &mut Quote, target: SessionTarget) -> &mut Session {
    match target {
        SessionTarget::Combined => &mut quote.combined,
        SessionTarget::Previous => &mut quote.previous,
        SessionTarget::Electronic => &mut quote.electronic,
        SessionTarget::Aux { day, session } => quote.aux_session_mut(day, session),
    }
}

fn micros(since: Instant) -> u64 {
    since.elapsed().as_micros() as u64
}

/// Collects the market events raised while folding one message.
struct Events<'a> {
    symbol: &'a str,
    message: &'a Arc<DecodedMessage>,
    live: bool,
    raised: Vec<MarketEvent>,
}

impl<'a> Events<'a> {
    fn raise(&mut self, kind: MarketEventKind, price: Option<f64>) {
        if self.live {
            self.raised.push(MarketEvent::new(
                kind,
                self.symbol,
                price,
                Some(Arc::clone(self.message)),
            ));
        }
    }
}

pub struct DataMaster {
    quotes: HashMap<String, Quote>,
    books: HashMap<String, BookQuote>,
    volumes: HashMap<String, CumulativeVolume>,
    requester: Box<dyn RefreshRequester>,
    tracker: RefreshTracker,
    config: EngineConfig,
    stats: FeedStats,
    last_beacon: Option<NaiveDateTime>,
}

impl DataMaster {
    pub fn new(config: EngineConfig, requester: impl RefreshRequester + 'static) -> Self {
        DataMaster {
            quotes: HashMap::new(),
            books: HashMap::new(),
            volumes: HashMap::new(),
            requester: Box::new(requester),
            tracker: RefreshTracker::new(config.dedupe_refresh_requests),
            config,
            stats: FeedStats::new(),
            last_beacon: None,
        }
    }

    /// Decode and fold one raw frame.
    pub fn process_frame(&mut self, frame: &[u8]) -> Option<FeedEvent> {
        self.stats.record_frame(frame.len());
        let started = Instant::now();
        let decoded = Decoder::try_decode(frame);
        self.stats.record_decode_latency(micros(started));

        match decoded {
            Ok(Some(message)) => {
                self.stats.record_decoded();
                self.fold(message)
            }
            Ok(None) => {
                self.stats.record_ignored();
                None
            }
            Err(e) => {
                self.stats.record_decode_error();
                error!(error = %e, frame = %printable(frame), "failed to decode frame");
                None
            }
        }
    }

    /// Fold a decoded message. Failures are logged with the frame and
    /// yield `None`.
    pub fn fold(&mut self, message: DecodedMessage) -> Option<FeedEvent> {
        let message = Arc::new(message);
        let started = Instant::now();
        let result = self.try_fold(Arc::clone(&message));
        self.stats.record_fold_latency(micros(started));

        match result {
            Ok(Some(event)) => {
                self.stats.record_folded(event.market_events.len());
                Some(event)
            }
            Ok(None) => None,
            Err(e) => {
                self.stats.record_fold_error();
                warn!(error = %e, frame = %printable(message.raw()), "failed to fold message");
                None
            }
        }
    }

    pub fn try_fold(&mut self, message: Arc<DecodedMessage>) -> Result<Option<FeedEvent>, FoldError> {
        if matches!(message.symbol(), Some("")) {
            return Err(FoldError::EmptySymbol {
                kind: message.kind(),
            });
        }

        let event = match message.as_ref() {
            DecodedMessage::Timestamp(beacon) => {
                self.last_beacon = Some(beacon.local);
                Some(FeedEvent {
                    timestamp: Some(beacon.local),
                    message: Some(Arc::clone(&message)),
                    ..Default::default()
                })
            }
            DecodedMessage::QuoteSnapshot(snapshot) => {
                let mut quote = (*snapshot.value).clone();
                quote.message = Some(Arc::clone(&message));
                if quote.electronic.day.is_none() {
                    quote.electronic.day = quote.combined.day;
                }
                let symbol = quote.symbol().to_string();
                self.tracker.snapshot_received(&symbol);
                debug!(symbol = %symbol, "quote snapshot");
                let event = FeedEvent {
                    timestamp: quote.last_update.or(self.last_beacon),
                    quote: Some(quote.clone()),
                    message: Some(Arc::clone(&message)),
                    ..Default::default()
                };
                self.quotes.insert(symbol, quote);
                Some(event)
            }
            DecodedMessage::BookSnapshot(snapshot) => {
                let book = snapshot.value.clone();
                self.books.insert(book.symbol.clone(), book.clone());
                Some(FeedEvent {
                    timestamp: book.timestamp.or(self.last_beacon),
                    book_quote: Some(book),
                    message: Some(Arc::clone(&message)),
                    ..Default::default()
                })
            }
            DecodedMessage::VolumeSnapshot(snapshot) => {
                let cv = snapshot.value.clone();
                self.volumes.insert(cv.symbol.clone(), cv.clone());
                Some(FeedEvent {
                    timestamp: self.last_beacon,
                    cumulative_volume: Some(cv),
                    message: Some(Arc::clone(&message)),
                    ..Default::default()
                })
            }
            DecodedMessage::Depth(update) => Some(self.fold_depth(update, &message)),
            DecodedMessage::EndOfDay(summary) => Some(self.fold_end_of_day(summary, &message)),
            DecodedMessage::Parameter(_)
            | DecodedMessage::Refresh(_)
            | DecodedMessage::Trade(_)
            | DecodedMessage::TopOfBook(_)
            | DecodedMessage::Condition(_) => self.fold_live(&message),
        };
        Ok(event)
    }

    fn fold_depth(&mut self, update: &DepthUpdate, message: &Arc<DecodedMessage>) -> FeedEvent {
        let symbol = &update.header.symbol;
        let book = self
            .books
            .entry(symbol.clone())
            .or_insert_with(|| BookQuote::new(symbol.clone(), update.header.base_code));
        if update.replace {
            book.replace(update);
        } else {
            book.merge(update);
        }
        FeedEvent {
            timestamp: update.header.timestamp.or(self.last_beacon),
            book_quote: Some(book.clone()),
            message: Some(Arc::clone(message)),
            ..Default::default()
        }
    }

    fn fold_end_of_day(&mut self, summary: &EndOfDaySummary, message: &Arc<DecodedMessage>) -> FeedEvent {
        let header = &summary.header;
        let timestamp = header.timestamp.or(self.last_beacon);
        let quote = self.quotes.entry(header.symbol.clone()).or_insert_with(|| {
            let mut quote = Quote::new(SymbolInfo::new(header.symbol.clone(), header.base_code));
            quote.combined.day = header.day;
            quote.electronic.day = header.day;
            quote
        });
        quote.message = Some(Arc::clone(message));
        quote.ddf_exchange = Some(header.exchange);

        let mut events = Events {
            symbol: &header.symbol,
            message,
            live: false,
            raised: Vec::new(),
        };

        if summary.kind == EndOfDayKind::PriorDay {
            if summary.volume.is_some() {
                quote.previous.volume = summary.volume;
            }
            if summary.open_interest.is_some() {
                quote.previous.open_interest = summary.open_interest;
            }
        } else {
            let resolution = resolve_session(quote, header, self.config.day_wrap_window);
            if resolution.rolled {
                roll_side_effects(quote, &mut self.volumes, &mut events);
            }
            events.live = resolution.target.is_live();
            let session = session_mut(quote, resolution.target);
            session.open = summary.open.or(session.open);
            session.high = summary.high.or(session.high);
            session.low = summary.low.or(session.low);
            if summary.volume.is_some() {
                session.volume = summary.volume;
            }
            if let Some(close) = summary.close {
                session.close = Some(close);
                if events.live {
                    quote.flag = Some('c');
                }
                events.raise(MarketEventKind::Close, Some(close));
            }
        }

        FeedEvent {
            timestamp,
            quote: Some(quote.clone()),
            market_events: events.raised,
            message: Some(Arc::clone(message)),
            ..Default::default()
        }
    }

    /// Updates that need an existing quote: parameter, refresh, trade, top
    /// of book and market condition.
    fn fold_live(&mut self, message: &Arc<DecodedMessage>) -> Option<FeedEvent> {
        let header = message.header()?;
        let symbol = header.symbol.as_str();

        if !self.quotes.contains_key(symbol) {
            if self.tracker.needs_request(symbol) {
                debug!(symbol, "no state for symbol, requesting refresh");
                self.stats.record_refresh_request();
                self.requester.request_refresh(symbol);
            }
            return None;
        }
        let quote = self.quotes.get_mut(symbol)?;
        let timestamp = header.timestamp.or(self.last_beacon);

        quote.message = Some(Arc::clone(message));
        quote.ddf_exchange = Some(header.exchange);
        if timestamp.is_some() {
            quote.last_update = timestamp;
        }

        let mut events = Events {
            symbol,
            message,
            live: false,
            raised: Vec::new(),
        };
        let resolution = resolve_session(quote, header, self.config.day_wrap_window);
        if resolution.rolled {
            roll_side_effects(quote, &mut self.volumes, &mut events);
        }
        let target = resolution.target;
        events.live = target.is_live();

        let mut volume_touched = false;
        match message.as_ref() {
            DecodedMessage::Parameter(update) => apply_parameter(quote, target, update, &mut events),
            DecodedMessage::Refresh(refresh) => apply_refresh(quote, target, refresh, &mut events),
            DecodedMessage::Trade(trade) => {
                if let Some(price) = trade.price {
                    apply_trade(quote, target, price, trade.size, header.timestamp, &mut events);
                    if target.is_live() {
                        self.volumes
                            .entry(symbol.to_string())
                            .or_insert_with(|| CumulativeVolume::new(symbol, header.base_code))
                            .add_trade(price, trade.size.filter(|s| *s > 0).unwrap_or(0));
                        volume_touched = true;
                    }
                }
            }
            DecodedMessage::TopOfBook(tob) => {
                if target.is_current() {
                    if tob.bid.is_some() {
                        quote.bid = tob.bid;
                        quote.bid_size = tob.bid_size;
                    }
                    if tob.ask.is_some() {
                        quote.ask = tob.ask;
                        quote.ask_size = tob.ask_size;
                    }
                }
            }
            DecodedMessage::Condition(condition) => quote.market_condition = Some(condition.code),
            _ => {}
        }

        if timestamp.is_some() {
            session_mut(quote, target).timestamp = timestamp;
        }

        let cumulative_volume = if volume_touched || resolution.rolled {
            self.volumes.get(symbol).cloned()
        } else {
            None
        };
        Some(FeedEvent {
            timestamp,
            quote: Some(quote.clone()),
            cumulative_volume,
            market_events: events.raised,
            message: Some(Arc::clone(message)),
            ..Default::default()
        })
    }

    pub fn quote(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol)
    }

    pub fn book_quote(&self, symbol: &str) -> Option<&BookQuote> {
        self.books.get(symbol)
    }

    pub fn cumulative_volume(&self, symbol: &str) -> Option<&CumulativeVolume> {
        self.volumes.get(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.quotes.keys().map(String::as_str)
    }

    pub fn last_beacon(&self) -> Option<NaiveDateTime> {
        self.last_beacon
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut FeedStats {
        &mut self.stats
    }

    /// Drop all cached state.
    pub fn reset_all(&mut self) {
        self.quotes.clear();
        self.books.clear();
        self.volumes.clear();
        self.tracker.reset();
        self.last_beacon = None;
    }
}

impl Default for DataMaster {
    fn default() -> Self {
        DataMaster::new(EngineConfig::default(), NoRefresh)
    }
}

fn roll_side_effects(
    quote: &Quote,
    volumes: &mut HashMap<String, CumulativeVolume>,
    events: &mut Events<'_>,
) {
    debug!(symbol = quote.symbol(), day = ?quote.combined.day, "session rolled");
    if let Some(cv) = volumes.get_mut(quote.symbol()) {
        cv.reset();
    }
    // the pre-open belongs to the new day whatever session the message targets
    let live = std::mem::replace(&mut events.live, true);
    events.raise(MarketEventKind::PreOpen, quote.combined.previous);
    events.live = live;
}

fn apply_parameter(
    quote: &mut Quote,
    target: SessionTarget,
    update: &ParameterUpdate,
    events: &mut Events<'_>,
) {
    match (update.kind, update.value) {
        (_, ParameterValue::Empty) => {}
        (ParameterKind::PreviousVolume, ParameterValue::Integer(v)) => quote.previous.volume = Some(v),
        (ParameterKind::Volume, ParameterValue::Integer(v)) => {
            session_mut(quote, target).volume = Some(v);
        }
        (ParameterKind::OpenInterest, ParameterValue::Integer(v)) => {
            session_mut(quote, target).open_interest = Some(v);
        }
        (ParameterKind::Bid, ParameterValue::Price(p)) => {
            if target.is_current() {
                quote.bid = Some(p);
            }
        }
        (ParameterKind::Ask, ParameterValue::Price(p)) => {
            if target.is_current() {
                quote.ask = Some(p);
            }
        }
        (kind, ParameterValue::Price(p)) => {
            let live = target.is_live();
            let session = session_mut(quote, target);
            let (event, flag) = match kind {
                ParameterKind::Last => {
                    session.set_last(p);
                    (None, None)
                }
                ParameterKind::Open => {
                    session.open = Some(p);
                    (Some(MarketEventKind::Open), None)
                }
                ParameterKind::Open2 => {
                    session.open2 = Some(p);
                    (None, None)
                }
                ParameterKind::High => {
                    session.high = Some(p);
                    (Some(MarketEventKind::High), None)
                }
                ParameterKind::Low => {
                    session.low = Some(p);
                    (Some(MarketEventKind::Low), None)
                }
                ParameterKind::Close => {
                    session.close = Some(p);
                    (Some(MarketEventKind::Close), Some('c'))
                }
                ParameterKind::Close2 => {
                    session.close2 = Some(p);
                    (None, None)
                }
                ParameterKind::Previous => {
                    session.previous = Some(p);
                    (None, None)
                }
                ParameterKind::Settlement => {
                    session.settlement = Some(p);
                    (Some(MarketEventKind::Settlement), Some('s'))
                }
                ParameterKind::PreliminarySettlement => {
                    session.settlement = Some(p);
                    (Some(MarketEventKind::PreSettlement), Some('p'))
                }
                ParameterKind::Vwap => {
                    session.vwap = Some(p);
                    (None, None)
                }
                // integer kinds never carry a price
                _ => (None, None),
            };
            if live && flag.is_some() {
                quote.flag = flag;
            }
            if let Some(kind) = event {
                events.raise(kind, Some(p));
            }
        }
        // a price kind carrying an integer cannot come out of the decoder
        (_, ParameterValue::Integer(_)) => {}
    }
}

/// Subrecord 0. Pit refreshes only touch the fields the pit owns.
fn apply_refresh(
    quote: &mut Quote,
    target: SessionTarget,
    refresh: &MarketRefresh,
    events: &mut Events<'_>,
) {
    if refresh.previous_volume.is_some() {
        quote.previous.volume = refresh.previous_volume;
    }
    if target.is_current() {
        if refresh.bid.is_some() {
            quote.bid = refresh.bid;
        }
        if refresh.ask.is_some() {
            quote.ask = refresh.ask;
        }
    }

    let live = target.is_live();
    let pit = refresh.header.session == SESSION_PIT;
    let session = session_mut(quote, target);
    let mut flag = None;

    if refresh.previous.is_some() {
        session.previous = refresh.previous;
    }
    if refresh.open_interest.is_some() {
        session.open_interest = refresh.open_interest;
    }
    if assign(&mut session.settlement, refresh.settlement) {
        events.raise(MarketEventKind::Settlement, refresh.settlement);
        flag = Some('s');
    }

    if !pit {
        if assign(&mut session.open, refresh.open) {
            events.raise(MarketEventKind::Open, refresh.open);
        }
        if assign(&mut session.high, refresh.high) {
            events.raise(MarketEventKind::High, refresh.high);
        }
        if assign(&mut session.low, refresh.low) {
            events.raise(MarketEventKind::Low, refresh.low);
        }
        assign(&mut session.open2, refresh.open2);
        assign(&mut session.close2, refresh.close2);
        if assign(&mut session.close, refresh.close) {
            events.raise(MarketEventKind::Close, refresh.close);
            // settlement outranks close
            flag = flag.or(Some('c'));
        }
        if let Some(last) = refresh.last {
            if session.last() != Some(last) {
                session.set_last(last);
            }
        }
        if refresh.volume.is_some() {
            session.volume = refresh.volume;
        }
    }

    if live && flag.is_some() {
        quote.flag = flag;
    }
}

/// Store a present value. True when the stored value changed.
fn assign(slot: &mut Option<f64>, value: Option<f64>) -> bool {
    match value {
        Some(v) if *slot != Some(v) => {
            *slot = Some(v);
            true
        }
        _ => false,
    }
}

fn apply_trade(
    quote: &mut Quote,
    target: SessionTarget,
    price: f64,
    size: Option<i64>,
    at: Option<NaiveDateTime>,
    events: &mut Events<'_>,
) {
    let session = session_mut(quote, target);
    session.add_trade(price, size, at);
    if let Some(size) = size.filter(|s| *s > 0) {
        session.volume = Some(session.volume.unwrap_or(0).saturating_add(size));
    }

    let opened = session.open.is_none();
    if opened {
        session.open = Some(price);
    }
    let high = session.update_high(price);
    let low = session.update_low(price);

    if opened {
        events.raise(MarketEventKind::Open, Some(price));
    }
    if high {
        events.raise(MarketEventKind::High, Some(price));
    }
    if low {
        events.raise(MarketEventKind::Low, Some(price));
    }

    if target.is_live() {
        if let Some(at) = at {
            Ohlc::advance(&mut quote.minute_bar, at, price, size.unwrap_or(0));
        }
    }
}
