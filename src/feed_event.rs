use crate::message::DecodedMessage;
use crate::model::{BookQuote, CumulativeVolume, MarketEvent, Quote};
use chrono::NaiveDateTime;
use std::sync::Arc;

/// What one fold step changed. Holds copies, so it stays valid while the
/// engine moves on.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedEvent {
    pub message: Option<Arc<DecodedMessage>>,
    pub timestamp: Option<NaiveDateTime>,
    pub quote: Option<Quote>,
    pub book_quote: Option<BookQuote>,
    pub cumulative_volume: Option<CumulativeVolume>,
    pub market_events: Vec<MarketEvent>,
}

impl FeedEvent {
    pub fn symbol(&self) -> Option<&str> {
        self.message.as_deref().and_then(DecodedMessage::symbol)
    }
}
