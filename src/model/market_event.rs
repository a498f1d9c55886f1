use crate::message::DecodedMessage;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketEventKind {
    PreOpen,
    Open,
    High,
    Low,
    Close,
    PreSettlement,
    Settlement,
}

impl fmt::Display for MarketEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarketEventKind::PreOpen => "preopen",
            MarketEventKind::Open => "open",
            MarketEventKind::High => "high",
            MarketEventKind::Low => "low",
            MarketEventKind::Close => "close",
            MarketEventKind::PreSettlement => "presettlement",
            MarketEventKind::Settlement => "settlement",
        };
        f.write_str(name)
    }
}

/// A discrete statistical fact observed while folding one message.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketEvent {
    pub kind: MarketEventKind,
    pub symbol: String,
    pub price: Option<f64>,
    pub message: Option<Arc<DecodedMessage>>,
}

impl MarketEvent {
    pub fn new(
        kind: MarketEventKind,
        symbol: &str,
        price: Option<f64>,
        message: Option<Arc<DecodedMessage>>,
    ) -> Self {
        MarketEvent {
            kind,
            symbol: symbol.to_string(),
            price,
            message,
        }
    }
}
