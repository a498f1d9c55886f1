use super::{get_long, get_price, get_time, set_price, set_time};
use crate::markup::{Element, MarkupResult};
use crate::protocol::BaseCode;
use chrono::{NaiveDateTime, Timelike};

/// One-minute bar built from timestamped trades.
#[derive(Debug, Clone, PartialEq)]
pub struct Ohlc {
    pub start: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Ohlc {
    pub fn new(at: NaiveDateTime, price: f64, size: i64) -> Self {
        Ohlc {
            start: minute_of(at),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: size.max(0),
        }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        minute_of(at) == self.start
    }

    pub fn update(&mut self, price: f64, size: i64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume = self.volume.saturating_add(size.max(0));
    }

    /// Add a trade, starting a new bar when it belongs to a later minute.
    /// Trades for an earlier minute are ignored.
    pub fn advance(bar: &mut Option<Ohlc>, at: NaiveDateTime, price: f64, size: i64) {
        match bar {
            Some(current) if current.contains(at) => current.update(price, size),
            Some(current) if minute_of(at) < current.start => {}
            _ => *bar = Some(Ohlc::new(at, price, size)),
        }
    }

    pub fn to_markup(&self, base: BaseCode) -> Element {
        let mut el = Element::new("OHLC");
        set_time(&mut el, "start", Some(self.start));
        set_price(&mut el, "open", Some(self.open), base);
        set_price(&mut el, "high", Some(self.high), base);
        set_price(&mut el, "low", Some(self.low), base);
        set_price(&mut el, "close", Some(self.close), base);
        el.set("volume", self.volume);
        el
    }

    pub fn from_markup(el: &Element, base: BaseCode) -> MarkupResult<Self> {
        el.expect_name("OHLC")?;
        let price = |name: &'static str| -> MarkupResult<f64> {
            get_price(el, name, base)?.ok_or_else(|| el.invalid(name))
        };
        Ok(Ohlc {
            start: get_time(el, "start")?.ok_or_else(|| el.invalid("start"))?,
            open: price("open")?,
            high: price("high")?,
            low: price("low")?,
            close: price("close")?,
            volume: get_long(el, "volume")?.unwrap_or(0),
        })
    }
}

fn minute_of(at: NaiveDateTime) -> NaiveDateTime {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}
