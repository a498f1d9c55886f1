//! One trading session's statistics

use super::{get_char, get_float, get_long, get_price, get_time, set_price, set_time};
use crate::markup::{Element, MarkupResult};
use crate::protocol::BaseCode;
use chrono::NaiveDateTime;

const LAST_DEPTH: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub day: Option<char>,
    pub session: char,
    pub open: Option<f64>,
    pub open2: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    /// Most recent first.
    last: [Option<f64>; LAST_DEPTH],
    pub last_size: Option<i64>,
    pub close: Option<f64>,
    pub close2: Option<f64>,
    pub previous: Option<f64>,
    pub settlement: Option<f64>,
    pub open_interest: Option<i64>,
    pub volume: Option<i64>,
    pub num_trades: i64,
    pub price_volume: f64,
    pub trade_volume: i64,
    pub vwap: Option<f64>,
    pub timestamp: Option<NaiveDateTime>,
    pub trade_timestamp: Option<NaiveDateTime>,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            day: None,
            session: ' ',
            open: None,
            open2: None,
            high: None,
            low: None,
            last: [None; LAST_DEPTH],
            last_size: None,
            close: None,
            close2: None,
            previous: None,
            settlement: None,
            open_interest: None,
            volume: None,
            num_trades: 0,
            price_volume: 0.0,
            trade_volume: 0,
            vwap: None,
            timestamp: None,
            trade_timestamp: None,
        }
    }
}

impl Session {
    pub fn new(day: Option<char>, session: char) -> Self {
        Session {
            day,
            session,
            ..Default::default()
        }
    }

    pub fn last(&self) -> Option<f64> {
        self.last[0]
    }

    /// `n = 0` is the current last, `n = 1` the one before it, and so on.
    pub fn last_prior(&self, n: usize) -> Option<f64> {
        self.last.get(n).copied().flatten()
    }

    /// Push onto the last-price ring; the oldest entry falls off.
    pub fn set_last(&mut self, price: f64) {
        self.last.rotate_right(1);
        self.last[0] = Some(price);
    }

    /// Fold a trade into the trade count and the VWAP accumulators.
    pub fn add_trade(&mut self, price: f64, size: Option<i64>, at: Option<NaiveDateTime>) {
        self.set_last(price);
        self.last_size = size;
        self.num_trades += 1;
        if let Some(size) = size.filter(|s| *s > 0) {
            self.price_volume += price * size as f64;
            self.trade_volume = self.trade_volume.saturating_add(size);
            self.vwap = Some(self.price_volume / self.trade_volume as f64);
        }
        if at.is_some() {
            self.trade_timestamp = at;
        }
    }

    /// Raise the high if `price` exceeds it. Returns true when it moved.
    pub fn update_high(&mut self, price: f64) -> bool {
        match self.high {
            Some(high) if high >= price => false,
            _ => {
                self.high = Some(price);
                true
            }
        }
    }

    /// Lower the low if `price` is under it. Returns true when it moved.
    pub fn update_low(&mut self, price: f64) -> bool {
        match self.low {
            Some(low) if low <= price => false,
            _ => {
                self.low = Some(price);
                true
            }
        }
    }

    pub fn to_markup(&self, id: &str, base: BaseCode) -> Element {
        let mut el = Element::new("SESSION");
        el.set("id", id);
        el.set_opt("day", self.day);
        el.set("session", self.session);
        set_price(&mut el, "open", self.open, base);
        set_price(&mut el, "open2", self.open2, base);
        set_price(&mut el, "high", self.high, base);
        set_price(&mut el, "low", self.low, base);
        set_price(&mut el, "last", self.last[0], base);
        set_price(&mut el, "last1", self.last[1], base);
        set_price(&mut el, "last2", self.last[2], base);
        el.set_opt("lastsize", self.last_size);
        set_price(&mut el, "close", self.close, base);
        set_price(&mut el, "close2", self.close2, base);
        set_price(&mut el, "previous", self.previous, base);
        set_price(&mut el, "settlement", self.settlement, base);
        el.set_opt("openinterest", self.open_interest);
        el.set_opt("volume", self.volume);
        if self.num_trades > 0 {
            el.set("numtrades", self.num_trades);
            el.set("pricevolume", self.price_volume);
            el.set("tradevolume", self.trade_volume);
        }
        el.set_opt("vwap", self.vwap);
        set_time(&mut el, "timestamp", self.timestamp);
        set_time(&mut el, "tradetime", self.trade_timestamp);
        el
    }

    pub fn from_markup(el: &Element, base: BaseCode) -> MarkupResult<Self> {
        el.expect_name("SESSION")?;
        Ok(Session {
            day: get_char(el, "day")?,
            session: get_char(el, "session")?.unwrap_or(' '),
            open: get_price(el, "open", base)?,
            open2: get_price(el, "open2", base)?,
            high: get_price(el, "high", base)?,
            low: get_price(el, "low", base)?,
            last: [
                get_price(el, "last", base)?,
                get_price(el, "last1", base)?,
                get_price(el, "last2", base)?,
            ],
            last_size: get_long(el, "lastsize")?,
            close: get_price(el, "close", base)?,
            close2: get_price(el, "close2", base)?,
            previous: get_price(el, "previous", base)?,
            settlement: get_price(el, "settlement", base)?,
            open_interest: get_long(el, "openinterest")?,
            volume: get_long(el, "volume")?,
            num_trades: get_long(el, "numtrades")?.unwrap_or(0),
            price_volume: get_float(el, "pricevolume")?.unwrap_or(0.0),
            trade_volume: get_long(el, "tradevolume")?.unwrap_or(0),
            vwap: get_float(el, "vwap")?,
            timestamp: get_time(el, "timestamp")?,
            trade_timestamp: get_time(el, "tradetime")?,
        })
    }
}
