//! Price-level depth for one symbol
//!
//! Fixed ten levels per side, index 0 is the best price. A depth refresh
//! replaces the book wholesale; an incremental update merges level by level
//! and leaves "no value" cells untouched.

use super::{get_base_code, get_long, get_time, set_time};
use crate::markup::{Element, MarkupResult};
use crate::message::{DepthCell, DepthUpdate};
use crate::price::{format_price, parse_price};
use crate::protocol::{BaseCode, BOOK_LEVELS};
use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct BookQuote {
    pub symbol: String,
    pub base_code: BaseCode,
    pub bid_prices: [f64; BOOK_LEVELS],
    pub bid_sizes: [i64; BOOK_LEVELS],
    pub ask_prices: [f64; BOOK_LEVELS],
    pub ask_sizes: [i64; BOOK_LEVELS],
    pub bid_count: usize,
    pub ask_count: usize,
    pub timestamp: Option<NaiveDateTime>,
}

impl BookQuote {
    pub fn new(symbol: impl Into<String>, base_code: BaseCode) -> Self {
        BookQuote {
            symbol: symbol.into(),
            base_code,
            bid_prices: [0.0; BOOK_LEVELS],
            bid_sizes: [0; BOOK_LEVELS],
            ask_prices: [0.0; BOOK_LEVELS],
            ask_sizes: [0; BOOK_LEVELS],
            bid_count: 0,
            ask_count: 0,
            timestamp: None,
        }
    }

    pub fn from_update(update: &DepthUpdate) -> Self {
        let mut book = BookQuote::new(update.header.symbol.clone(), update.header.base_code);
        book.replace(update);
        book
    }

    /// Discard the current levels and take the update's.
    pub fn replace(&mut self, update: &DepthUpdate) {
        self.bid_prices = [0.0; BOOK_LEVELS];
        self.bid_sizes = [0; BOOK_LEVELS];
        self.ask_prices = [0.0; BOOK_LEVELS];
        self.ask_sizes = [0; BOOK_LEVELS];
        self.merge(update);
    }

    /// Overwrite only the cells the update carries a value for.
    pub fn merge(&mut self, update: &DepthUpdate) {
        apply_side(&mut self.bid_prices, &mut self.bid_sizes, &update.bids);
        apply_side(&mut self.ask_prices, &mut self.ask_sizes, &update.asks);
        self.bid_count = update.bid_depth.min(BOOK_LEVELS);
        self.ask_count = update.ask_depth.min(BOOK_LEVELS);
        self.base_code = update.header.base_code;
        if update.header.timestamp.is_some() {
            self.timestamp = update.header.timestamp;
        }
    }

    pub fn best_bid(&self) -> Option<(f64, i64)> {
        (self.bid_count > 0).then(|| (self.bid_prices[0], self.bid_sizes[0]))
    }

    pub fn best_ask(&self) -> Option<(f64, i64)> {
        (self.ask_count > 0).then(|| (self.ask_prices[0], self.ask_sizes[0]))
    }

    /// Best ask minus best bid, when the book is not crossed.
    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) if bid < ask => Some(ask - bid),
            _ => None,
        }
    }

    /// Top `n` levels on each side.
    pub fn depth(&self, n: usize) -> BookDepth {
        let side = |prices: &[f64; BOOK_LEVELS],
                    sizes: &[i64; BOOK_LEVELS],
                    count: usize|
         -> Vec<(f64, i64)> {
            prices
                .iter()
                .zip(sizes.iter())
                .take(count.min(n))
                .map(|(&p, &s)| (p, s))
                .collect()
        };
        BookDepth {
            bids: side(&self.bid_prices, &self.bid_sizes, self.bid_count),
            asks: side(&self.ask_prices, &self.ask_sizes, self.ask_count),
        }
    }

    pub fn to_markup(&self) -> Element {
        let unit = self.base_code.unit_code();
        let prices = |values: &[f64], count: usize| {
            let cells: Vec<String> = values[..count].iter().map(|&v| format_price(v, unit)).collect();
            cells.join(",")
        };
        let sizes = |values: &[i64], count: usize| {
            let cells: Vec<String> = values[..count].iter().map(i64::to_string).collect();
            cells.join(",")
        };

        let mut el = Element::new("BOOK");
        el.set("symbol", &self.symbol);
        el.set("basecode", self.base_code);
        el.set("bidcount", self.bid_count);
        el.set("askcount", self.ask_count);
        el.set("bidprices", prices(&self.bid_prices, self.bid_count));
        el.set("bidsizes", sizes(&self.bid_sizes, self.bid_count));
        el.set("askprices", prices(&self.ask_prices, self.ask_count));
        el.set("asksizes", sizes(&self.ask_sizes, self.ask_count));
        set_time(&mut el, "timestamp", self.timestamp);
        el
    }

    pub fn from_markup(el: &Element) -> MarkupResult<Self> {
        el.expect_name("BOOK")?;
        let mut book = BookQuote::new(el.require("symbol")?, get_base_code(el)?);
        let unit = book.base_code.unit_code();

        let count = |name: &'static str| -> MarkupResult<usize> {
            let n = get_long(el, name)?.unwrap_or(0);
            usize::try_from(n)
                .ok()
                .filter(|n| *n <= BOOK_LEVELS)
                .ok_or_else(|| el.invalid(name))
        };
        book.bid_count = count("bidcount")?;
        book.ask_count = count("askcount")?;

        let fill_prices = |name: &'static str, out: &mut [f64; BOOK_LEVELS]| -> MarkupResult<()> {
            let text = el.attr(name).unwrap_or_default();
            for (slot, cell) in out.iter_mut().zip(text.split(',').filter(|c| !c.is_empty())) {
                *slot = parse_price(cell.as_bytes(), 0, cell.len(), unit).map_err(|_| el.invalid(name))?;
            }
            Ok(())
        };
        let fill_sizes = |name: &'static str, out: &mut [i64; BOOK_LEVELS]| -> MarkupResult<()> {
            let text = el.attr(name).unwrap_or_default();
            for (slot, cell) in out.iter_mut().zip(text.split(',').filter(|c| !c.is_empty())) {
                *slot = cell.parse().map_err(|_| el.invalid(name))?;
            }
            Ok(())
        };
        fill_prices("bidprices", &mut book.bid_prices)?;
        fill_sizes("bidsizes", &mut book.bid_sizes)?;
        fill_prices("askprices", &mut book.ask_prices)?;
        fill_sizes("asksizes", &mut book.ask_sizes)?;
        book.timestamp = get_time(el, "timestamp")?;
        Ok(book)
    }
}

fn apply_side(
    prices: &mut [f64; BOOK_LEVELS],
    sizes: &mut [i64; BOOK_LEVELS],
    cells: &[DepthCell; BOOK_LEVELS],
) {
    for (i, cell) in cells.iter().enumerate() {
        if let Some(price) = cell.price {
            prices[i] = price;
        }
        if let Some(size) = cell.size {
            sizes[i] = size;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookDepth {
    pub bids: Vec<(f64, i64)>,
    pub asks: Vec<(f64, i64)>,
}
