//! Per-symbol market state
//!
//! Every entity renders to and from the snapshot markup so that wire
//! snapshots and cached state share one format.

pub mod book_quote;
pub mod cumulative_volume;
pub mod market_event;
pub mod ohlc;
pub mod quote;
pub mod session;
pub mod symbol_info;

pub use book_quote::{BookDepth, BookQuote};
pub use cumulative_volume::CumulativeVolume;
pub use market_event::{MarketEvent, MarketEventKind};
pub use ohlc::Ohlc;
pub use quote::Quote;
pub use session::Session;
pub use symbol_info::SymbolInfo;

use crate::markup::{Element, MarkupResult};
use crate::price::{format_price, parse_long, parse_price};
use crate::protocol::BaseCode;
use crate::timestamp::{format_compact, parse_compact};
use chrono::NaiveDateTime;

fn set_price(el: &mut Element, name: &str, value: Option<f64>, base: BaseCode) {
    if let Some(v) = value {
        el.set(name, format_price(v, base.unit_code()));
    }
}

fn get_price(el: &Element, name: &'static str, base: BaseCode) -> MarkupResult<Option<f64>> {
    match el.attr(name) {
        None => Ok(None),
        Some(text) => parse_price(text.as_bytes(), 0, text.len(), base.unit_code())
            .map(Some)
            .map_err(|_| el.invalid(name)),
    }
}

fn get_long(el: &Element, name: &'static str) -> MarkupResult<Option<i64>> {
    match el.attr(name) {
        None => Ok(None),
        Some(text) => parse_long(text.as_bytes(), 0, text.len())
            .map(Some)
            .map_err(|_| el.invalid(name)),
    }
}

fn get_float(el: &Element, name: &'static str) -> MarkupResult<Option<f64>> {
    match el.attr(name) {
        None => Ok(None),
        Some(text) => text.parse().map(Some).map_err(|_| el.invalid(name)),
    }
}

fn get_char(el: &Element, name: &'static str) -> MarkupResult<Option<char>> {
    match el.attr(name) {
        None => Ok(None),
        Some(text) => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Some(c)),
                _ => Err(el.invalid(name)),
            }
        }
    }
}

fn set_time(el: &mut Element, name: &str, value: Option<NaiveDateTime>) {
    if let Some(ts) = value {
        el.set(name, format_compact(&ts));
    }
}

fn get_time(el: &Element, name: &'static str) -> MarkupResult<Option<NaiveDateTime>> {
    match el.attr(name) {
        None => Ok(None),
        Some(text) => parse_compact(text).map(Some).ok_or_else(|| el.invalid(name)),
    }
}

fn get_base_code(el: &Element) -> MarkupResult<BaseCode> {
    match get_char(el, "basecode")? {
        None => Ok(BaseCode::UNITLESS),
        Some(c) => BaseCode::from_char(c).ok_or_else(|| el.invalid("basecode")),
    }
}
