//! Price-bucketed traded volume for the current day

use super::{get_base_code, get_long, get_price, set_price};
use crate::markup::{Element, MarkupResult};
use crate::price::{parse_long, price_to_units, units_to_price};
use crate::protocol::BaseCode;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct CumulativeVolume {
    pub symbol: String,
    pub base_code: BaseCode,
    /// Keyed by wire units so buckets compare exactly.
    levels: BTreeMap<i64, i64>,
    pub last_price: Option<f64>,
    pub last_size: Option<i64>,
    /// Volume traded in the current run at `last_price`.
    pub last_cum_volume: i64,
}

impl CumulativeVolume {
    pub fn new(symbol: impl Into<String>, base_code: BaseCode) -> Self {
        CumulativeVolume {
            symbol: symbol.into(),
            base_code,
            levels: BTreeMap::new(),
            last_price: None,
            last_size: None,
            last_cum_volume: 0,
        }
    }

    /// Non-positive sizes move the last price but add no volume.
    pub fn add_trade(&mut self, price: f64, size: i64) {
        let size = size.max(0);
        let units = price_to_units(price, self.base_code.unit_code());
        let level = self.levels.entry(units).or_insert(0);
        *level = level.saturating_add(size);

        if self.last_price == Some(price) {
            self.last_cum_volume = self.last_cum_volume.saturating_add(size);
        } else {
            self.last_cum_volume = size;
        }
        self.last_price = Some(price);
        self.last_size = Some(size);
    }

    pub fn volume_at(&self, price: f64) -> i64 {
        let units = price_to_units(price, self.base_code.unit_code());
        self.levels.get(&units).copied().unwrap_or(0)
    }

    pub fn total_volume(&self) -> i64 {
        self.levels.values().fold(0i64, |total, v| total.saturating_add(*v))
    }

    /// `(price, volume)` pairs in ascending price order.
    pub fn levels(&self) -> impl Iterator<Item = (f64, i64)> + '_ {
        let unit = self.base_code.unit_code();
        self.levels
            .iter()
            .map(move |(&units, &volume)| (units_to_price(units, unit), volume))
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn reset(&mut self) {
        self.levels.clear();
        self.last_price = None;
        self.last_size = None;
        self.last_cum_volume = 0;
    }

    pub fn to_markup(&self) -> Element {
        let mut el = Element::new("CV");
        el.set("symbol", &self.symbol);
        el.set("basecode", self.base_code);
        let data: Vec<String> = self
            .levels
            .iter()
            .map(|(units, volume)| format!("{},{}", units, volume))
            .collect();
        el.set("data", data.join(":"));
        set_price(&mut el, "last", self.last_price, self.base_code);
        el.set_opt("lastsize", self.last_size);
        el.set("lastcumvolume", self.last_cum_volume);
        el
    }

    pub fn from_markup(el: &Element) -> MarkupResult<Self> {
        el.expect_name("CV")?;
        let base_code = get_base_code(el)?;
        let mut cv = CumulativeVolume::new(el.require("symbol")?, base_code);

        let data = el.attr("data").unwrap_or_default();
        for entry in data.split(':').filter(|e| !e.is_empty()) {
            let (units, volume) = entry.split_once(',').ok_or_else(|| el.invalid("data"))?;
            let units = parse_long(units.as_bytes(), 0, units.len()).map_err(|_| el.invalid("data"))?;
            let volume =
                parse_long(volume.as_bytes(), 0, volume.len()).map_err(|_| el.invalid("data"))?;
            cv.levels.insert(units, volume);
        }

        cv.last_price = get_price(el, "last", base_code)?;
        cv.last_size = get_long(el, "lastsize")?;
        cv.last_cum_volume = get_long(el, "lastcumvolume")?.unwrap_or(0);
        Ok(cv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cv() -> CumulativeVolume {
        CumulativeVolume::new("ESZ9", BaseCode::from_char('A').unwrap())
    }

    #[test]
    fn test_buckets_by_price() {
        let mut v = cv();
        v.add_trade(1001.25, 3);
        v.add_trade(1001.50, 2);
        v.add_trade(1001.25, 4);
        assert_eq!(v.volume_at(1001.25), 7);
        assert_eq!(v.volume_at(1001.50), 2);
        assert_eq!(v.volume_at(999.0), 0);
        assert_eq!(v.total_volume(), 9);
        let levels: Vec<_> = v.levels().collect();
        assert_eq!(levels, vec![(1001.25, 7), (1001.5, 2)]);
    }

    #[test]
    fn test_run_at_last_price_resets_on_change() {
        let mut v = cv();
        v.add_trade(10.0, 1);
        v.add_trade(10.0, 2);
        assert_eq!(v.last_cum_volume, 3);
        v.add_trade(10.25, 5);
        assert_eq!(v.last_cum_volume, 5);
        v.add_trade(10.0, 1);
        assert_eq!(v.last_cum_volume, 1);
        assert_eq!(v.last_size, Some(1));
    }

    #[test]
    fn test_reset() {
        let mut v = cv();
        v.add_trade(10.0, 1);
        v.reset();
        assert!(v.is_empty());
        assert_eq!(v.last_price, None);
        assert_eq!(v.last_cum_volume, 0);
    }

    #[test]
    fn test_sizes_clamp_and_saturate() {
        let mut v = cv();
        v.add_trade(10.0, 4);
        v.add_trade(10.0, -3);
        assert_eq!(v.volume_at(10.0), 4);
        assert_eq!(v.last_cum_volume, 4);

        v.add_trade(10.0, i64::MAX);
        v.add_trade(10.25, i64::MAX);
        assert_eq!(v.volume_at(10.0), i64::MAX);
        assert_eq!(v.last_cum_volume, i64::MAX);
        assert_eq!(v.total_volume(), i64::MAX);
    }
}
