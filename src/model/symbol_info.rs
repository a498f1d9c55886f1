use super::{get_base_code, get_float, get_long};
use crate::markup::{Element, MarkupResult};
use crate::protocol::BaseCode;

/// Static identity and price format of one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    pub symbol: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub base_code: BaseCode,
    pub point_value: f64,
    /// Minimum price increment, in wire units.
    pub tick_increment: i64,
}

impl SymbolInfo {
    pub fn new(symbol: impl Into<String>, base_code: BaseCode) -> Self {
        SymbolInfo {
            symbol: symbol.into(),
            name: None,
            exchange: None,
            base_code,
            point_value: 1.0,
            tick_increment: 1,
        }
    }

    pub fn unit_code(&self) -> i32 {
        self.base_code.unit_code()
    }

    /// Write identity attributes onto a QUOTE element.
    pub(crate) fn write_attributes(&self, el: &mut Element) {
        el.set("symbol", &self.symbol);
        el.set_opt("name", self.name.as_ref());
        el.set_opt("exchange", self.exchange.as_ref());
        el.set("basecode", self.base_code);
        el.set("pointvalue", self.point_value);
        el.set("tickincrement", self.tick_increment);
    }

    pub(crate) fn read_attributes(el: &Element) -> MarkupResult<Self> {
        Ok(SymbolInfo {
            symbol: el.require("symbol")?.to_string(),
            name: el.attr("name").map(str::to_string),
            exchange: el.attr("exchange").map(str::to_string),
            base_code: get_base_code(el)?,
            point_value: get_float(el, "pointvalue")?.unwrap_or(1.0),
            tick_increment: get_long(el, "tickincrement")?.unwrap_or(1),
        })
    }
}
