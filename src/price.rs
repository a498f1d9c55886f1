//! ASCII digit and price conversion
//!
//! Prices travel as signed integers in "wire units". A non-negative unit code
//! is a decimal scale; a negative one selects a fractional base where the
//! trailing digits are the numerator (e.g. 32nds: `10412` = 104 + 12/32).
//! Fractions are split with integer division so results match exchange
//! rounding exactly.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceError {
    #[error("field out of bounds: {start}+{len} exceeds buffer of {have} bytes")]
    OutOfBounds { start: usize, len: usize, have: usize },

    #[error("invalid digit {byte:#04x} at offset {offset}")]
    InvalidDigit { byte: u8, offset: usize },

    #[error("numeric field overflows")]
    Overflow,
}

pub type PriceResult<T> = Result<T, PriceError>;

/// Bias added before truncating a scaled price back to wire units.
const ROUNDING_BIAS: f64 = 0.25;

/// (denominator, numerator digits) for unit codes -1 through -6.
const FRACTIONS: [(i64, u32); 6] = [(8, 1), (16, 2), (32, 2), (64, 2), (128, 3), (256, 3)];

/// Returns `(denominator, 10^numerator_digits)` for fractional unit codes.
fn fraction(unit: i32) -> Option<(i64, i64)> {
    if !(-6..=-1).contains(&unit) {
        return None;
    }
    let (denominator, digits) = FRACTIONS[(-unit - 1) as usize];
    Some((denominator, 10i64.pow(digits)))
}

fn decimal_scale(unit: i32) -> f64 {
    10f64.powi(unit.max(0))
}

fn field(bytes: &[u8], start: usize, len: usize) -> PriceResult<&[u8]> {
    let out_of_bounds = PriceError::OutOfBounds {
        start,
        len,
        have: bytes.len(),
    };
    let end = start.checked_add(len).ok_or(out_of_bounds)?;
    bytes.get(start..end).ok_or(out_of_bounds)
}

/// Parse an optionally minus-prefixed run of ASCII digits. An empty field or a
/// lone `-` is zero.
pub fn parse_long(bytes: &[u8], start: usize, len: usize) -> PriceResult<i64> {
    let digits = field(bytes, start, len)?;
    let (negative, digits, offset) = match digits.split_first() {
        Some((b'-', rest)) => (true, rest, start + 1),
        _ => (false, digits, start),
    };

    let mut value: i64 = 0;
    for (i, &b) in digits.iter().enumerate() {
        if !b.is_ascii_digit() {
            return Err(PriceError::InvalidDigit {
                byte: b,
                offset: offset + i,
            });
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(i64::from(b - b'0')))
            .ok_or(PriceError::Overflow)?;
    }

    Ok(if negative { -value } else { value })
}

pub fn parse_int(bytes: &[u8], start: usize, len: usize) -> PriceResult<i32> {
    let value = parse_long(bytes, start, len)?;
    i32::try_from(value).map_err(|_| PriceError::Overflow)
}

/// Convert wire units to a price for the given unit code.
pub fn units_to_price(units: i64, unit: i32) -> f64 {
    match fraction(unit) {
        None => units as f64 / decimal_scale(unit),
        Some((denominator, split)) => {
            let sign = if units < 0 { -1.0 } else { 1.0 };
            let magnitude = units.abs();
            let whole = magnitude / split;
            let numerator = magnitude % split;
            sign * (whole as f64 + numerator as f64 / denominator as f64)
        }
    }
}

/// Convert a price back to wire units, the inverse of [`units_to_price`].
pub fn price_to_units(value: f64, unit: i32) -> i64 {
    let negative = value < 0.0;
    let magnitude = value.abs();

    let units = match fraction(unit) {
        None => (magnitude * decimal_scale(unit) + ROUNDING_BIAS).floor() as i64,
        Some((denominator, split)) => {
            let mut whole = magnitude.floor() as i64;
            let mut numerator =
                ((magnitude - magnitude.floor()) * denominator as f64 + ROUNDING_BIAS).floor() as i64;
            if numerator >= denominator {
                whole += 1;
                numerator -= denominator;
            }
            whole * split + numerator
        }
    };

    if negative {
        -units
    } else {
        units
    }
}

/// Parse a price field. Empty and `-` fields are zero.
pub fn parse_price(bytes: &[u8], start: usize, len: usize, unit: i32) -> PriceResult<f64> {
    if len == 0 {
        return Ok(0.0);
    }
    let digits = field(bytes, start, len)?;
    if digits == b"-" {
        return Ok(0.0);
    }
    Ok(units_to_price(parse_long(bytes, start, len)?, unit))
}

/// Render a price in wire form for the given unit code.
pub fn format_price(value: f64, unit: i32) -> String {
    price_to_units(value, unit).to_string()
}

/// Like [`parse_price`] on a whole slice, but an empty or `-` field is absent
/// rather than zero.
pub fn optional_price(field: &[u8], unit: i32) -> PriceResult<Option<f64>> {
    if is_blank(field) {
        return Ok(None);
    }
    parse_price(field, 0, field.len(), unit).map(Some)
}

pub fn optional_long(field: &[u8]) -> PriceResult<Option<i64>> {
    if is_blank(field) {
        return Ok(None);
    }
    parse_long(field, 0, field.len()).map(Some)
}

/// Empty or a lone `-`: the feed's "no value".
pub fn is_blank(field: &[u8]) -> bool {
    field.is_empty() || field == b"-"
}
