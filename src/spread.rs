//! Spread frame rewriting
//!
//! ```text
//! SOH S PUBSYM , sub STX tt n leg1 , .. legN , base exch delay payload ETX [suffix]
//!   becomes
//! SOH 2 _S_tt_leg1_.._legN , sub STX base exch delay payload ETX [suffix]
//! ```
//!
//! The rewritten frame then goes through the ordinary quote path.

use crate::decoder::{DecodeError, DecodeResult};
use crate::message::SpreadInfo;
use crate::protocol::{SOH, STX};

pub const SPREAD_PREFIX: &str = "_S_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadRewrite {
    pub frame: Vec<u8>,
    pub info: SpreadInfo,
    /// `frame.len() - original.len()`; add to any index found in the original
    /// frame past the leg list.
    pub delta: isize,
}

impl SpreadRewrite {
    /// Translate an index in the original frame into the rewritten one.
    pub fn shift(&self, index: usize) -> Option<usize> {
        index.checked_add_signed(self.delta)
    }
}

/// `_S_<type>_<leg1>_.._<legN>`
pub fn synthetic_symbol(info: &SpreadInfo) -> String {
    let mut symbol = format!("{}{}", SPREAD_PREFIX, info.spread_type);
    for leg in &info.legs {
        symbol.push('_');
        symbol.push_str(leg);
    }
    symbol
}

pub fn rewrite_spread(frame: &[u8]) -> DecodeResult<SpreadRewrite> {
    if frame.len() < 4 || frame[0] != SOH || frame[1] != b'S' {
        return Err(DecodeError::InvalidSpread("not a spread frame"));
    }
    let comma = position(frame, 2, b',').ok_or(DecodeError::MissingDelimiter("symbol comma"))?;
    let sub = *frame
        .get(comma + 1)
        .ok_or(DecodeError::InvalidSpread("missing subrecord"))?;
    if frame.get(comma + 2) != Some(&STX) {
        return Err(DecodeError::MissingDelimiter("STX"));
    }

    let mut pos = comma + 3;
    let head = frame
        .get(pos..pos + 3)
        .ok_or(DecodeError::InvalidSpread("truncated leg header"))?;
    let spread_type = std::str::from_utf8(&head[..2])
        .map_err(|_| DecodeError::InvalidSpread("spread type is not text"))?
        .to_string();
    let count = match head[2] {
        c @ b'1'..=b'9' => usize::from(c - b'0'),
        _ => return Err(DecodeError::InvalidSpread("bad leg count")),
    };
    pos += 3;

    let mut legs = Vec::with_capacity(count);
    for _ in 0..count {
        let end = position(frame, pos, b',').ok_or(DecodeError::InvalidSpread("truncated leg list"))?;
        let leg = std::str::from_utf8(&frame[pos..end])
            .map_err(|_| DecodeError::InvalidSpread("leg is not text"))?;
        if leg.is_empty() {
            return Err(DecodeError::InvalidSpread("empty leg"));
        }
        legs.push(leg.to_string());
        pos = end + 1;
    }

    let info = SpreadInfo { spread_type, legs };
    let symbol = synthetic_symbol(&info);
    let rest = &frame[pos..];

    let mut out = Vec::with_capacity(symbol.len() + rest.len() + 5);
    out.extend_from_slice(&[SOH, b'2']);
    out.extend_from_slice(symbol.as_bytes());
    out.extend_from_slice(&[b',', sub, STX]);
    out.extend_from_slice(rest);

    let delta = out.len() as isize - frame.len() as isize;
    Ok(SpreadRewrite {
        frame: out,
        info,
        delta,
    })
}

fn position(frame: &[u8], from: usize, byte: u8) -> Option<usize> {
    frame
        .get(from..)?
        .iter()
        .position(|&b| b == byte)
        .map(|i| from + i)
}
