//! Live state of one symbol

use super::{get_char, get_long, get_price, get_time, set_price, set_time, Ohlc, Session, SymbolInfo};
use crate::markup::{Element, MarkupResult};
use crate::message::DecodedMessage;
use crate::protocol::{day_code_to_int, BaseCode, SESSION_ELECTRONIC};
use chrono::NaiveDateTime;
use std::sync::Arc;

pub const COMBINED_ID: &str = "combined";
pub const PREVIOUS_ID: &str = "previous";

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol_info: SymbolInfo,
    /// Exchange code as last reported by the feed.
    pub ddf_exchange: Option<char>,
    pub bid: Option<f64>,
    pub bid_size: Option<i64>,
    pub ask: Option<f64>,
    pub ask_size: Option<i64>,
    pub market_condition: Option<char>,
    /// `c` closed, `s` settled, `p` preliminary settlement.
    pub flag: Option<char>,
    pub last_update: Option<NaiveDateTime>,
    pub message: Option<Arc<DecodedMessage>>,
    pub combined: Session,
    pub previous: Session,
    pub electronic: Session,
    /// Additional (day, session) views, ordered by day then session code.
    pub aux: Vec<Session>,
    pub minute_bar: Option<Ohlc>,
}

impl Quote {
    pub fn new(symbol_info: SymbolInfo) -> Self {
        Quote {
            symbol_info,
            ddf_exchange: None,
            bid: None,
            bid_size: None,
            ask: None,
            ask_size: None,
            market_condition: None,
            flag: None,
            last_update: None,
            message: None,
            combined: Session::default(),
            previous: Session::default(),
            electronic: Session::new(None, SESSION_ELECTRONIC),
            aux: Vec::new(),
            minute_bar: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol_info.symbol
    }

    pub fn base_code(&self) -> BaseCode {
        self.symbol_info.base_code
    }

    /// Start a new trading day. The combined view becomes the previous one;
    /// open interest carries forward until the new day reports its own.
    pub fn roll(&mut self, day: char) {
        let fresh = Session::new(Some(day), self.combined.session);
        let mut previous = std::mem::replace(&mut self.combined, fresh);
        if previous.open_interest.is_none() {
            previous.open_interest = self.previous.open_interest;
        }

        self.combined.open_interest = previous.open_interest;
        self.combined.previous = previous
            .settlement
            .or(previous.close)
            .or_else(|| previous.last());
        self.previous = previous;
        self.electronic = Session::new(Some(day), SESSION_ELECTRONIC);
        self.aux.retain(|s| s.day != Some(day));
        self.flag = None;
        self.minute_bar = None;
    }

    pub fn aux_session(&self, day: char, session: char) -> Option<&Session> {
        self.aux
            .iter()
            .find(|s| s.day == Some(day) && s.session == session)
    }

    /// Find or create the auxiliary view for `(day, session)`.
    pub fn aux_session_mut(&mut self, day: char, session: char) -> &mut Session {
        let key = aux_key(Some(day), session);
        let index = match self.aux.binary_search_by_key(&key, |s| aux_key(s.day, s.session)) {
            Ok(i) => i,
            Err(i) => {
                self.aux.insert(i, Session::new(Some(day), session));
                i
            }
        };
        &mut self.aux[index]
    }

    pub fn to_markup(&self) -> Element {
        let base = self.base_code();
        let mut el = Element::new("QUOTE");
        self.symbol_info.write_attributes(&mut el);
        el.set_opt("ddfexchange", self.ddf_exchange);
        set_price(&mut el, "bid", self.bid, base);
        el.set_opt("bidsize", self.bid_size);
        set_price(&mut el, "ask", self.ask, base);
        el.set_opt("asksize", self.ask_size);
        el.set_opt("marketcondition", self.market_condition);
        el.set_opt("flag", self.flag);
        set_time(&mut el, "lastupdate", self.last_update);

        el.children.push(self.combined.to_markup(COMBINED_ID, base));
        el.children.push(self.previous.to_markup(PREVIOUS_ID, base));
        if let Some(day) = self.electronic.day {
            el.children
                .push(self.electronic.to_markup(&session_id(day, SESSION_ELECTRONIC), base));
        }
        for session in &self.aux {
            if let Some(day) = session.day {
                el.children
                    .push(session.to_markup(&session_id(day, session.session), base));
            }
        }
        if let Some(bar) = &self.minute_bar {
            el.children.push(bar.to_markup(base));
        }
        el
    }

    pub fn from_markup(el: &Element) -> MarkupResult<Self> {
        el.expect_name("QUOTE")?;
        let mut quote = Quote::new(SymbolInfo::read_attributes(el)?);
        let base = quote.base_code();

        quote.ddf_exchange = get_char(el, "ddfexchange")?;
        quote.bid = get_price(el, "bid", base)?;
        quote.bid_size = get_long(el, "bidsize")?;
        quote.ask = get_price(el, "ask", base)?;
        quote.ask_size = get_long(el, "asksize")?;
        quote.market_condition = get_char(el, "marketcondition")?;
        quote.flag = get_char(el, "flag")?;
        quote.last_update = get_time(el, "lastupdate")?;

        let mut electronic = None;
        for child in &el.children {
            match child.name.as_str() {
                "OHLC" => quote.minute_bar = Some(Ohlc::from_markup(child, base)?),
                "SESSION" => {
                    let session = Session::from_markup(child, base)?;
                    match child.require("id")? {
                        COMBINED_ID => quote.combined = session,
                        PREVIOUS_ID => quote.previous = session,
                        id if id.starts_with("session_") => {
                            if session.session == SESSION_ELECTRONIC {
                                electronic = Some(session);
                            } else {
                                quote.aux.push(session);
                            }
                        }
                        _ => return Err(child.invalid("id")),
                    }
                }
                _ => {}
            }
        }

        if let Some(session) = electronic {
            if session.day.is_some() && session.day != quote.combined.day {
                quote.aux.push(session);
            } else {
                quote.electronic = session;
            }
        }
        quote.aux.sort_by_key(|s| aux_key(s.day, s.session));
        Ok(quote)
    }
}

/// `session_<day>_<session>`
pub fn session_id(day: char, session: char) -> String {
    format!("session_{}_{}", day, session)
}

fn aux_key(day: Option<char>, session: char) -> (u8, char) {
    (day.and_then(day_code_to_int).unwrap_or(0), session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote() -> Quote {
        let mut info = SymbolInfo::new("HOZ9", BaseCode::from_char('C').unwrap());
        info.name = Some("Heating Oil".to_string());
        let mut q = Quote::new(info);
        q.combined = Session::new(Some('S'), 'G');
        q.electronic = Session::new(Some('S'), SESSION_ELECTRONIC);
        q
    }

    #[test]
    fn test_roll_moves_combined_to_previous() {
        let mut q = quote();
        q.combined.set_last(2.1371);
        q.combined.settlement = Some(2.14);
        q.combined.open_interest = Some(900);
        q.electronic.set_last(2.13);
        q.flag = Some('s');

        q.roll('T');

        assert_eq!(q.previous.day, Some('S'));
        assert_eq!(q.previous.last(), Some(2.1371));
        assert_eq!(q.combined.day, Some('T'));
        assert_eq!(q.combined.last(), None);
        assert_eq!(q.combined.previous, Some(2.14));
        assert_eq!(q.combined.open_interest, Some(900));
        assert_eq!(q.electronic.day, Some('T'));
        assert_eq!(q.electronic.last(), None);
        assert_eq!(q.flag, None);
    }

    #[test]
    fn test_roll_carries_older_open_interest() {
        let mut q = quote();
        q.previous.open_interest = Some(750);
        q.combined.set_last(2.0);
        q.roll('T');
        assert_eq!(q.previous.open_interest, Some(750));
        assert_eq!(q.combined.open_interest, Some(750));
    }

    #[test]
    fn test_aux_sessions_are_ordered() {
        let mut q = quote();
        q.aux_session_mut('B', 'G').set_last(1.0);
        q.aux_session_mut('A', 'G').set_last(2.0);
        q.aux_session_mut('B', 'G').set_last(3.0);
        assert_eq!(q.aux.len(), 2);
        assert_eq!(q.aux[0].day, Some('A'));
        assert_eq!(q.aux_session('B', 'G').and_then(Session::last), Some(3.0));
    }

    #[test]
    fn test_markup_round_trip() {
        let mut q = quote();
        q.bid = Some(2.0919);
        q.bid_size = Some(3);
        q.flag = Some('c');
        q.ddf_exchange = Some('J');
        q.combined.set_last(2.1371);
        q.previous = Session::new(Some('R'), 'G');
        q.previous.settlement = Some(2.1);
        q.electronic.set_last(2.13);
        q.aux_session_mut('Q', 'G').set_last(2.05);

        let el = q.to_markup();
        let ids: Vec<_> = el.children.iter().filter_map(|c| c.attr("id")).collect();
        assert_eq!(ids, vec!["combined", "previous", "session_S_T", "session_Q_G"]);

        let back = Quote::from_markup(&crate::markup::parse(&el.to_string()).unwrap()).unwrap();
        assert_eq!(back, q);
    }
}
