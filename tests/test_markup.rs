/// Snapshot markup tests

use ddf_feed::markup::{self, MarkupError};
use ddf_feed::protocol::BaseCode;
use ddf_feed::timestamp::local_datetime;
use ddf_feed::{CumulativeVolume, DecodedMessage, Decoder, Element, Quote, Session, SymbolInfo};

#[test]
fn test_entities_survive_write_and_parse() {
    let mut el = Element::new("QUOTE");
    el.set("name", "Corn <Dec> \"09\" & more");
    let text = el.to_string();
    assert!(text.contains("&lt;Dec&gt;"));
    assert!(text.contains("&quot;09&quot;"));
    assert!(text.contains("&amp; more"));

    let parsed = markup::parse(&text).unwrap();
    assert_eq!(parsed.attr("name"), Some("Corn <Dec> \"09\" & more"));
}

#[test]
fn test_parse_nested_with_prolog_and_single_quotes() {
    let doc = "<?xml version=\"1.0\"?>\n<QUOTE symbol='ZCZ9'>\n  <SESSION id='combined'/>\n  <SESSION id='previous'></SESSION>\n</QUOTE>\n";
    let root = markup::parse(doc).unwrap();
    assert_eq!(root.name, "QUOTE");
    assert_eq!(root.attr("symbol"), Some("ZCZ9"));
    assert_eq!(root.children_named("SESSION").count(), 2);
}

#[test]
fn test_malformed_markup() {
    assert!(matches!(
        markup::parse("<QUOTE></BOOK>"),
        Err(MarkupError::MismatchedTag { .. })
    ));
    assert!(matches!(markup::parse("<QUOTE a=\"1\""), Err(_)));
    assert!(matches!(
        markup::parse("<A/><B/>"),
        Err(MarkupError::TrailingContent(_))
    ));
}

#[test]
fn test_wide_whitespace_between_attributes() {
    let parsed = markup::parse("<QUOTE\u{3000}symbol=\"A\"\u{a0}/>").unwrap();
    assert_eq!(parsed.name, "QUOTE");
    assert_eq!(parsed.attr("symbol"), Some("A"));

    // a malformed snapshot built around it still decodes without panicking
    let _ = Decoder::try_decode("%<QUOTE\u{3000}symbol=\"A\"/>".as_bytes());
}

#[test]
fn test_quote_snapshot_round_trip() {
    let base = BaseCode::from_char('C').unwrap();
    let mut info = SymbolInfo::new("HOZ9", base);
    info.name = Some("Heating Oil & Gas".to_string());
    info.exchange = Some("NYMEX".to_string());
    let mut quote = Quote::new(info);
    quote.combined = Session::new(Some('S'), 'G');
    quote.combined.add_trade(2.1371, Some(5), local_datetime(2009, 12, 15, 11, 23, 45, 120));
    quote.combined.settlement = Some(2.14);
    quote.electronic = Session::new(Some('S'), 'T');
    quote.ask = Some(2.0919);
    quote.ask_size = Some(1);
    quote.last_update = local_datetime(2009, 12, 15, 11, 23, 45, 120);

    let frame = format!("%{}", quote.to_markup());
    let DecodedMessage::QuoteSnapshot(snapshot) = Decoder::try_decode(frame.as_bytes()).unwrap().unwrap() else {
        panic!("expected a quote snapshot");
    };
    let decoded = &snapshot.value;
    assert_eq!(decoded.symbol_info, quote.symbol_info);
    assert_eq!(decoded.combined, quote.combined);
    assert_eq!(decoded.electronic, quote.electronic);
    assert_eq!(decoded.ask, Some(2.0919));
    assert_eq!(decoded.last_update, quote.last_update);
}

#[test]
fn test_volume_snapshot_round_trip() {
    let mut cv = CumulativeVolume::new("ESZ9", BaseCode::from_char('A').unwrap());
    cv.add_trade(1100.25, 4);
    cv.add_trade(1100.25, 6);
    cv.add_trade(1100.5, 1);

    let frame = format!("%%{}", cv.to_markup());
    let DecodedMessage::VolumeSnapshot(snapshot) = Decoder::try_decode(frame.as_bytes()).unwrap().unwrap() else {
        panic!("expected a volume snapshot");
    };
    assert_eq!(snapshot.value, cv);
    assert_eq!(snapshot.value.volume_at(1100.25), 10);
}
