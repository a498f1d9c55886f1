/// Depth book correctness tests

use ddf_feed::{BookQuote, DataMaster, DecodedMessage, Decoder, DepthUpdate};

const FULL_REFRESH: &[u8] = b"\x013HOZ9,B\x02CJ55\x02\
    20900K3,20890L4,20880M5,20870N6,20860O7,\
    20919J1,20929I2,20939H3,20949G4,20959F5\x03";

fn depth(frame: &[u8]) -> DepthUpdate {
    match Decoder::try_decode(frame) {
        Ok(Some(DecodedMessage::Depth(update))) => update,
        other => panic!("expected a depth update, got {:?}", other),
    }
}

#[test]
fn test_empty_book() {
    let book = BookQuote::new("HOZ9", Default::default());
    assert_eq!(book.best_bid(), None);
    assert_eq!(book.best_ask(), None);
    assert_eq!(book.spread(), None);
    assert!(book.depth(10).bids.is_empty());
}

#[test]
fn test_refresh_levels_by_letter() {
    let update = depth(FULL_REFRESH);
    assert!(update.replace);
    assert_eq!((update.bid_depth, update.ask_depth), (5, 5));

    let book = BookQuote::from_update(&update);
    assert_eq!(book.bid_count, 5);
    assert_eq!(book.ask_count, 5);
    assert_eq!(book.best_bid(), Some((2.09, 3)));
    assert_eq!(book.best_ask(), Some((2.0919, 1)));
    assert_eq!(book.bid_prices[4], 2.086);
    assert_eq!(book.ask_prices[4], 2.0959);
    assert_eq!(book.ask_sizes[4], 5);
    assert!((book.spread().unwrap() - 0.0019).abs() < 1e-9);
}

#[test]
fn test_depth_view() {
    let book = BookQuote::from_update(&depth(FULL_REFRESH));
    let top = book.depth(2);
    assert_eq!(top.bids, vec![(2.09, 3), (2.089, 4)]);
    assert_eq!(top.asks, vec![(2.0919, 1), (2.0929, 2)]);
    assert_eq!(book.depth(20).bids.len(), 5);
}

#[test]
fn test_merge_leaves_empty_cells_untouched() {
    let mut book = BookQuote::from_update(&depth(FULL_REFRESH));

    // new size for the best bid, a blank second level, a new best ask price
    let merge = depth(b"\x013HOZ9,b\x02CJ55\x0220900K9,-L-,20918J2\x03");
    assert!(!merge.replace);
    book.merge(&merge);

    assert_eq!(book.best_bid(), Some((2.09, 9)));
    assert_eq!(book.bid_prices[1], 2.089);
    assert_eq!(book.bid_sizes[1], 4);
    assert_eq!(book.best_ask(), Some((2.0918, 2)));
    assert_eq!(book.ask_prices[1], 2.0929);
}

#[test]
fn test_refresh_discards_old_levels() {
    let mut book = BookQuote::from_update(&depth(FULL_REFRESH));
    book.replace(&depth(b"\x013HOZ9,B\x02CJ21\x0220800K1,20790L2,20950J3\x03"));

    assert_eq!(book.bid_count, 2);
    assert_eq!(book.ask_count, 1);
    assert_eq!(book.bid_prices[2], 0.0);
    assert_eq!(book.best_ask(), Some((2.095, 3)));
    assert_eq!(book.depth(10).asks.len(), 1);
}

#[test]
fn test_full_ten_levels() {
    let mut entries: Vec<String> = (0..10u8)
        .map(|i| format!("{}{}{}", 20900 - i as i64 * 10, (b'K' + i) as char, i + 1))
        .collect();
    entries.extend((0..10u8).map(|i| format!("{}{}1", 20910 + i as i64 * 10, (b'J' - i) as char)));
    let frame = format!("\x013HOZ9,B\x02CJAA\x02{}\x03", entries.join(","));

    let book = BookQuote::from_update(&depth(frame.as_bytes()));
    assert_eq!((book.bid_count, book.ask_count), (10, 10));
    assert_eq!(book.bid_prices[9], 2.081);
    assert_eq!(book.bid_sizes[9], 10);
    assert_eq!(book.ask_prices[9], 2.1);
}

#[test]
fn test_engine_keeps_one_book_per_symbol() {
    let mut master = DataMaster::default();
    let event = master.process_frame(FULL_REFRESH).unwrap();
    assert_eq!(event.book_quote.as_ref().unwrap().best_bid(), Some((2.09, 3)));
    assert!(event.quote.is_none());

    master.process_frame(b"\x013HOZ9,b\x02CJ55\x0220905K2\x03");
    let book = master.book_quote("HOZ9").unwrap();
    assert_eq!(book.best_bid(), Some((2.0905, 2)));
    assert_eq!(book.ask_count, 5);

    // book snapshots go through the markup path
    let snapshot = format!("%{}", book.to_markup());
    master.reset_all();
    assert!(master.book_quote("HOZ9").is_none());
    master.process_frame(snapshot.as_bytes());
    assert_eq!(master.book_quote("HOZ9").unwrap().best_bid(), Some((2.0905, 2)));
}
