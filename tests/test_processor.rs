/// Single-writer processor tests

use ddf_feed::{Decoder, EngineConfig, FeedProcessor, MarketEventKind, NoRefresh, ProcessorError};
use std::sync::{Arc, Mutex};
use std::thread;

const SNAPSHOT: &[u8] =
    b"%<QUOTE symbol=\"HOZ9\" basecode=\"C\"><SESSION id=\"combined\" day=\"S\" session=\"G\"/></QUOTE>";

#[test]
fn test_frames_from_many_threads() {
    let processor = FeedProcessor::spawn(EngineConfig::default(), NoRefresh).unwrap();
    processor.sender().send(SNAPSHOT).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let sender = processor.sender();
            thread::spawn(move || {
                for i in 0..25 {
                    let frame = format!("\x012HOZ9,7\x02CJ10{},1,SG\x03", 21000 + t * 100 + i);
                    sender.send(frame.into_bytes()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let quote = processor.quote("HOZ9").unwrap().unwrap();
    assert_eq!(quote.combined.num_trades, 100);
    assert_eq!(quote.combined.volume, Some(100));
    assert_eq!(quote.combined.high, Some(2.1324));
    assert_eq!(quote.combined.low, Some(2.1));

    let cv = processor.cumulative_volume("HOZ9").unwrap().unwrap();
    assert_eq!(cv.total_volume(), 100);

    let stats = processor.stats().unwrap();
    assert_eq!(stats.total_frames(), 101);
    assert_eq!(stats.folded(), 101);

    let events: Vec<_> = processor.events().try_iter().collect();
    assert_eq!(events.len(), 101);
    assert!(events[0].quote.is_some());
    assert!(events[1]
        .market_events
        .iter()
        .any(|e| e.kind == MarketEventKind::Open));
}

#[test]
fn test_queries_and_decoded_messages() {
    let processor = FeedProcessor::spawn(EngineConfig::default(), NoRefresh).unwrap();
    assert_eq!(processor.quote("HOZ9").unwrap(), None);

    let sender = processor.sender();
    sender.send(SNAPSHOT).unwrap();
    let depth = Decoder::decode(b"\x013HOZ9,B\x02CJ11\x0220900K3,20919J1\x03").unwrap();
    sender.send_message(depth).unwrap();

    let book = processor.book_quote("HOZ9").unwrap().unwrap();
    assert_eq!(book.best_bid(), Some((2.09, 3)));
    assert_eq!(book.best_ask(), Some((2.0919, 1)));

    processor.reset_all().unwrap();
    assert_eq!(processor.book_quote("HOZ9").unwrap(), None);
    assert_eq!(processor.quote("HOZ9").unwrap(), None);
}

#[test]
fn test_refresh_requests_reach_the_requester() {
    let requested = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let requested = Arc::clone(&requested);
        move |symbol: &str| requested.lock().unwrap().push(symbol.to_string())
    };
    let processor = FeedProcessor::spawn(EngineConfig::default(), sink).unwrap();
    let sender = processor.sender();
    sender.send(&b"\x012CLZ9,7\x02AJ107512,1,SG\x03"[..]).unwrap();
    sender.send(&b"\x012CLZ9,7\x02AJ107513,1,SG\x03"[..]).unwrap();

    // a query round trip orders us after both frames
    assert_eq!(processor.stats().unwrap().refresh_requests(), 1);
    assert_eq!(*requested.lock().unwrap(), vec!["CLZ9".to_string()]);
}

#[test]
fn test_slow_subscriber_never_blocks_ingest() {
    let config = EngineConfig {
        event_capacity: 4,
        ingest_capacity: 8,
        ..Default::default()
    };
    let processor = FeedProcessor::spawn(config, NoRefresh).unwrap();
    let sender = processor.sender();
    sender.send(SNAPSHOT).unwrap();
    for i in 0..50 {
        let frame = format!("\x012HOZ9,7\x02CJ10{},1,SG\x03", 21000 + i);
        sender.send(frame.into_bytes()).unwrap();
    }

    let stats = processor.stats().unwrap();
    assert_eq!(stats.total_frames(), 51);
    assert_eq!(stats.dropped_events(), 47);
    assert_eq!(processor.events().len(), 4);
}

#[test]
fn test_bad_frames_do_not_stop_processing() {
    let processor = FeedProcessor::spawn(EngineConfig::default(), NoRefresh).unwrap();
    let sender = processor.sender();
    sender.send(SNAPSHOT).unwrap();
    sender.send(&b"\x012HOZ9,7\x02CJ10abc,1,SG\x03"[..]).unwrap();
    sender.send(&b"garbage"[..]).unwrap();
    sender.send(&b"\x012HOZ9,7\x02CJ1021000,1,SG\x03"[..]).unwrap();

    let stats = processor.stats().unwrap();
    assert_eq!(stats.decode_errors(), 2);
    assert_eq!(processor.quote("HOZ9").unwrap().unwrap().combined.last(), Some(2.1));
}

#[test]
fn test_stopped_processor_rejects_frames() {
    let processor = FeedProcessor::spawn(EngineConfig::default(), NoRefresh).unwrap();
    let sender = processor.sender();
    sender.send(SNAPSHOT).unwrap();

    let master = processor.shutdown().unwrap();
    assert!(master.quote("HOZ9").is_some());
    assert!(matches!(sender.send(SNAPSHOT), Err(ProcessorError::Stopped)));
    assert!(matches!(sender.try_send(SNAPSHOT), Err(ProcessorError::Stopped)));
}

#[test]
fn test_replay_capture_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.ddf");

    let mut capture = Vec::new();
    capture.extend_from_slice(SNAPSHOT);
    capture.push(b'\n');
    capture.extend_from_slice(b"\x012HOZ9,7\x02CJ1021371,5,SG\x03");
    capture.extend_from_slice(b"\x012HOZ9,8\x02CJ1020900,3,20919,1,SG\x03");
    capture.extend_from_slice(b"\x012HOZ9,7\x02CJ10213");
    std::fs::write(&path, &capture).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let processor = FeedProcessor::spawn(EngineConfig::default(), NoRefresh).unwrap();
    let (frames, consumed) = processor.sender().send_stream(&bytes).unwrap();
    assert_eq!(frames, 3);
    assert_eq!(&bytes[consumed..], b"\x012HOZ9,7\x02CJ10213");

    let master = processor.shutdown().unwrap();
    let quote = master.quote("HOZ9").unwrap();
    assert_eq!(quote.combined.last(), Some(2.1371));
    assert_eq!(quote.bid, Some(2.09));
    assert_eq!(master.stats().decode_errors(), 0);
}
