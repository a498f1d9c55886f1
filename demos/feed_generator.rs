/// Synthetic DDF feed generator
///
/// Writes a capture of snapshot lines followed by random trades, top of book,
/// parameter updates, depth refreshes and timestamp beacons to stdout or a
/// file. Useful for testing the replay binary and benchmarking.

use chrono::{Duration, NaiveDateTime};
use ddf_feed::protocol::BaseCode;
use ddf_feed::timestamp::{encode_suffix, local_datetime};
use ddf_feed::{format_price, Quote, Session, SymbolInfo};
use rand::Rng;
use std::env;
use std::fs::File;
use std::io::Write;

const SYMBOLS: [(&str, char, f64); 3] = [("HOZ9", 'C', 2.1371), ("ESZ9", 'A', 1100.25), ("ZCZ9", '2', 410.5)];
const DAY: char = 'O';

fn suffix(at: &NaiveDateTime) -> Vec<u8> {
    encode_suffix(at, true)
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = env::args().collect();

    let output_path = if args.len() > 1 {
        args[1].clone()
    } else {
        "/tmp/ddf_feed.bin".to_string()
    };

    let message_count: usize = if args.len() > 2 {
        args[2].parse().unwrap_or(10000)
    } else {
        10000
    };

    let mut output: Box<dyn Write> = if output_path == "stdout" {
        Box::new(std::io::stdout())
    } else {
        Box::new(File::create(&output_path)?)
    };

    let mut rng = rand::thread_rng();
    let mut clock = local_datetime(2009, 12, 24, 8, 30, 0, 0).expect("valid start time");
    let mut prices: Vec<f64> = SYMBOLS.iter().map(|s| s.2).collect();

    eprintln!("Generating {} frames to {}", message_count, output_path);

    for (symbol, base, _) in SYMBOLS {
        let Some(base_code) = BaseCode::from_char(base) else {
            continue;
        };
        let mut quote = Quote::new(SymbolInfo::new(symbol, base_code));
        quote.combined = Session::new(Some(DAY), 'G');
        quote.electronic = Session::new(Some(DAY), 'T');
        writeln!(output, "%{}", quote.to_markup())?;
    }

    for i in 0..message_count {
        clock += Duration::milliseconds(rng.gen_range(1..250));
        let which = rng.gen_range(0..SYMBOLS.len());
        let (symbol, base, _) = SYMBOLS[which];
        let unit = BaseCode::from_char(base).map_or(0, |b| b.unit_code());
        let tick = if unit > 0 { 10f64.powi(-unit) } else { 0.25 };

        prices[which] += tick * rng.gen_range(-3i32..=3) as f64;
        let price = format_price(prices[which], unit);

        let frame = match rng.gen_range(0u8..20) {
            0..=9 => {
                let size = rng.gen_range(1u32..50);
                format!("\x012{},7\x02{}J10{},{},{}G\x03", symbol, base, price, size, DAY)
            }
            10..=15 => {
                let ask = format_price(prices[which] + tick, unit);
                let bid_size = rng.gen_range(1u32..200);
                let ask_size = rng.gen_range(1u32..200);
                format!(
                    "\x012{},8\x02{}J10{},{},{},{},{}G\x03",
                    symbol, base, price, bid_size, ask, ask_size, DAY
                )
            }
            16 | 17 => {
                let element = ["5", "6", "D", "d"][rng.gen_range(0..4)];
                format!("\x012{},2\x02{}J10{},{}0{}G\x03", symbol, base, price, element, DAY)
            }
            18 => {
                let mut levels = Vec::with_capacity(10);
                for l in 0..5u8 {
                    let bid = format_price(prices[which] - tick * f64::from(l + 1), unit);
                    levels.push(format!("{}{}{}", bid, (b'K' + l) as char, rng.gen_range(1u32..100)));
                }
                for l in 0..5u8 {
                    let ask = format_price(prices[which] + tick * f64::from(l + 1), unit);
                    levels.push(format!("{}{}{}", ask, (b'J' - l) as char, rng.gen_range(1u32..100)));
                }
                format!("\x013{},B\x02{}J55\x02{}\x03", symbol, base, levels.join(","))
            }
            _ => format!("\x01#{}\x03", clock.format("%Y%m%d%H%M%S")),
        };

        output.write_all(frame.as_bytes())?;
        if frame.as_bytes()[1] != b'#' {
            output.write_all(&suffix(&clock))?;
        }

        if i % 1000 == 0 && i > 0 {
            eprintln!("Generated {} frames", i);
        }
    }

    eprintln!("Feed generation complete: {} frames", message_count);
    Ok(())
}
