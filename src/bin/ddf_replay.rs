use anyhow::{Context, Result};
use clap::Parser;
use ddf_feed::{EngineConfig, FeedEvent, FeedProcessor, Quote};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Replay a captured DDF feed through the state engine")]
struct Args {
    /// Capture file to replay (raw frames and snapshot lines)
    #[arg(long, short = 'i', env = "DDF_REPLAY_INPUT")]
    input: PathBuf,

    /// Engine configuration (TOML)
    #[arg(long, short = 'c', env = "DDF_CONFIG")]
    config: Option<PathBuf>,

    /// Print every FeedEvent as it is produced
    #[arg(long, default_value_t = false)]
    events: bool,

    /// Only report these symbols (comma separated)
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,
}

fn fmt_price(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{}", v))
}

fn describe(event: &FeedEvent) -> String {
    let mut line = format!(
        "{} {}",
        event.symbol().unwrap_or("*"),
        event.message.as_deref().map_or("-", |m| m.kind())
    );
    if let Some(ts) = event.timestamp {
        line.push_str(&format!(" @{}", ts));
    }
    for market_event in &event.market_events {
        line.push_str(&format!(" [{} {}]", market_event.kind, fmt_price(market_event.price)));
    }
    line
}

fn print_quote(quote: &Quote) {
    let c = &quote.combined;
    println!(
        "{:<16} day={} last={} bid={}x{} ask={}x{} open={} high={} low={} settle={} vol={} oi={} flag={}",
        quote.symbol(),
        c.day.unwrap_or('-'),
        fmt_price(c.last()),
        fmt_price(quote.bid),
        quote.bid_size.unwrap_or(0),
        fmt_price(quote.ask),
        quote.ask_size.unwrap_or(0),
        fmt_price(c.open),
        fmt_price(c.high),
        fmt_price(c.low),
        fmt_price(c.settlement),
        c.volume.unwrap_or(0),
        c.open_interest.unwrap_or(0),
        quote.flag.unwrap_or('-'),
    );
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("load config {:?}", path))?,
        None => EngineConfig::default(),
    };
    let capture = std::fs::read(&args.input).with_context(|| format!("read {:?}", args.input))?;

    let processor = FeedProcessor::spawn(config, |symbol: &str| {
        info!(symbol, "snapshot refresh requested");
    })
    .context("start processor")?;

    let printer = {
        let events = processor.events().clone();
        let symbols = args.symbols.clone();
        let print = args.events;
        std::thread::spawn(move || {
            for event in events.iter() {
                let wanted = symbols.is_empty()
                    || event.symbol().is_some_and(|s| symbols.iter().any(|w| w == s));
                if print && wanted {
                    println!("{}", describe(&event));
                }
            }
        })
    };

    let (frames, consumed) = processor
        .sender()
        .send_stream(&capture)
        .context("queue frames")?;
    if consumed < capture.len() {
        warn!(trailing = capture.len() - consumed, "capture ends inside a frame");
    }
    info!(frames, "capture queued");

    let master = processor.shutdown().context("stop processor")?;
    // the event channel closes once the processor thread exits
    let _ = printer.join();

    let mut symbols: Vec<&str> = master
        .symbols()
        .filter(|s| args.symbols.is_empty() || args.symbols.iter().any(|w| w == s))
        .collect();
    symbols.sort_unstable();
    for symbol in symbols {
        if let Some(quote) = master.quote(symbol) {
            print_quote(quote);
        }
    }

    master.stats().print_summary();
    Ok(())
}
