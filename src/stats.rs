/// Feed statistics tracking
///
/// Counts frames through each stage (decode, fold, publish) and keeps a
/// window of decode and fold latencies.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW_SIZE: usize = 10000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p99_us: u64,
}

impl LatencyStats {
    fn from_window(window: &VecDeque<u64>) -> Option<Self> {
        let mut sorted: Vec<u64> = window.iter().copied().collect();
        sorted.sort_unstable();
        let (&min_us, &max_us) = (sorted.first()?, sorted.last()?);
        let n = sorted.len();

        Some(LatencyStats {
            min_us,
            max_us,
            mean_us: sorted.iter().sum::<u64>() as f64 / n as f64,
            p50_us: sorted[n / 2],
            p99_us: sorted[n * 99 / 100],
        })
    }

    fn print(&self, label: &str) {
        println!("\n{} latency (us):", label);
        println!("  min {}  max {}  mean {:.2}", self.min_us, self.max_us, self.mean_us);
        println!("  p50 {}  p99 {}", self.p50_us, self.p99_us);
    }
}

fn push_window(window: &mut VecDeque<u64>, micros: u64) {
    if window.len() >= WINDOW_SIZE {
        window.pop_front();
    }
    window.push_back(micros);
}

#[derive(Debug, Clone, Default)]
pub struct FeedStats {
    start_time: Option<Instant>,
    total_frames: u64,
    total_bytes: u64,

    decoded: u64,
    ignored: u64,
    decode_errors: u64,

    folded: u64,
    fold_errors: u64,
    market_events: u64,
    dropped_events: u64,
    refresh_requests: u64,

    decode_latencies: VecDeque<u64>,
    fold_latencies: VecDeque<u64>,
}

impl FeedStats {
    pub fn new() -> Self {
        FeedStats {
            decode_latencies: VecDeque::with_capacity(WINDOW_SIZE),
            fold_latencies: VecDeque::with_capacity(WINDOW_SIZE),
            ..Default::default()
        }
    }

    /// Record a frame received
    pub fn record_frame(&mut self, size: usize) {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }
        self.total_frames += 1;
        self.total_bytes += size as u64;
    }

    pub fn record_decoded(&mut self) {
        self.decoded += 1;
    }

    /// A frame that decoded to nothing on purpose
    pub fn record_ignored(&mut self) {
        self.ignored += 1;
    }

    pub fn record_decode_error(&mut self) {
        self.decode_errors += 1;
    }

    /// A fold that produced a FeedEvent carrying `market_events` events
    pub fn record_folded(&mut self, market_events: usize) {
        self.folded += 1;
        self.market_events += market_events as u64;
    }

    pub fn record_fold_error(&mut self) {
        self.fold_errors += 1;
    }

    pub fn record_dropped_event(&mut self) {
        self.dropped_events += 1;
    }

    pub fn record_refresh_request(&mut self) {
        self.refresh_requests += 1;
    }

    /// Record decode latency in microseconds
    pub fn record_decode_latency(&mut self, micros: u64) {
        push_window(&mut self.decode_latencies, micros);
    }

    /// Record fold latency in microseconds
    pub fn record_fold_latency(&mut self, micros: u64) {
        push_window(&mut self.fold_latencies, micros);
    }

    /// Get frames per second
    pub fn frames_per_sec(&self) -> f64 {
        self.rate(self.total_frames)
    }

    /// Get bytes per second
    pub fn bytes_per_sec(&self) -> f64 {
        self.rate(self.total_bytes)
    }

    fn rate(&self, count: u64) -> f64 {
        match self.start_time {
            None => 0.0,
            Some(start) => {
                let elapsed = start.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    count as f64 / elapsed
                } else {
                    0.0
                }
            }
        }
    }

    pub fn decode_latency_stats(&self) -> Option<LatencyStats> {
        LatencyStats::from_window(&self.decode_latencies)
    }

    pub fn fold_latency_stats(&self) -> Option<LatencyStats> {
        LatencyStats::from_window(&self.fold_latencies)
    }

    /// Get total elapsed time
    pub fn elapsed(&self) -> Option<Duration> {
        self.start_time.map(|st| st.elapsed())
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    pub fn ignored(&self) -> u64 {
        self.ignored
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    pub fn folded(&self) -> u64 {
        self.folded
    }

    pub fn fold_errors(&self) -> u64 {
        self.fold_errors
    }

    pub fn market_events(&self) -> u64 {
        self.market_events
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    pub fn refresh_requests(&self) -> u64 {
        self.refresh_requests
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = FeedStats::new();
    }

    /// Print statistics summary
    pub fn print_summary(&self) {
        println!("=== Feed Statistics ===");
        println!("Frames: {} ({} bytes)", self.total_frames, self.total_bytes);
        println!("Elapsed: {:?}", self.elapsed());
        println!("Frames/sec: {:.2}", self.frames_per_sec());
        println!("Bytes/sec: {:.2}", self.bytes_per_sec());
        println!(
            "Decoded: {}, ignored: {}, decode errors: {}",
            self.decoded, self.ignored, self.decode_errors
        );
        println!(
            "Folded: {}, fold errors: {}, market events: {}, dropped events: {}",
            self.folded, self.fold_errors, self.market_events, self.dropped_events
        );
        println!("Refresh requests: {}", self.refresh_requests);

        if let Some(stats) = self.decode_latency_stats() {
            stats.print("Decode");
        }
        if let Some(stats) = self.fold_latency_stats() {
            stats.print("Fold");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_frame() {
        let mut stats = FeedStats::new();
        stats.record_frame(46);
        assert_eq!(stats.total_frames(), 1);
        assert_eq!(stats.total_bytes(), 46);
        assert!(stats.elapsed().is_some());
    }

    #[test]
    fn test_decode_latency_stats() {
        let mut stats = FeedStats::new();
        assert!(stats.decode_latency_stats().is_none());
        for i in 1..=100 {
            stats.record_decode_latency(i);
        }

        let latency_stats = stats.decode_latency_stats().unwrap();
        assert_eq!(latency_stats.min_us, 1);
        assert_eq!(latency_stats.max_us, 100);
        assert_eq!(latency_stats.p50_us, 51);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut stats = FeedStats::new();
        for i in 0..(WINDOW_SIZE as u64 + 10) {
            stats.record_fold_latency(i);
        }
        assert_eq!(stats.fold_latency_stats().unwrap().min_us, 10);
    }

    #[test]
    fn test_counters_and_reset() {
        let mut stats = FeedStats::new();
        stats.record_folded(2);
        stats.record_folded(0);
        stats.record_dropped_event();
        assert_eq!(stats.folded(), 2);
        assert_eq!(stats.market_events(), 2);
        assert_eq!(stats.dropped_events(), 1);

        stats.reset();
        assert_eq!(stats.folded(), 0);
        assert_eq!(stats.elapsed(), None);
    }
}
