//! Single-writer processor
//!
//! A dedicated thread owns the `DataMaster`. Transport threads push frames
//! through cloned `FrameSender`s; queries travel on the same queue, so a
//! reader only ever sees state between two whole messages.

use crate::config::EngineConfig;
use crate::data_master::{DataMaster, FoldError};
use crate::decoder::Decoder;
use crate::feed_event::FeedEvent;
use crate::message::DecodedMessage;
use crate::model::{BookQuote, CumulativeVolume, Quote};
use crate::protocol::printable;
use crate::recovery::RefreshRequester;
use crate::stats::FeedStats;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("processor has stopped")]
    Stopped,

    #[error("frame queue is full")]
    Full,

    #[error("failed to spawn processor thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("processor thread panicked")]
    Panicked,
}

enum Command {
    Frame(Vec<u8>),
    Message(Box<DecodedMessage>),
    Quote(String, Sender<Option<Quote>>),
    BookQuote(String, Sender<Option<BookQuote>>),
    CumulativeVolume(String, Sender<Option<CumulativeVolume>>),
    Stats(Sender<FeedStats>),
    ResetAll,
    Shutdown,
}

/// Cloneable handle for pushing frames into a running processor.
#[derive(Clone)]
pub struct FrameSender {
    commands: Sender<Command>,
}

impl FrameSender {
    /// Queue a frame, blocking while the queue is full.
    pub fn send(&self, frame: impl Into<Vec<u8>>) -> Result<(), ProcessorError> {
        self.commands
            .send(Command::Frame(frame.into()))
            .map_err(|_| ProcessorError::Stopped)
    }

    pub fn try_send(&self, frame: impl Into<Vec<u8>>) -> Result<(), ProcessorError> {
        self.commands
            .try_send(Command::Frame(frame.into()))
            .map_err(|e| match e {
                TrySendError::Full(_) => ProcessorError::Full,
                TrySendError::Disconnected(_) => ProcessorError::Stopped,
            })
    }

    /// Split a captured byte stream into frames and queue each one. Returns
    /// the number of frames queued and the bytes consumed; a trailing
    /// partial frame is left for the caller.
    pub fn send_stream(&self, buffer: &[u8]) -> Result<(usize, usize), ProcessorError> {
        let (frames, consumed) = Decoder::split_frames(buffer);
        let count = frames.len();
        for frame in frames {
            self.send(frame)?;
        }
        Ok((count, consumed))
    }

    /// Queue an already decoded message.
    pub fn send_message(&self, message: DecodedMessage) -> Result<(), ProcessorError> {
        self.commands
            .send(Command::Message(Box::new(message)))
            .map_err(|_| ProcessorError::Stopped)
    }
}

pub struct FeedProcessor {
    sender: FrameSender,
    events: Receiver<FeedEvent>,
    handle: Option<JoinHandle<DataMaster>>,
}

impl FeedProcessor {
    pub fn spawn(
        config: EngineConfig,
        requester: impl RefreshRequester + 'static,
    ) -> Result<Self, ProcessorError> {
        let (command_tx, command_rx) = bounded(config.ingest_capacity);
        let (event_tx, event_rx) = bounded(config.event_capacity);
        let master = DataMaster::new(config, requester);

        let handle = std::thread::Builder::new()
            .name("ddf-processor".to_string())
            .spawn(move || run(master, command_rx, event_tx))?;

        Ok(FeedProcessor {
            sender: FrameSender {
                commands: command_tx,
            },
            events: event_rx,
            handle: Some(handle),
        })
    }

    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    /// Events in fold order. Events the subscriber has not taken once the
    /// queue is full are dropped and counted in `FeedStats`.
    pub fn events(&self) -> &Receiver<FeedEvent> {
        &self.events
    }

    pub fn quote(&self, symbol: &str) -> Result<Option<Quote>, ProcessorError> {
        self.query(|reply| Command::Quote(symbol.to_string(), reply))
    }

    pub fn book_quote(&self, symbol: &str) -> Result<Option<BookQuote>, ProcessorError> {
        self.query(|reply| Command::BookQuote(symbol.to_string(), reply))
    }

    pub fn cumulative_volume(
        &self,
        symbol: &str,
    ) -> Result<Option<CumulativeVolume>, ProcessorError> {
        self.query(|reply| Command::CumulativeVolume(symbol.to_string(), reply))
    }

    pub fn stats(&self) -> Result<FeedStats, ProcessorError> {
        self.query(Command::Stats)
    }

    pub fn reset_all(&self) -> Result<(), ProcessorError> {
        self.sender
            .commands
            .send(Command::ResetAll)
            .map_err(|_| ProcessorError::Stopped)
    }

    fn query<T>(&self, command: impl FnOnce(Sender<T>) -> Command) -> Result<T, ProcessorError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.sender
            .commands
            .send(command(reply_tx))
            .map_err(|_| ProcessorError::Stopped)?;
        reply_rx.recv().map_err(|_| ProcessorError::Stopped)
    }

    /// Drain the queue, stop the thread and hand back the engine.
    pub fn shutdown(mut self) -> Result<DataMaster, ProcessorError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<DataMaster, ProcessorError> {
        let handle = self.handle.take().ok_or(ProcessorError::Stopped)?;
        // a dead thread has already dropped its receiver
        let _ = self.sender.commands.send(Command::Shutdown);
        handle.join().map_err(|_| ProcessorError::Panicked)
    }
}

impl Drop for FeedProcessor {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}

fn run(mut master: DataMaster, commands: Receiver<Command>, events: Sender<FeedEvent>) -> DataMaster {
    info!("feed processor started");
    while let Ok(command) = commands.recv() {
        match command {
            Command::Frame(frame) => {
                let result = catch_unwind(AssertUnwindSafe(|| master.process_frame(&frame)));
                publish(&mut master, &events, result, &frame);
            }
            Command::Message(message) => {
                let message = *message;
                let raw = message.raw().to_vec();
                let result = catch_unwind(AssertUnwindSafe(|| master.fold(message)));
                publish(&mut master, &events, result, &raw);
            }
            Command::Quote(symbol, reply) => {
                let _ = reply.send(master.quote(&symbol).cloned());
            }
            Command::BookQuote(symbol, reply) => {
                let _ = reply.send(master.book_quote(&symbol).cloned());
            }
            Command::CumulativeVolume(symbol, reply) => {
                let _ = reply.send(master.cumulative_volume(&symbol).cloned());
            }
            Command::Stats(reply) => {
                let _ = reply.send(master.stats().clone());
            }
            Command::ResetAll => master.reset_all(),
            Command::Shutdown => break,
        }
    }
    info!(frames = master.stats().total_frames(), "feed processor stopped");
    master
}

fn publish(
    master: &mut DataMaster,
    events: &Sender<FeedEvent>,
    result: std::thread::Result<Option<FeedEvent>>,
    frame: &[u8],
) {
    match result {
        Ok(Some(event)) => {
            // never wait on a slow subscriber
            if events.try_send(event).is_err() {
                master.stats_mut().record_dropped_event();
            }
        }
        Ok(None) => {}
        Err(payload) => {
            let e = FoldError::Panicked(panic_message(payload.as_ref()));
            error!(error = %e, frame = %printable(frame), "fold panicked, continuing");
            master.stats_mut().record_fold_error();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::NoRefresh;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_full_event_queue_drops_and_counts() {
        let config = EngineConfig {
            event_capacity: 1,
            ..Default::default()
        };
        let processor = FeedProcessor::spawn(config, NoRefresh).unwrap();
        let sender = processor.sender();
        for _ in 0..3 {
            sender.send(&b"\x01#20091215112345\x03"[..]).unwrap();
        }
        let stats = processor.stats().unwrap();
        assert_eq!(stats.total_frames(), 3);
        assert_eq!(stats.dropped_events(), 2);
        assert_eq!(processor.events().len(), 1);
    }

    #[test]
    fn test_shutdown_returns_engine() {
        let processor = FeedProcessor::spawn(EngineConfig::default(), NoRefresh).unwrap();
        processor.reset_all().unwrap();
        let master = processor.shutdown().unwrap();
        assert_eq!(master.symbols().count(), 0);
    }
}
