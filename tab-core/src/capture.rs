//! # Capture Loop Module
//!
//! The boundary between real-time audio delivery and the detection engine.
//! Audio arrives in fixed-size frames from a capture callback that must never
//! block; the engine runs on a dedicated processing thread.
//!
//! ## Architecture
//! - **Capture side**: `FrameSender::offer` moves each frame into a bounded
//!   channel with `try_send`. A full queue drops the frame instead of stalling.
//! - **Processing thread**: owns the `TabEngine` and a `PitchOracle`. Each frame
//!   is estimated, turned into a `FrameInput` and fed to the engine.
//! - **Downstream**: accepted `NoteEvent`s go out on a channel; the engine's
//!   event log can also be polled through an `EventLogReader`.
//!
//! Pitch estimation is not implemented here; any `PitchOracle` can be plugged in.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::engine::TabEngine;
use crate::sequencer::EventLogReader;
use crate::{FrameInput, NoteEvent};

/// Samples per frame delivered by the capture side.
pub const BUFFER_SIZE: usize = 1024;

/// Capture sample rate in Hz.
pub const SAMPLE_RATE: u32 = 44_100;

/// Frames that may queue up before new ones are dropped.
pub const DEFAULT_QUEUE_DEPTH: usize = 32;

/// Duration of one frame in seconds (~23ms at 1024 samples / 44.1kHz).
pub fn frame_period(buffer_size: usize, sample_rate: u32) -> f64 {
    buffer_size as f64 / sample_rate as f64
}

/// Frequency and confidence for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Hz, 0.0 when no pitch was found
    pub frequency: f32,
    pub confidence: f32,
}

/// A pitch detector treated as a black box.
pub trait PitchOracle: Send {
    fn estimate(&mut self, samples: &[f32]) -> PitchEstimate;
}

impl<F> PitchOracle for F
where
    F: FnMut(&[f32]) -> PitchEstimate + Send,
{
    fn estimate(&mut self, samples: &[f32]) -> PitchEstimate {
        self(samples)
    }
}

/// One captured buffer and the time it was captured.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    /// Monotonic seconds
    pub timestamp: f64,
}

/// Largest absolute sample value; 0.0 for an empty buffer.
pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
}

/// Combines a frame with its pitch estimate into engine input.
pub fn frame_input(frame: &AudioFrame, estimate: PitchEstimate) -> FrameInput {
    FrameInput {
        frequency: estimate.frequency,
        confidence: estimate.confidence,
        peak_amplitude: peak_amplitude(&frame.samples),
        timestamp: frame.timestamp,
    }
}

/// Capture-side handle. Never blocks.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: Sender<AudioFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameSender {
    /// Hands a frame to the processing thread.
    ///
    /// Returns false when the frame was dropped because the queue is full or
    /// the processing thread has gone away.
    pub fn offer(&self, frame: AudioFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!(target: "capture", "processing is behind, dropped frame ({} total)", dropped);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Number of frames dropped on a full queue so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Bounded frame queue between capture and processing.
pub fn frame_channel(capacity: usize) -> (FrameSender, Receiver<AudioFrame>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (
        FrameSender {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

/// Processing thread management.
///
/// Owns the engine while running and hands it back from `stop`.
#[derive(Debug)]
pub struct CaptureWorker {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<TabEngine>>,
    log_reader: EventLogReader,
}

impl CaptureWorker {
    /// Starts the processing thread.
    ///
    /// The thread runs until `stop` is called or the frame channel closes.
    ///
    /// # Arguments
    /// * `engine` - Engine that will own the session state
    /// * `oracle` - Pitch detector run on every frame
    /// * `frames` - Receiving end of `frame_channel`
    /// * `events` - Where accepted notes are sent
    pub fn spawn<O>(
        mut engine: TabEngine,
        mut oracle: O,
        frames: Receiver<AudioFrame>,
        events: Sender<NoteEvent>,
    ) -> Result<Self>
    where
        O: PitchOracle + 'static,
    {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let log_reader = engine.log_reader();

        let thread_handle = thread::Builder::new()
            .name("tab-capture".into())
            .spawn(move || {
                log::info!(target: "capture", "processing thread started");
                let mut downstream_open = true;
                loop {
                    crossbeam_channel::select! {
                        recv(frames) -> msg => match msg {
                            Ok(frame) => {
                                let estimate = oracle.estimate(&frame.samples);
                                let input = frame_input(&frame, estimate);
                                if let Some(event) = engine.process_frame(&input).event() {
                                    if downstream_open && events.send(*event).is_err() {
                                        log::warn!(target: "capture", "event receiver closed; notes stay in the log only");
                                        downstream_open = false;
                                    }
                                }
                            }
                            Err(_) => {
                                log::info!(target: "capture", "frame channel closed");
                                break;
                            }
                        },
                        recv(shutdown_rx) -> _ => {
                            log::info!(target: "capture", "received shutdown signal");
                            break;
                        },
                    }
                }
                log::info!(
                    target: "capture",
                    "processing thread finished with {} notes",
                    engine.log().len()
                );
                engine
            })
            .context("failed to spawn capture processing thread")?;

        Ok(Self {
            shutdown_tx,
            thread_handle: Some(thread_handle),
            log_reader,
        })
    }

    /// Reader over the running session's event log.
    pub fn log_reader(&self) -> EventLogReader {
        self.log_reader.clone()
    }

    /// Stops processing between frames and returns the engine.
    pub fn stop(mut self) -> Result<TabEngine> {
        // The thread may already have exited on a closed frame channel.
        let _ = self.shutdown_tx.try_send(());
        let handle = self
            .thread_handle
            .take()
            .ok_or_else(|| anyhow!("capture worker already stopped"))?;
        handle
            .join()
            .map_err(|_| anyhow!("capture processing thread panicked"))
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            let _ = self.shutdown_tx.try_send(());
        }
    }
}
