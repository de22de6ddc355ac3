use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::{dsp, session::SharedSession};

pub const DEFAULT_WINDOW_FRAMES: usize = 2_048;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub rms: f32,
    pub peak: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackLevel {
    pub track_id: Uuid,
    pub peak: f32,
    pub rms: f32,
}

/// Ring buffer holding every channel sample of the most recent `window_frames` frames.
#[derive(Debug, Clone)]
pub struct AnalysisTap {
    window_frames: usize,
    channels: usize,
    buffer: Vec<f32>,
    write: usize,
    filled: usize,
}

impl AnalysisTap {
    #[must_use]
    pub fn new(window_frames: usize) -> Self {
        let window_frames = window_frames.max(1);
        Self {
            window_frames,
            channels: 2,
            buffer: vec![0.0; window_frames * 2],
            write: 0,
            filled: 0,
        }
    }

    /// A change of channel count starts a fresh window.
    pub fn push_frames(&mut self, samples: &[f32], channels: usize) {
        let channels = channels.max(1);
        if channels != self.channels {
            self.channels = channels;
            self.buffer = vec![0.0; self.window_frames * channels];
            self.write = 0;
            self.filled = 0;
        }
        let whole_frames = samples.len() / channels * channels;
        for sample in &samples[..whole_frames] {
            self.buffer[self.write] = *sample;
            self.write = (self.write + 1) % self.buffer.len();
            self.filled = (self.filled + 1).min(self.buffer.len());
        }
    }

    #[must_use]
    pub fn levels(&self) -> Level {
        let window = &self.buffer[..self.filled];
        Level {
            rms: dsp::rms(window),
            peak: dsp::peak(window),
        }
    }

    pub fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|sample| *sample = 0.0);
        self.write = 0;
        self.filled = 0;
    }
}

/// Periodic level sampler running beside the control thread.
///
/// Each cycle tries the session lock and skips the cycle when the session is busy,
/// so a slow control operation only costs meter smoothness.
pub struct MonitorTask {
    stop_tx: Option<Sender<()>>,
    skipped: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl MonitorTask {
    pub fn spawn(session: SharedSession, interval: Duration) -> anyhow::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let skipped = Arc::new(AtomicU64::new(0));
        let interval = interval.max(Duration::from_millis(1));
        let thread_skipped = Arc::clone(&skipped);

        let handle = thread::Builder::new()
            .name("mixlane-monitor".to_string())
            .spawn(move || {
                info!(interval_ms = interval.as_millis(), "level monitor started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    match session.try_lock() {
                        Some(mut session) => {
                            session.tick_monitor(interval.as_secs_f64());
                        }
                        None => {
                            let total = thread_skipped.fetch_add(1, Ordering::Relaxed) + 1;
                            trace!(skipped = total, "session busy, monitor cycle skipped");
                        }
                    }
                }
                debug!("level monitor exiting");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            skipped,
            handle: Some(handle),
        })
    }

    #[must_use]
    pub fn skipped_cycles(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // a full or closed channel means the thread is already on its way out
            let _ = stop_tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("level monitor thread panicked");
            }
        }
    }
}

impl Drop for MonitorTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_reports_recent_window_only() {
        let mut tap = AnalysisTap::new(4);
        tap.push_frames(&[1.0, 1.0, 1.0, 1.0], 2);
        assert_eq!(tap.levels().peak, 1.0);
        tap.push_frames(&[0.5; 8], 2);
        let level = tap.levels();
        assert!((level.peak - 0.5).abs() < 1e-6);
        assert!((level.rms - 0.5).abs() < 1e-6);
    }

    #[test]
    fn empty_tap_is_silent() {
        let tap = AnalysisTap::new(16);
        assert_eq!(tap.levels(), Level::default());
    }

    #[test]
    fn one_sided_frames_keep_their_peak() {
        let mut tap = AnalysisTap::new(2);
        tap.push_frames(&[0.0, 1.0, 0.0, 1.0], 2);
        let level = tap.levels();
        assert_eq!(level.peak, 1.0);
        assert!((level.rms - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn wider_bus_restarts_the_window() {
        let mut tap = AnalysisTap::new(4);
        tap.push_frames(&[0.9; 8], 2);
        tap.push_frames(&[0.0, 0.0, 0.2, 0.0, 0.0, 0.0], 6);
        let level = tap.levels();
        assert!((level.peak - 0.2).abs() < 1e-6);
    }
}
