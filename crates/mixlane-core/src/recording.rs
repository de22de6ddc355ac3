use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::export::{EXPORT_CHANNELS, encode_wav, fold_to_stereo};

/// Captured master output, WAV encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingBlob {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub byte_len: usize,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Capture {
    sample_rate: u32,
    started_at: DateTime<Utc>,
    samples: Vec<f32>,
}

/// Accumulates rendered master blocks between start and stop.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    capture: Option<Capture>,
}

impl Recorder {
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.capture.is_some()
    }

    /// Returns `false` if a capture is already running.
    pub fn start(&mut self, sample_rate: u32) -> bool {
        if self.capture.is_some() {
            return false;
        }
        self.capture = Some(Capture {
            sample_rate,
            started_at: Utc::now(),
            samples: Vec::new(),
        });
        info!(sample_rate, "recording started");
        true
    }

    pub fn push(&mut self, block: &[f32], channels: usize) {
        if let Some(capture) = self.capture.as_mut() {
            capture
                .samples
                .extend_from_slice(&fold_to_stereo(block, channels));
        }
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        self.capture.as_ref().map_or(0.0, |capture| {
            if capture.sample_rate == 0 {
                return 0.0;
            }
            (capture.samples.len() / usize::from(EXPORT_CHANNELS)) as f64
                / f64::from(capture.sample_rate)
        })
    }

    /// Ends the capture. `Ok(None)` when nothing was recording.
    pub fn stop(&mut self) -> Result<Option<RecordingBlob>> {
        let duration_seconds = self.duration_seconds();
        let Some(capture) = self.capture.take() else {
            debug!("stop requested without an active recording");
            return Ok(None);
        };
        let bytes = encode_wav(&capture.samples, EXPORT_CHANNELS, capture.sample_rate)?;
        info!(duration_seconds, bytes = bytes.len(), "recording stopped");
        Ok(Some(RecordingBlob {
            byte_len: bytes.len(),
            bytes,
            duration_seconds,
            sample_rate: capture.sample_rate,
            channels: EXPORT_CHANNELS,
            started_at: capture.started_at,
            stopped_at: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_blocks_until_stopped() {
        let mut recorder = Recorder::default();
        assert!(recorder.start(100));
        assert!(!recorder.start(100));
        recorder.push(&[0.25; 100], 2);
        recorder.push(&[0.25; 300], 6);
        assert!((recorder.duration_seconds() - 1.0).abs() < 1e-9);
        let blob = recorder.stop().expect("encode").expect("blob");
        assert_eq!(blob.channels, 2);
        assert_eq!(blob.byte_len, 44 + 100 * 2 * 2);
        assert!(!recorder.is_recording());
        assert!(recorder.stop().expect("idle stop").is_none());
    }
}
