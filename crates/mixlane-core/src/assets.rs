use std::{f32::consts::TAU, fs::File, io::ErrorKind, path::Path, sync::Arc, thread};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use serde::{Deserialize, Serialize};
use symphonia::core::{
    audio::{AudioBufferRef, SampleBuffer},
    codecs::DecoderOptions,
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Every decoded source is held as interleaved stereo.
pub const SOURCE_CHANNELS: u16 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    #[must_use]
    pub fn from_stereo(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: SOURCE_CHANNELS,
            samples,
        }
    }

    /// Stereo sine of `amplitude` lasting `seconds`.
    #[must_use]
    pub fn sine(frequency: f32, amplitude: f32, seconds: f64, sample_rate: u32) -> Self {
        let frames = crate::time::frames_covering(seconds, sample_rate);
        let mut samples = Vec::with_capacity(frames * 2);
        for frame in 0..frames {
            let phase = TAU * frequency * frame as f32 / sample_rate as f32;
            let value = amplitude * phase.sin();
            samples.push(value);
            samples.push(value);
        }
        Self::from_stereo(sample_rate, samples)
    }

    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Stereo frame at `seconds`, linearly interpolated between neighbouring source frames.
    #[must_use]
    pub fn frame_at(&self, seconds: f64) -> [f32; 2] {
        let frames = self.frames();
        if frames == 0 || seconds < 0.0 || self.sample_rate == 0 {
            return [0.0; 2];
        }
        let position = seconds * f64::from(self.sample_rate);
        let index = position.floor() as usize;
        if index >= frames {
            return [0.0; 2];
        }
        let fraction = (position - index as f64) as f32;
        let current = self.stereo_frame(index);
        let next = if index + 1 < frames {
            self.stereo_frame(index + 1)
        } else {
            current
        };
        [
            current[0] + (next[0] - current[0]) * fraction,
            current[1] + (next[1] - current[1]) * fraction,
        ]
    }

    fn stereo_frame(&self, index: usize) -> [f32; 2] {
        let channels = usize::from(self.channels.max(1));
        let base = index * channels;
        let left = self.samples[base];
        let right = if channels > 1 {
            self.samples[base + 1]
        } else {
            left
        };
        [left, right]
    }
}

pub type SharedSource = Arc<DecodedAudio>;

/// Decodes any symphonia-supported file into interleaved stereo f32.
///
/// Mono is duplicated to both sides; wider layouts keep their first two channels.
#[instrument(fields(path = %path.display()))]
pub fn decode_source(path: &Path) -> Result<DecodedAudio> {
    let file = File::open(path)
        .with_context(|| format!("failed to open audio file: {}", path.display()))?;
    let source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|value| value.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("unrecognised audio container: {}", path.display()))?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default audio track found in {}", path.display()))?;
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut sample_rate = track
        .codec_params
        .sample_rate
        .unwrap_or(crate::model::DEFAULT_SAMPLE_RATE);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(error)) if error.kind() == ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err(anyhow::anyhow!(
                    "audio stream reset required for {}",
                    path.display()
                ));
            }
            Err(error) => return Err(error.into()),
        };

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                debug!(reason, "skipping undecodable packet");
                continue;
            }
            Err(error) => return Err(error.into()),
        };

        sample_rate = decoded.spec().rate;
        push_stereo_samples(decoded, &mut samples);
    }

    if samples.is_empty() {
        return Err(anyhow::anyhow!(
            "decoded zero samples from {}",
            path.display()
        ));
    }

    let audio = DecodedAudio::from_stereo(sample_rate, samples);
    debug!(
        sample_rate,
        frames = audio.frames(),
        "audio decode complete"
    );
    Ok(audio)
}

fn push_stereo_samples(decoded: AudioBufferRef<'_>, samples: &mut Vec<f32>) {
    let spec = *decoded.spec();
    let channel_count = spec.channels.count().max(1);
    let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
    sample_buffer.copy_interleaved_ref(decoded);

    for frame in sample_buffer.samples().chunks(channel_count) {
        let left = frame[0];
        let right = frame.get(1).copied().unwrap_or(left);
        samples.push(left);
        samples.push(right);
    }
}

/// Peak of each `bucket_frames`-long bucket, both channels folded together.
#[must_use]
pub fn waveform_peaks(audio: &DecodedAudio, bucket_frames: usize) -> Vec<f32> {
    let width = bucket_frames.max(1) * usize::from(audio.channels.max(1));
    audio
        .samples
        .chunks(width)
        .map(|chunk| chunk.iter().copied().map(f32::abs).fold(0.0_f32, f32::max))
        .collect()
}

#[derive(Debug)]
pub struct SourceLoaded {
    pub track_id: Uuid,
    pub source: String,
    pub result: Result<DecodedAudio>,
}

/// Decodes sources on worker threads; completions are drained on the control thread.
#[derive(Debug)]
pub struct SourceLoader {
    sender: Sender<SourceLoaded>,
    receiver: Receiver<SourceLoaded>,
    pending: usize,
}

impl Default for SourceLoader {
    fn default() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            pending: 0,
        }
    }
}

impl SourceLoader {
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn spawn(&mut self, track_id: Uuid, source: String) {
        let sender = self.sender.clone();
        let worker_source = source.clone();
        let spawned = thread::Builder::new()
            .name(format!("mixlane-load-{track_id}"))
            .spawn(move || {
                let result = decode_source(Path::new(&worker_source));
                if sender
                    .send(SourceLoaded {
                        track_id,
                        source: worker_source,
                        result,
                    })
                    .is_err()
                {
                    debug!(%track_id, "session gone before source load finished");
                }
            });

        match spawned {
            Ok(_) => {
                self.pending += 1;
                info!(%track_id, %source, "source load started");
            }
            Err(error) => {
                warn!(%track_id, ?error, "failed to spawn source loader, decoding inline");
                let result = decode_source(Path::new(&source));
                self.pending += 1;
                // the receiver lives in self, so this send cannot fail
                let _ = self.sender.send(SourceLoaded {
                    track_id,
                    source,
                    result,
                });
            }
        }
    }

    pub fn try_next(&mut self) -> Option<SourceLoaded> {
        match self.receiver.try_recv() {
            Ok(loaded) => {
                self.pending = self.pending.saturating_sub(1);
                Some(loaded)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn next_timeout(&mut self, timeout: std::time::Duration) -> Option<SourceLoaded> {
        let loaded = self.receiver.recv_timeout(timeout).ok()?;
        self.pending = self.pending.saturating_sub(1);
        Some(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_frames() {
        let audio = DecodedAudio::from_stereo(4, vec![0.0, 0.0, 1.0, -1.0]);
        let frame = audio.frame_at(0.125);
        assert!((frame[0] - 0.5).abs() < 1e-6);
        assert!((frame[1] + 0.5).abs() < 1e-6);
        assert_eq!(audio.frame_at(1.0), [0.0, 0.0]);
    }

    #[test]
    fn sine_covers_requested_duration() {
        let tone = DecodedAudio::sine(440.0, 0.5, 0.25, 48_000);
        assert_eq!(tone.frames(), 12_000);
        assert!((tone.duration_seconds() - 0.25).abs() < 1e-9);
        assert!(waveform_peaks(&tone, 1_000).iter().all(|peak| *peak <= 0.5));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let error = decode_source(Path::new("/nonexistent/voice.wav")).expect_err("missing");
        assert!(error.to_string().contains("failed to open audio file"));
    }
}
