use std::{
    collections::HashMap,
    fmt,
    fs,
    io::Cursor,
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    assets::{DecodedAudio, SharedSource},
    ducking::DuckingEngine,
    graph::Graph,
    model::{CrossfadeConfig, CrossfadeState, DuckingConfig, SurroundMode, Track, total_duration},
    time::frames_covering,
    transport::{any_solo, is_audible, schedule_sources},
};

pub const DEFAULT_BLOCK_FRAMES: usize = 1_024;
pub const DEFAULT_PROGRESS_EVERY_BLOCKS: usize = 16;
pub const EXPORT_BITS_PER_SAMPLE: u16 = 16;
/// Only the front pair of a wider bus reaches the exported file.
pub const EXPORT_CHANNELS: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Wav,
    Mp3,
    Ogg,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
        }
    }

    /// Container actually produced; compressed formats have no encoder and fall back to WAV.
    #[must_use]
    pub const fn encoded_as(self) -> Self {
        Self::Wav
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wav" => Ok(Self::Wav),
            "mp3" => Ok(Self::Mp3),
            "ogg" => Ok(Self::Ogg),
            other => Err(anyhow::anyhow!("unsupported export format: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Render rate; the session rate when unset.
    pub sample_rate: Option<u32>,
    pub block_frames: usize,
    pub progress_every_blocks: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            sample_rate: None,
            block_frames: DEFAULT_BLOCK_FRAMES,
            progress_every_blocks: DEFAULT_PROGRESS_EVERY_BLOCKS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResult {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub format: ExportFormat,
    pub requested_format: ExportFormat,
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: u64,
    pub duration_seconds: f64,
    pub sha256: String,
}

/// Writes an encoded export, creating parent directories as needed.
#[instrument(skip(result), fields(path = %path.display(), bytes = result.bytes.len()))]
pub fn export_to_path(result: &ExportResult, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create export directory: {}", parent.display())
        })?;
    }
    fs::write(path, &result.bytes)
        .with_context(|| format!("failed to write export: {}", path.display()))?;
    info!(sha256 = %result.sha256, "export written");
    Ok(())
}

/// Clamps to [-1, 1] and scales asymmetrically so both rails map onto the i16 range.
#[must_use]
pub fn quantize_sample(sample: f32) -> i16 {
    let sample = if sample.is_finite() {
        sample.clamp(-1.0, 1.0)
    } else {
        0.0
    };
    if sample >= 0.0 {
        (sample * 32_767.0) as i16
    } else {
        (sample * 32_768.0) as i16
    }
}

/// Keeps the first two channels of an interleaved buffer (duplicating mono).
#[must_use]
pub fn fold_to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    if channels == 2 {
        return samples.to_vec();
    }
    let mut stereo = Vec::with_capacity(samples.len() / channels * 2);
    for frame in samples.chunks_exact(channels) {
        stereo.push(frame[0]);
        stereo.push(frame.get(1).copied().unwrap_or(frame[0]));
    }
    stereo
}

/// 16-bit PCM RIFF/WAVE image of an interleaved float buffer.
pub fn encode_wav(samples: &[f32], channels: u16, sample_rate: u32) -> Result<Vec<u8>> {
    if sample_rate == 0 {
        return Err(anyhow::anyhow!("cannot encode wav at a zero sample rate"));
    }
    let spec = hound::WavSpec {
        channels: channels.max(1),
        sample_rate,
        bits_per_sample: EXPORT_BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("failed to start wav encoder")?;
        for sample in samples {
            writer
                .write_sample(quantize_sample(*sample))
                .context("failed to write wav sample")?;
        }
        writer.finalize().context("failed to finalize wav data")?;
    }
    Ok(cursor.into_inner())
}

/// Decodes 16-bit PCM WAV bytes back into normalized floats.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).context("failed to parse wav")?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(anyhow::anyhow!(
            "expected 16-bit integer wav, found {:?} {} bit",
            spec.sample_format,
            spec.bits_per_sample
        ));
    }
    let samples = reader
        .samples::<i16>()
        .map(|sample| sample.map(|value| f32::from(value) / 32_768.0))
        .collect::<Result<Vec<f32>, _>>()
        .context("failed to read wav samples")?;
    Ok(DecodedAudio {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        samples,
    })
}

/// Everything an offline render needs, detached from the live session.
#[derive(Debug, Clone)]
pub struct OfflineMix {
    pub tracks: Vec<Track>,
    pub sources: HashMap<Uuid, SharedSource>,
    pub sample_rate: u32,
    pub surround_mode: SurroundMode,
    pub window_frames: usize,
    pub master_volume: f32,
    pub master_muted: bool,
    pub ducking: DuckingConfig,
    pub crossfade: CrossfadeConfig,
    pub crossfade_state: CrossfadeState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMix {
    pub sample_rate: u32,
    pub channels: usize,
    pub frames: usize,
    pub samples: Vec<f32>,
}

impl OfflineMix {
    /// Renders the whole mix faster than real time on a private graph.
    ///
    /// `progress` receives values in (0, 1] every `progress_every_blocks` blocks and once at the end.
    #[instrument(skip(self, options, progress), fields(tracks = self.tracks.len()))]
    pub fn render(
        &self,
        options: &ExportOptions,
        mut progress: impl FnMut(f32),
    ) -> Result<RenderedMix> {
        let sample_rate = options.sample_rate.unwrap_or(self.sample_rate);
        if sample_rate == 0 {
            return Err(anyhow::anyhow!("export sample rate must be greater than zero"));
        }
        let total = total_duration(&self.tracks);
        if total <= 0.0 {
            return Err(anyhow::anyhow!("nothing to export: mix has no duration"));
        }

        let mut graph = Graph::new(sample_rate, self.surround_mode, self.window_frames);
        let soloing = any_solo(&self.tracks);
        for track in &self.tracks {
            graph.build_track(track, is_audible(track, soloing));
            if let Some(source) = self.sources.get(&track.id) {
                graph.attach_source(track.id, SharedSource::clone(source));
            }
        }
        if let Some(track_a) = self.crossfade.track_a {
            graph.set_crossfade_gain(track_a, self.crossfade_state.volume_a);
        }
        if let Some(track_b) = self.crossfade.track_b {
            graph.set_crossfade_gain(track_b, self.crossfade_state.volume_b);
        }
        graph.set_master(self.master_volume, self.master_muted);

        let mut ducking = (self.ducking.enabled
            && graph.install_duck(self.ducking.target_track_id)
            && graph.has_track(self.ducking.trigger_track_id))
        .then(|| DuckingEngine::new(self.ducking.clone()));

        let has_source = |track_id: Uuid| self.sources.contains_key(&track_id);
        for voice in schedule_sources(&self.tracks, 0.0, has_source) {
            graph.start_voice(voice);
        }

        let channels = graph.channels();
        let total_frames = frames_covering(total, sample_rate);
        let block_frames = options.block_frames.max(1);
        let report_every = options.progress_every_blocks.max(1);
        let mut samples = Vec::with_capacity(total_frames * channels);
        let mut block = Vec::with_capacity(block_frames * channels);
        let mut rendered = 0_usize;
        let mut blocks = 0_usize;

        while rendered < total_frames {
            let frames = block_frames.min(total_frames - rendered);
            let block_start = rendered as f64 / f64::from(sample_rate);
            graph.render(block_start, frames, &mut block);
            samples.extend_from_slice(&block);
            rendered += frames;
            blocks += 1;

            if let Some(engine) = ducking.as_mut() {
                let trigger = graph
                    .tap_level(self.ducking.trigger_track_id)
                    .map_or(0.0, |level| level.rms);
                let level = engine.update(trigger, frames as f32 / sample_rate as f32);
                graph.set_duck_level(self.ducking.target_track_id, level);
            }

            if blocks % report_every == 0 && rendered < total_frames {
                progress(rendered as f32 / total_frames as f32);
            }
        }
        progress(1.0);

        debug!(
            frames = total_frames,
            channels, blocks, "offline render completed"
        );
        Ok(RenderedMix {
            sample_rate,
            channels,
            frames: total_frames,
            samples,
        })
    }

    /// Renders and encodes. Compressed formats are encoded as WAV and reported as such.
    pub fn export(
        &self,
        format: ExportFormat,
        options: &ExportOptions,
        progress: impl FnMut(f32),
    ) -> Result<ExportResult> {
        let encoded_as = format.encoded_as();
        if encoded_as != format {
            warn!(requested = %format, encoded = %encoded_as, "no encoder for format, writing wav");
        }
        let rendered = self.render(options, progress)?;
        let stereo = fold_to_stereo(&rendered.samples, rendered.channels);
        let bytes = encode_wav(&stereo, EXPORT_CHANNELS, rendered.sample_rate)?;
        let sha256 = format!("{:x}", Sha256::digest(&bytes));
        info!(
            bytes = bytes.len(),
            frames = rendered.frames,
            %sha256,
            "mix exported"
        );
        Ok(ExportResult {
            bytes,
            format: encoded_as,
            requested_format: format,
            sample_rate: rendered.sample_rate,
            channels: EXPORT_CHANNELS,
            frames: rendered.frames as u64,
            duration_seconds: rendered.frames as f64 / f64::from(rendered.sample_rate),
            sha256,
        })
    }
}
