use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::{
    assets::SharedSource,
    dsp::Compressor,
    effects::{EffectStage, build_stage},
    model::{EffectKind, SurroundMode, Track},
    monitor::{AnalysisTap, Level, TrackLevel},
    spatial::{ChannelGains, SpatialMix, linear_pan_gains, spatialize},
    transport::ScheduledSource,
};

/// Stable reference to a stage record. A stale handle never aliases a newer stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainStage {
    pub volume: f32,
    pub silenced: bool,
    pub crossfade: f32,
}

impl GainStage {
    #[must_use]
    pub fn linear(&self) -> f32 {
        if self.silenced {
            0.0
        } else {
            self.volume * self.crossfade
        }
    }
}

#[derive(Debug, Clone)]
pub enum Stage {
    Gain(GainStage),
    Duck {
        level: f32,
    },
    Effect {
        effect_id: Uuid,
        kind: EffectKind,
        stage: EffectStage,
    },
    Pan {
        pan: f32,
    },
    Spatial {
        gains: ChannelGains,
        multipliers: Vec<f32>,
    },
    Limiter(Compressor),
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    stage: Option<Stage>,
}

#[derive(Debug, Clone, Default)]
pub struct StageArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl StageArena {
    pub fn insert(&mut self, stage: Stage) -> StageHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.stage = Some(stage);
            return StageHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            stage: Some(stage),
        });
        StageHandle {
            index,
            generation: 0,
        }
    }

    pub fn remove(&mut self, handle: StageHandle) -> Option<Stage> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let stage = slot.stage.take()?;
        self.free.push(handle.index);
        self.live -= 1;
        Some(stage)
    }

    #[must_use]
    pub fn get(&self, handle: StageHandle) -> Option<&Stage> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.stage.as_ref()
    }

    pub fn get_mut(&mut self, handle: StageHandle) -> Option<&mut Stage> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.stage.as_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

/// Ordered view of one track's signal path, source first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageDescriptor {
    Source {
        loaded: bool,
        active: bool,
    },
    Gain {
        linear: f32,
    },
    Duck {
        level: f32,
    },
    Effect {
        effect_id: Uuid,
        kind: EffectKind,
        linear_gain: Option<f32>,
    },
    Pan {
        pan: f32,
    },
    Spatial {
        gains: ChannelGains,
    },
    Limiter {
        threshold_db: f32,
        ratio: f32,
        knee_db: f32,
        attack_sec: f32,
        release_sec: f32,
    },
    Master {
        volume: f32,
        muted: bool,
    },
}

#[derive(Debug, Clone)]
struct TrackGraph {
    gain: StageHandle,
    duck: Option<StageHandle>,
    effects: Vec<StageHandle>,
    output: StageHandle,
    limiter: StageHandle,
    tap: AnalysisTap,
}

/// The live mix: per-track stage chains summed into one master bus.
#[derive(Debug, Clone)]
pub struct Graph {
    sample_rate: u32,
    mode: SurroundMode,
    window_frames: usize,
    arena: StageArena,
    tracks: BTreeMap<Uuid, TrackGraph>,
    sources: HashMap<Uuid, SharedSource>,
    voices: HashMap<Uuid, ScheduledSource>,
    master_volume: f32,
    master_muted: bool,
    stereo_scratch: Vec<f32>,
    track_scratch: Vec<f32>,
}

impl Graph {
    #[must_use]
    pub fn new(sample_rate: u32, mode: SurroundMode, window_frames: usize) -> Self {
        Self {
            sample_rate,
            mode,
            window_frames,
            arena: StageArena::default(),
            tracks: BTreeMap::new(),
            sources: HashMap::new(),
            voices: HashMap::new(),
            master_volume: 1.0,
            master_muted: false,
            stereo_scratch: Vec::new(),
            track_scratch: Vec::new(),
        }
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn surround_mode(&self) -> SurroundMode {
        self.mode
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        self.mode.channel_count()
    }

    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.arena.len()
    }

    #[must_use]
    pub fn has_track(&self, track_id: Uuid) -> bool {
        self.tracks.contains_key(&track_id)
    }

    /// Builds gain, pan/spatial and limiter stages for `track`, then wires its effects.
    pub fn build_track(&mut self, track: &Track, audible: bool) {
        self.teardown_track(track.id);
        let gain = self.arena.insert(Stage::Gain(GainStage {
            volume: track.volume,
            silenced: !audible,
            crossfade: 1.0,
        }));
        let output_stage = self.output_stage(track);
        let output = self.arena.insert(output_stage);
        let limiter = self
            .arena
            .insert(Stage::Limiter(Compressor::limiter(self.sample_rate)));
        self.tracks.insert(
            track.id,
            TrackGraph {
                gain,
                duck: None,
                effects: Vec::new(),
                output,
                limiter,
                tap: AnalysisTap::new(self.window_frames),
            },
        );
        self.rebuild_chain(track);
        debug!(track_id = %track.id, stages = self.arena.len(), "track graph built");
    }

    /// Drops every stage the track owns along with its voice. Returns `false` for an unknown track.
    pub fn teardown_track(&mut self, track_id: Uuid) -> bool {
        let Some(graph) = self.tracks.remove(&track_id) else {
            return false;
        };
        let handles = [graph.gain, graph.output, graph.limiter]
            .into_iter()
            .chain(graph.duck)
            .chain(graph.effects);
        for handle in handles {
            self.arena.remove(handle);
        }
        self.voices.remove(&track_id);
        debug!(%track_id, stages = self.arena.len(), "track graph torn down");
        true
    }

    /// Discards the track's effect stages and re-instantiates them in ascending `order`.
    pub fn rebuild_chain(&mut self, track: &Track) -> bool {
        let Some(graph) = self.tracks.get_mut(&track.id) else {
            return false;
        };
        for handle in graph.effects.drain(..) {
            self.arena.remove(handle);
        }
        let mut wired = Vec::new();
        for spec in track.ordered_effects() {
            if let Some(stage) = build_stage(spec, self.sample_rate) {
                wired.push(self.arena.insert(Stage::Effect {
                    effect_id: spec.id,
                    kind: spec.kind,
                    stage,
                }));
            }
        }
        info!(
            track_id = %track.id,
            declared = track.effects.len(),
            wired = wired.len(),
            "effect chain rebuilt"
        );
        graph.effects = wired;
        true
    }

    fn output_stage(&self, track: &Track) -> Stage {
        match spatialize(track.position, self.mode) {
            SpatialMix::Stereo { pan } => Stage::Pan { pan },
            SpatialMix::Surround { gains } => Stage::Spatial {
                gains,
                multipliers: gains.channel_multipliers(self.mode),
            },
        }
    }

    fn gain_stage_mut(&mut self, track_id: Uuid) -> Option<&mut GainStage> {
        let handle = self.tracks.get(&track_id)?.gain;
        match self.arena.get_mut(handle)? {
            Stage::Gain(gain) => Some(gain),
            _ => None,
        }
    }

    pub fn set_volume(&mut self, track_id: Uuid, volume: f32) -> bool {
        self.gain_stage_mut(track_id)
            .map(|gain| gain.volume = volume)
            .is_some()
    }

    pub fn set_silenced(&mut self, track_id: Uuid, silenced: bool) -> bool {
        self.gain_stage_mut(track_id)
            .map(|gain| gain.silenced = silenced)
            .is_some()
    }

    pub fn set_crossfade_gain(&mut self, track_id: Uuid, gain: f32) -> bool {
        self.gain_stage_mut(track_id)
            .map(|stage| stage.crossfade = gain)
            .is_some()
    }

    /// Refreshes the pan or spatial stage from the track's pan and position.
    pub fn refresh_output(&mut self, track: &Track) -> bool {
        let Some(handle) = self.tracks.get(&track.id).map(|graph| graph.output) else {
            return false;
        };
        let next = self.output_stage(track);
        match self.arena.get_mut(handle) {
            Some(stage) => {
                *stage = next;
                true
            }
            None => false,
        }
    }

    /// Switches the bus layout and swaps every track's output stage to match.
    pub fn set_surround_mode<'a>(
        &mut self,
        mode: SurroundMode,
        tracks: impl IntoIterator<Item = &'a Track>,
    ) {
        self.mode = mode;
        for track in tracks {
            self.refresh_output(track);
        }
        info!(?mode, channels = mode.channel_count(), "surround mode applied");
    }

    pub fn install_duck(&mut self, track_id: Uuid) -> bool {
        let Some(graph) = self.tracks.get_mut(&track_id) else {
            return false;
        };
        if graph.duck.is_none() {
            graph.duck = Some(self.arena.insert(Stage::Duck { level: 1.0 }));
            debug!(%track_id, "duck stage installed");
        }
        true
    }

    pub fn remove_duck(&mut self, track_id: Uuid) -> bool {
        let Some(handle) = self
            .tracks
            .get_mut(&track_id)
            .and_then(|graph| graph.duck.take())
        else {
            return false;
        };
        self.arena.remove(handle);
        debug!(%track_id, "duck stage removed");
        true
    }

    pub fn set_duck_level(&mut self, track_id: Uuid, level: f32) -> bool {
        let Some(handle) = self.tracks.get(&track_id).and_then(|graph| graph.duck) else {
            return false;
        };
        match self.arena.get_mut(handle) {
            Some(Stage::Duck { level: current }) => {
                *current = level.clamp(0.0, 1.0);
                true
            }
            _ => false,
        }
    }

    pub fn set_master(&mut self, volume: f32, muted: bool) {
        self.master_volume = volume;
        self.master_muted = muted;
    }

    pub fn attach_source(&mut self, track_id: Uuid, source: SharedSource) {
        self.sources.insert(track_id, source);
    }

    pub fn remove_source(&mut self, track_id: Uuid) -> Option<SharedSource> {
        self.sources.remove(&track_id)
    }

    #[must_use]
    pub fn source(&self, track_id: Uuid) -> Option<&SharedSource> {
        self.sources.get(&track_id)
    }

    #[must_use]
    pub fn has_source(&self, track_id: Uuid) -> bool {
        self.sources.contains_key(&track_id)
    }

    /// Arms a voice for a track that has both a graph and a decoded source.
    pub fn start_voice(&mut self, voice: ScheduledSource) -> bool {
        if !self.tracks.contains_key(&voice.track_id) || !self.sources.contains_key(&voice.track_id)
        {
            debug!(track_id = %voice.track_id, "voice not started, graph or source missing");
            return false;
        }
        trace!(track_id = %voice.track_id, starts_at = voice.starts_at, "voice started");
        self.voices.insert(voice.track_id, voice);
        true
    }

    pub fn stop_voice(&mut self, track_id: Uuid) -> bool {
        self.voices.remove(&track_id).is_some()
    }

    pub fn stop_all_voices(&mut self) {
        self.voices.clear();
    }

    #[must_use]
    pub fn is_voice_active(&self, track_id: Uuid) -> bool {
        self.voices.contains_key(&track_id)
    }

    #[must_use]
    pub fn signal_path(&self, track_id: Uuid) -> Option<Vec<StageDescriptor>> {
        let graph = self.tracks.get(&track_id)?;
        let mut path = vec![StageDescriptor::Source {
            loaded: self.sources.contains_key(&track_id),
            active: self.voices.contains_key(&track_id),
        }];
        let handles = std::iter::once(graph.gain)
            .chain(graph.duck)
            .chain(graph.effects.iter().copied())
            .chain([graph.output, graph.limiter]);
        for handle in handles {
            if let Some(stage) = self.arena.get(handle) {
                path.push(describe(stage));
            }
        }
        path.push(StageDescriptor::Master {
            volume: self.master_volume,
            muted: self.master_muted,
        });
        Some(path)
    }

    #[must_use]
    pub fn tap_level(&self, track_id: Uuid) -> Option<Level> {
        self.tracks.get(&track_id).map(|graph| graph.tap.levels())
    }

    #[must_use]
    pub fn track_levels(&self) -> Vec<TrackLevel> {
        self.tracks
            .iter()
            .map(|(track_id, graph)| {
                let level = graph.tap.levels();
                TrackLevel {
                    track_id: *track_id,
                    peak: level.peak,
                    rms: level.rms,
                }
            })
            .collect()
    }

    pub fn clear_taps(&mut self) {
        for graph in self.tracks.values_mut() {
            graph.tap.clear();
        }
    }

    /// Flushes filter, delay and envelope state so no tail carries across a discontinuity.
    pub fn reset_processing(&mut self) {
        let handles = self
            .tracks
            .values()
            .flat_map(|graph| graph.effects.iter().copied().chain([graph.limiter]));
        for handle in handles {
            match self.arena.get_mut(handle) {
                Some(Stage::Effect { stage, .. }) => stage.reset(),
                Some(Stage::Limiter(limiter)) => limiter.reset(),
                _ => {}
            }
        }
        trace!("stage state flushed");
    }

    /// Renders `frames` frames starting at session time `block_start` into `out`
    /// (interleaved, `channels()` wide). Finished voices are released afterwards.
    ///
    /// Each track's tap reads the stereo signal after its effects and before placement,
    /// so levels do not depend on pan or on the bus layout.
    pub fn render(&mut self, block_start: f64, frames: usize, out: &mut Vec<f32>) {
        let channels = self.channels();
        out.clear();
        out.resize(frames * channels, 0.0);

        let Self {
            sample_rate,
            arena,
            tracks,
            sources,
            voices,
            stereo_scratch,
            track_scratch,
            ..
        } = self;
        let rate = f64::from((*sample_rate).max(1));

        for (track_id, graph) in tracks.iter_mut() {
            let playing = voices.get(track_id).zip(sources.get(track_id));
            let Some((voice, source)) = playing else {
                stereo_scratch.clear();
                stereo_scratch.resize(frames * 2, 0.0);
                graph.tap.push_frames(stereo_scratch, 2);
                continue;
            };

            stereo_scratch.clear();
            stereo_scratch.resize(frames * 2, 0.0);
            for (index, frame) in stereo_scratch.chunks_exact_mut(2).enumerate() {
                let t = block_start + index as f64 / rate;
                if let Some((position, envelope)) = voice.sample_at(t) {
                    let [left, right] = source.frame_at(position);
                    frame[0] = left * envelope;
                    frame[1] = right * envelope;
                }
            }

            let pre_output = std::iter::once(graph.gain)
                .chain(graph.duck)
                .chain(graph.effects.iter().copied());
            for handle in pre_output {
                match arena.get_mut(handle) {
                    Some(Stage::Gain(gain)) => {
                        let linear = gain.linear();
                        stereo_scratch.iter_mut().for_each(|sample| *sample *= linear);
                    }
                    Some(Stage::Duck { level }) => {
                        let level = *level;
                        stereo_scratch.iter_mut().for_each(|sample| *sample *= level);
                    }
                    Some(Stage::Effect { stage, .. }) => stage.process(stereo_scratch, 2),
                    _ => {}
                }
            }
            graph.tap.push_frames(stereo_scratch, 2);

            track_scratch.clear();
            track_scratch.resize(frames * channels, 0.0);
            match arena.get(graph.output) {
                Some(Stage::Pan { pan }) => {
                    let [left_gain, right_gain] = linear_pan_gains(*pan);
                    for (dst, src) in track_scratch
                        .chunks_exact_mut(channels)
                        .zip(stereo_scratch.chunks_exact(2))
                    {
                        dst[0] = src[0] * left_gain;
                        dst[1] = src[1] * right_gain;
                    }
                }
                Some(Stage::Spatial { multipliers, .. }) => {
                    for (dst, src) in track_scratch
                        .chunks_exact_mut(channels)
                        .zip(stereo_scratch.chunks_exact(2))
                    {
                        let mono = (src[0] + src[1]) * 0.5;
                        for (sample, multiplier) in dst.iter_mut().zip(multipliers.iter()) {
                            *sample = mono * multiplier;
                        }
                    }
                }
                _ => {}
            }

            if let Some(Stage::Limiter(limiter)) = arena.get_mut(graph.limiter) {
                limiter.process(track_scratch, channels);
            }
            for (mixed, sample) in out.iter_mut().zip(track_scratch.iter()) {
                *mixed += *sample;
            }
        }

        let master = if self.master_muted {
            0.0
        } else {
            self.master_volume
        };
        out.iter_mut().for_each(|sample| *sample *= master);

        let block_end = block_start + frames as f64 / f64::from(self.sample_rate.max(1));
        self.voices.retain(|track_id, voice| {
            let keep = !voice.is_finished(block_end);
            if !keep {
                trace!(%track_id, "voice reached track end");
            }
            keep
        });
    }
}

fn describe(stage: &Stage) -> StageDescriptor {
    match stage {
        Stage::Gain(gain) => StageDescriptor::Gain {
            linear: gain.linear(),
        },
        Stage::Duck { level } => StageDescriptor::Duck { level: *level },
        Stage::Effect {
            effect_id,
            kind,
            stage,
        } => StageDescriptor::Effect {
            effect_id: *effect_id,
            kind: *kind,
            linear_gain: stage.linear_gain(),
        },
        Stage::Pan { pan } => StageDescriptor::Pan { pan: *pan },
        Stage::Spatial { gains, .. } => StageDescriptor::Spatial { gains: *gains },
        Stage::Limiter(limiter) => StageDescriptor::Limiter {
            threshold_db: limiter.threshold_db(),
            ratio: limiter.ratio(),
            knee_db: limiter.knee_db(),
            attack_sec: limiter.attack_sec(),
            release_sec: limiter.release_sec(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        assets::DecodedAudio,
        model::{EffectSpec, NewTrack, TrackKind},
    };

    fn track() -> Track {
        Track::from_request(
            NewTrack {
                duration: 1.0,
                ..NewTrack::named("lead", TrackKind::Music)
            },
            0,
        )
    }

    #[test]
    fn stale_handles_do_not_alias_reused_slots() {
        let mut arena = StageArena::default();
        let first = arena.insert(Stage::Duck { level: 0.5 });
        assert!(arena.remove(first).is_some());
        let second = arena.insert(Stage::Pan { pan: 0.0 });
        assert!(arena.get(first).is_none());
        assert!(arena.remove(first).is_none());
        assert!(matches!(arena.get(second), Some(Stage::Pan { .. })));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn chain_follows_effect_order_and_skips_unrendered_kinds() {
        let mut track = track();
        let a = EffectSpec::new(EffectKind::Gain).with_order(1);
        let b = EffectSpec::new(EffectKind::Compressor).with_order(0);
        let reverb = EffectSpec::new(EffectKind::Reverb).with_order(2);
        track.effects = vec![a.clone(), b.clone(), reverb];

        let mut graph = Graph::new(48_000, SurroundMode::Stereo, 256);
        graph.build_track(&track, true);
        let effect_ids: Vec<Uuid> = graph
            .signal_path(track.id)
            .expect("path")
            .into_iter()
            .filter_map(|stage| match stage {
                StageDescriptor::Effect { effect_id, .. } => Some(effect_id),
                _ => None,
            })
            .collect();
        assert_eq!(effect_ids, vec![b.id, a.id]);
    }

    #[test]
    fn teardown_releases_every_stage() {
        let track = track();
        let mut graph = Graph::new(48_000, SurroundMode::Stereo, 256);
        graph.build_track(&track, true);
        graph.install_duck(track.id);
        assert_eq!(graph.stage_count(), 4);
        assert!(graph.teardown_track(track.id));
        assert_eq!(graph.stage_count(), 0);
        assert!(!graph.teardown_track(track.id));
    }

    #[test]
    fn volume_scales_rendered_output() {
        let track = track();
        let mut graph = Graph::new(1_000, SurroundMode::Stereo, 64);
        graph.build_track(&track, true);
        graph.set_volume(track.id, 0.25);
        graph.attach_source(
            track.id,
            Arc::new(DecodedAudio::from_stereo(1_000, vec![0.2; 2_000])),
        );
        assert!(graph.start_voice(ScheduledSource::for_track(&track, 0.0).expect("voice")));
        let mut out = Vec::new();
        graph.render(0.0, 10, &mut out);
        assert_eq!(out.len(), 20);
        assert!(out.iter().all(|sample| (sample - 0.05).abs() < 1e-6));
    }

    #[test]
    fn meters_ignore_pan_and_bus_layout() {
        let mut track = track();
        track.apply(crate::model::TrackPatch {
            pan: Some(1.0),
            ..crate::model::TrackPatch::default()
        });
        let mut levels = Vec::new();
        for mode in [SurroundMode::Stereo, SurroundMode::Surround51, SurroundMode::Surround71] {
            let mut graph = Graph::new(1_000, mode, 64);
            graph.build_track(&track, true);
            graph.attach_source(
                track.id,
                Arc::new(DecodedAudio::from_stereo(1_000, vec![0.25; 2_000])),
            );
            assert!(graph.start_voice(ScheduledSource::for_track(&track, 0.0).expect("voice")));
            let mut out = Vec::new();
            graph.render(0.0, 64, &mut out);
            levels.push(graph.tap_level(track.id).expect("tap"));
        }
        for level in levels {
            assert!((level.peak - 0.25).abs() < 1e-6);
            assert!((level.rms - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn stereo_pan_follows_horizontal_position() {
        let mut track = track();
        track.apply(crate::model::TrackPatch {
            position: Some(crate::model::Position3d::new(-1.0, 1.0, 0.0)),
            ..crate::model::TrackPatch::default()
        });
        let mut graph = Graph::new(1_000, SurroundMode::Stereo, 64);
        graph.build_track(&track, true);
        graph.attach_source(
            track.id,
            Arc::new(DecodedAudio::from_stereo(1_000, vec![0.2; 2_000])),
        );
        assert!(graph.start_voice(ScheduledSource::for_track(&track, 0.0).expect("voice")));
        let mut out = Vec::new();
        graph.render(0.0, 4, &mut out);
        for frame in out.chunks_exact(2) {
            assert!((frame[0] - 0.2).abs() < 1e-6);
            assert_eq!(frame[1], 0.0);
        }
    }

    #[test]
    fn reset_flushes_delay_tails() {
        let mut track = track();
        track.effects = vec![
            EffectSpec::new(EffectKind::Delay)
                .with_param("timeMs", 2.0)
                .with_param("mix", 1.0),
        ];
        // eight loud frames, then silence
        let mut samples = vec![0.0; 2_000];
        samples[..16].fill(0.2);
        let mut graph = Graph::new(1_000, SurroundMode::Stereo, 64);
        graph.build_track(&track, true);
        graph.attach_source(track.id, Arc::new(DecodedAudio::from_stereo(1_000, samples)));
        assert!(graph.start_voice(ScheduledSource::for_track(&track, 0.0).expect("voice")));
        let mut out = Vec::new();
        graph.render(0.0, 8, &mut out);
        assert!(out.iter().skip(4).any(|sample| *sample > 0.1));

        graph.reset_processing();
        graph.render(0.008, 8, &mut out);
        assert!(out.iter().all(|sample| sample.abs() < 1e-6));
    }

    #[test]
    fn surround_output_spreads_across_bus() {
        let track = track();
        let mut graph = Graph::new(1_000, SurroundMode::Stereo, 64);
        graph.build_track(&track, true);
        graph.set_surround_mode(SurroundMode::Surround51, [&track]);
        assert_eq!(graph.channels(), 6);
        let path = graph.signal_path(track.id).expect("path");
        assert!(
            path.iter()
                .any(|stage| matches!(stage, StageDescriptor::Spatial { .. }))
        );
    }
}
