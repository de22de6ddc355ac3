use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    assets::{DecodedAudio, SharedSource, SourceLoaded, SourceLoader},
    config::MixConfig,
    crossfade::CrossfadeEngine,
    ducking::DuckingEngine,
    events::{EventBus, MixEvent},
    export::{ExportFormat, ExportOptions, ExportResult, OfflineMix},
    graph::{Graph, StageDescriptor},
    model::{
        CrossfadeConfig, CrossfadeState, DuckingConfig, DuckingState, EffectPatch, EffectSpec,
        MixingState, NewEffect, NewTrack, Position3d, SurroundMode, SyncConfig, SyncState, Track,
        TrackPatch, TransportState, total_duration,
    },
    monitor::TrackLevel,
    recording::{Recorder, RecordingBlob},
    sync::SyncEngine,
    transport::{ScheduledSource, Transport, any_solo, is_audible, schedule_sources},
};

#[derive(Debug, Error)]
pub enum MixError {
    #[error("mixing session is not initialized")]
    NotInitialized,
    #[error("audio backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("failed to load source for track {track_id}: {reason}")]
    SourceLoad { track_id: Uuid, reason: String },
    #[error("export failed: {0}")]
    Export(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<anyhow::Error> for MixError {
    fn from(value: anyhow::Error) -> Self {
        Self::Io(format!("{value:#}"))
    }
}

/// Platform output the session renders for. Hosts plug in their device layer here.
pub trait AudioBackend {
    /// Opens the output; returns the sample rate the device actually runs at.
    fn open(&mut self, sample_rate: u32, channels: usize) -> anyhow::Result<u32>;

    fn close(&mut self) {}
}

/// Backend with no device; rendering is driven by explicit `render_block` calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineBackend;

impl AudioBackend for OfflineBackend {
    fn open(&mut self, sample_rate: u32, channels: usize) -> anyhow::Result<u32> {
        debug!(sample_rate, channels, "offline backend opened");
        Ok(sample_rate)
    }
}

pub type SharedSession = Arc<Mutex<MixSession>>;

/// One mixing session: the track list, its live graph and the engines acting on it.
///
/// Constructed once by the host and torn down with [`MixSession::shutdown`].
#[derive(Debug)]
pub struct MixSession {
    config: MixConfig,
    tracks: Vec<Track>,
    graph: Option<Graph>,
    sources: HashMap<Uuid, SharedSource>,
    loader: SourceLoader,
    transport: Transport,
    master_volume: f32,
    master_muted: bool,
    sample_rate: u32,
    surround_mode: SurroundMode,
    total_duration: f64,
    ducking: DuckingEngine,
    crossfade: CrossfadeEngine,
    sync: SyncEngine,
    recorder: Recorder,
    events: EventBus,
    last_error: Option<String>,
    render_buffer: Vec<f32>,
}

impl MixSession {
    #[must_use]
    pub fn new(config: MixConfig) -> Self {
        let sample_rate = config.audio.sample_rate;
        let surround_mode = config.audio.surround_mode;
        Self {
            config,
            tracks: Vec::new(),
            graph: None,
            sources: HashMap::new(),
            loader: SourceLoader::default(),
            transport: Transport::default(),
            master_volume: 1.0,
            master_muted: false,
            sample_rate,
            surround_mode,
            total_duration: 0.0,
            ducking: DuckingEngine::new(DuckingConfig::default()),
            crossfade: CrossfadeEngine::default(),
            sync: SyncEngine::new(sample_rate),
            recorder: Recorder::default(),
            events: EventBus::default(),
            last_error: None,
            render_buffer: Vec::new(),
        }
    }

    #[must_use]
    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    #[must_use]
    pub fn config(&self) -> &MixConfig {
        &self.config
    }

    pub fn subscribe(&mut self) -> Receiver<MixEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.graph.is_some()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.transport.current_time()
    }

    #[must_use]
    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[must_use]
    pub fn track(&self, track_id: Uuid) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id == track_id)
    }

    /// Opens the backend and builds the live graph for every known track.
    ///
    /// On failure the session stays uninitialized, `error` is emitted and the call may be retried.
    #[instrument(skip(self, backend), fields(sample_rate = self.sample_rate, mode = ?self.surround_mode))]
    pub fn initialize(&mut self, backend: &mut dyn AudioBackend) -> Result<(), MixError> {
        if self.graph.is_some() {
            debug!("session already initialized");
            return Ok(());
        }

        let opened = backend
            .open(self.sample_rate, self.surround_mode.channel_count())
            .and_then(|rate| {
                if rate == 0 {
                    Err(anyhow::anyhow!("backend reported a zero sample rate"))
                } else {
                    Ok(rate)
                }
            });
        let sample_rate = match opened {
            Ok(rate) => rate,
            Err(open_error) => {
                let message = format!("{open_error:#}");
                error!(error = %message, "audio backend failed to open");
                self.fail(MixError::BackendUnavailable(message.clone()).to_string());
                return Err(MixError::BackendUnavailable(message));
            }
        };

        if sample_rate != self.sample_rate {
            info!(
                requested = self.sample_rate,
                actual = sample_rate,
                "backend runs at a different rate"
            );
        }
        self.sample_rate = sample_rate;
        self.sync.set_sample_rate(sample_rate);

        let mut graph = Graph::new(
            sample_rate,
            self.surround_mode,
            self.config.monitor.window_frames,
        );
        let soloing = any_solo(&self.tracks);
        for track in &self.tracks {
            graph.build_track(track, is_audible(track, soloing));
            if let Some(source) = self.sources.get(&track.id) {
                graph.attach_source(track.id, SharedSource::clone(source));
            }
        }
        graph.set_master(self.master_volume, self.master_muted);
        let ducking = self.ducking.config();
        if ducking.enabled && !graph.install_duck(ducking.target_track_id) {
            warn!(target_track_id = %ducking.target_track_id, "ducking target has no graph");
        }
        self.graph = Some(graph);
        self.apply_crossfade_gains();
        self.last_error = None;
        info!(tracks = self.tracks.len(), "mixing session initialized");
        Ok(())
    }

    /// Stops playback and recording and drops the live graph. Track data is kept.
    #[instrument(skip(self, backend))]
    pub fn shutdown(&mut self, backend: &mut dyn AudioBackend) {
        if self.recorder.is_recording() {
            if let Err(recording_error) = self.recorder.stop() {
                warn!(error = %recording_error, "recording discarded during shutdown");
            }
        }
        self.transport.stop();
        self.ducking.reset();
        if self.graph.take().is_some() {
            backend.close();
            info!("mixing session shut down");
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MixingState {
        MixingState {
            tracks: self.tracks.clone(),
            master_volume: self.master_volume,
            master_muted: self.master_muted,
            transport: self.transport.state(),
            is_playing: self.transport.is_playing(),
            current_time: self.transport.current_time(),
            total_duration: self.total_duration,
            graph_ready: self.graph.is_some(),
            sample_rate: self.sample_rate,
            surround_mode: self.surround_mode,
            is_recording: self.recorder.is_recording(),
            recording_duration: self.recorder.duration_seconds(),
            last_error: self.last_error.clone(),
        }
    }

    #[must_use]
    pub fn signal_path(&self, track_id: Uuid) -> Option<Vec<StageDescriptor>> {
        self.graph.as_ref()?.signal_path(track_id)
    }

    #[must_use]
    pub fn is_voice_active(&self, track_id: Uuid) -> bool {
        self.graph
            .as_ref()
            .is_some_and(|graph| graph.is_voice_active(track_id))
    }

    // ---- tracks ----

    #[instrument(skip(self, request), fields(name = %request.name, kind = ?request.kind))]
    pub fn add_track(&mut self, request: NewTrack) -> Uuid {
        let track = Track::from_request(request, self.tracks.len());
        let track_id = track.id;
        if let Some(graph) = self.graph.as_mut() {
            let soloing = any_solo(&self.tracks) || track.solo;
            graph.build_track(&track, is_audible(&track, soloing));
        }
        if !track.source.is_empty() {
            self.loader.spawn(track_id, track.source.clone());
        }
        self.tracks.push(track.clone());
        self.recompute_total();
        self.refresh_audibility();
        info!(%track_id, order = track.order, "track added");
        self.events.emit(MixEvent::TrackAdded { track });
        track_id
    }

    #[instrument(skip(self), fields(%track_id))]
    pub fn remove_track(&mut self, track_id: Uuid) -> bool {
        let Some(index) = self.index_of(track_id) else {
            debug!("remove ignored, unknown track");
            return false;
        };
        self.tracks.remove(index);
        for (order, track) in self.tracks.iter_mut().enumerate() {
            track.order = order;
        }
        self.sources.remove(&track_id);
        if let Some(graph) = self.graph.as_mut() {
            graph.teardown_track(track_id);
            graph.remove_source(track_id);
        }
        let ducking = self.ducking.config();
        if ducking.enabled
            && (ducking.target_track_id == track_id || ducking.trigger_track_id == track_id)
        {
            warn!("ducking disabled, its track was removed");
            self.disable_ducking();
        }
        self.recompute_total();
        self.refresh_audibility();
        info!(remaining = self.tracks.len(), "track removed");
        self.events.emit(MixEvent::TrackRemoved { track_id });
        true
    }

    /// Merges `patch` into the track and pushes the changes into its live stages.
    #[instrument(skip(self, patch), fields(%track_id))]
    pub fn update_track(&mut self, track_id: Uuid, patch: TrackPatch) -> Option<Track> {
        let Some(index) = self.index_of(track_id) else {
            debug!("update ignored, unknown track");
            return None;
        };
        let timing_changed = patch.touches_timing();
        let effects_changed = patch.effects.is_some();
        let source_changed = patch
            .source
            .as_ref()
            .is_some_and(|source| *source != self.tracks[index].source);

        let track = &mut self.tracks[index];
        track.apply(patch);
        let track = track.clone();

        if let Some(graph) = self.graph.as_mut() {
            graph.set_volume(track_id, track.volume);
            graph.refresh_output(&track);
            if effects_changed {
                graph.rebuild_chain(&track);
            }
        }

        if source_changed {
            self.sources.remove(&track_id);
            if let Some(graph) = self.graph.as_mut() {
                graph.remove_source(track_id);
                graph.stop_voice(track_id);
            }
            if !track.source.is_empty() {
                self.loader.spawn(track_id, track.source.clone());
            }
        }

        if timing_changed {
            self.recompute_total();
            self.reschedule(&track);
        }
        self.refresh_audibility();

        debug!(volume = track.volume, pan = track.pan, muted = track.muted, solo = track.solo, "track updated");
        self.events.emit(MixEvent::TrackUpdated {
            track: track.clone(),
        });
        Some(track)
    }

    /// Reassigns `order` from a full permutation of the current track ids.
    #[instrument(skip(self, ordered_ids), fields(count = ordered_ids.len()))]
    pub fn reorder_tracks(&mut self, ordered_ids: &[Uuid]) -> bool {
        let current: Vec<Uuid> = self.tracks.iter().map(|track| track.id).collect();
        if !is_permutation(&current, ordered_ids) {
            warn!("reorder ignored, ids are not a permutation of the tracks");
            return false;
        }
        for track in &mut self.tracks {
            if let Some(order) = ordered_ids.iter().position(|id| *id == track.id) {
                track.order = order;
            }
        }
        self.tracks.sort_by_key(|track| track.order);
        for (track, previous) in self.tracks.iter().zip(&current) {
            if track.id != *previous {
                self.events.emit(MixEvent::TrackUpdated {
                    track: track.clone(),
                });
            }
        }
        info!("tracks reordered");
        true
    }

    /// Copies every field except id and order; effects get fresh ids.
    #[instrument(skip(self), fields(%track_id))]
    pub fn duplicate_track(&mut self, track_id: Uuid) -> Option<Uuid> {
        let original = self.track(track_id)?.clone();
        let mut copy = original.clone();
        copy.id = Uuid::new_v4();
        copy.order = self.tracks.len();
        copy.name = format!("{} (Copy)", original.name);
        for effect in &mut copy.effects {
            effect.id = Uuid::new_v4();
        }
        let copy_id = copy.id;

        if let Some(source) = self.sources.get(&track_id).cloned() {
            self.sources.insert(copy_id, SharedSource::clone(&source));
            if let Some(graph) = self.graph.as_mut() {
                graph.attach_source(copy_id, source);
            }
        }
        if let Some(graph) = self.graph.as_mut() {
            let soloing = any_solo(&self.tracks);
            graph.build_track(&copy, is_audible(&copy, soloing));
        }
        self.tracks.push(copy.clone());
        self.recompute_total();
        self.reschedule(&copy);
        info!(%copy_id, "track duplicated");
        self.events.emit(MixEvent::TrackAdded { track: copy });
        Some(copy_id)
    }

    pub fn set_track_volume(&mut self, track_id: Uuid, volume: f32) -> bool {
        self.patch(track_id, TrackPatch {
            volume: Some(volume),
            ..TrackPatch::default()
        })
    }

    pub fn set_track_pan(&mut self, track_id: Uuid, pan: f32) -> bool {
        self.patch(track_id, TrackPatch {
            pan: Some(pan),
            ..TrackPatch::default()
        })
    }

    pub fn set_track_muted(&mut self, track_id: Uuid, muted: bool) -> bool {
        self.patch(track_id, TrackPatch {
            muted: Some(muted),
            ..TrackPatch::default()
        })
    }

    pub fn set_track_solo(&mut self, track_id: Uuid, solo: bool) -> bool {
        self.patch(track_id, TrackPatch {
            solo: Some(solo),
            ..TrackPatch::default()
        })
    }

    pub fn set_track_fade_in(&mut self, track_id: Uuid, seconds: f64) -> bool {
        self.patch(track_id, TrackPatch {
            fade_in: Some(seconds),
            ..TrackPatch::default()
        })
    }

    pub fn set_track_fade_out(&mut self, track_id: Uuid, seconds: f64) -> bool {
        self.patch(track_id, TrackPatch {
            fade_out: Some(seconds),
            ..TrackPatch::default()
        })
    }

    pub fn set_track_position(&mut self, track_id: Uuid, x: f32, y: f32, z: f32) -> bool {
        self.patch(track_id, TrackPatch {
            position: Some(Position3d::new(x, y, z)),
            ..TrackPatch::default()
        })
    }

    fn patch(&mut self, track_id: Uuid, patch: TrackPatch) -> bool {
        self.update_track(track_id, patch).is_some()
    }

    #[instrument(skip(self))]
    pub fn set_surround_mode(&mut self, mode: SurroundMode) {
        if mode == self.surround_mode {
            return;
        }
        self.surround_mode = mode;
        if let Some(graph) = self.graph.as_mut() {
            graph.set_surround_mode(mode, &self.tracks);
        }
        info!(channels = mode.channel_count(), "surround mode changed");
    }

    // ---- sources ----

    /// Points the track at `source` and starts decoding it in the background.
    #[instrument(skip(self, source), fields(%track_id))]
    pub fn load_source(&mut self, track_id: Uuid, source: impl Into<String>) -> bool {
        let source = source.into();
        let Some(index) = self.index_of(track_id) else {
            debug!("load ignored, unknown track");
            return false;
        };
        self.tracks[index].source = source.clone();
        self.sources.remove(&track_id);
        if let Some(graph) = self.graph.as_mut() {
            graph.remove_source(track_id);
            graph.stop_voice(track_id);
        }
        self.loader.spawn(track_id, source);
        true
    }

    #[must_use]
    pub fn pending_sources(&self) -> usize {
        self.loader.pending()
    }

    /// Applies every finished load without blocking. Returns how many were applied.
    pub fn poll_sources(&mut self) -> usize {
        let mut applied = 0;
        while let Some(loaded) = self.loader.try_next() {
            self.apply_loaded(loaded);
            applied += 1;
        }
        applied
    }

    /// Blocks until all pending loads finish or `timeout` passes.
    pub fn wait_for_sources(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut applied = 0;
        while self.loader.pending() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(pending = self.loader.pending(), "timed out waiting for sources");
                break;
            }
            match self.loader.next_timeout(remaining) {
                Some(loaded) => {
                    self.apply_loaded(loaded);
                    applied += 1;
                }
                None => continue,
            }
        }
        applied
    }

    fn apply_loaded(&mut self, loaded: SourceLoaded) {
        let SourceLoaded {
            track_id,
            source,
            result,
        } = loaded;
        let Some(index) = self.index_of(track_id) else {
            debug!(%track_id, "loaded source dropped, track no longer exists");
            return;
        };
        if self.tracks[index].source != source {
            debug!(%track_id, "stale source load dropped");
            return;
        }
        match result {
            Ok(audio) => {
                self.attach_source(track_id, audio);
            }
            Err(load_error) => {
                let failure = MixError::SourceLoad {
                    track_id,
                    reason: format!("{load_error:#}"),
                };
                warn!(error = %failure, "source load failed, track will be silent");
                self.tracks[index].duration = 0.0;
                let track = self.tracks[index].clone();
                self.recompute_total();
                self.fail(failure.to_string());
                self.events.emit(MixEvent::TrackUpdated { track });
            }
        }
    }

    /// Installs already-decoded audio for a track. A zero track duration adopts the source length.
    #[instrument(skip(self, audio), fields(%track_id, frames = audio.frames()))]
    pub fn attach_source(&mut self, track_id: Uuid, audio: DecodedAudio) -> bool {
        let Some(index) = self.index_of(track_id) else {
            debug!("attach ignored, unknown track");
            return false;
        };
        let source: SharedSource = Arc::new(audio);
        let adopted = self.tracks[index].duration <= 0.0;
        if adopted {
            self.tracks[index].duration = source.duration_seconds();
            self.recompute_total();
        }
        self.sources.insert(track_id, SharedSource::clone(&source));
        if let Some(graph) = self.graph.as_mut() {
            graph.attach_source(track_id, source);
        }
        let track = self.tracks[index].clone();
        self.reschedule(&track);
        info!(duration = track.duration, adopted, "source attached");
        if adopted {
            self.events.emit(MixEvent::TrackUpdated { track });
        }
        true
    }

    // ---- effects ----

    #[instrument(skip(self, effect), fields(%track_id, kind = ?effect.kind))]
    pub fn add_effect(&mut self, track_id: Uuid, effect: NewEffect) -> Option<Uuid> {
        let index = self.index_of(track_id)?;
        let track = &mut self.tracks[index];
        let spec = EffectSpec {
            id: Uuid::new_v4(),
            kind: effect.kind,
            enabled: effect.enabled,
            order: track.effects.len(),
            params: effect.params,
        };
        let effect_id = spec.id;
        track.effects.push(spec.clone());
        self.rebuild_chain(index);
        info!(%effect_id, "effect added");
        self.events.emit(MixEvent::EffectAdded {
            track_id,
            effect: spec,
        });
        Some(effect_id)
    }

    #[instrument(skip(self), fields(%track_id, %effect_id))]
    pub fn remove_effect(&mut self, track_id: Uuid, effect_id: Uuid) -> bool {
        let Some(index) = self.index_of(track_id) else {
            return false;
        };
        let track = &mut self.tracks[index];
        let before = track.effects.len();
        track.effects.retain(|effect| effect.id != effect_id);
        if track.effects.len() == before {
            debug!("remove ignored, unknown effect");
            return false;
        }
        track.renumber_effects();
        self.rebuild_chain(index);
        info!("effect removed");
        self.events.emit(MixEvent::EffectRemoved {
            track_id,
            effect_id,
        });
        true
    }

    #[instrument(skip(self, patch), fields(%track_id, %effect_id))]
    pub fn update_effect(
        &mut self,
        track_id: Uuid,
        effect_id: Uuid,
        patch: EffectPatch,
    ) -> Option<EffectSpec> {
        let index = self.index_of(track_id)?;
        let effect = self.tracks[index]
            .effects
            .iter_mut()
            .find(|effect| effect.id == effect_id)?;
        effect.apply(patch);
        let effect = effect.clone();
        self.rebuild_chain(index);
        debug!(enabled = effect.enabled, "effect updated");
        self.events.emit(MixEvent::EffectUpdated {
            track_id,
            effect: effect.clone(),
        });
        Some(effect)
    }

    /// Reassigns effect order from a full permutation of the track's effect ids.
    #[instrument(skip(self, ordered_ids), fields(%track_id))]
    pub fn reorder_effects(&mut self, track_id: Uuid, ordered_ids: &[Uuid]) -> bool {
        let Some(index) = self.index_of(track_id) else {
            return false;
        };
        let track = &mut self.tracks[index];
        let current: Vec<Uuid> = track.effects.iter().map(|effect| effect.id).collect();
        if !is_permutation(&current, ordered_ids) {
            warn!("effect reorder ignored, ids are not a permutation of the chain");
            return false;
        }
        for effect in &mut track.effects {
            if let Some(order) = ordered_ids.iter().position(|id| *id == effect.id) {
                effect.order = order;
            }
        }
        track.renumber_effects();
        let track = track.clone();
        self.rebuild_chain(index);
        info!("effects reordered");
        self.events.emit(MixEvent::TrackUpdated { track });
        true
    }

    fn rebuild_chain(&mut self, index: usize) {
        if let Some(graph) = self.graph.as_mut() {
            graph.rebuild_chain(&self.tracks[index]);
        }
    }

    // ---- transport ----

    #[instrument(skip(self))]
    pub fn play(&mut self) -> bool {
        if self.graph.is_none() {
            warn!("play ignored, session not initialized");
            return false;
        }
        if !self.transport.play() {
            debug!("already playing");
            return false;
        }
        self.start_voices();
        let current_time = self.transport.current_time();
        info!(current_time, "playback started");
        self.events.emit(MixEvent::PlaybackStarted { current_time });
        true
    }

    #[instrument(skip(self))]
    pub fn pause(&mut self) -> bool {
        if self.graph.is_none() || !self.transport.pause() {
            debug!("pause ignored");
            return false;
        }
        if let Some(graph) = self.graph.as_mut() {
            graph.stop_all_voices();
        }
        let current_time = self.transport.current_time();
        info!(current_time, "playback paused");
        self.events.emit(MixEvent::PlaybackPaused { current_time });
        true
    }

    #[instrument(skip(self))]
    pub fn stop(&mut self) -> bool {
        let Some(graph) = self.graph.as_mut() else {
            warn!("stop ignored, session not initialized");
            return false;
        };
        graph.stop_all_voices();
        graph.clear_taps();
        graph.reset_processing();
        self.transport.stop();
        self.ducking.reset();
        let target = self.ducking.config().target_track_id;
        graph.set_duck_level(target, 1.0);
        self.sync.update(0.0);
        info!("playback stopped");
        self.events.emit(MixEvent::PlaybackStopped);
        true
    }

    #[instrument(skip(self))]
    pub fn seek(&mut self, seconds: f64) -> bool {
        if self.graph.is_none() {
            warn!("seek ignored, session not initialized");
            return false;
        }
        let current_time = self.transport.seek(seconds);
        if let Some(graph) = self.graph.as_mut() {
            graph.reset_processing();
        }
        if self.transport.is_playing() {
            self.start_voices();
        }
        self.sync.update(current_time);
        info!(current_time, "playhead moved");
        self.events.emit(MixEvent::PlaybackSeeked { current_time });
        true
    }

    pub fn set_master_volume(&mut self, volume: f32) -> f32 {
        self.master_volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.apply_master();
        debug!(volume = self.master_volume, "master volume set");
        self.master_volume
    }

    pub fn set_master_muted(&mut self, muted: bool) {
        self.master_muted = muted;
        self.apply_master();
        debug!(muted, "master mute set");
    }

    fn apply_master(&mut self) {
        if let Some(graph) = self.graph.as_mut() {
            graph.set_master(self.master_volume, self.master_muted);
        }
    }

    /// Processes one block of `frames` frames, as the device callback would, and advances the playhead.
    pub fn render_block(&mut self, frames: usize) -> Option<&[f32]> {
        let graph = self.graph.as_mut()?;
        let channels = graph.channels();
        graph.render(
            self.transport.current_time(),
            frames,
            &mut self.render_buffer,
        );
        self.recorder.push(&self.render_buffer, channels);

        let block_seconds = frames as f64 / f64::from(self.sample_rate.max(1));
        if self.transport.advance(block_seconds, self.total_duration) {
            info!(total_duration = self.total_duration, "end of mix reached");
            self.stop();
        } else if self.transport.is_playing() {
            self.sync.update(self.transport.current_time());
        }
        Some(&self.render_buffer)
    }

    /// One monitor cycle: publishes track levels and drives ducking from the trigger's RMS.
    pub fn tick_monitor(&mut self, dt: f64) -> Vec<TrackLevel> {
        let Some(graph) = self.graph.as_mut() else {
            return Vec::new();
        };
        let levels = graph.track_levels();

        let ducking = self.ducking.config();
        if ducking.enabled {
            let (target, trigger) = (ducking.target_track_id, ducking.trigger_track_id);
            let trigger_rms = graph.tap_level(trigger).map_or(0.0, |level| level.rms);
            let level = self.ducking.update(trigger_rms, dt as f32);
            graph.set_duck_level(target, level);
        }

        for level in &levels {
            self.events.emit(MixEvent::LevelUpdate {
                track_id: level.track_id,
                peak: level.peak,
                rms: level.rms,
            });
        }
        if self.transport.is_playing() {
            self.events.emit(MixEvent::TimeUpdate {
                current_time: self.transport.current_time(),
            });
        }
        levels
    }

    // ---- ducking / crossfade / sync ----

    /// Replaces the ducking configuration wholesale.
    #[instrument(skip(self, config), fields(enabled = config.enabled, target = %config.target_track_id, trigger = %config.trigger_track_id))]
    pub fn set_ducking(&mut self, config: DuckingConfig) -> DuckingState {
        let previous_target = self.ducking.config().target_track_id;
        if let Some(graph) = self.graph.as_mut() {
            graph.remove_duck(previous_target);
            if config.enabled && !graph.install_duck(config.target_track_id) {
                warn!("ducking target has no graph");
            }
        }
        if config.enabled && self.track(config.trigger_track_id).is_none() {
            warn!("ducking trigger track is unknown");
        }
        self.ducking = DuckingEngine::new(config);
        info!(
            target_level = self.ducking.target_level(),
            "ducking configured"
        );
        self.ducking.state()
    }

    /// Forces Idle, removes the target's duck stage and restores unity gain.
    #[instrument(skip(self))]
    pub fn disable_ducking(&mut self) {
        let mut config = self.ducking.config().clone();
        if let Some(graph) = self.graph.as_mut() {
            graph.remove_duck(config.target_track_id);
        }
        config.enabled = false;
        self.ducking = DuckingEngine::new(config);
        info!("ducking disabled");
    }

    #[must_use]
    pub fn ducking_state(&self) -> DuckingState {
        self.ducking.state()
    }

    #[instrument(skip(self, config), fields(curve = ?config.curve_type))]
    pub fn set_crossfade(&mut self, config: CrossfadeConfig) -> CrossfadeState {
        let previous = self.crossfade.config().clone();
        if let Some(graph) = self.graph.as_mut() {
            for track_id in [previous.track_a, previous.track_b].into_iter().flatten() {
                graph.set_crossfade_gain(track_id, 1.0);
            }
        }
        let state = self.crossfade.set_config(config);
        self.apply_crossfade_gains();
        state
    }

    pub fn set_crossfade_progress(&mut self, progress: f32) -> CrossfadeState {
        let state = self.crossfade.set_progress(progress);
        self.apply_crossfade_gains();
        state
    }

    #[must_use]
    pub fn crossfade_state(&self) -> CrossfadeState {
        self.crossfade.state()
    }

    fn apply_crossfade_gains(&mut self) {
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        let state = self.crossfade.state();
        let config = self.crossfade.config();
        if let Some(track_a) = config.track_a {
            graph.set_crossfade_gain(track_a, state.volume_a);
        }
        if let Some(track_b) = config.track_b {
            graph.set_crossfade_gain(track_b, state.volume_b);
        }
    }

    pub fn set_sync(&mut self, config: SyncConfig) -> SyncState {
        self.sync.set_config(config, self.transport.current_time())
    }

    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }

    #[must_use]
    pub fn quantize(&self, seconds: f64) -> f64 {
        self.sync.quantize(seconds)
    }

    pub fn report_external_position(&mut self, external_seconds: f64) -> SyncState {
        let current_time = self.transport.current_time();
        self.sync
            .report_external_position(external_seconds, current_time)
    }

    // ---- recording ----

    #[instrument(skip(self))]
    pub fn start_recording(&mut self) -> Result<bool, MixError> {
        if self.graph.is_none() {
            warn!("recording needs an initialized session");
            return Err(MixError::NotInitialized);
        }
        if !self.recorder.start(self.sample_rate) {
            debug!("already recording");
            return Ok(false);
        }
        self.events.emit(MixEvent::RecordingStarted);
        Ok(true)
    }

    #[instrument(skip(self))]
    pub fn stop_recording(&mut self) -> Result<Option<RecordingBlob>, MixError> {
        match self.recorder.stop() {
            Ok(Some(blob)) => {
                self.events
                    .emit(MixEvent::RecordingStopped { blob: blob.clone() });
                Ok(Some(blob))
            }
            Ok(None) => Ok(None),
            Err(encode_error) => {
                let failure = MixError::from(encode_error);
                self.fail(failure.to_string());
                Err(failure)
            }
        }
    }

    // ---- export ----

    /// Renders the mix offline and encodes it. The live graph is not touched.
    #[instrument(skip(self, options), fields(%format, tracks = self.tracks.len()))]
    pub fn export_mix(
        &mut self,
        format: ExportFormat,
        options: &ExportOptions,
    ) -> Result<ExportResult, MixError> {
        self.events.emit(MixEvent::ExportStarted { format });
        let mix = OfflineMix {
            tracks: self.tracks.clone(),
            sources: self.sources.clone(),
            sample_rate: self.sample_rate,
            surround_mode: self.surround_mode,
            window_frames: self.config.monitor.window_frames,
            master_volume: self.master_volume,
            master_muted: self.master_muted,
            ducking: self.ducking.config().clone(),
            crossfade: self.crossfade.config().clone(),
            crossfade_state: self.crossfade.state(),
        };

        let events = &mut self.events;
        let exported = mix.export(format, options, |progress| {
            events.emit(MixEvent::ExportProgress { progress });
        });
        match exported {
            Ok(result) => {
                self.events.emit(MixEvent::ExportCompleted {
                    format: result.format,
                    bytes: result.bytes.len(),
                });
                Ok(result)
            }
            Err(export_error) => {
                let failure = MixError::Export(format!("{export_error:#}"));
                error!(error = %failure, "export failed");
                self.fail(failure.to_string());
                Err(failure)
            }
        }
    }

    // ---- internals ----

    fn index_of(&self, track_id: Uuid) -> Option<usize> {
        self.tracks.iter().position(|track| track.id == track_id)
    }

    fn fail(&mut self, message: String) {
        self.last_error = Some(message.clone());
        self.events.emit(MixEvent::Error { message });
    }

    fn recompute_total(&mut self) {
        let total = total_duration(&self.tracks);
        if (total - self.total_duration).abs() > f64::EPSILON {
            debug!(
                previous = self.total_duration,
                total, "total duration changed"
            );
        }
        self.total_duration = total;
    }

    /// Re-evaluates mute/solo for every gain stage and starts voices for tracks that became audible.
    fn refresh_audibility(&mut self) {
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        let soloing = any_solo(&self.tracks);
        let playing = self.transport.is_playing();
        let now = self.transport.current_time();
        for track in &self.tracks {
            let audible = is_audible(track, soloing);
            graph.set_silenced(track.id, !audible);
            if !audible {
                graph.stop_voice(track.id);
            } else if playing && !graph.is_voice_active(track.id) {
                if let Some(voice) = ScheduledSource::for_track(track, now) {
                    graph.start_voice(voice);
                }
            }
        }
    }

    /// Restarts a playing track's voice against its current timing.
    fn reschedule(&mut self, track: &Track) {
        if !self.transport.is_playing() {
            return;
        }
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        graph.stop_voice(track.id);
        if is_audible(track, any_solo(&self.tracks)) {
            if let Some(voice) = ScheduledSource::for_track(track, self.transport.current_time()) {
                graph.start_voice(voice);
            }
        }
    }

    fn start_voices(&mut self) {
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        graph.stop_all_voices();
        let now = self.transport.current_time();
        let voices = schedule_sources(&self.tracks, now, |track_id| graph.has_source(track_id));
        let scheduled = voices.len();
        for voice in voices {
            graph.start_voice(voice);
        }
        debug!(scheduled, now, "voices scheduled");
    }
}

fn is_permutation(current: &[Uuid], proposed: &[Uuid]) -> bool {
    if current.len() != proposed.len() {
        return false;
    }
    let current: HashSet<&Uuid> = current.iter().collect();
    let proposed_set: HashSet<&Uuid> = proposed.iter().collect();
    proposed_set.len() == proposed.len() && current == proposed_set
}
