use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::{
    export::ExportFormat,
    model::{EffectSpec, Track},
    recording::RecordingBlob,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum MixEvent {
    #[serde(rename = "track:added")]
    TrackAdded { track: Track },
    #[serde(rename = "track:removed")]
    TrackRemoved { track_id: Uuid },
    #[serde(rename = "track:updated")]
    TrackUpdated { track: Track },
    #[serde(rename = "effect:added")]
    EffectAdded { track_id: Uuid, effect: EffectSpec },
    #[serde(rename = "effect:removed")]
    EffectRemoved { track_id: Uuid, effect_id: Uuid },
    #[serde(rename = "effect:updated")]
    EffectUpdated { track_id: Uuid, effect: EffectSpec },
    #[serde(rename = "playback:started")]
    PlaybackStarted { current_time: f64 },
    #[serde(rename = "playback:paused")]
    PlaybackPaused { current_time: f64 },
    #[serde(rename = "playback:stopped")]
    PlaybackStopped,
    #[serde(rename = "playback:seeked")]
    PlaybackSeeked { current_time: f64 },
    #[serde(rename = "timeupdate")]
    TimeUpdate { current_time: f64 },
    #[serde(rename = "levelupdate")]
    LevelUpdate { track_id: Uuid, peak: f32, rms: f32 },
    #[serde(rename = "recording:started")]
    RecordingStarted,
    #[serde(rename = "recording:stopped")]
    RecordingStopped { blob: RecordingBlob },
    #[serde(rename = "export:started")]
    ExportStarted { format: ExportFormat },
    #[serde(rename = "export:progress")]
    ExportProgress { progress: f32 },
    #[serde(rename = "export:completed")]
    ExportCompleted { format: ExportFormat, bytes: usize },
    #[serde(rename = "error")]
    Error { message: String },
}

impl MixEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TrackAdded { .. } => "track:added",
            Self::TrackRemoved { .. } => "track:removed",
            Self::TrackUpdated { .. } => "track:updated",
            Self::EffectAdded { .. } => "effect:added",
            Self::EffectRemoved { .. } => "effect:removed",
            Self::EffectUpdated { .. } => "effect:updated",
            Self::PlaybackStarted { .. } => "playback:started",
            Self::PlaybackPaused { .. } => "playback:paused",
            Self::PlaybackStopped => "playback:stopped",
            Self::PlaybackSeeked { .. } => "playback:seeked",
            Self::TimeUpdate { .. } => "timeupdate",
            Self::LevelUpdate { .. } => "levelupdate",
            Self::RecordingStarted => "recording:started",
            Self::RecordingStopped { .. } => "recording:stopped",
            Self::ExportStarted { .. } => "export:started",
            Self::ExportProgress { .. } => "export:progress",
            Self::ExportCompleted { .. } => "export:completed",
            Self::Error { .. } => "error",
        }
    }
}

/// Fan-out of [`MixEvent`]s to any number of subscribers. Dropped receivers are pruned on emit.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<MixEvent>>,
}

impl EventBus {
    pub fn subscribe(&mut self) -> Receiver<MixEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers.push(sender);
        debug!(subscribers = self.subscribers.len(), "event subscriber added");
        receiver
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn emit(&mut self, event: MixEvent) {
        trace!(event = event.name(), "emit");
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_wire_names() {
        let json = serde_json::to_value(MixEvent::TimeUpdate { current_time: 1.5 })
            .expect("serialize");
        assert_eq!(json["event"], "timeupdate");
        assert_eq!(json["current_time"], 1.5);
        let stopped = serde_json::to_value(MixEvent::PlaybackStopped).expect("serialize");
        assert_eq!(stopped["event"], "playback:stopped");
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut bus = EventBus::default();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        bus.emit(MixEvent::RecordingStarted);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().expect("event"), MixEvent::RecordingStarted);
    }
}
