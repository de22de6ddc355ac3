pub mod assets;
pub mod config;
pub mod crossfade;
pub mod diagnostics;
pub mod dsp;
pub mod ducking;
pub mod effects;
pub mod events;
pub mod export;
pub mod fixtures;
pub mod graph;
pub mod model;
pub mod monitor;
pub mod recording;
pub mod session;
pub mod spatial;
pub mod sync;
pub mod time;
pub mod transport;

pub use assets::{DecodedAudio, decode_source, waveform_peaks};
pub use config::MixConfig;
pub use diagnostics::{TelemetryGuard, init_tracing, init_tracing_from_config, init_tracing_with_options};
pub use events::MixEvent;
pub use export::{ExportFormat, ExportOptions, ExportResult, export_to_path};
pub use graph::StageDescriptor;
pub use model::{
    CrossfadeConfig, CrossfadeCurve, CrossfadeState, CurvePoint, DuckingConfig, DuckingState,
    EffectKind, EffectPatch, EffectSpec, MixingState, NewEffect, NewTrack, ParamValue, Position3d,
    QuantizeUnit, SurroundMode, SyncConfig, SyncState, Track, TrackKind, TrackPatch,
    TransportState,
};
pub use monitor::{MonitorTask, TrackLevel};
pub use recording::RecordingBlob;
pub use session::{AudioBackend, MixError, MixSession, OfflineBackend, SharedSession};
pub use spatial::{ChannelGains, SpatialMix, spatialize};
