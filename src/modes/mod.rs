pub mod control;
pub mod play;
pub mod train;

pub use control::{
    EpisodeSummary, NullObserver, SessionControl, SessionObserver, SessionState,
    VisualizationSpeed, playback_interval,
};
pub use play::PlaybackSession;
pub use train::{SessionReport, TrainingSession};
