#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod error;
pub mod video_progress;

pub use app_services::AppServices;
pub use config::TrackerConfig;
pub use error::{AppServicesError, ConfigError};
pub use video_progress::{
    PlaybackSurface, ResumeChoice, ResumePrompt, SessionState, SurfaceEvent, VideoProgressTracker,
};
