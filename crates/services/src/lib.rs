#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod progress;

pub use progress_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, ProgressErrorKind, ProgressServiceError};
pub use progress::{
    EnrichedProgress, LessonProgress, ProgressService, ProgressTarget, WatchTimeOutcome,
};
