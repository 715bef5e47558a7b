mod catalog;
mod initializer;
mod service;
mod view;
mod watch_time;

pub use catalog::LessonCatalogReader;
pub use initializer::{ProgressInitializer, ProgressTarget};
pub use service::ProgressService;
pub use view::{EnrichedProgress, LessonProgress};
pub use watch_time::{WatchTimeOutcome, WatchTimeUpdater};
