mod ids;
mod lesson;
mod package;
mod progress;

pub use ids::{CourseId, LessonId, PackageId, ParseIdError, ProgressId, UserId};

pub use lesson::{CatalogLesson, CourseLessons, LessonKind};
pub use package::{PackageInfo, PricingEntry};
pub use progress::{
    LessonSlot, PersistedProgress, ProgressDraft, ProgressRecord, ProgressRecordError,
};
