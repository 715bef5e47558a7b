//! Shared error types for the services crate.

use serde::Serialize;
use thiserror::Error;

use progress_core::model::{CourseId, LessonId, PackageId, UserId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Caller-facing failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressErrorKind {
    InvalidArgument,
    NotFound,
    OutOfRange,
    StorageFailure,
    InternalError,
}

impl ProgressErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::OutOfRange => "out_of_range",
            Self::StorageFailure => "storage_failure",
            Self::InternalError => "internal_error",
        }
    }
}

/// Errors emitted by the progress services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error("course_id and package_id are mutually exclusive")]
    ConflictingTarget,

    #[error("either course_id or package_id is required")]
    MissingTarget,

    #[error("watch time must be a finite, non-negative number of seconds, got {0}")]
    InvalidWatchTime(f64),

    #[error("lesson {lesson_id} is not part of course {course_id}")]
    UnknownLesson {
        course_id: CourseId,
        lesson_id: LessonId,
    },

    #[error("no progress for user {user_id} in course {course_id}")]
    RecordNotFound { user_id: UserId, course_id: CourseId },

    #[error("package {0} not found")]
    PackageNotFound(PackageId),

    #[error("package {0} has no courses")]
    EmptyPackage(PackageId),

    #[error("watch time {watch_time}s exceeds duration {duration}s of lesson {lesson_id}")]
    OutOfRange {
        lesson_id: LessonId,
        watch_time: f64,
        duration: f64,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("could not initialize progress for course {course_id}: {reason}")]
    Internal { course_id: CourseId, reason: String },
}

impl ProgressServiceError {
    #[must_use]
    pub fn kind(&self) -> ProgressErrorKind {
        match self {
            Self::ConflictingTarget
            | Self::MissingTarget
            | Self::InvalidWatchTime(_)
            | Self::UnknownLesson { .. } => ProgressErrorKind::InvalidArgument,
            Self::RecordNotFound { .. } | Self::PackageNotFound(_) | Self::EmptyPackage(_) => {
                ProgressErrorKind::NotFound
            }
            Self::OutOfRange { .. } => ProgressErrorKind::OutOfRange,
            Self::Storage(_) => ProgressErrorKind::StorageFailure,
            Self::Internal { .. } => ProgressErrorKind::InternalError,
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
