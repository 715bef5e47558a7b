use std::sync::Arc;

use progress_core::model::{CourseId, LessonId, UserId};
use serde::Serialize;
use storage::repository::ProgressRepository;
use tracing::{debug, warn};

use crate::Clock;
use crate::error::ProgressServiceError;

/// Result reported back to the client after a watch-time update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchTimeOutcome {
    pub success: bool,
    pub message: String,
}

impl WatchTimeOutcome {
    fn updated() -> Self {
        Self {
            success: true,
            message: "watch time updated".into(),
        }
    }

    fn vanished() -> Self {
        Self {
            success: false,
            message: "progress record not found".into(),
        }
    }
}

/// Applies observed lesson watch times with monotonic-max merging.
#[derive(Clone)]
pub struct WatchTimeUpdater {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
}

impl WatchTimeUpdater {
    #[must_use]
    pub fn new(clock: Clock, progress: Arc<dyn ProgressRepository>) -> Self {
        Self { clock, progress }
    }

    /// Record that `seconds` of `lesson_id` have been watched.
    ///
    /// Smaller values than the stored one are accepted and leave it unchanged.
    /// If the record disappears between validation and the atomic update, the
    /// outcome reports failure instead of returning an error.
    ///
    /// # Errors
    ///
    /// - `InvalidWatchTime` for negative or non-finite input
    /// - `RecordNotFound` if the user has no progress in the course
    /// - `UnknownLesson` if the lesson is not part of the record
    /// - `OutOfRange` if `seconds` exceeds the lesson duration
    /// - `Storage` on persistence failures
    pub async fn update(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        lesson_id: &LessonId,
        seconds: f64,
    ) -> Result<WatchTimeOutcome, ProgressServiceError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ProgressServiceError::InvalidWatchTime(seconds));
        }

        let record = self
            .progress
            .get_progress(user_id, course_id)
            .await?
            .ok_or_else(|| ProgressServiceError::RecordNotFound {
                user_id: user_id.clone(),
                course_id: course_id.clone(),
            })?;

        let duration = record.lesson_duration(lesson_id).ok_or_else(|| {
            ProgressServiceError::UnknownLesson {
                course_id: course_id.clone(),
                lesson_id: lesson_id.clone(),
            }
        })?;
        if seconds > duration {
            return Err(ProgressServiceError::OutOfRange {
                lesson_id: lesson_id.clone(),
                watch_time: seconds,
                duration,
            });
        }

        let applied = self
            .progress
            .apply_watch_time(user_id, course_id, lesson_id, seconds, self.clock.now())
            .await?;

        let Some(updated) = applied else {
            warn!(
                user_id = %user_id,
                course_id = %course_id,
                lesson_id = %lesson_id,
                "progress record vanished before watch time could be applied"
            );
            return Ok(WatchTimeOutcome::vanished());
        };

        let stored = updated.watch_time(lesson_id);
        if stored > record.watch_time(lesson_id) {
            debug!(
                user_id = %user_id,
                course_id = %course_id,
                lesson_id = %lesson_id,
                watch_time = stored,
                total = updated.total_watch_time(),
                "watch time advanced"
            );
        } else {
            debug!(
                user_id = %user_id,
                course_id = %course_id,
                lesson_id = %lesson_id,
                requested = seconds,
                stored,
                "watch time unchanged"
            );
        }
        Ok(WatchTimeOutcome::updated())
    }
}
