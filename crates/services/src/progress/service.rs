use std::sync::Arc;

use progress_core::model::{CourseId, LessonId, PackageId, ProgressRecord, UserId};
use storage::repository::{CourseCatalog, PackageDirectory, ProgressRepository};

use super::catalog::LessonCatalogReader;
use super::initializer::{ProgressInitializer, ProgressTarget};
use super::view::EnrichedProgress;
use super::watch_time::{WatchTimeOutcome, WatchTimeUpdater};
use crate::Clock;
use crate::error::ProgressServiceError;

/// Entry point for callers: initialization, watch-time updates and reads.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    initializer: ProgressInitializer,
    updater: WatchTimeUpdater,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressRepository>,
        catalog: Arc<dyn CourseCatalog>,
        packages: Arc<dyn PackageDirectory>,
    ) -> Self {
        let initializer = ProgressInitializer::new(
            clock,
            LessonCatalogReader::new(catalog),
            packages,
            Arc::clone(&progress),
        );
        let updater = WatchTimeUpdater::new(clock, Arc::clone(&progress));
        Self {
            clock,
            initializer,
            updater,
            progress,
        }
    }

    /// Create progress for one course or for every course of a package.
    ///
    /// Exactly one of `course_id` and `package_id` must be given. An empty
    /// result means nothing new could be created.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError`; see [`ProgressInitializer::initialize`].
    pub async fn initialize_progress(
        &self,
        user_id: &UserId,
        course_id: Option<CourseId>,
        package_id: Option<PackageId>,
        period_spec: Option<&str>,
    ) -> Result<Vec<ProgressRecord>, ProgressServiceError> {
        let target = ProgressTarget::from_options(course_id, package_id)?;
        self.initializer
            .initialize(user_id, &target, period_spec)
            .await
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError`; see [`WatchTimeUpdater::update`].
    pub async fn update_lesson_watch_time(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        lesson_id: &LessonId,
        seconds: f64,
    ) -> Result<WatchTimeOutcome, ProgressServiceError> {
        self.updater
            .update(user_id, course_id, lesson_id, seconds)
            .await
    }

    /// Progress of a user in a course with derived metrics, if any exists.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` on persistence failures.
    pub async fn get_course_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<EnrichedProgress>, ProgressServiceError> {
        let now = self.clock.now();
        let record = self.progress.get_progress(user_id, course_id).await?;
        Ok(record.map(|record| EnrichedProgress::from_record(record, now)))
    }

    /// Every progress record of a user, ordered by course id.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` on persistence failures.
    pub async fn list_user_progress(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<EnrichedProgress>, ProgressServiceError> {
        let now = self.clock.now();
        let records = self.progress.list_progress(user_id).await?;
        Ok(records
            .into_iter()
            .map(|record| EnrichedProgress::from_record(record, now))
            .collect())
    }
}
