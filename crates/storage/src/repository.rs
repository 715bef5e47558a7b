use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{
    CatalogLesson, CourseId, LessonId, PackageId, PackageInfo, ProgressDraft, ProgressId,
    ProgressRecord, ProgressRecordError, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Progress Record Store: one record per (user, course).
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Insert freshly initialized records.
    ///
    /// Drafts whose (user, course) pair already has a record are skipped; the
    /// returned records are the newly created ones, with store-assigned ids.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the batch cannot be written.
    async fn insert_progress_batch(
        &self,
        drafts: &[ProgressDraft],
    ) -> Result<Vec<ProgressRecord>, StorageError>;

    /// Fetch the record for a (user, course) pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on I/O failure or if the stored record violates
    /// a record invariant.
    async fn get_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// All records of a user, ordered by course id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on I/O failure or invalid stored records.
    async fn list_progress(&self, user_id: &UserId) -> Result<Vec<ProgressRecord>, StorageError>;

    /// Atomically merge one lesson's watch time and recompute the course total.
    ///
    /// Applies `watch_time = max(watch_time, min(seconds, duration))` and
    /// `total = clamp(sum(watch_time), 0, course_duration)` in a single
    /// store-side operation. Returns `Ok(None)` if the record or the lesson
    /// no longer exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on I/O failure.
    async fn apply_watch_time(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        lesson_id: &LessonId,
        seconds: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<ProgressRecord>, StorageError>;
}

/// Read access to the external course catalog.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// Lessons of a course in catalog order, of every kind.
    ///
    /// Unknown courses yield an empty list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be reached.
    async fn lessons_by_course(
        &self,
        course_id: &CourseId,
    ) -> Result<Vec<CatalogLesson>, StorageError>;
}

/// Read access to the external package directory.
#[async_trait]
pub trait PackageDirectory: Send + Sync {
    /// Fetch a package with its course ids and pricing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the directory cannot be reached.
    async fn get_package(&self, package_id: &PackageId)
    -> Result<Option<PackageInfo>, StorageError>;
}

/// Write access to the catalog, used by seeding and tests.
#[async_trait]
pub trait CatalogWriter: Send + Sync {
    /// Replace a course and its lesson list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(
        &self,
        course_id: &CourseId,
        title: &str,
        lessons: &[CatalogLesson],
    ) -> Result<(), StorageError>;

    /// Replace a package, its course list and its pricing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the package cannot be stored.
    async fn upsert_package(&self, package: &PackageInfo, name: &str) -> Result<(), StorageError>;
}

pub(crate) fn invalid_record(err: ProgressRecordError) -> StorageError {
    StorageError::Serialization(err.to_string())
}

#[derive(Default)]
struct ProgressTable {
    next_id: u64,
    records: HashMap<(UserId, CourseId), ProgressRecord>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<ProgressTable>>,
    courses: Arc<Mutex<HashMap<CourseId, Vec<CatalogLesson>>>>,
    packages: Arc<Mutex<HashMap<PackageId, PackageInfo>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn insert_progress_batch(
        &self,
        drafts: &[ProgressDraft],
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let key = (draft.user_id().clone(), draft.course_id().clone());
            if guard.records.contains_key(&key) {
                continue;
            }
            guard.next_id += 1;
            let record = draft.clone().into_record(ProgressId::new(guard.next_id));
            guard.records.insert(key, record.clone());
            created.push(record);
        }
        Ok(created)
    }

    async fn get_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .records
            .get(&(user_id.clone(), course_id.clone()))
            .cloned())
    }

    async fn list_progress(&self, user_id: &UserId) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut records: Vec<ProgressRecord> = guard
            .records
            .values()
            .filter(|record| record.user_id() == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.course_id().cmp(b.course_id()));
        Ok(records)
    }

    async fn apply_watch_time(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        lesson_id: &LessonId,
        seconds: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let Some(record) = guard.records.get_mut(&(user_id.clone(), course_id.clone())) else {
            return Ok(None);
        };
        match record.merge_watch_time(lesson_id, seconds, at) {
            Ok(_) => Ok(Some(record.clone())),
            Err(ProgressRecordError::UnknownLesson(_)) => Ok(None),
            Err(e) => Err(invalid_record(e)),
        }
    }
}

#[async_trait]
impl CourseCatalog for InMemoryRepository {
    async fn lessons_by_course(
        &self,
        course_id: &CourseId,
    ) -> Result<Vec<CatalogLesson>, StorageError> {
        let guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(course_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl PackageDirectory for InMemoryRepository {
    async fn get_package(
        &self,
        package_id: &PackageId,
    ) -> Result<Option<PackageInfo>, StorageError> {
        let guard = self
            .packages
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(package_id).cloned())
    }
}

#[async_trait]
impl CatalogWriter for InMemoryRepository {
    async fn upsert_course(
        &self,
        course_id: &CourseId,
        _title: &str,
        lessons: &[CatalogLesson],
    ) -> Result<(), StorageError> {
        let mut guard = self
            .courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(course_id.clone(), lessons.to_vec());
        Ok(())
    }

    async fn upsert_package(&self, package: &PackageInfo, _name: &str) -> Result<(), StorageError> {
        let mut guard = self
            .packages
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(package.id.clone(), package.clone());
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub catalog: Arc<dyn CourseCatalog>,
    pub packages: Arc<dyn PackageDirectory>,
    pub catalog_writer: Arc<dyn CatalogWriter>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repo(InMemoryRepository::new())
    }

    /// Share one repository value across every repository role.
    pub fn from_repo<R>(repo: R) -> Self
    where
        R: ProgressRepository + CourseCatalog + PackageDirectory + CatalogWriter + Clone + 'static,
    {
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let catalog: Arc<dyn CourseCatalog> = Arc::new(repo.clone());
        let packages: Arc<dyn PackageDirectory> = Arc::new(repo.clone());
        let catalog_writer: Arc<dyn CatalogWriter> = Arc::new(repo);
        Self {
            progress,
            catalog,
            packages,
            catalog_writer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::CourseLessons;
    use progress_core::time::fixed_now;

    fn draft(user: &str, course: &str) -> ProgressDraft {
        let lessons = CourseLessons::from_catalog(vec![
            CatalogLesson::video("L1", Some(300.0)),
            CatalogLesson::video("L2", Some(300.0)),
        ]);
        ProgressDraft::new(
            UserId::new(user),
            CourseId::new(course),
            None,
            None,
            lessons,
            fixed_now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn batch_insert_assigns_ids_and_skips_existing_pairs() {
        let repo = InMemoryRepository::new();
        let first = repo
            .insert_progress_batch(&[draft("u1", "a"), draft("u1", "b")])
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_ne!(first[0].id(), first[1].id());

        let second = repo
            .insert_progress_batch(&[draft("u1", "a"), draft("u2", "a")])
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].user_id(), &UserId::new("u2"));
    }

    #[tokio::test]
    async fn apply_watch_time_is_monotonic() {
        let repo = InMemoryRepository::new();
        repo.insert_progress_batch(&[draft("u1", "a")]).await.unwrap();
        let (user, course, l1) = (UserId::new("u1"), CourseId::new("a"), LessonId::new("L1"));

        let rec = repo
            .apply_watch_time(&user, &course, &l1, 200.0, fixed_now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.total_watch_time(), 200.0);

        let rec = repo
            .apply_watch_time(&user, &course, &l1, 120.0, fixed_now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.watch_time(&l1), 200.0);
    }

    #[tokio::test]
    async fn apply_watch_time_reports_missing_record_or_lesson() {
        let repo = InMemoryRepository::new();
        repo.insert_progress_batch(&[draft("u1", "a")]).await.unwrap();

        let missing_record = repo
            .apply_watch_time(
                &UserId::new("u1"),
                &CourseId::new("zzz"),
                &LessonId::new("L1"),
                1.0,
                fixed_now(),
            )
            .await
            .unwrap();
        assert!(missing_record.is_none());

        let missing_lesson = repo
            .apply_watch_time(
                &UserId::new("u1"),
                &CourseId::new("a"),
                &LessonId::new("L9"),
                1.0,
                fixed_now(),
            )
            .await
            .unwrap();
        assert!(missing_lesson.is_none());
    }

    #[tokio::test]
    async fn list_progress_orders_by_course() {
        let repo = InMemoryRepository::new();
        repo.insert_progress_batch(&[draft("u1", "b"), draft("u1", "a"), draft("u2", "c")])
            .await
            .unwrap();
        let listed = repo.list_progress(&UserId::new("u1")).await.unwrap();
        let courses: Vec<&str> = listed.iter().map(|r| r.course_id().as_str()).collect();
        assert_eq!(courses, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unknown_course_has_no_lessons() {
        let repo = InMemoryRepository::new();
        let lessons = repo
            .lessons_by_course(&CourseId::new("missing"))
            .await
            .unwrap();
        assert!(lessons.is_empty());
    }
}
