use std::sync::Arc;

use progress_core::model::{CourseId, CourseLessons};
use storage::repository::{CourseCatalog, StorageError};

/// Reads the ordered video lessons of a course from the external catalog.
#[derive(Clone)]
pub struct LessonCatalogReader {
    catalog: Arc<dyn CourseCatalog>,
}

impl LessonCatalogReader {
    #[must_use]
    pub fn new(catalog: Arc<dyn CourseCatalog>) -> Self {
        Self { catalog }
    }

    /// Video lessons of `course_id` with their durations and total.
    ///
    /// An unknown course yields empty lessons, not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the catalog itself cannot be read.
    pub async fn lessons(&self, course_id: &CourseId) -> Result<CourseLessons, StorageError> {
        let lessons = self.catalog.lessons_by_course(course_id).await?;
        Ok(CourseLessons::from_catalog(lessons))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{CatalogLesson, LessonId, LessonKind};
    use storage::repository::{CatalogWriter, InMemoryRepository};

    #[tokio::test]
    async fn keeps_video_lessons_only_and_zeroes_missing_durations() {
        let repo = InMemoryRepository::new();
        repo.upsert_course(
            &CourseId::new("c1"),
            "Course",
            &[
                CatalogLesson::video("v1", Some(120.0)),
                CatalogLesson {
                    lesson_id: LessonId::new("doc"),
                    kind: LessonKind::Other("pdf".into()),
                    duration: Some(999.0),
                },
                CatalogLesson::video("v2", None),
            ],
        )
        .await
        .unwrap();
        let reader = LessonCatalogReader::new(Arc::new(repo));

        let lessons = reader.lessons(&CourseId::new("c1")).await.unwrap();
        assert_eq!(
            lessons.lesson_ids(),
            &[LessonId::new("v1"), LessonId::new("v2")]
        );
        assert_eq!(lessons.durations(), &[120.0, 0.0]);
        assert_eq!(lessons.total_duration(), 120.0);

        let unknown = reader.lessons(&CourseId::new("missing")).await.unwrap();
        assert!(unknown.lesson_ids().is_empty());
        assert_eq!(unknown.total_duration(), 0.0);
    }
}
