use std::sync::Arc;

use chrono::{DateTime, Utc};
use progress_core::model::{CourseId, PackageId, ProgressDraft, ProgressRecord, UserId};
use progress_core::period::expiry_from_spec;
use storage::repository::{PackageDirectory, ProgressRepository};
use tracing::{debug, info, warn};

use super::catalog::LessonCatalogReader;
use crate::Clock;
use crate::error::ProgressServiceError;

/// What a progress initialization covers: one course, or every course of a
/// package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressTarget {
    Course(CourseId),
    Package(PackageId),
}

impl ProgressTarget {
    /// Build a target from optional identifiers; exactly one must be given.
    ///
    /// # Errors
    ///
    /// Returns `ConflictingTarget` when both are given and `MissingTarget`
    /// when neither is.
    pub fn from_options(
        course_id: Option<CourseId>,
        package_id: Option<PackageId>,
    ) -> Result<Self, ProgressServiceError> {
        match (course_id, package_id) {
            (Some(course_id), None) => Ok(Self::Course(course_id)),
            (None, Some(package_id)) => Ok(Self::Package(package_id)),
            (Some(_), Some(_)) => Err(ProgressServiceError::ConflictingTarget),
            (None, None) => Err(ProgressServiceError::MissingTarget),
        }
    }
}

/// Creates progress records for a single course or a whole package.
#[derive(Clone)]
pub struct ProgressInitializer {
    clock: Clock,
    lessons: LessonCatalogReader,
    packages: Arc<dyn PackageDirectory>,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressInitializer {
    #[must_use]
    pub fn new(
        clock: Clock,
        lessons: LessonCatalogReader,
        packages: Arc<dyn PackageDirectory>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            lessons,
            packages,
            progress,
        }
    }

    /// Build and persist the records for `target`.
    ///
    /// For a course, `period_spec` sets the expiry. For a package, the period
    /// of its first pricing entry does and `period_spec` is ignored; courses
    /// that cannot be built are skipped. Pairs that already have a record are
    /// left as they are and are not part of the result.
    ///
    /// # Errors
    ///
    /// - `PackageNotFound` / `EmptyPackage` for an unusable package
    /// - `Internal` if the single course cannot be assembled
    /// - `Storage` if the package lookup or the batch insert fails
    pub async fn initialize(
        &self,
        user_id: &UserId,
        target: &ProgressTarget,
        period_spec: Option<&str>,
    ) -> Result<Vec<ProgressRecord>, ProgressServiceError> {
        let now = self.clock.now();

        let drafts = match target {
            ProgressTarget::Course(course_id) => {
                let expiry = resolve_expiry(period_spec, now);
                let draft = self
                    .build_draft(user_id, course_id, None, expiry, now)
                    .await
                    .map_err(|reason| ProgressServiceError::Internal {
                        course_id: course_id.clone(),
                        reason,
                    })?;
                vec![draft]
            }
            ProgressTarget::Package(package_id) => {
                self.package_drafts(user_id, package_id, now).await?
            }
        };

        if drafts.is_empty() {
            info!(user_id = %user_id, ?target, "no progress records could be built");
            return Ok(Vec::new());
        }

        let created = self.progress.insert_progress_batch(&drafts).await?;
        info!(
            user_id = %user_id,
            ?target,
            built = drafts.len(),
            created = created.len(),
            "progress initialized"
        );
        Ok(created)
    }

    async fn package_drafts(
        &self,
        user_id: &UserId,
        package_id: &PackageId,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProgressDraft>, ProgressServiceError> {
        let package = self
            .packages
            .get_package(package_id)
            .await?
            .ok_or_else(|| ProgressServiceError::PackageNotFound(package_id.clone()))?;
        if package.course_ids.is_empty() {
            return Err(ProgressServiceError::EmptyPackage(package_id.clone()));
        }

        let expiry = resolve_expiry(package.period_spec(), now);
        let mut drafts = Vec::with_capacity(package.course_ids.len());
        for course_id in &package.course_ids {
            match self
                .build_draft(user_id, course_id, Some(package_id), expiry, now)
                .await
            {
                Ok(draft) => drafts.push(draft),
                Err(reason) => warn!(
                    package_id = %package_id,
                    course_id = %course_id,
                    %reason,
                    "skipping course in package"
                ),
            }
        }
        Ok(drafts)
    }

    async fn build_draft(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        package_id: Option<&PackageId>,
        expiry: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<ProgressDraft, String> {
        let lessons = self
            .lessons
            .lessons(course_id)
            .await
            .map_err(|e| e.to_string())?;
        debug!(
            course_id = %course_id,
            lessons = lessons.lesson_ids().len(),
            duration = lessons.total_duration(),
            "building progress draft"
        );
        ProgressDraft::new(
            user_id.clone(),
            course_id.clone(),
            package_id.cloned(),
            expiry,
            lessons,
            now,
        )
        .map_err(|e| e.to_string())
    }
}

/// Expiry for an optional period string. A missing or unusable period means
/// no expiry.
fn resolve_expiry(spec: Option<&str>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let expiry = expiry_from_spec(spec, now);
    if let (Some(spec), None) = (spec, expiry) {
        debug!(period = spec, "period ignored, no expiry");
    }
    expiry
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Months;
    use progress_core::model::{CatalogLesson, LessonId, PackageInfo, PricingEntry};
    use progress_core::time::{fixed_clock, fixed_now};
    use storage::repository::{CatalogWriter, InMemoryRepository};

    async fn seeded() -> (InMemoryRepository, ProgressInitializer) {
        let repo = InMemoryRepository::new();
        for course in ["a", "b"] {
            repo.upsert_course(
                &CourseId::new(course),
                course,
                &[
                    CatalogLesson::video(LessonId::new(format!("{course}-1")), Some(100.0)),
                    CatalogLesson::video(LessonId::new(format!("{course}-2")), Some(50.0)),
                ],
            )
            .await
            .unwrap();
        }
        let initializer = ProgressInitializer::new(
            fixed_clock(),
            LessonCatalogReader::new(Arc::new(repo.clone())),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        );
        (repo, initializer)
    }

    #[test]
    fn target_requires_exactly_one_identifier() {
        assert_eq!(
            ProgressTarget::from_options(Some(CourseId::new("c")), None).unwrap(),
            ProgressTarget::Course(CourseId::new("c"))
        );
        assert_eq!(
            ProgressTarget::from_options(None, Some(PackageId::new("p"))).unwrap(),
            ProgressTarget::Package(PackageId::new("p"))
        );
        assert!(matches!(
            ProgressTarget::from_options(Some(CourseId::new("c")), Some(PackageId::new("p"))),
            Err(ProgressServiceError::ConflictingTarget)
        ));
        assert!(matches!(
            ProgressTarget::from_options(None, None),
            Err(ProgressServiceError::MissingTarget)
        ));
    }

    #[tokio::test]
    async fn single_course_uses_caller_period() {
        let (_repo, initializer) = seeded().await;
        let created = initializer
            .initialize(
                &UserId::new("u1"),
                &ProgressTarget::Course(CourseId::new("a")),
                Some("3 months"),
            )
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        let record = &created[0];
        assert_eq!(record.package_id(), None);
        assert_eq!(record.course_duration(), 150.0);
        assert_eq!(
            record.expiry(),
            fixed_now().checked_add_months(Months::new(3))
        );
    }

    #[tokio::test]
    async fn unknown_course_still_gets_an_empty_record() {
        let (_repo, initializer) = seeded().await;
        let created = initializer
            .initialize(
                &UserId::new("u1"),
                &ProgressTarget::Course(CourseId::new("nope")),
                Some("abc"),
            )
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        assert!(created[0].lesson_ids().is_empty());
        assert_eq!(created[0].course_duration(), 0.0);
        assert_eq!(created[0].expiry(), None);
    }

    #[tokio::test]
    async fn duplicate_catalog_lessons_fail_a_single_course() {
        let (repo, initializer) = seeded().await;
        repo.upsert_course(
            &CourseId::new("dup"),
            "dup",
            &[
                CatalogLesson::video("x", Some(10.0)),
                CatalogLesson::video("x", Some(20.0)),
            ],
        )
        .await
        .unwrap();

        let err = initializer
            .initialize(
                &UserId::new("u1"),
                &ProgressTarget::Course(CourseId::new("dup")),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressServiceError::Internal { .. }));
    }

    #[tokio::test]
    async fn package_period_wins_over_caller_period() {
        let (repo, initializer) = seeded().await;
        repo.upsert_package(
            &PackageInfo {
                id: PackageId::new("p1"),
                course_ids: vec![CourseId::new("a"), CourseId::new("b")],
                pricing: vec![PricingEntry {
                    period: Some("1 year".into()),
                    price: Some(10.0),
                }],
            },
            "bundle",
        )
        .await
        .unwrap();

        let created = initializer
            .initialize(
                &UserId::new("u1"),
                &ProgressTarget::Package(PackageId::new("p1")),
                Some("2 days"),
            )
            .await
            .unwrap();

        let expected = fixed_now().checked_add_months(Months::new(12));
        assert_eq!(created.len(), 2);
        for record in &created {
            assert_eq!(record.package_id(), Some(&PackageId::new("p1")));
            assert_eq!(record.expiry(), expected);
        }
    }

    #[tokio::test]
    async fn package_with_unusable_period_has_no_expiry() {
        let (repo, initializer) = seeded().await;
        repo.upsert_package(
            &PackageInfo {
                id: PackageId::new("p2"),
                course_ids: vec![CourseId::new("a")],
                pricing: vec![PricingEntry {
                    period: Some("forever".into()),
                    price: None,
                }],
            },
            "lifetime",
        )
        .await
        .unwrap();

        let created = initializer
            .initialize(
                &UserId::new("u1"),
                &ProgressTarget::Package(PackageId::new("p2")),
                Some("1 month"),
            )
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].expiry(), None);
    }

    #[test]
    fn resolve_expiry_agrees_with_period_parsing() {
        let now = fixed_now();
        assert_eq!(resolve_expiry(None, now), None);
        assert_eq!(resolve_expiry(Some(""), now), None);
        assert_eq!(resolve_expiry(Some("2 fortnights"), now), None);
        assert_eq!(
            resolve_expiry(Some("2 weeks"), now),
            Some(now + chrono::Duration::days(14))
        );
    }

    #[tokio::test]
    async fn existing_pairs_are_not_recreated() {
        let (_repo, initializer) = seeded().await;
        let target = ProgressTarget::Course(CourseId::new("a"));
        let user = UserId::new("u1");

        let first = initializer.initialize(&user, &target, None).await.unwrap();
        let second = initializer.initialize(&user, &target, None).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }
}
