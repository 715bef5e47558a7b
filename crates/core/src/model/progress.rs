use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::completion::progress_percent;
use crate::model::ids::{CourseId, LessonId, PackageId, ProgressId, UserId};
use crate::model::lesson::CourseLessons;

/// Relative slack allowed between a stored total and the recomputed lesson sum.
const TOTAL_TOLERANCE: f64 = 1e-6;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressRecordError {
    #[error("lesson ids ({ids}) and durations ({durations}) are not index-aligned")]
    LengthMismatch { ids: usize, durations: usize },

    #[error("duplicate lesson id: {0}")]
    DuplicateLesson(LessonId),

    #[error("invalid duration {duration} for lesson {lesson_id}")]
    InvalidDuration { lesson_id: LessonId, duration: f64 },

    #[error("invalid course duration: {0}")]
    InvalidCourseDuration(f64),

    #[error("unknown lesson: {0}")]
    UnknownLesson(LessonId),

    #[error("invalid watch time: {0}")]
    InvalidWatchTime(f64),

    #[error("watch time {watch_time} for lesson {lesson_id} is outside 0..={duration}")]
    WatchTimeOutOfBounds {
        lesson_id: LessonId,
        watch_time: f64,
        duration: f64,
    },

    #[error("total watch time {total} is outside 0..={course_duration}")]
    TotalOutOfBounds { total: f64, course_duration: f64 },

    #[error("total watch time {total} does not match clamped lesson sum {expected}")]
    TotalMismatch { total: f64, expected: f64 },
}

/// Checks the lesson-list coupling contract and returns the summed duration.
///
/// `lesson_ids` and `durations` are index-aligned, ids are unique, and every
/// duration is finite and non-negative.
fn validate_lessons(lesson_ids: &[LessonId], durations: &[f64]) -> Result<f64, ProgressRecordError> {
    if lesson_ids.len() != durations.len() {
        return Err(ProgressRecordError::LengthMismatch {
            ids: lesson_ids.len(),
            durations: durations.len(),
        });
    }

    let mut seen = HashSet::with_capacity(lesson_ids.len());
    for (lesson_id, &duration) in lesson_ids.iter().zip(durations) {
        if !seen.insert(lesson_id) {
            return Err(ProgressRecordError::DuplicateLesson(lesson_id.clone()));
        }
        if !duration.is_finite() || duration < 0.0 {
            return Err(ProgressRecordError::InvalidDuration {
                lesson_id: lesson_id.clone(),
                duration,
            });
        }
    }

    Ok(durations.iter().sum())
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// A validated progress record that has not been assigned a store id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressDraft {
    user_id: UserId,
    course_id: CourseId,
    package_id: Option<PackageId>,
    expiry: Option<DateTime<Utc>>,
    lesson_ids: Vec<LessonId>,
    lesson_durations: Vec<f64>,
    course_duration: f64,
    created_at: DateTime<Utc>,
}

impl ProgressDraft {
    /// Builds a draft with zero watch time from a course's video lessons.
    ///
    /// # Errors
    ///
    /// Returns `ProgressRecordError` if the lessons repeat an id or carry an
    /// invalid duration.
    pub fn new(
        user_id: UserId,
        course_id: CourseId,
        package_id: Option<PackageId>,
        expiry: Option<DateTime<Utc>>,
        lessons: CourseLessons,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ProgressRecordError> {
        let (lesson_ids, lesson_durations) = lessons.into_parts();
        let course_duration = validate_lessons(&lesson_ids, &lesson_durations)?;
        Ok(Self {
            user_id,
            course_id,
            package_id,
            expiry,
            lesson_ids,
            lesson_durations,
            course_duration,
            created_at,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn package_id(&self) -> Option<&PackageId> {
        self.package_id.as_ref()
    }

    #[must_use]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    #[must_use]
    pub fn lesson_ids(&self) -> &[LessonId] {
        &self.lesson_ids
    }

    #[must_use]
    pub fn lesson_durations(&self) -> &[f64] {
        &self.lesson_durations
    }

    #[must_use]
    pub fn course_duration(&self) -> f64 {
        self.course_duration
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Attach a store-assigned id, producing a fresh record with no watch time.
    #[must_use]
    pub fn into_record(self, id: ProgressId) -> ProgressRecord {
        let watch_times = self
            .lesson_ids
            .iter()
            .map(|lesson_id| (lesson_id.clone(), 0.0))
            .collect();
        ProgressRecord {
            id,
            user_id: self.user_id,
            course_id: self.course_id,
            package_id: self.package_id,
            expiry: self.expiry,
            lesson_ids: self.lesson_ids,
            lesson_durations: self.lesson_durations,
            watch_times,
            total_watch_time: 0.0,
            course_duration: self.course_duration,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

//
// ─── RECORD ────────────────────────────────────────────────────────────────────
//

/// Raw persisted fields of a progress record, prior to validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedProgress {
    pub id: ProgressId,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub package_id: Option<PackageId>,
    pub expiry: Option<DateTime<Utc>>,
    pub lesson_ids: Vec<LessonId>,
    pub lesson_durations: Vec<f64>,
    pub watch_times: Vec<(LessonId, f64)>,
    pub total_watch_time: f64,
    pub course_duration: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Watch-time progress of one user through one course.
///
/// Invariants held by every constructed value:
/// - `lesson_ids` and `lesson_durations` are index-aligned and ids are unique
/// - `0 <= watch_time(l) <= duration(l)` for every lesson
/// - `total_watch_time == clamp(sum(watch_times), 0, course_duration)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRecord {
    id: ProgressId,
    user_id: UserId,
    course_id: CourseId,
    package_id: Option<PackageId>,
    expiry: Option<DateTime<Utc>>,
    lesson_ids: Vec<LessonId>,
    lesson_durations: Vec<f64>,
    watch_times: BTreeMap<LessonId, f64>,
    total_watch_time: f64,
    course_duration: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// One lesson of a record with its duration and observed watch time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LessonSlot<'a> {
    pub lesson_id: &'a LessonId,
    pub duration: f64,
    pub watch_time: f64,
}

impl ProgressRecord {
    /// Rebuild a record loaded from storage, validating every invariant.
    ///
    /// Lessons without a stored watch time start at zero.
    ///
    /// # Errors
    ///
    /// Returns `ProgressRecordError` describing the first violated invariant.
    pub fn from_persisted(parts: PersistedProgress) -> Result<Self, ProgressRecordError> {
        validate_lessons(&parts.lesson_ids, &parts.lesson_durations)?;

        if !parts.course_duration.is_finite() || parts.course_duration < 0.0 {
            return Err(ProgressRecordError::InvalidCourseDuration(
                parts.course_duration,
            ));
        }

        let mut watch_times: BTreeMap<LessonId, f64> = parts
            .lesson_ids
            .iter()
            .map(|lesson_id| (lesson_id.clone(), 0.0))
            .collect();

        for (lesson_id, watch_time) in parts.watch_times {
            let Some(index) = parts.lesson_ids.iter().position(|l| *l == lesson_id) else {
                return Err(ProgressRecordError::UnknownLesson(lesson_id));
            };
            let duration = parts.lesson_durations[index];
            if !watch_time.is_finite() || watch_time < 0.0 || watch_time > duration {
                return Err(ProgressRecordError::WatchTimeOutOfBounds {
                    lesson_id,
                    watch_time,
                    duration,
                });
            }
            watch_times.insert(lesson_id, watch_time);
        }

        let total = parts.total_watch_time;
        if !total.is_finite() || total < 0.0 || total > parts.course_duration {
            return Err(ProgressRecordError::TotalOutOfBounds {
                total,
                course_duration: parts.course_duration,
            });
        }

        let expected = clamped_total(watch_times.values().sum(), parts.course_duration);
        if (expected - total).abs() > TOTAL_TOLERANCE * parts.course_duration.max(1.0) {
            return Err(ProgressRecordError::TotalMismatch { total, expected });
        }

        Ok(Self {
            id: parts.id,
            user_id: parts.user_id,
            course_id: parts.course_id,
            package_id: parts.package_id,
            expiry: parts.expiry,
            lesson_ids: parts.lesson_ids,
            lesson_durations: parts.lesson_durations,
            watch_times,
            total_watch_time: total,
            course_duration: parts.course_duration,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> ProgressId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn package_id(&self) -> Option<&PackageId> {
        self.package_id.as_ref()
    }

    #[must_use]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    #[must_use]
    pub fn lesson_ids(&self) -> &[LessonId] {
        &self.lesson_ids
    }

    #[must_use]
    pub fn lesson_durations(&self) -> &[f64] {
        &self.lesson_durations
    }

    #[must_use]
    pub fn total_watch_time(&self) -> f64 {
        self.total_watch_time
    }

    #[must_use]
    pub fn course_duration(&self) -> f64 {
        self.course_duration
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Position of a lesson in the record's ordered lesson list.
    #[must_use]
    pub fn lesson_index(&self, lesson_id: &LessonId) -> Option<usize> {
        self.lesson_ids.iter().position(|l| l == lesson_id)
    }

    #[must_use]
    pub fn lesson_duration(&self, lesson_id: &LessonId) -> Option<f64> {
        self.lesson_index(lesson_id)
            .map(|index| self.lesson_durations[index])
    }

    /// Observed watch time for a lesson; zero for lessons not in the record.
    #[must_use]
    pub fn watch_time(&self, lesson_id: &LessonId) -> f64 {
        self.watch_times.get(lesson_id).copied().unwrap_or(0.0)
    }

    /// Lessons in record order.
    pub fn lessons(&self) -> impl Iterator<Item = LessonSlot<'_>> {
        self.lesson_ids
            .iter()
            .zip(&self.lesson_durations)
            .map(|(lesson_id, &duration)| LessonSlot {
                lesson_id,
                duration,
                watch_time: self.watch_time(lesson_id),
            })
    }

    /// Completion of the whole course, in percent with two decimals.
    #[must_use]
    pub fn total_progress_percent(&self) -> f64 {
        progress_percent(self.total_watch_time, self.course_duration)
    }

    /// Monotonic-max merge of one lesson's observed watch time.
    ///
    /// The stored value only ever grows; a value above the lesson duration is
    /// capped at the duration. The course total is recomputed and clamped to
    /// `course_duration`. Returns whether the lesson's value changed.
    ///
    /// # Errors
    ///
    /// Returns `UnknownLesson` for lessons outside the record and
    /// `InvalidWatchTime` for non-finite input.
    pub fn merge_watch_time(
        &mut self,
        lesson_id: &LessonId,
        seconds: f64,
        at: DateTime<Utc>,
    ) -> Result<bool, ProgressRecordError> {
        if !seconds.is_finite() {
            return Err(ProgressRecordError::InvalidWatchTime(seconds));
        }
        let duration = self
            .lesson_duration(lesson_id)
            .ok_or_else(|| ProgressRecordError::UnknownLesson(lesson_id.clone()))?;

        let current = self.watch_time(lesson_id);
        let merged = current.max(seconds.min(duration));
        let changed = merged > current;
        self.watch_times.insert(lesson_id.clone(), merged);
        self.total_watch_time =
            clamped_total(self.watch_times.values().sum(), self.course_duration);
        self.updated_at = at;
        Ok(changed)
    }
}

fn clamped_total(sum: f64, course_duration: f64) -> f64 {
    sum.min(course_duration).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::lesson::CatalogLesson;
    use crate::time::fixed_now;

    fn two_lesson_draft() -> ProgressDraft {
        let lessons = CourseLessons::from_catalog(vec![
            CatalogLesson::video("L1", Some(300.0)),
            CatalogLesson::video("L2", Some(300.0)),
        ]);
        ProgressDraft::new(
            UserId::new("u1"),
            CourseId::new("c1"),
            None,
            None,
            lessons,
            fixed_now(),
        )
        .unwrap()
    }

    fn persisted(total: f64, watch_times: Vec<(LessonId, f64)>) -> PersistedProgress {
        PersistedProgress {
            id: ProgressId::new(1),
            user_id: UserId::new("u1"),
            course_id: CourseId::new("c1"),
            package_id: None,
            expiry: None,
            lesson_ids: vec![LessonId::new("L1"), LessonId::new("L2")],
            lesson_durations: vec![300.0, 300.0],
            watch_times,
            total_watch_time: total,
            course_duration: 600.0,
            created_at: fixed_now(),
            updated_at: fixed_now(),
        }
    }

    #[test]
    fn draft_sums_course_duration() {
        let draft = two_lesson_draft();
        assert_eq!(draft.course_duration(), 600.0);
        assert_eq!(draft.lesson_ids().len(), draft.lesson_durations().len());
    }

    #[test]
    fn draft_rejects_duplicate_lessons() {
        let lessons = CourseLessons::from_catalog(vec![
            CatalogLesson::video("L1", Some(10.0)),
            CatalogLesson::video("L1", Some(20.0)),
        ]);
        let err = ProgressDraft::new(
            UserId::new("u1"),
            CourseId::new("c1"),
            None,
            None,
            lessons,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, ProgressRecordError::DuplicateLesson(LessonId::new("L1")));
    }

    #[test]
    fn fresh_record_has_zero_watch_time() {
        let record = two_lesson_draft().into_record(ProgressId::new(7));
        assert_eq!(record.id(), ProgressId::new(7));
        assert_eq!(record.total_watch_time(), 0.0);
        assert!(record.lessons().all(|slot| slot.watch_time == 0.0));
        assert_eq!(record.updated_at(), record.created_at());
    }

    #[test]
    fn merge_is_monotonic_and_recomputes_total() {
        let mut record = two_lesson_draft().into_record(ProgressId::new(1));
        let l1 = LessonId::new("L1");
        let l2 = LessonId::new("L2");

        assert!(record.merge_watch_time(&l1, 200.0, fixed_now()).unwrap());
        assert_eq!(record.total_watch_time(), 200.0);
        assert_eq!(record.total_progress_percent(), 33.33);

        assert!(!record.merge_watch_time(&l1, 150.0, fixed_now()).unwrap());
        assert_eq!(record.watch_time(&l1), 200.0);

        assert!(record.merge_watch_time(&l2, 300.0, fixed_now()).unwrap());
        assert_eq!(record.total_watch_time(), 500.0);
        assert_eq!(record.total_progress_percent(), 83.33);
    }

    #[test]
    fn merge_caps_at_lesson_duration() {
        let mut record = two_lesson_draft().into_record(ProgressId::new(1));
        let l1 = LessonId::new("L1");
        record.merge_watch_time(&l1, 10_000.0, fixed_now()).unwrap();
        assert_eq!(record.watch_time(&l1), 300.0);
        assert_eq!(record.total_watch_time(), 300.0);
    }

    #[test]
    fn merge_rejects_unknown_lesson_and_nan() {
        let mut record = two_lesson_draft().into_record(ProgressId::new(1));
        let err = record
            .merge_watch_time(&LessonId::new("nope"), 1.0, fixed_now())
            .unwrap_err();
        assert_eq!(err, ProgressRecordError::UnknownLesson(LessonId::new("nope")));

        let err = record
            .merge_watch_time(&LessonId::new("L1"), f64::NAN, fixed_now())
            .unwrap_err();
        assert!(matches!(err, ProgressRecordError::InvalidWatchTime(_)));
    }

    #[test]
    fn from_persisted_accepts_consistent_record() {
        let record = ProgressRecord::from_persisted(persisted(
            250.0,
            vec![(LessonId::new("L1"), 200.0), (LessonId::new("L2"), 50.0)],
        ))
        .unwrap();
        assert_eq!(record.watch_time(&LessonId::new("L2")), 50.0);
        assert_eq!(record.total_watch_time(), 250.0);
    }

    #[test]
    fn from_persisted_rejects_misaligned_lessons() {
        let mut parts = persisted(0.0, Vec::new());
        parts.lesson_durations.pop();
        let err = ProgressRecord::from_persisted(parts).unwrap_err();
        assert_eq!(
            err,
            ProgressRecordError::LengthMismatch {
                ids: 2,
                durations: 1
            }
        );
    }

    #[test]
    fn from_persisted_rejects_watch_time_past_duration() {
        let err = ProgressRecord::from_persisted(persisted(
            301.0,
            vec![(LessonId::new("L1"), 301.0)],
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            ProgressRecordError::WatchTimeOutOfBounds { .. }
        ));
    }

    #[test]
    fn from_persisted_rejects_total_mismatch() {
        let err = ProgressRecord::from_persisted(persisted(
            100.0,
            vec![(LessonId::new("L1"), 200.0)],
        ))
        .unwrap_err();
        assert!(matches!(err, ProgressRecordError::TotalMismatch { .. }));
    }

    #[test]
    fn stale_course_duration_clamps_total() {
        let mut parts = persisted(
            500.0,
            vec![(LessonId::new("L1"), 300.0), (LessonId::new("L2"), 300.0)],
        );
        parts.course_duration = 500.0;
        let record = ProgressRecord::from_persisted(parts).unwrap();
        assert_eq!(record.total_watch_time(), 500.0);
        assert_eq!(record.total_progress_percent(), 100.0);
    }
}
