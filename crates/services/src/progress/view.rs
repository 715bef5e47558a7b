use chrono::{DateTime, Utc};
use serde::Serialize;

use progress_core::completion::progress_percent;
use progress_core::model::{LessonId, ProgressRecord};
use progress_core::time::days_left;

/// Completion of a single lesson.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonProgress {
    pub lesson_id: LessonId,
    pub watch_time: f64,
    pub progress_percent: f64,
}

/// A stored progress record plus the metrics derived from it at read time.
///
/// Nothing here is persisted; `days_left` depends on the clock at the moment
/// of the read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedProgress {
    #[serde(flatten)]
    pub record: ProgressRecord,
    pub days_left: Option<i64>,
    pub total_progress_percent: f64,
    pub lesson_progress: Vec<LessonProgress>,
}

impl EnrichedProgress {
    #[must_use]
    pub fn from_record(record: ProgressRecord, now: DateTime<Utc>) -> Self {
        let lesson_progress = record
            .lessons()
            .map(|slot| LessonProgress {
                lesson_id: slot.lesson_id.clone(),
                watch_time: slot.watch_time,
                progress_percent: progress_percent(slot.watch_time, slot.duration),
            })
            .collect();

        Self {
            days_left: days_left(record.expiry(), now),
            total_progress_percent: record.total_progress_percent(),
            lesson_progress,
            record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use progress_core::model::{
        CatalogLesson, CourseId, CourseLessons, ProgressDraft, ProgressId, UserId,
    };
    use progress_core::time::fixed_now;

    fn record(expiry: Option<DateTime<Utc>>) -> ProgressRecord {
        ProgressDraft::new(
            UserId::new("u1"),
            CourseId::new("c1"),
            None,
            expiry,
            CourseLessons::from_catalog(vec![
                CatalogLesson::video("L1", Some(300.0)),
                CatalogLesson::video("L2", Some(0.0)),
            ]),
            fixed_now(),
        )
        .unwrap()
        .into_record(ProgressId::new(7))
    }

    #[test]
    fn derives_percentages_per_lesson() {
        let mut rec = record(None);
        rec.merge_watch_time(&LessonId::new("L1"), 100.0, fixed_now())
            .unwrap();

        let view = EnrichedProgress::from_record(rec, fixed_now());
        assert_eq!(view.days_left, None);
        assert_eq!(view.total_progress_percent, 33.33);
        assert_eq!(
            view.lesson_progress,
            vec![
                LessonProgress {
                    lesson_id: LessonId::new("L1"),
                    watch_time: 100.0,
                    progress_percent: 33.33,
                },
                LessonProgress {
                    lesson_id: LessonId::new("L2"),
                    watch_time: 0.0,
                    progress_percent: 0.0,
                },
            ]
        );
    }

    #[test]
    fn days_left_rounds_up_and_floors_at_zero() {
        let now = fixed_now();
        let view = EnrichedProgress::from_record(record(Some(now + Duration::hours(25))), now);
        assert_eq!(view.days_left, Some(2));

        let view = EnrichedProgress::from_record(record(Some(now - Duration::days(3))), now);
        assert_eq!(view.days_left, Some(0));
    }

    #[test]
    fn serializes_record_fields_alongside_metrics() {
        let view = EnrichedProgress::from_record(record(None), fixed_now());
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["user_id"], "u1");
        assert_eq!(json["course_id"], "c1");
        assert_eq!(json["course_duration"], 300.0);
        assert!(json["days_left"].is_null());
        assert_eq!(json["lesson_progress"][0]["lesson_id"], "L1");
    }
}
