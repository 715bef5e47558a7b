//! Completion-percentage math shared by records and read views.

/// Percent of `duration` covered by `watched`, capped at 100 and rounded to
/// two decimals. A non-positive duration reports zero.
#[must_use]
pub fn progress_percent(watched: f64, duration: f64) -> f64 {
    if duration.is_nan() || duration <= 0.0 || !watched.is_finite() {
        return 0.0;
    }
    let percent = (watched / duration * 100.0).clamp(0.0, 100.0);
    round2(percent)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
