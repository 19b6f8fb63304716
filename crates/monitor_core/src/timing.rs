use std::time::Duration;

/// Sentinel shown when no remaining-time estimate can be made.
pub const UNKNOWN_REMAINING: &str = "—";

/// Share of processed items that raised no error, as a percentage.
///
/// Zero processed items yield 0.0 rather than a division by zero, and an
/// error count above the processed count saturates at 0.0.
pub fn success_rate(processed: u64, error_count: u64) -> f64 {
    if processed == 0 {
        return 0.0;
    }
    let ok = processed.saturating_sub(error_count);
    ok as f64 / processed as f64 * 100.0
}

/// Linear remaining-time estimate: `elapsed / percentage * (100 - percentage)`.
///
/// Returns `None` outside `0 < percentage < 100` and whenever the
/// arithmetic degenerates, so callers never see NaN or infinity.
pub fn estimate_remaining(elapsed: Duration, percentage: f64) -> Option<Duration> {
    if !(percentage > 0.0 && percentage < 100.0) {
        return None;
    }
    let secs = elapsed.as_secs_f64() / percentage * (100.0 - percentage);
    if !secs.is_finite() {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

/// Whole-second display form: `42s`, `3m 5s`, `1h 2m`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = total % 3600 / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Remaining-time display, substituting the unknown sentinel for `None`.
pub fn format_remaining(remaining: Option<Duration>) -> String {
    match remaining {
        Some(duration) => format_duration(duration),
        None => UNKNOWN_REMAINING.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_errors_in_ten_processed_is_eighty_percent() {
        let rate = success_rate(10, 2);
        assert!((rate - 80.0).abs() < 1e-9, "got {rate}");
    }

    #[test]
    fn success_rate_with_nothing_processed_is_zero() {
        assert_eq!(success_rate(0, 0), 0.0);
        assert_eq!(success_rate(0, 5), 0.0);
    }

    #[test]
    fn success_rate_saturates_when_errors_exceed_processed() {
        assert_eq!(success_rate(3, 5), 0.0);
    }

    #[test]
    fn halfway_at_thirty_seconds_estimates_thirty_more() {
        let remaining = estimate_remaining(Duration::from_secs(30), 50.0);
        assert_eq!(remaining, Some(Duration::from_secs(30)));
    }

    #[test]
    fn quarter_done_estimates_three_times_elapsed() {
        let remaining = estimate_remaining(Duration::from_secs(30), 25.0);
        assert_eq!(remaining, Some(Duration::from_secs(90)));
    }

    #[test]
    fn estimate_is_unknown_at_the_boundaries() {
        assert_eq!(estimate_remaining(Duration::from_secs(30), 0.0), None);
        assert_eq!(estimate_remaining(Duration::from_secs(30), 100.0), None);
    }

    #[test]
    fn estimate_rejects_out_of_range_and_non_finite_percentages() {
        assert_eq!(estimate_remaining(Duration::from_secs(30), -5.0), None);
        assert_eq!(estimate_remaining(Duration::from_secs(30), 150.0), None);
        assert_eq!(estimate_remaining(Duration::from_secs(30), f64::NAN), None);
    }

    #[test]
    fn formats_durations_by_magnitude() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0s");
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(185)), "3m 5s");
        assert_eq!(format_duration(Duration::from_secs(3720)), "1h 2m");
    }

    #[test]
    fn unknown_remaining_renders_the_sentinel() {
        assert_eq!(format_remaining(None), UNKNOWN_REMAINING);
        assert_eq!(format_remaining(Some(Duration::from_secs(61))), "1m 1s");
    }
}
