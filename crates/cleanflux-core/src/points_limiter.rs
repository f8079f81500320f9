//! Points-per-series / points-per-query budget enforcement (spec §4.5),
//! grounded on `update_query_to_limit_nb_points_per_series` and
//! `update_query_to_limit_nb_points_for_query` in `rp_auto_selection.py`.

use crate::interval::Interval;

/// Expected number of points a single series will return for a query
/// window of `window_ns` bucketed at `group_by_interval`.
pub fn expected_points_per_series(window_ns: i64, group_by_interval: &str) -> Option<i64> {
    let bucket_ns = Interval::parse(group_by_interval)?.to_nanos();
    if bucket_ns <= 0 {
        return None;
    }
    Some(window_ns / bucket_ns)
}

pub struct LimitOutcome {
    pub new_group_by_time_interval: String,
    /// `"1/factor"`, present only for SUM() GROUP BY time() queries —
    /// rescales the sum to the new, coarser bucket to keep it a rate.
    pub sum_rescale_factor: Option<String>,
}

/// If `expected_points` exceeds `max_points`, widen `current_interval` by
/// the ceiling of their ratio and report the outcome; otherwise `None`
/// (no limiting needed).
pub fn limit_interval(
    expected_points: i64,
    max_points: i64,
    current_interval: &str,
    is_sum_group_by_time: bool,
) -> Option<LimitOutcome> {
    if expected_points <= max_points || max_points <= 0 {
        return None;
    }
    let factor = (expected_points + max_points - 1) / max_points;
    if factor <= 0 {
        return None;
    }
    let current = Interval::parse(current_interval)?;
    let new_number = factor * current.number;
    let new_group_by_time_interval = Interval::new(new_number, current.unit).to_string();

    Some(LimitOutcome {
        new_group_by_time_interval,
        sum_rescale_factor: is_sum_group_by_time.then(|| format!("1 / {factor}")),
    })
}
