//! Counter-wrap correction for `non_negative_derivative()` queries,
//! grounded on `handle_counter_wrap_non_negative_derivative.py`.
//!
//! REDESIGN (see DESIGN.md): the original tracks one `prev_value` shared
//! across every `non_negative_derivative` column while walking a series'
//! rows, so a wrap in one column can be mistaken for a wrap in another.
//! Here each matching column gets its own unwrap state.

use std::collections::HashMap;

use crate::error::{CleanfluxError, Result};
use crate::interval::Interval;
use crate::modifier::{extend_lower_time_bound, remove_non_negative_derivative};
use crate::parser::{
    extract_group_by_time_interval, extract_nnd_column_names, extract_nnd_intervals,
    is_lower_time_bound_parsable, is_non_negative_derivative_query,
};
use crate::tabular::{BackendClient, Cell, TabularResult};

use super::{CorrectiveRule, RuleContext, RuleName};

pub struct CounterWrapRule;

impl CorrectiveRule for CounterWrapRule {
    fn name(&self) -> RuleName {
        RuleName::HandleCounterWrapNonNegativeDerivative
    }

    fn check(&self, ctx: &RuleContext) -> bool {
        ctx.counter_overflow.is_some()
            && is_non_negative_derivative_query(ctx.parsed_query)
            && is_lower_time_bound_parsable(ctx.query)
    }

    fn action(&self, ctx: &RuleContext, backend: &dyn BackendClient) -> Result<TabularResult> {
        let overflow_value = ctx
            .counter_overflow
            .ok_or_else(|| CleanfluxError::InternalRewriteFailure("no counter overflow configured".into()))?;

        let nnd_intervals = extract_nnd_intervals(ctx.parsed_query);
        let (output_names, forced_map) = disambiguate_output_names(extract_nnd_column_names(ctx.parsed_query));

        let mut alt_pq = ctx.parsed_query.clone();
        remove_non_negative_derivative(&mut alt_pq, None, Some(&forced_map));
        let alt_query = alt_pq.stringify();

        let group_by_text = extract_group_by_time_interval(ctx.parsed_query)
            .ok_or_else(|| CleanfluxError::InternalRewriteFailure("no GROUP BY time() interval".into()))?;
        let group_by_interval = Interval::parse(&group_by_text)
            .ok_or_else(|| CleanfluxError::InternalRewriteFailure(format!("unparsable interval: {group_by_text}")))?;
        let shift = Interval::new(2 * group_by_interval.number, group_by_interval.unit).to_string();
        let alt_query = extend_lower_time_bound(&alt_query, &shift)
            .ok_or_else(|| CleanfluxError::InternalRewriteFailure("could not extend lower time bound".into()))?;

        let mut result = backend.execute(ctx.schema, ctx.user, ctx.password, &alt_query)?;

        let nnd_interval_ns: Vec<i64> = nnd_intervals
            .iter()
            .map(|text| Interval::parse(text).map(|i| i.to_nanos()).unwrap_or(0))
            .collect();

        unwrap_counters(&mut result, &output_names, overflow_value);
        apply_derivative(&mut result, &output_names, &nnd_interval_ns);

        Ok(result)
    }
}

/// Mirrors the original's de-duplication of the default
/// `non_negative_derivative` output name across multiple unaliased
/// columns in one query. Unlike the original, the forced alias map keys
/// to the *final* (possibly disambiguated) name throughout, so the
/// rewritten query and the result lookup agree — the original keys both
/// to the literal default name, which collides results across duplicate
/// columns.
fn disambiguate_output_names(mut names: Vec<String>) -> (Vec<String>, HashMap<usize, String>) {
    let mut forced = HashMap::new();
    let mut seen_default = 0;
    for (i, name) in names.iter_mut().enumerate() {
        if name == "non_negative_derivative" {
            if seen_default >= 1 {
                *name = format!("non_negative_derivative_{i}");
            }
            forced.insert(i, name.clone());
            seen_default += 1;
        }
    }
    (names, forced)
}

/// Per-column counter-unwrap pass: a drop between consecutive samples is
/// treated as a wrap and corrected by adding enough multiples of
/// `overflow_value` to make it monotonic again.
fn unwrap_counters(result: &mut TabularResult, output_names: &[String], overflow_value: f64) {
    for table in result.values_mut() {
        let col_indices: Vec<Option<usize>> = output_names.iter().map(|n| table.column_index(n)).collect();
        let mut prev_values: Vec<Option<f64>> = vec![None; output_names.len()];
        for row in table.rows.iter_mut() {
            for (ci, idx) in col_indices.iter().enumerate() {
                let Some(idx) = idx else { continue };
                let Some(value) = row.values[*idx].as_f64() else { continue };
                match prev_values[ci] {
                    None => prev_values[ci] = Some(value),
                    Some(prev) => {
                        let diff = value - prev;
                        if diff < 0.0 {
                            let mut shift = overflow_value - diff.abs();
                            while shift <= 0.0 {
                                shift += overflow_value;
                            }
                            let new_value = prev + shift;
                            row.values[*idx] = Cell::from_computed(new_value);
                            prev_values[ci] = Some(new_value);
                        } else {
                            prev_values[ci] = Some(value);
                        }
                    }
                }
            }
        }
    }
}

/// Re-derive the rate from the unwrapped counter values (since the raw
/// `non_negative_derivative()` was stripped out of the rewritten query),
/// and drop the first sample per series whose derivative is undefined.
fn apply_derivative(result: &mut TabularResult, output_names: &[String], interval_ns: &[i64]) {
    for table in result.values_mut() {
        let col_indices: Vec<Option<usize>> = output_names.iter().map(|n| table.column_index(n)).collect();
        let mut prev_values: Vec<Option<f64>> = vec![None; output_names.len()];
        let mut prev_timestamps: Vec<Option<i64>> = vec![None; output_names.len()];
        let mut first_timestamp: Option<i64> = None;

        for row in table.rows.iter_mut() {
            for (ci, idx) in col_indices.iter().enumerate() {
                let Some(idx) = idx else { continue };
                let Some(value) = row.values[*idx].as_f64() else { continue };

                match prev_values[ci] {
                    None => {
                        prev_values[ci] = Some(value);
                        prev_timestamps[ci] = Some(row.timestamp_ns);
                        first_timestamp.get_or_insert(row.timestamp_ns);
                        row.values[*idx] = Cell::Float(0.0);
                    }
                    Some(prev) => {
                        let diff = value - prev;
                        if diff < 0.0 {
                            row.values[*idx] = Cell::Float(0.0);
                        } else {
                            let time_diff = row.timestamp_ns - prev_timestamps[ci].unwrap_or(row.timestamp_ns);
                            let bucket_ns = interval_ns.get(ci).copied().unwrap_or(0);
                            row.values[*idx] = if time_diff > 0 {
                                Cell::from_computed(diff * bucket_ns as f64 / time_diff as f64)
                            } else {
                                Cell::Float(0.0)
                            };
                        }
                        prev_values[ci] = Some(value);
                        prev_timestamps[ci] = Some(row.timestamp_ns);
                    }
                }
            }
        }

        if let Some(first_ts) = first_timestamp {
            table.rows.retain(|r| r.timestamp_ns != first_ts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabular::{Row, Table};

    #[test]
    fn unwraps_single_drop_per_column_independently() {
        let mut table = Table::new(vec!["a".into(), "b".into()]);
        table.rows.push(Row { timestamp_ns: 0, values: vec![Cell::Float(100.0), Cell::Float(900.0)] });
        table.rows.push(Row { timestamp_ns: 1, values: vec![Cell::Float(10.0), Cell::Float(950.0)] });
        let mut result = TabularResult::new();
        result.insert(crate::tabular::SeriesKey::Bare("s".into()), table);

        unwrap_counters(&mut result, &["a".to_string(), "b".to_string()], 1000.0);

        let t = &result[&crate::tabular::SeriesKey::Bare("s".into())];
        // column "a" wrapped (100 -> 10): corrected to 100 + (1000 - 90) = 1010
        assert_eq!(t.rows[1].values[0], Cell::Float(1010.0));
        // column "b" did not wrap and must be untouched by "a"'s correction
        assert_eq!(t.rows[1].values[1], Cell::Float(950.0));
    }

    #[test]
    fn disambiguates_duplicate_default_names() {
        let (names, forced) = disambiguate_output_names(vec![
            "non_negative_derivative".to_string(),
            "non_negative_derivative".to_string(),
            "rate".to_string(),
        ]);
        assert_eq!(names[0], "non_negative_derivative");
        assert_eq!(names[1], "non_negative_derivative_1");
        assert_eq!(names[2], "rate");
        assert_eq!(forced.get(&0).map(String::as_str), Some("non_negative_derivative"));
        assert_eq!(forced.get(&1).map(String::as_str), Some("non_negative_derivative_1"));
        assert!(!forced.contains_key(&2));
    }

    #[test]
    fn apply_derivative_drops_first_sample() {
        let mut table = Table::new(vec!["rate".into()]);
        table.rows.push(Row { timestamp_ns: 0, values: vec![Cell::Float(0.0)] });
        table.rows.push(Row { timestamp_ns: 1_000_000_000, values: vec![Cell::Float(10.0)] });
        let mut result = TabularResult::new();
        result.insert(crate::tabular::SeriesKey::Bare("s".into()), table);

        apply_derivative(&mut result, &["rate".to_string()], &[1_000_000_000]);

        let t = &result[&crate::tabular::SeriesKey::Bare("s".into())];
        assert_eq!(t.rows.len(), 1);
        assert_eq!(t.rows[0].values[0], Cell::Float(10.0));
    }
}
