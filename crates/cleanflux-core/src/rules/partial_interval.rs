//! Partial-interval removal for SUM() GROUP BY time() queries, grounded on
//! `remove_partial_intervals_case_sum_group_by_time.py`.

use crate::error::{CleanfluxError, Result};
use crate::interval::Interval;
use crate::modifier::extend_lower_time_bound;
use crate::parser::{extract_group_by_time_interval, is_lower_time_bound_parsable, is_sum_group_by_time};
use crate::tabular::{BackendClient, TabularResult};

use super::{CorrectiveRule, RuleContext, RuleName};

pub struct PartialIntervalRule;

impl CorrectiveRule for PartialIntervalRule {
    fn name(&self) -> RuleName {
        RuleName::RemovePartialIntervalsCaseSumGroupByTime
    }

    fn check(&self, ctx: &RuleContext) -> bool {
        is_sum_group_by_time(ctx.parsed_query) && is_lower_time_bound_parsable(ctx.query)
    }

    fn action(&self, ctx: &RuleContext, backend: &dyn BackendClient) -> Result<TabularResult> {
        let interval_text = extract_group_by_time_interval(ctx.parsed_query)
            .ok_or_else(|| CleanfluxError::InternalRewriteFailure("no GROUP BY time() interval".into()))?;
        let interval = Interval::parse(&interval_text)
            .ok_or_else(|| CleanfluxError::InternalRewriteFailure(format!("unparsable interval: {interval_text}")))?;

        // Extend the lower bound by two buckets to compensate for the
        // leading and trailing partial interval we're about to drop.
        let shift = Interval::new(2 * interval.number, interval.unit).to_string();
        let reworked_query = extend_lower_time_bound(ctx.query, &shift)
            .ok_or_else(|| CleanfluxError::InternalRewriteFailure("could not extend lower time bound".into()))?;

        let mut result = backend.execute(ctx.schema, ctx.user, ctx.password, &reworked_query)?;
        rework_data(&mut result, interval.to_nanos());
        Ok(result)
    }
}

/// Drop null-only rows (the fully-in-the-future tail), then drop the
/// leading and trailing partial buckets, then shift every timestamp
/// forward one bucket so a SUM labels the *end* of the interval it covers
/// rather than the start.
fn rework_data(result: &mut TabularResult, bucket_ns: i64) {
    for table in result.values_mut() {
        table.drop_all_null_rows();
        let len = table.rows.len();
        if len > 2 {
            let drop_at = len - 2;
            let mut kept = Vec::with_capacity(len - 2);
            for (i, row) in table.rows.drain(..).enumerate() {
                if i == 0 || i == drop_at {
                    continue;
                }
                kept.push(row);
            }
            table.rows = kept;
        }
        for row in &mut table.rows {
            row.timestamp_ns += bucket_ns;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabular::Cell;
    use crate::tabular::Row;
    use crate::tabular::Table;

    #[test]
    fn drops_leading_and_trailing_partial_buckets() {
        let mut table = Table::new(vec!["sum".into()]);
        for i in 0..5 {
            table.rows.push(Row {
                timestamp_ns: i * 10,
                values: vec![Cell::Float(i as f64)],
            });
        }
        let mut result = TabularResult::new();
        result.insert(crate::tabular::SeriesKey::Bare("series".into()), table);
        rework_data(&mut result, 10);
        let kept = &result[&crate::tabular::SeriesKey::Bare("series".into())];
        assert_eq!(kept.rows.len(), 3);
        assert_eq!(kept.rows[0].timestamp_ns, 20); // was index 1 (10), shifted by bucket
        assert_eq!(kept.rows[2].timestamp_ns, 50); // was index 4 (40), shifted by bucket
    }

    #[test]
    fn leaves_short_series_untouched_besides_shift() {
        let mut table = Table::new(vec!["sum".into()]);
        table.rows.push(Row {
            timestamp_ns: 0,
            values: vec![Cell::Float(1.0)],
        });
        let mut result = TabularResult::new();
        result.insert(crate::tabular::SeriesKey::Bare("series".into()), table);
        rework_data(&mut result, 10);
        assert_eq!(result[&crate::tabular::SeriesKey::Bare("series".into())].rows.len(), 1);
        assert_eq!(result[&crate::tabular::SeriesKey::Bare("series".into())].rows[0].timestamp_ns, 10);
    }
}
