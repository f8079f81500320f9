//! Per-query orchestration (spec §4 "Pipeline"), grounded on
//! `corrective_guard.py`'s `get_data`, which is the point in the original
//! where RP auto-selection, points-budget limiting and corrective rules
//! are all threaded together against one incoming query.
//!
//! The entry point, [`process_query`], returns `Ok(None)` whenever nothing
//! about the query needed to change — the caller is expected to forward
//! the original request to the backend untouched in that case, rather
//! than have this module re-issue an identical query itself.

use crate::ast::ParsedQuery;
use crate::catalog::{AggregationProperties, CounterOverflows, RpCatalog};
use crate::error::Result;
use crate::modifier::{add_limit, change_group_by_time_interval, change_sum_group_by_time_factor};
use crate::parser::{
    extract_from_target, extract_group_by_time_interval, extract_lower_time_bound,
    extract_upper_time_bound, is_select_query, is_sum_group_by_time, parse, TimeBound,
};
use crate::points_limiter::{expected_points_per_series, limit_interval};
use crate::rp_selector::{apply_selection, resolve_from_parts, select_rp};
use crate::rules::{dispatch, RuleContext, RuleName};
use crate::tabular::{BackendClient, TabularResult};

/// Everything about a deployment that a single query is evaluated against:
/// the RP catalog, counter-aggregation rules, counter-overflow thresholds,
/// which corrective rules are enabled, and the points budgets. Bundled so
/// `process_query` doesn't take a dozen positional arguments.
pub struct PipelineConfig<'a> {
    pub catalog: &'a RpCatalog,
    pub aggregation_properties: &'a AggregationProperties,
    pub counter_overflows: &'a CounterOverflows,
    pub enabled_rules: &'a [RuleName],
    pub max_nb_points_per_series: Option<i64>,
    pub max_nb_points_per_query: Option<i64>,
    pub override_explicit_rp: bool,
}

/// Run one query through RP auto-selection, points-budget limiting and the
/// corrective rule engine. `schema_param`/`user`/`password` come from the
/// request's URL params (spec §4.2); `now_ns` is the wall-clock time to
/// resolve `now() - ...` bounds against.
///
/// Returns `Ok(None)` when the query should be forwarded to the backend
/// unmodified — not a SELECT, not against a known schema, no parsable
/// lower time bound, or an adequate RP and budget already. Returns
/// `Ok(Some(result))` with data this module already fetched (and possibly
/// corrected) on the caller's behalf.
pub fn process_query(
    query: &str,
    schema_param: Option<&str>,
    user: &str,
    password: &str,
    config: &PipelineConfig,
    now_ns: i64,
    backend: &dyn BackendClient,
) -> Result<Option<TabularResult>> {
    if !is_select_query(query) {
        return Ok(None);
    }
    let pq = parse(query);
    if !pq.is_select {
        return Ok(None);
    }
    let Some(from_target) = extract_from_target(&pq) else {
        return Ok(None);
    };
    let Some(from_parts) = resolve_from_parts(schema_param, &from_target) else {
        return Ok(None);
    };
    let Some(schema) = from_parts.schema.as_deref() else {
        return Ok(None);
    };

    let mut pq = pq;
    let mut query_text = query.to_string();
    let mut modified = false;

    let lower_bound_ns = extract_lower_time_bound(query).map(|b| b.resolve(now_ns));
    let counter_mode = config
        .aggregation_properties
        .counter_aggregation_mode(schema, &from_parts.measurement);
    let is_counter_sum = counter_mode == Some("sum");

    if let Some(lower_bound_ns) = lower_bound_ns {
        let group_by_time_interval = extract_group_by_time_interval(&pq);
        if let Some(selection) = select_rp(
            &from_parts,
            Some(lower_bound_ns),
            group_by_time_interval.as_deref(),
            is_sum_group_by_time(&pq),
            is_counter_sum,
            config.catalog,
            now_ns,
            config.override_explicit_rp,
        ) {
            if apply_selection(&mut pq, schema, &from_parts.measurement, &selection) {
                tracing::debug!(
                    schema,
                    measurement = %from_parts.measurement,
                    rp = selection.rp.as_deref().unwrap_or("unchanged"),
                    "rewriting query onto a different retention policy"
                );
                modified = true;
                query_text = pq.stringify();
            }
        }
    }

    apply_points_budget(&mut pq, &mut query_text, &mut modified, config, user, password, schema, backend, now_ns)?;

    let counter_overflow = config.counter_overflows.overflow_for(schema, &from_parts.measurement);
    let ctx = RuleContext {
        query: &query_text,
        parsed_query: &pq,
        schema,
        user,
        password,
        measurement: &from_parts.measurement,
        counter_overflow,
    };
    if let Some(result) = dispatch(&ctx, config.enabled_rules, backend) {
        return result.map(Some);
    }

    if modified {
        return backend.execute(schema, user, password, &query_text).map(Some);
    }
    Ok(None)
}

/// Re-coarsen the GROUP BY time() bucket if this query would return more
/// points than the configured budget. A per-query budget needs the number
/// of series the query returns, which isn't known without asking the
/// backend, so it's probed with a one-row `LIMIT 1` copy of the query
/// first — mirrors `update_query_to_limit_nb_points_for_query`.
#[allow(clippy::too_many_arguments)]
fn apply_points_budget(
    pq: &mut ParsedQuery,
    query_text: &mut String,
    modified: &mut bool,
    config: &PipelineConfig,
    user: &str,
    password: &str,
    schema: &str,
    backend: &dyn BackendClient,
    now_ns: i64,
) -> Result<()> {
    let Some(group_by_time_interval) = extract_group_by_time_interval(pq) else {
        return Ok(());
    };
    let Some(window_ns) = query_window_ns(query_text, now_ns) else {
        return Ok(());
    };
    let Some(points_per_series) = expected_points_per_series(window_ns, &group_by_time_interval) else {
        return Ok(());
    };

    let outcome = if let Some(max_per_query) = config.max_nb_points_per_query {
        let probe_query = add_limit(query_text, 1);
        let probe = backend.execute(schema, user, password, &probe_query)?;
        let nb_series = probe.len().max(1) as i64;
        limit_interval(
            points_per_series * nb_series,
            max_per_query,
            &group_by_time_interval,
            is_sum_group_by_time(pq),
        )
    } else if let Some(max_per_series) = config.max_nb_points_per_series {
        limit_interval(points_per_series, max_per_series, &group_by_time_interval, is_sum_group_by_time(pq))
    } else {
        None
    };

    if let Some(outcome) = outcome {
        change_group_by_time_interval(pq, &outcome.new_group_by_time_interval);
        if let Some(factor) = &outcome.sum_rescale_factor {
            change_sum_group_by_time_factor(pq, factor);
        }
        *modified = true;
        *query_text = pq.stringify();
    }
    Ok(())
}

/// Width of the query's time window in nanoseconds, resolving both bounds
/// against `now_ns`. `None` if either bound is missing or unparsable.
fn query_window_ns(query: &str, now_ns: i64) -> Option<i64> {
    let lower = extract_lower_time_bound(query)?.resolve(now_ns);
    let upper = extract_upper_time_bound(query).map(|b: TimeBound| b.resolve(now_ns)).unwrap_or(now_ns);
    let width = upper - lower;
    (width > 0).then_some(width)
}
