//! Automatic retention-policy selection (spec §4.4), grounded on
//! `rp_auto_selection.py`'s `get_right_rp_for_query` /
//! `update_query_with_right_rp`.

use crate::ast::ParsedQuery;
use crate::catalog::{RetentionPolicy, RpCatalog};
use crate::interval::Interval;
use crate::measurement::parse_measurement_path;
use crate::modifier::{change_group_by_time_interval, change_rp, change_sum_group_by_time_factor};

/// FROM target, decomposed and with the query's own schema (if any)
/// already reconciled against the URL's `schema` param.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromParts {
    pub schema: Option<String>,
    pub retention_policy: Option<String>,
    pub measurement: String,
}

/// Resolve a FROM target against the request's URL-param schema. A schema
/// named explicitly in the query (the three-part path form) wins over the
/// URL param.
pub fn resolve_from_parts(url_schema: Option<&str>, from_target: &str) -> Option<FromParts> {
    let path = parse_measurement_path(from_target)?;
    let schema = path.schema.or_else(|| url_schema.map(str::to_string));
    Some(FromParts {
        schema,
        retention_policy: path.retention_policy,
        measurement: path.measurement,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpSelection {
    pub rp: Option<String>,
    pub group_by_time_interval: Option<String>,
    pub sum_group_by_time_interval_factor: Option<String>,
}

impl RpSelection {
    fn is_empty(&self) -> bool {
        self.rp.is_none() && self.group_by_time_interval.is_none()
    }
}

/// One second of slack so an RP whose coverage boundary lands exactly on
/// the query's lower bound still counts as good.
const GOOD_RP_MARGIN_NS: i64 = 1_000_000_000;

fn is_rp_good_for_interval(rp: &RetentionPolicy, lower_bound_ns: i64, now_ns: i64) -> bool {
    rp.earliest_covered_ns(now_ns) - GOOD_RP_MARGIN_NS <= lower_bound_ns
}

/// If `rp_interval` is coarser than `current_interval`, the one to switch
/// the query's GROUP BY time() to; otherwise `None` (the RP's precision
/// already meets or exceeds what the query asked for).
fn coarser_interval_for_rp(current_interval: &str, rp_interval: &str) -> Option<String> {
    let current = Interval::parse(current_interval)?;
    let candidate = Interval::parse(rp_interval)?;
    (current.to_nanos() < candidate.to_nanos()).then(|| rp_interval.to_string())
}

/// Rate-preserving rescale factor for a SUM() switched to a coarser
/// bucket, expressed as a literal fraction string so the backend
/// evaluates it inline rather than us losing precision to floating point.
fn sum_rescale_factor(current_interval: &str, new_interval: &str) -> String {
    let current_ns = Interval::parse(current_interval).map(|i| i.to_nanos()).unwrap_or(0);
    let new_ns = Interval::parse(new_interval).map(|i| i.to_nanos()).unwrap_or(0);
    if current_ns < new_ns {
        format!("{current_ns} / {new_ns}")
    } else {
        format!("{new_ns} / {current_ns}")
    }
}

/// Work out what (if anything) should change about this query's RP and
/// GROUP BY time() bucket. Returns `None` when nothing needs to change —
/// an explicit RP without `override_explicit_rp`, an unknown schema, a
/// query with no parsable lower bound, or an already-adequate RP.
#[allow(clippy::too_many_arguments)]
pub fn select_rp(
    from_parts: &FromParts,
    lower_bound_ns: Option<i64>,
    group_by_time_interval: Option<&str>,
    is_sum_group_by_time: bool,
    is_counter_sum_mode: bool,
    catalog: &RpCatalog,
    now_ns: i64,
    override_explicit_rp: bool,
) -> Option<RpSelection> {
    let schema = from_parts.schema.as_deref()?;

    if from_parts.retention_policy.is_some() && !override_explicit_rp {
        return None;
    }
    if !catalog.knows_schema(schema) {
        return None;
    }
    let lower_bound_ns = lower_bound_ns?;

    let starting_rp = match &from_parts.retention_policy {
        Some(explicit) => catalog.find_rp(schema, explicit)?,
        None => catalog.default_rp(schema)?,
    };

    let mut chosen: Option<&RetentionPolicy> = None;
    if !is_rp_good_for_interval(starting_rp, lower_bound_ns, now_ns) {
        for candidate in catalog.retention_policies(schema).unwrap_or(&[]) {
            if is_rp_good_for_interval(candidate, lower_bound_ns, now_ns) {
                chosen = Some(candidate);
                break;
            }
        }
    }

    let mut output = RpSelection::default();
    if let Some(rp) = chosen {
        output.rp = Some(rp.name.clone());
        if let (Some(current), Some(rp_interval)) = (group_by_time_interval, rp.interval.as_deref()) {
            if let Some(new_interval) = coarser_interval_for_rp(current, rp_interval) {
                if is_sum_group_by_time && is_counter_sum_mode {
                    output.sum_group_by_time_interval_factor =
                        Some(sum_rescale_factor(current, &new_interval));
                }
                output.group_by_time_interval = Some(new_interval);
            }
        }
    }

    (!output.is_empty()).then_some(output)
}

/// Apply a resolved [`RpSelection`] to the parsed query in place, mirroring
/// `update_query_with_right_rp`'s rewrite order (RP first, then GROUP BY
/// interval, then the SUM rescale).
pub fn apply_selection(pq: &mut ParsedQuery, schema: &str, measurement: &str, selection: &RpSelection) -> bool {
    let mut changed = false;
    if let Some(rp) = &selection.rp {
        changed |= change_rp(pq, schema, rp, measurement);
    }
    if let Some(interval) = &selection.group_by_time_interval {
        changed |= change_group_by_time_interval(pq, interval);
        if let Some(factor) = &selection.sum_group_by_time_interval_factor {
            changed |= change_sum_group_by_time_factor(pq, factor);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RpCatalog;

    fn catalog_with_two_rps() -> RpCatalog {
        let mut catalog = RpCatalog::new();
        catalog.insert_schema(
            "telemetry",
            vec![
                RetentionPolicy::new("autogen", Some(2 * 86_400 * 1_000_000_000))
                    .with_interval("10s")
                    .default_flag(true),
                RetentionPolicy::new("downsampled_90d", Some(90 * 86_400 * 1_000_000_000))
                    .with_interval("5m"),
            ],
        );
        catalog
    }

    #[test]
    fn selects_coarser_rp_for_old_lower_bound() {
        let catalog = catalog_with_two_rps();
        let from_parts = FromParts {
            schema: Some("telemetry".into()),
            retention_policy: None,
            measurement: "cpu".into(),
        };
        let now_ns = 100 * 86_400 * 1_000_000_000i64;
        let lower_bound_ns = now_ns - 10 * 86_400 * 1_000_000_000;
        let selection = select_rp(&from_parts, Some(lower_bound_ns), Some("10s"), false, false, &catalog, now_ns, false)
            .unwrap();
        assert_eq!(selection.rp.as_deref(), Some("downsampled_90d"));
        assert_eq!(selection.group_by_time_interval.as_deref(), Some("5m"));
    }

    #[test]
    fn keeps_default_rp_when_already_adequate() {
        let catalog = catalog_with_two_rps();
        let from_parts = FromParts {
            schema: Some("telemetry".into()),
            retention_policy: None,
            measurement: "cpu".into(),
        };
        let now_ns = 100 * 86_400 * 1_000_000_000i64;
        let lower_bound_ns = now_ns - 3600 * 1_000_000_000;
        let selection = select_rp(&from_parts, Some(lower_bound_ns), Some("10s"), false, false, &catalog, now_ns, false);
        assert!(selection.is_none());
    }

    #[test]
    fn explicit_rp_blocks_override_unless_forced() {
        let catalog = catalog_with_two_rps();
        let from_parts = FromParts {
            schema: Some("telemetry".into()),
            retention_policy: Some("autogen".into()),
            measurement: "cpu".into(),
        };
        let now_ns = 100 * 86_400 * 1_000_000_000i64;
        let lower_bound_ns = now_ns - 10 * 86_400 * 1_000_000_000;
        assert!(select_rp(&from_parts, Some(lower_bound_ns), Some("10s"), false, false, &catalog, now_ns, false).is_none());
        assert!(select_rp(&from_parts, Some(lower_bound_ns), Some("10s"), false, false, &catalog, now_ns, true).is_some());
    }

    #[test]
    fn sum_rescale_only_applied_in_counter_sum_mode() {
        let catalog = catalog_with_two_rps();
        let from_parts = FromParts {
            schema: Some("telemetry".into()),
            retention_policy: None,
            measurement: "cpu".into(),
        };
        let now_ns = 100 * 86_400 * 1_000_000_000i64;
        let lower_bound_ns = now_ns - 10 * 86_400 * 1_000_000_000;
        let selection = select_rp(&from_parts, Some(lower_bound_ns), Some("10s"), true, false, &catalog, now_ns, false)
            .unwrap();
        assert!(selection.sum_group_by_time_interval_factor.is_none());

        let selection = select_rp(&from_parts, Some(lower_bound_ns), Some("10s"), true, true, &catalog, now_ns, false)
            .unwrap();
        assert_eq!(selection.sum_group_by_time_interval_factor.as_deref(), Some("10000000000 / 300000000000"));
    }
}
