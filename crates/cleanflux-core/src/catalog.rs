//! Retention-policy catalog and counter-aggregation configuration
//! (spec §3 "RetentionPolicy"/"RpCatalog"/"ContinuousQuery"/"AggregationRule"),
//! grounded on `rp_conf_access.py` and the `known_retention_policies` /
//! `aggregation_properties` structures threaded through `rp_auto_selection.py`.

use std::collections::HashMap;

use fancy_regex::Regex;

use crate::interval::parse_rp_duration;

/// One retention policy known for a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub name: String,
    /// `None` means infinite retention (`INF`).
    pub duration_ns: Option<i64>,
    /// Bucket width this RP was built with, when known (continuous-query
    /// RPs always know it; the catalog's raw/base RP may not).
    pub interval: Option<String>,
    pub is_default: bool,
}

impl RetentionPolicy {
    pub fn new(name: impl Into<String>, duration_ns: Option<i64>) -> Self {
        RetentionPolicy {
            name: name.into(),
            duration_ns,
            interval: None,
            is_default: false,
        }
    }

    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }

    pub fn default_flag(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    /// Parse the InfluxDB composite `<h>h<m>m<s>s` duration form, or `INF`.
    pub fn parse_duration(text: &str) -> Option<i64> {
        if text.eq_ignore_ascii_case("inf") || text.eq_ignore_ascii_case("0s") {
            return None;
        }
        parse_rp_duration(text)
    }

    /// Earliest instant (nanoseconds since epoch) still covered by this RP,
    /// given the current time. Infinite retention covers everything.
    pub fn earliest_covered_ns(&self, now_ns: i64) -> i64 {
        match self.duration_ns {
            Some(d) => now_ns - d,
            None => i64::MIN,
        }
    }
}

/// A continuous query materializing `source_rp` into `target_rp` at a given
/// bucket width — these enrich the catalog with the coarser RPs a schema
/// offers beyond its raw retention policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuousQuery {
    pub schema: String,
    pub source_rp: String,
    pub target_rp: String,
    pub interval: String,
}

/// Known retention policies per schema. Cheap to clone (process-global,
/// refreshed wholesale at startup and on reload rather than mutated
/// in place) so a reader never observes a half-updated catalog.
#[derive(Debug, Clone, Default)]
pub struct RpCatalog {
    by_schema: HashMap<String, Vec<RetentionPolicy>>,
}

impl RpCatalog {
    pub fn new() -> Self {
        RpCatalog::default()
    }

    pub fn insert_schema(&mut self, schema: impl Into<String>, rps: Vec<RetentionPolicy>) {
        self.by_schema.insert(schema.into(), rps);
    }

    pub fn knows_schema(&self, schema: &str) -> bool {
        self.by_schema.contains_key(schema)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &str> {
        self.by_schema.keys().map(String::as_str)
    }

    pub fn retention_policies(&self, schema: &str) -> Option<&[RetentionPolicy]> {
        self.by_schema.get(schema).map(|v| v.as_slice())
    }

    pub fn find_rp<'a>(&'a self, schema: &str, name: &str) -> Option<&'a RetentionPolicy> {
        self.by_schema
            .get(schema)?
            .iter()
            .find(|rp| rp.name == name)
    }

    pub fn default_rp<'a>(&'a self, schema: &str) -> Option<&'a RetentionPolicy> {
        self.by_schema.get(schema)?.iter().find(|rp| rp.is_default)
    }

    /// Fold continuous-query bindings into the catalog: each CQ assigns its
    /// bucket width to the RP it targets, exactly once. An RP already known
    /// to the catalog (e.g. the backend's raw RP list) gets its `interval`
    /// filled in if it doesn't have one yet; an RP the catalog has never
    /// seen (a pure CQ-materialized RP) is added outright.
    pub fn enrich_from_continuous_queries(&mut self, cqs: &[ContinuousQuery]) {
        for cq in cqs {
            let entry = self.by_schema.entry(cq.schema.clone()).or_default();
            match entry.iter_mut().find(|rp| rp.name == cq.target_rp) {
                Some(rp) if rp.interval.is_none() => rp.interval = Some(cq.interval.clone()),
                Some(_) => {}
                None => entry.push(
                    RetentionPolicy::new(cq.target_rp.clone(), None).with_interval(cq.interval.clone()),
                ),
            }
        }
    }
}

/// A regex-matched counter-aggregation override for measurements in a
/// schema (e.g. "measurements matching `if_.*` aggregate via sum, not
/// mean").
#[derive(Debug, Clone)]
pub struct AggregationRule {
    pub regexp: Regex,
    pub function: String,
}

/// Per-schema (falling back to a `"default"` entry) counter-aggregation
/// rule lists.
#[derive(Debug, Clone, Default)]
pub struct AggregationProperties {
    by_schema: HashMap<String, Vec<AggregationRule>>,
}

impl AggregationProperties {
    pub fn new() -> Self {
        AggregationProperties::default()
    }

    pub fn insert_schema(&mut self, schema: impl Into<String>, rules: Vec<AggregationRule>) {
        self.by_schema.insert(schema.into(), rules);
    }

    /// The aggregation function (`"sum"`, `"mean"`, ...) a measurement
    /// should be treated as using, or `None` if nothing matches.
    pub fn counter_aggregation_mode(&self, schema: &str, measurement: &str) -> Option<&str> {
        let rules = self
            .by_schema
            .get(schema)
            .or_else(|| self.by_schema.get("default"))?;
        rules
            .iter()
            .find(|rule| rule.regexp.is_match(measurement).unwrap_or(false))
            .map(|rule| rule.function.as_str())
    }
}

/// Per-schema, per-measurement counter-wrap thresholds (spec §6
/// "Configuration" `counter_overflows`), e.g. a 32-bit counter wraps at
/// `2^32`.
#[derive(Debug, Clone, Default)]
pub struct CounterOverflows {
    by_schema: HashMap<String, HashMap<String, f64>>,
}

impl CounterOverflows {
    pub fn new() -> Self {
        CounterOverflows::default()
    }

    pub fn insert(&mut self, schema: impl Into<String>, measurement: impl Into<String>, overflow_value: f64) {
        self.by_schema
            .entry(schema.into())
            .or_default()
            .insert(measurement.into(), overflow_value);
    }

    pub fn overflow_for(&self, schema: &str, measurement: &str) -> Option<f64> {
        self.by_schema.get(schema)?.get(measurement).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_retention_covers_everything() {
        let rp = RetentionPolicy::new("autogen", None);
        assert_eq!(rp.earliest_covered_ns(1_000_000), i64::MIN);
    }

    #[test]
    fn finite_retention_covers_back_to_duration() {
        let rp = RetentionPolicy::new("two_days", Some(2 * 86_400 * 1_000_000_000));
        assert_eq!(rp.earliest_covered_ns(10 * 86_400 * 1_000_000_000), 8 * 86_400 * 1_000_000_000);
    }

    #[test]
    fn enrich_adds_missing_cq_rp_only() {
        let mut catalog = RpCatalog::new();
        catalog.insert_schema("telemetry", vec![RetentionPolicy::new("autogen", None).default_flag(true)]);
        catalog.enrich_from_continuous_queries(&[ContinuousQuery {
            schema: "telemetry".into(),
            source_rp: "autogen".into(),
            target_rp: "downsampled_1h".into(),
            interval: "1h".into(),
        }]);
        assert!(catalog.find_rp("telemetry", "downsampled_1h").is_some());
        assert!(catalog.find_rp("telemetry", "autogen").is_some());
    }

    #[test]
    fn enrich_fills_interval_on_existing_rp_once() {
        let mut catalog = RpCatalog::new();
        catalog.insert_schema("telemetry", vec![RetentionPolicy::new("downsampled_1h", None)]);
        catalog.enrich_from_continuous_queries(&[ContinuousQuery {
            schema: "telemetry".into(),
            source_rp: "autogen".into(),
            target_rp: "downsampled_1h".into(),
            interval: "1h".into(),
        }]);
        assert_eq!(
            catalog.find_rp("telemetry", "downsampled_1h").unwrap().interval.as_deref(),
            Some("1h")
        );
    }

    #[test]
    fn counter_aggregation_mode_falls_back_to_default() {
        let mut props = AggregationProperties::new();
        props.insert_schema(
            "default",
            vec![AggregationRule {
                regexp: Regex::new("^if_").unwrap(),
                function: "sum".into(),
            }],
        );
        assert_eq!(props.counter_aggregation_mode("unknown_schema", "if_bytes"), Some("sum"));
        assert_eq!(props.counter_aggregation_mode("unknown_schema", "cpu"), None);
    }
}
