//! The `Config` struct (spec §6 "Configuration"), field-for-field against
//! `examples/original_source/cleanflux/config/default_config.py`'s
//! `DEFAULT_CONFIG`.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use cleanflux_core::catalog::{AggregationProperties, AggregationRule, CounterOverflows, RetentionPolicy, RpCatalog};
use cleanflux_core::rules::RuleName;
use fancy_regex::Regex;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid aggregation rule regexp \"{regexp}\": {source}")]
    InvalidRegexp {
        regexp: String,
        #[source]
        source: fancy_regex::Error,
    },
}

/// One entry of the `retention_policies` override table: a schema's
/// manually-declared RP, bypassing live backend discovery.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionPolicyOverride {
    pub name: String,
    /// `INF`/`0s`, a composite `<h>h<m>m<s>s` duration, or absent for
    /// infinite retention.
    pub duration: Option<String>,
    pub interval: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// One entry of the `aggregation_properties` list: a regexp over
/// measurement names and the aggregation function to treat matches as
/// using, scoped to a schema (or `"default"` to apply everywhere else).
#[derive(Debug, Clone, Deserialize)]
pub struct AggregationPropertyConfig {
    #[serde(default = "default_schema_scope")]
    pub schema: String,
    pub regexp: String,
    pub function: String,
}

fn default_schema_scope() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,

    pub backend_host: String,
    pub backend_port: u16,
    pub backend_user: Option<String>,
    pub backend_password: Option<String>,

    pub rules: Vec<String>,

    pub max_nb_points_per_series: Option<i64>,
    pub max_nb_points_per_query: Option<i64>,

    /// schema -> measurement -> overflow value.
    pub counter_overflows: HashMap<String, HashMap<String, f64>>,

    pub aggregation_properties: Vec<AggregationPropertyConfig>,

    pub auto_retrieve_retention_policies: bool,
    /// schema -> manually-declared RPs, used instead of (or alongside)
    /// live discovery.
    pub retention_policies: HashMap<String, Vec<RetentionPolicyOverride>>,

    pub foreground: bool,
    pub pidfile: String,

    pub epoch: Option<String>,
    pub configfile: Option<String>,

    /// Accepted for compatibility; emitting to syslog is a documented
    /// non-goal (see DESIGN.md) — logging always goes through `tracing`.
    pub use_syslog: bool,
    pub syslog_address: Option<String>,
    pub logfile: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "localhost".to_string(),
            port: 8888,

            backend_host: "localhost".to_string(),
            backend_port: 8086,
            backend_user: None,
            backend_password: None,

            rules: vec!["remove_partial_intervals_case_sum_group_by_time".to_string()],

            max_nb_points_per_series: None,
            max_nb_points_per_query: None,

            counter_overflows: HashMap::new(),
            aggregation_properties: Vec::new(),

            auto_retrieve_retention_policies: true,
            retention_policies: HashMap::new(),

            foreground: false,
            pidfile: "/var/run/cleanflux.pid".to_string(),

            epoch: None,
            configfile: None,

            use_syslog: false,
            syslog_address: None,
            logfile: "/var/log/cleanflux.log".to_string(),
            log_level: "ERROR".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Rule names this config enables, skipping (and the caller should log)
    /// any string that doesn't match a known [`RuleName`] variant.
    pub fn rule_names(&self) -> Vec<RuleName> {
        self.rules.iter().filter_map(|name| RuleName::from_str(name).ok()).collect()
    }

    pub fn counter_overflows(&self) -> CounterOverflows {
        let mut out = CounterOverflows::new();
        for (schema, by_measurement) in &self.counter_overflows {
            for (measurement, value) in by_measurement {
                out.insert(schema.clone(), measurement.clone(), *value);
            }
        }
        out
    }

    pub fn aggregation_properties(&self) -> Result<AggregationProperties, ConfigError> {
        let mut by_schema: HashMap<String, Vec<AggregationRule>> = HashMap::new();
        for entry in &self.aggregation_properties {
            let regexp = Regex::new(&entry.regexp).map_err(|source| ConfigError::InvalidRegexp {
                regexp: entry.regexp.clone(),
                source,
            })?;
            by_schema.entry(entry.schema.clone()).or_default().push(AggregationRule {
                regexp,
                function: entry.function.clone(),
            });
        }
        let mut props = AggregationProperties::new();
        for (schema, rules) in by_schema {
            props.insert_schema(schema, rules);
        }
        Ok(props)
    }

    /// Manually-declared retention policies from the `retention_policies`
    /// override table, independent of live backend discovery.
    pub fn static_rp_catalog(&self) -> RpCatalog {
        let mut catalog = RpCatalog::new();
        for (schema, overrides) in &self.retention_policies {
            let rps = overrides
                .iter()
                .map(|o| {
                    let duration_ns = o.duration.as_deref().and_then(RetentionPolicy::parse_duration);
                    let mut rp = RetentionPolicy::new(o.name.clone(), duration_ns).default_flag(o.is_default);
                    if let Some(interval) = &o.interval {
                        rp = rp.with_interval(interval.clone());
                    }
                    rp
                })
                .collect();
            catalog.insert_schema(schema.clone(), rps);
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_original_config() {
        let config = Config::default();
        assert_eq!(config.backend_host, "localhost");
        assert_eq!(config.backend_port, 8086);
        assert_eq!(config.max_nb_points_per_series, None);
        assert_eq!(config.max_nb_points_per_query, None);
        assert!(config.auto_retrieve_retention_policies);
        pretty_assertions::assert_eq!(config.rules, vec!["remove_partial_intervals_case_sum_group_by_time".to_string()]);
    }

    #[test]
    fn loads_overrides_from_toml() {
        let toml_text = r#"
            backend_host = "influx.internal"
            backend_port = 8087
            rules = ["remove_partial_intervals_case_sum_group_by_time", "handle_counter_wrap_non_negative_derivative"]
            max_nb_points_per_series = 10000

            [counter_overflows.telemetry]
            if_octets = 4294967296.0

            [[aggregation_properties]]
            schema = "telemetry"
            regexp = "^if_"
            function = "sum"

            [[retention_policies.telemetry]]
            name = "downsampled_90d"
            duration = "7776000s"
            interval = "5m"
        "#;
        let config: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(config.backend_host, "influx.internal");
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.max_nb_points_per_series, Some(10_000));
        assert_eq!(config.counter_overflows["telemetry"]["if_octets"], 4_294_967_296.0);

        let props = config.aggregation_properties().unwrap();
        assert_eq!(props.counter_aggregation_mode("telemetry", "if_octets"), Some("sum"));

        let catalog = config.static_rp_catalog();
        assert!(catalog.find_rp("telemetry", "downsampled_90d").is_some());
    }

    #[test]
    fn unknown_rule_name_is_skipped_not_fatal() {
        let mut config = Config::default();
        config.rules.push("not_a_real_rule".to_string());
        let names = config.rule_names();
        assert_eq!(names.len(), 1);
    }
}
