//! Startup retention-policy discovery over the wire, grounded on
//! `get_rp_list` in `querying.py`: `SHOW DATABASES`, then
//! `SHOW RETENTION POLICIES ON "<schema>"` and `SHOW CONTINUOUS QUERIES`
//! per schema, folded into an [`RpCatalog`].
//!
//! `SHOW CONTINUOUS QUERIES` rows carry the CQ's full `CREATE CONTINUOUS
//! QUERY ... BEGIN ... END` text rather than structured fields (the
//! `get_cq_from`/`get_cq_into`/`get_cq_interval` helpers `querying.py`
//! calls aren't present in the retrieved original source), so the target
//! RP and bucket width are pulled out of that text with a small
//! dedicated regexp rather than the full query parser.

use cleanflux_backend::ReqwestBackendClient;
use cleanflux_core::catalog::{ContinuousQuery, RetentionPolicy, RpCatalog};
use cleanflux_core::error::Result;
use fancy_regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::catalog::enrich_from_cqs;

fn cq_into_from_re() -> &'static Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)INTO\s+(?P<into>\S+)\s+FROM\s+(?P<from>\S+).*?GROUP BY.*?time\((?P<interval>[^)]+)\)"#).unwrap()
    })
}

/// Discover every schema's retention policies (and, where a continuous
/// query targets it, the bucket width that RP was built with) from the
/// live backend. `schema_list` restricts discovery to those schemas;
/// empty means "ask the backend for `SHOW DATABASES`".
pub fn discover_rp_catalog(backend: &ReqwestBackendClient, schema_list: &[String]) -> Result<RpCatalog> {
    let schemas = if schema_list.is_empty() {
        list_databases(backend)?
    } else {
        schema_list.to_vec()
    };

    let mut catalog = RpCatalog::new();
    for schema in &schemas {
        match list_retention_policies(backend, schema) {
            Ok(rps) => catalog.insert_schema(schema.clone(), rps),
            Err(e) => warn!(schema, error = %e, "could not list retention policies, skipping"),
        }
    }

    match list_continuous_queries(backend) {
        Ok(cqs) => enrich_from_cqs(&mut catalog, &cqs),
        Err(e) => warn!(error = %e, "could not list continuous queries, RP intervals left unassigned"),
    }

    Ok(catalog)
}

fn list_databases(backend: &ReqwestBackendClient) -> Result<Vec<String>> {
    let body = backend.execute_raw("", "", "", "SHOW DATABASES")?;
    Ok(string_column(&body, "name"))
}

fn list_retention_policies(backend: &ReqwestBackendClient, schema: &str) -> Result<Vec<RetentionPolicy>> {
    let query = format!("SHOW RETENTION POLICIES ON \"{schema}\"");
    let body = backend.execute_raw(schema, "", "", &query)?;
    let names = string_column(&body, "name");
    let durations = string_column(&body, "duration");
    let defaults = bool_column(&body, "default");

    Ok(names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let duration_ns = durations.get(i).and_then(|d| RetentionPolicy::parse_duration(d));
            RetentionPolicy::new(name, duration_ns).default_flag(defaults.get(i).copied().unwrap_or(false))
        })
        .collect())
}

fn list_continuous_queries(backend: &ReqwestBackendClient) -> Result<Vec<ContinuousQuery>> {
    let body = backend.execute_raw("", "", "", "SHOW CONTINUOUS QUERIES")?;
    let mut out = Vec::new();

    let Some(results) = body.get("results").and_then(Value::as_array) else {
        return Ok(out);
    };
    for result in results {
        let Some(series) = result.get("series").and_then(Value::as_array) else {
            continue;
        };
        for entry in series {
            let Some(schema) = entry.get("name").and_then(Value::as_str) else {
                continue;
            };
            let queries = string_column(entry, "query");
            for query_text in queries {
                if let Some(cq) = parse_cq_text(schema, &query_text) {
                    out.push(cq);
                }
            }
        }
    }
    Ok(out)
}

fn parse_cq_text(schema: &str, text: &str) -> Option<ContinuousQuery> {
    let caps = cq_into_from_re().captures(text).ok()??;
    let into = caps.name("into")?.as_str();
    let from = caps.name("from")?.as_str();
    let interval = caps.name("interval")?.as_str().trim().to_string();

    let into_path = cleanflux_core::measurement::parse_measurement_path(into)?;
    let from_path = cleanflux_core::measurement::parse_measurement_path(from)?;
    // Skip renaming CQs (source and target measurement differ, or the
    // target uses InfluxDB's `:MEASUREMENT` passthrough placeholder for a
    // different name) — only source->target RP bindings matter here.
    if into_path.measurement != from_path.measurement && into_path.measurement != ":MEASUREMENT" {
        return None;
    }

    Some(ContinuousQuery {
        schema: schema.to_string(),
        source_rp: from_path.retention_policy.unwrap_or_else(|| "autogen".to_string()),
        target_rp: into_path.retention_policy.unwrap_or_else(|| "autogen".to_string()),
        interval,
    })
}

/// Pull every row's string value for `column` out of a decoded `{"results":
/// [{"series": [{"columns": [...], "values": [[...]]}]}]}` response,
/// across every series in the first result.
fn string_column(body: &Value, column: &str) -> Vec<String> {
    each_row_value(body, column, |v| v.as_str().map(str::to_string))
}

fn bool_column(body: &Value, column: &str) -> Vec<bool> {
    each_row_value(body, column, |v| v.as_bool().or_else(|| v.as_str().map(|s| s == "true")))
}

fn each_row_value<T>(body: &Value, column: &str, extract: impl Fn(&Value) -> Option<T>) -> Vec<T> {
    let mut out = Vec::new();
    let Some(results) = body.get("results").and_then(Value::as_array) else {
        return out;
    };
    for result in results {
        let Some(series) = result.get("series").and_then(Value::as_array) else {
            continue;
        };
        for entry in series {
            out.extend(rows_for_column(entry, column, &extract));
        }
    }
    out
}

fn rows_for_column<T>(entry: &Value, column: &str, extract: &impl Fn(&Value) -> Option<T>) -> Vec<T> {
    let Some(columns) = entry.get("columns").and_then(Value::as_array) else {
        return Vec::new();
    };
    let Some(index) = columns.iter().position(|c| c.as_str() == Some(column)) else {
        return Vec::new();
    };
    entry
        .get("values")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.as_array().and_then(|cells| cells.get(index)).and_then(&extract))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_string_column_across_series() {
        let body = json!({
            "results": [{
                "series": [{
                    "columns": ["name"],
                    "values": [["telemetry"], ["other"]]
                }]
            }]
        });
        assert_eq!(string_column(&body, "name"), vec!["telemetry".to_string(), "other".to_string()]);
    }

    #[test]
    fn parses_cq_text_into_binding() {
        let cq = parse_cq_text(
            "telemetry",
            r#"CREATE CONTINUOUS QUERY "cq_1h" ON "telemetry" BEGIN SELECT mean(value) INTO "downsampled_1h"."cpu" FROM "autogen"."cpu" GROUP BY time(1h) END"#,
        )
        .unwrap();
        assert_eq!(cq.schema, "telemetry");
        assert_eq!(cq.source_rp, "autogen");
        assert_eq!(cq.target_rp, "downsampled_1h");
        assert_eq!(cq.interval, "1h");
    }

    #[test]
    fn skips_renaming_cq() {
        let renamed = parse_cq_text(
            "telemetry",
            r#"CREATE CONTINUOUS QUERY "cq_1h" ON "telemetry" BEGIN SELECT mean(value) INTO "downsampled_1h"."cpu_mean" FROM "autogen"."cpu" GROUP BY time(1h) END"#,
        );
        assert!(renamed.is_none());
    }
}
