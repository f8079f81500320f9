//! FROM-target parsing into schema/retention-policy/measurement parts
//! (spec §3 "MeasurementPath").
//!
//! Mirrors `extract_measurement_from_query` in the original: the FROM
//! target is split on `.`, but a quoted segment (`"some.dotted.name"`)
//! can itself contain literal dots, so segments are reassembled whenever
//! a `"`-opened segment hasn't been closed yet.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementPath {
    pub schema: Option<String>,
    pub retention_policy: Option<String>,
    pub measurement: String,
}

/// Parse a FROM-clause target such as `"cpu"`, `"autogen"."cpu"`, or
/// `"telemetry"."autogen"."cpu"`. Returns `None` for a path with more than
/// three dot-separated parts, which the grammar doesn't allow.
pub fn parse_measurement_path(target: &str) -> Option<MeasurementPath> {
    let parts = split_respecting_quotes(target.trim());
    match parts.len() {
        1 => Some(MeasurementPath {
            schema: None,
            retention_policy: None,
            measurement: unquote(&parts[0]),
        }),
        2 => Some(MeasurementPath {
            schema: None,
            retention_policy: Some(unquote(&parts[0])),
            measurement: unquote(&parts[1]),
        }),
        3 => Some(MeasurementPath {
            schema: Some(unquote(&parts[0])),
            retention_policy: Some(unquote(&parts[1])),
            measurement: unquote(&parts[2]),
        }),
        _ => None,
    }
}

fn split_respecting_quotes(target: &str) -> Vec<String> {
    let raw: Vec<&str> = target.split('.').collect();
    let mut parts = Vec::new();
    let mut pending: Option<String> = None;

    for segment in raw {
        match &mut pending {
            Some(held) => {
                held.push('.');
                held.push_str(segment);
                if segment.ends_with('"') {
                    parts.push(pending.take().unwrap());
                }
            }
            None => {
                let opens_unterminated =
                    segment.starts_with('"') && !(segment.len() > 1 && segment.ends_with('"'));
                if opens_unterminated {
                    pending = Some(segment.to_string());
                } else {
                    parts.push(segment.to_string());
                }
            }
        }
    }
    if let Some(held) = pending {
        parts.push(held);
    }
    parts
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measurement_only() {
        let p = parse_measurement_path("\"cpu\"").unwrap();
        assert_eq!(p.schema, None);
        assert_eq!(p.retention_policy, None);
        assert_eq!(p.measurement, "cpu");
    }

    #[test]
    fn rp_and_measurement() {
        let p = parse_measurement_path("\"autogen\".\"cpu\"").unwrap();
        assert_eq!(p.retention_policy.as_deref(), Some("autogen"));
        assert_eq!(p.measurement, "cpu");
    }

    #[test]
    fn schema_rp_and_measurement() {
        let p = parse_measurement_path("\"telemetry\".\"autogen\".\"cpu\"").unwrap();
        assert_eq!(p.schema.as_deref(), Some("telemetry"));
        assert_eq!(p.retention_policy.as_deref(), Some("autogen"));
        assert_eq!(p.measurement, "cpu");
    }

    #[test]
    fn measurement_with_literal_dot_inside_quotes() {
        let p = parse_measurement_path("\"autogen\".\"if.bytes\"").unwrap();
        assert_eq!(p.retention_policy.as_deref(), Some("autogen"));
        assert_eq!(p.measurement, "if.bytes");
    }

    #[test]
    fn four_parts_is_none() {
        assert_eq!(parse_measurement_path("\"a\".\"b\".\"c\".\"d\""), None);
    }

    #[test]
    fn unquoted_measurement_only() {
        let p = parse_measurement_path("cpu").unwrap();
        assert_eq!(p.measurement, "cpu");
        assert_eq!(p.schema, None);
    }
}
