//! In-place query rewrites (spec §4.3), grounded on `query_modification.py`.
//!
//! Each function here mutates a [`ParsedQuery`] (or, for the two rewrites
//! that run before a structural parse exists, a raw query string) and
//! turns the touched token opaque via [`ParsedQuery::replace_opaque`].

use std::collections::HashMap;
use std::sync::OnceLock;

use fancy_regex::Regex;

use crate::ast::{ParsedQuery, TokenKind};
use crate::measurement::parse_measurement_path;
use crate::parser::{column_has_transform_wrapping_sum, extract_columns, time_group_by_re};
use crate::scan::split_top_level;

/// Rewrite the FROM target to `"schema"."rp"."measurement"`. If the target
/// already names a schema (the three-part form), that schema wins over the
/// `schema` argument — a query pinning its own database isn't second-guessed.
pub fn change_rp(pq: &mut ParsedQuery, schema: &str, rp: &str, measurement: &str) -> bool {
    let idx = match pq.find_index(TokenKind::From) {
        Some(i) => i,
        None => return false,
    };
    let current = pq.tokens[idx].text().to_string();
    let trimmed = current.trim();
    let lead_len = current.len() - current.trim_start().len();
    let trail_len = current.len() - current.trim_end().len();
    let leading = &current[..lead_len];
    let trailing = &current[current.len() - trail_len..];

    let effective_schema = parse_measurement_path(trimmed)
        .and_then(|p| p.schema)
        .unwrap_or_else(|| schema.to_string());

    let replacement = format!(
        "{leading}\"{effective_schema}\".\"{rp}\".\"{measurement}\"{trailing}"
    );
    pq.replace_opaque(idx, replacement);
    true
}

/// Overwrite the interval of the first `time(...)` element in GROUP BY.
pub fn change_group_by_time_interval(pq: &mut ParsedQuery, interval: &str) -> bool {
    let idx = match pq.find_index(TokenKind::GroupBy) {
        Some(i) => i,
        None => return false,
    };
    let text = pq.tokens[idx].text().to_string();
    let chars: Vec<char> = text.chars().collect();
    let parts = split_top_level(&chars, ',');

    let mut replaced = false;
    let new_parts: Vec<String> = parts
        .into_iter()
        .map(|part| {
            if replaced {
                return part;
            }
            let lead = part.len() - part.trim_start().len();
            let elem = part[lead..].trim_end();
            match rewrite_time_interval(elem, interval) {
                Some(rewritten) => {
                    replaced = true;
                    let trail = &part[lead + elem.len()..];
                    format!("{}{}{}", &part[..lead], rewritten, trail)
                }
                None => part,
            }
        })
        .collect();

    if replaced {
        pq.replace_opaque(idx, new_parts.join(","));
    }
    replaced
}

fn rewrite_time_interval(elem: &str, interval: &str) -> Option<String> {
    let caps = time_group_by_re().captures(elem).ok()??;
    let m = caps.name("interval")?;
    Some(format!("{}{}{}", &elem[..m.start()], interval, &elem[m.end()..]))
}

fn sum_factor_simple_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^sum\(.*?\)(?P<factor>.*?)(( AS | as ).*)?$").unwrap())
}

fn sum_factor_transform_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^.*\(\s*sum\(.*?\),(.*)\)(?P<factor>.*?)(( AS | as ).*)?$").unwrap()
    })
}

/// Append a `* (factor)` rescale right after the column's `sum(...)` (or
/// the outer transform wrapping it), leaving any alias untouched.
pub fn change_sum_group_by_time_factor(pq: &mut ParsedQuery, factor: &str) -> bool {
    let idx = match pq.find_index(TokenKind::Columns) {
        Some(i) => i,
        None => return false,
    };
    let mut changed = false;
    let new_columns: Vec<String> = extract_columns(pq)
        .into_iter()
        .map(|column| {
            let re = if column_has_transform_wrapping_sum(&column) {
                sum_factor_transform_re()
            } else {
                sum_factor_simple_re()
            };
            match re.captures(&column).ok().flatten().and_then(|c| c.name("factor").map(|m| m.end())) {
                Some(end) => {
                    changed = true;
                    format!("{} * ({}){}", &column[..end], factor, &column[end..])
                }
                None => column,
            }
        })
        .collect();
    if changed {
        pq.replace_opaque(idx, new_columns.join(", "));
    }
    changed
}

pub fn add_limit(query: &str, limit: u64) -> String {
    format!("{query} LIMIT {limit}")
}

fn lower_time_bound_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is).*WHERE.*time\s*>=?\s*(?P<bound>.+?)\s+(and|group)").unwrap()
    })
}

/// Push the lower time bound further into the past by subtracting an
/// extra interval, textually (`time > now() - 24h` becomes
/// `time > now() - 24h - 1h`).
pub fn extend_lower_time_bound(query: &str, interval_str: &str) -> Option<String> {
    let caps = lower_time_bound_re().captures(query).ok()??;
    let end = caps.name("bound")?.end();
    let mut result = String::with_capacity(query.len() + interval_str.len() + 3);
    result.push_str(&query[..end]);
    result.push_str(" - ");
    result.push_str(interval_str);
    result.push_str(&query[end..]);
    Some(result)
}

fn nnd_with_interval_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^non_negative_derivative\((?P<content>.*?),\s*(?P<interval>.+?)\s*\)\s*(?P<math_n_alias>.*?)$")
            .unwrap()
    })
}

fn nnd_without_interval_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^non_negative_derivative\((?P<content>.*?)\)\s*(?P<math_n_alias>.*?)$").unwrap()
    })
}

/// Strip `non_negative_derivative(...)` wrapping back to its inner column,
/// for every matching column unless `index_list` narrows it. The counter-wrap
/// corrective rule re-derives the derivative itself once raw counter values
/// are available.
///
/// `index_list` and `forced_column_name_map` both index by the position
/// among *matching* (nth `non_negative_derivative`) columns, not by raw
/// column position, matching how the corrective rule walks its targets.
pub fn remove_non_negative_derivative(
    pq: &mut ParsedQuery,
    index_list: Option<&[usize]>,
    forced_column_name_map: Option<&HashMap<usize, String>>,
) -> bool {
    let idx = match pq.find_index(TokenKind::Columns) {
        Some(i) => i,
        None => return false,
    };
    let mut index_found = 0usize;
    let mut changed = false;
    let new_columns: Vec<String> = extract_columns(pq)
        .into_iter()
        .map(|column| {
            let with_interval = nnd_with_interval_re().captures(&column).ok().flatten();
            let without_interval = if with_interval.is_none() {
                nnd_without_interval_re().captures(&column).ok().flatten()
            } else {
                None
            };
            let Some(caps) = with_interval.as_ref().or(without_interval.as_ref()) else {
                return column;
            };

            let applies = index_list.map_or(true, |l| l.contains(&index_found));
            let result = if applies {
                let content = caps.name("content").map(|m| m.as_str()).unwrap_or("");
                let tail_start = match caps.name("interval") {
                    Some(interval) => interval.end() + 1,
                    None => caps.name("content").map(|m| m.end() + 1).unwrap_or(0),
                };
                let alias_end = caps.name("math_n_alias").map(|m| m.end()).unwrap_or(column.len());
                let tail = &column[tail_start.min(column.len())..alias_end.min(column.len())];

                let mut rebuilt = String::new();
                rebuilt.push_str(content);
                rebuilt.push_str(tail);
                if let Some(alias) = forced_column_name_map.and_then(|m| m.get(&index_found)) {
                    rebuilt.push_str(" AS ");
                    rebuilt.push_str(alias);
                    rebuilt.push(' ');
                }
                changed = true;
                rebuilt
            } else {
                column
            };
            index_found += 1;
            result
        })
        .collect();

    if changed {
        pq.replace_opaque(idx, new_columns.join(", "));
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn change_rp_rewrites_two_part_target() {
        let mut pq = parse("SELECT mean(x) FROM \"cpu\" WHERE time > now() - 1h");
        assert!(change_rp(&mut pq, "telemetry", "autogen", "cpu"));
        assert_eq!(
            pq.stringify(),
            "SELECT mean(x) FROM \"telemetry\".\"autogen\".\"cpu\" WHERE time > now() - 1h"
        );
    }

    #[test]
    fn change_rp_keeps_query_schema_override() {
        let mut pq = parse("SELECT mean(x) FROM \"other\".\"rp1\".\"cpu\" WHERE time > now() - 1h");
        assert!(change_rp(&mut pq, "telemetry", "autogen", "cpu"));
        assert_eq!(
            pq.stringify(),
            "SELECT mean(x) FROM \"other\".\"autogen\".\"cpu\" WHERE time > now() - 1h"
        );
    }

    #[test]
    fn change_group_by_rewrites_interval() {
        let mut pq = parse("SELECT mean(x) FROM m WHERE time > now() - 1h GROUP BY time(10s)");
        assert!(change_group_by_time_interval(&mut pq, "1m"));
        assert_eq!(
            pq.stringify(),
            "SELECT mean(x) FROM m WHERE time > now() - 1h GROUP BY time(1m)"
        );
    }

    #[test]
    fn sum_factor_inserted_after_sum_call() {
        let mut pq = parse("SELECT sum(x) FROM m WHERE time > now() - 1h GROUP BY time(1m)");
        assert!(change_sum_group_by_time_factor(&mut pq, "1024 / 2048"));
        assert_eq!(
            extract_columns(&pq)[0],
            "sum(x) * (1024 / 2048)"
        );
    }

    #[test]
    fn nnd_removed_back_to_inner_column() {
        let mut pq = parse(
            "SELECT non_negative_derivative(sum(bytes), 1s) AS rate FROM m WHERE time > now() - 1h GROUP BY time(1m)",
        );
        assert!(remove_non_negative_derivative(&mut pq, None, None));
        let cols = extract_columns(&pq);
        assert_eq!(cols[0].trim(), "sum(bytes) AS rate");
    }

    #[test]
    fn extend_lower_bound_appends_interval() {
        let q = "SELECT mean(x) FROM m WHERE time > now() - 24h GROUP BY time(1m)";
        let extended = extend_lower_time_bound(q, "1h").unwrap();
        assert_eq!(
            extended,
            "SELECT mean(x) FROM m WHERE time > now() - 24h - 1h GROUP BY time(1m)"
        );
    }

    #[test]
    fn add_limit_appends_clause() {
        assert_eq!(add_limit("SELECT x FROM m", 500), "SELECT x FROM m LIMIT 500");
    }
}
