//! Query parser & stringifier (spec §4.2).
//!
//! Understands just enough of the SELECT grammar to locate the column
//! list, the FROM target, and the GROUP BY list; everything else (the
//! WHERE clause body, trailing ORDER BY/LIMIT/FILL) is carried as opaque
//! text so re-stringifying an untouched parse always reproduces the
//! input byte-for-byte.

use crate::ast::{ParsedQuery, Token, TokenKind};
use crate::scan::{
    chars_to_string, find_first_keyword_ci, find_keyword_ci, matches_keyword_at, skip_whitespace,
    split_top_level,
};
use fancy_regex::Regex;
use std::sync::OnceLock;

const TRAILING_CLAUSES: &[&str] = &["ORDER", "LIMIT", "SLIMIT", "OFFSET", "SOFFSET", "FILL", "TZ"];

/// Parse a query into a [`ParsedQuery`] token stream.
pub fn parse(query: &str) -> ParsedQuery {
    let chars: Vec<char> = query.chars().collect();

    let select_start = skip_whitespace(&chars, 0);
    if matches_keyword_at(&chars, select_start, "SELECT").is_none() {
        return ParsedQuery {
            is_select: false,
            tokens: vec![Token::Literal(query.to_string())],
        };
    }

    let mut tokens = Vec::new();
    if select_start > 0 {
        tokens.push(Token::Structural(
            TokenKind::Whitespace,
            chars_to_string(&chars[0..select_start]),
        ));
    }
    let select_end = select_start + "SELECT".len();
    tokens.push(Token::Structural(
        TokenKind::Keyword,
        chars_to_string(&chars[select_start..select_end]),
    ));

    // --- columns, up to top-level FROM ---
    let from_kw = find_keyword_ci(&chars, select_end, "FROM");
    let columns_end = from_kw.map(|(s, _)| s).unwrap_or(chars.len());
    push_whitespace_then_structural(
        &mut tokens,
        &chars,
        select_end,
        columns_end,
        TokenKind::Columns,
    );

    let mut cursor = columns_end;
    if let Some((from_s, from_e)) = from_kw {
        tokens.push(Token::Structural(
            TokenKind::Keyword,
            chars_to_string(&chars[from_s..from_e]),
        ));

        let where_kw = find_keyword_ci(&chars, from_e, "WHERE");
        let group_kw = find_keyword_ci(&chars, from_e, "GROUP");
        let from_target_end = [where_kw.map(|(s, _)| s), group_kw.map(|(s, _)| s)]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(chars.len());
        push_whitespace_then_structural(&mut tokens, &chars, from_e, from_target_end, TokenKind::From);
        cursor = from_target_end;

        if let Some((where_s, where_e)) = find_keyword_ci(&chars, cursor, "WHERE") {
            if where_s == cursor {
                tokens.push(Token::Structural(
                    TokenKind::Keyword,
                    chars_to_string(&chars[where_s..where_e]),
                ));
                let group_kw2 = find_keyword_ci(&chars, where_e, "GROUP");
                let where_end = group_kw2.map(|(s, _)| s).unwrap_or(chars.len());
                push_whitespace_then_structural(&mut tokens, &chars, where_e, where_end, TokenKind::Where);
                cursor = where_end;
            }
        }

        if let Some((group_s, group_e)) = find_keyword_ci(&chars, cursor, "GROUP") {
            if group_s == cursor {
                let after_group = skip_whitespace(&chars, group_e);
                if let Some(by_end) = matches_keyword_at(&chars, after_group, "BY") {
                    tokens.push(Token::Structural(
                        TokenKind::Keyword,
                        chars_to_string(&chars[group_s..by_end]),
                    ));
                    let terminator = find_first_keyword_ci(&chars, by_end, TRAILING_CLAUSES);
                    let group_by_end = terminator.map(|(s, _, _)| s).unwrap_or(chars.len());
                    push_whitespace_then_structural(
                        &mut tokens,
                        &chars,
                        by_end,
                        group_by_end,
                        TokenKind::GroupBy,
                    );
                    cursor = group_by_end;
                }
            }
        }
    }

    if cursor < chars.len() {
        tokens.push(Token::Literal(chars_to_string(&chars[cursor..])));
    }

    ParsedQuery {
        tokens,
        is_select: true,
    }
}

/// Push `Whitespace(leading) Structural(kind, core) Whitespace(trailing)`
/// for the span `[start, end)`, matching spec's "each element trimmed"
/// while preserving every character for the round-trip invariant.
fn push_whitespace_then_structural(
    tokens: &mut Vec<Token>,
    chars: &[char],
    start: usize,
    end: usize,
    kind: TokenKind,
) {
    if start >= end {
        return;
    }
    let span = &chars[start..end];
    let lead = span.iter().take_while(|c| c.is_whitespace()).count();
    let trail = span.iter().rev().take_while(|c| c.is_whitespace()).count();
    let trail = trail.min(span.len() - lead);
    if lead > 0 {
        tokens.push(Token::Structural(
            TokenKind::Whitespace,
            chars_to_string(&span[..lead]),
        ));
    }
    if lead + trail < span.len() {
        tokens.push(Token::Structural(
            kind,
            chars_to_string(&span[lead..span.len() - trail]),
        ));
    }
    if trail > 0 {
        tokens.push(Token::Structural(
            TokenKind::Whitespace,
            chars_to_string(&span[span.len() - trail..]),
        ));
    }
}

pub fn stringify(pq: &ParsedQuery) -> String {
    pq.stringify()
}

/// Comma-separated column list, split at top-level commas only.
pub fn extract_columns(pq: &ParsedQuery) -> Vec<String> {
    match pq.find_text(TokenKind::Columns) {
        Some(text) => {
            let chars: Vec<char> = text.chars().collect();
            split_top_level(&chars, ',')
                .into_iter()
                .map(|s| s.trim().to_string())
                .collect()
        }
        None => Vec::new(),
    }
}

pub fn extract_from_target(pq: &ParsedQuery) -> Option<String> {
    pq.find_text(TokenKind::From).map(|s| s.to_string())
}

/// GROUP BY elements, split at top-level commas.
pub fn extract_group_by(pq: &ParsedQuery) -> Vec<String> {
    match pq.find_text(TokenKind::GroupBy) {
        Some(text) => {
            let chars: Vec<char> = text.chars().collect();
            split_top_level(&chars, ',')
                .into_iter()
                .map(|s| s.trim().to_string())
                .collect()
        }
        None => Vec::new(),
    }
}

pub(crate) fn time_group_by_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^time\((?P<interval>.+?)\)").unwrap())
}

pub fn extract_group_by_time_interval(pq: &ParsedQuery) -> Option<String> {
    extract_group_by(pq).into_iter().find_map(|elem| {
        let caps = time_group_by_re().captures(&elem).ok()??;
        Some(caps.name("interval")?.as_str().trim().to_string())
    })
}

pub fn is_grouped_by_time(pq: &ParsedQuery) -> bool {
    extract_group_by_time_interval(pq).is_some()
}

// --- time bounds -----------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeBound {
    Absolute(i64),
    RelativeNow(crate::interval::Interval),
}

fn lower_bound_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is).*WHERE.*time\s*>=?\s*(?P<bound>.+?)\s+(and|group)").unwrap()
    })
}

fn lower_bound_relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)now\(\)\s*-\s*(?P<interval>\S+)$").unwrap())
}

/// The raw lower-bound literal text, e.g. `now() - 1h` or `1500000000s`.
pub fn extract_lower_time_bound_text(query: &str) -> Option<String> {
    let caps = lower_bound_re().captures(query).ok()??;
    Some(caps.name("bound")?.as_str().trim().to_string())
}

pub fn is_lower_time_bound_parsable(query: &str) -> bool {
    extract_lower_time_bound(query).is_some()
}

pub fn extract_lower_time_bound(query: &str) -> Option<TimeBound> {
    let text = extract_lower_time_bound_text(query)?;
    parse_time_bound(&text)
}

fn upper_bound_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is).*WHERE.*time\s*<=?\s*(?P<bound>now\(\)(\s*-\s*\S+)?|\S+)").unwrap())
}

pub fn extract_upper_time_bound(query: &str) -> Option<TimeBound> {
    let caps = upper_bound_re().captures(query).ok()??;
    let text = caps.name("bound")?.as_str().trim();
    parse_time_bound(text)
}

fn parse_time_bound(text: &str) -> Option<TimeBound> {
    if text.eq_ignore_ascii_case("now()") {
        return Some(TimeBound::RelativeNow(crate::interval::Interval::new(
            0,
            crate::interval::Unit::S,
        )));
    }
    if let Some(caps) = lower_bound_relative_re().captures(text).ok().flatten() {
        let interval_text = caps.name("interval")?.as_str();
        let interval = crate::interval::Interval::parse(interval_text)?;
        return Some(TimeBound::RelativeNow(interval));
    }
    crate::interval::Interval::parse(text).map(|i| TimeBound::Absolute(i.to_nanos()))
}

impl TimeBound {
    pub fn resolve(&self, now_ns: i64) -> i64 {
        match self {
            TimeBound::Absolute(ns) => *ns,
            TimeBound::RelativeNow(interval) => now_ns - interval.to_nanos(),
        }
    }
}

// --- column-level inspection ------------------------------------------

const TRANSFORM_FUNCS: &[&str] = &[
    "spread",
    "derivative",
    "non_negative_derivative",
    "difference",
    "non_negative_difference",
    "moving_average",
    "cumulative_sum",
    "stddev",
    "elapsed",
];

fn outer_call_name(column: &str) -> Option<String> {
    let trimmed = column.trim_start();
    let paren = trimmed.find('(')?;
    let name = trimmed[..paren].trim();
    if name.chars().all(|c| c.is_alphanumeric() || c == '_') && !name.is_empty() {
        Some(name.to_lowercase())
    } else {
        None
    }
}

pub fn column_outer_call_is(column: &str, func: &str) -> bool {
    outer_call_name(column).as_deref() == Some(&func.to_lowercase())
}

pub fn column_has_non_negative_derivative(column: &str) -> bool {
    column_outer_call_is(column, "non_negative_derivative")
}

pub fn column_has_sum(column: &str) -> bool {
    sum_re().is_match(column).unwrap_or(false)
}

fn sum_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bsum\s*\(").unwrap())
}

pub fn column_has_transform_wrapping_sum(column: &str) -> bool {
    let alternation = TRANSFORM_FUNCS.join("|");
    let pattern = format!(r"(?i)^\s*({})\s*\(\s*sum\s*\(", alternation);
    Regex::new(&pattern)
        .ok()
        .and_then(|re| re.is_match(column).ok())
        .unwrap_or(false)
}

pub fn is_sum_group_by_time(pq: &ParsedQuery) -> bool {
    is_grouped_by_time(pq)
        && extract_columns(pq)
            .iter()
            .any(|c| column_has_sum(c) || column_has_transform_wrapping_sum(c))
}

pub fn is_non_negative_derivative_query(pq: &ParsedQuery) -> bool {
    is_grouped_by_time(pq)
        && extract_columns(pq)
            .iter()
            .any(|c| column_has_non_negative_derivative(c))
}

fn nnd_interval_capture_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i).*non_negative_derivative\(.*,\s*(?P<interval>.+?)\)\s?").unwrap()
    })
}

fn nnd_alias_capture_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i).*non_negative_derivative\((?P<aggreg_func>.*?)\((?P<content>.*?)\).*?\s*(as|AS)\s*(?P<alias>.+?)$").unwrap()
    })
}

/// Top-level `non_negative_derivative(...)` columns, in SELECT order
/// (columns where it's merely nested inside another transform don't
/// count — the counter-wrap rule only rewrites the outermost call).
pub fn extract_nnd_columns(pq: &ParsedQuery) -> Vec<String> {
    extract_columns(pq)
        .into_iter()
        .filter(|c| column_outer_call_is(c, "non_negative_derivative"))
        .collect()
}

/// Per-NND-column bucket width, defaulting to `1s` when the call has no
/// explicit interval argument (e.g. `non_negative_derivative(sum(x))`).
pub fn extract_nnd_intervals(pq: &ParsedQuery) -> Vec<String> {
    extract_nnd_columns(pq)
        .iter()
        .map(|call| {
            nnd_interval_capture_re()
                .captures(call)
                .ok()
                .flatten()
                .and_then(|c| c.name("interval").map(|m| m.as_str().trim().to_string()))
                .unwrap_or_else(|| "1s".to_string())
        })
        .collect()
}

/// Per-NND-column output name: the `AS alias` if present, else the
/// literal `non_negative_derivative` (duplicates of that default get
/// disambiguated by the caller).
pub fn extract_nnd_column_names(pq: &ParsedQuery) -> Vec<String> {
    extract_nnd_columns(pq)
        .iter()
        .map(|call| {
            nnd_alias_capture_re()
                .captures(call)
                .ok()
                .flatten()
                .and_then(|c| c.name("alias").map(|m| m.as_str().trim().to_string()))
                .unwrap_or_else(|| "non_negative_derivative".to_string())
        })
        .collect()
}

pub fn is_select_query(query: &str) -> bool {
    query.trim_start().to_uppercase().starts_with("SELECT")
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q1: &str = "SELECT mean(v) FROM \"m\" WHERE time > now() - 24h GROUP BY time(10s)";

    #[test]
    fn roundtrip_identity_for_fixture_queries() {
        let fixtures = [
            Q1,
            "SELECT sum(x) FROM m WHERE time > now() - 1h GROUP BY time(5m)",
            "SELECT non_negative_derivative(sum(bytes), 1s) AS rate FROM \"db\".\"rp\".\"if_bytes\" WHERE time > now() - 2h GROUP BY time(1m)",
            "SHOW DATABASES",
            "SELECT value FROM cpu",
        ];
        for q in fixtures {
            let pq = parse(q);
            assert_eq!(stringify(&pq), q, "roundtrip failed for {q}");
        }
    }

    #[test]
    fn is_select_flag() {
        assert!(parse(Q1).is_select);
        assert!(!parse("SHOW DATABASES").is_select);
    }

    #[test]
    fn extracts_columns_respecting_parens() {
        let pq = parse("SELECT mean(x), non_negative_derivative(sum(y), 1m) AS r FROM m");
        let cols = extract_columns(&pq);
        assert_eq!(cols, vec!["mean(x)", "non_negative_derivative(sum(y), 1m) AS r"]);
    }

    #[test]
    fn extracts_from_target() {
        let pq = parse(Q1);
        assert_eq!(extract_from_target(&pq).as_deref(), Some("\"m\""));
    }

    #[test]
    fn extracts_group_by_time_interval() {
        let pq = parse(Q1);
        assert_eq!(extract_group_by_time_interval(&pq).as_deref(), Some("10s"));
    }

    #[test]
    fn extracts_lower_bound_relative() {
        let bound = extract_lower_time_bound(Q1).unwrap();
        match bound {
            TimeBound::RelativeNow(i) => assert_eq!(i.to_nanos(), crate::interval::Interval::parse("24h").unwrap().to_nanos()),
            _ => panic!("expected relative bound"),
        }
    }

    #[test]
    fn sum_detection_handles_wrapping() {
        assert!(column_has_sum("sum(x)"));
        assert!(column_has_transform_wrapping_sum("non_negative_derivative(sum(x), 1m)"));
        assert!(!column_has_transform_wrapping_sum("mean(x)"));
    }
}
