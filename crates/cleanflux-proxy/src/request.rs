//! URL query-string decoding for the InfluxDB query endpoint, grounded on
//! `get_queries`/`get_schema`/`get_user`/`get_password`/`get_precision` in
//! `request_handler.py`.

/// The bits of a `/query` request the pipeline needs: one or more `q=`
/// statements (a single `q` param can itself hold several
/// semicolon-separated statements), the target `db`, optional basic-auth
/// query params, and the requested timestamp precision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub queries: Vec<String>,
    pub schema: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub epoch: Option<String>,
}

/// Parse an `application/x-www-form-urlencoded` query string (the part of
/// a URL after `?`, with no leading `?`).
pub fn parse_query_params(raw: &str) -> QueryParams {
    let mut params = QueryParams::default();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        let key = percent_decode(key);
        let value = percent_decode(value);
        match key.as_str() {
            "q" => params.queries.extend(value.split(';').filter(|s| !s.is_empty()).map(str::to_string)),
            "db" if params.schema.is_none() => params.schema = Some(value),
            "u" if params.user.is_none() => params.user = Some(value),
            "p" if params.password.is_none() => params.password = Some(value),
            "epoch" if params.epoch.is_none() => params.epoch = Some(value),
            _ => {}
        }
    }
    params
}

/// Minimal `application/x-www-form-urlencoded` decoder: `+` as space, and
/// `%XX` hex escapes.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Split `/query?db=telemetry&q=...` into its path and raw query string.
pub fn split_path_and_query(target: &str) -> (&str, &str) {
    match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_query_with_schema_and_epoch() {
        let params = parse_query_params("db=telemetry&q=SELECT%20%2A%20FROM%20cpu&epoch=ms");
        assert_eq!(params.schema.as_deref(), Some("telemetry"));
        pretty_assertions::assert_eq!(params.queries, vec!["SELECT * FROM cpu".to_string()]);
        assert_eq!(params.epoch.as_deref(), Some("ms"));
    }

    #[test]
    fn splits_semicolon_separated_statements_within_one_q_param() {
        let params = parse_query_params("q=SELECT%201%3BSELECT%202");
        assert_eq!(params.queries, vec!["SELECT 1".to_string(), "SELECT 2".to_string()]);
    }

    #[test]
    fn splits_target_into_path_and_query() {
        assert_eq!(split_path_and_query("/query?db=a"), ("/query", "db=a"));
        assert_eq!(split_path_and_query("/ping"), ("/ping", ""));
    }
}
