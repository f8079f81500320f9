//! Decode a `{"results": [...]}` query response into a [`TabularResult`],
//! the mirror image of `cleanflux_core::serializer`. Grounded on
//! `pd_result_to_influx_result` in `querying.py`, which builds the same
//! envelope shape in the other direction.

use cleanflux_core::error::{CleanfluxError, Result};
use cleanflux_core::tabular::{Cell, Row, SeriesKey, Table, TabularResult};
use serde_json::Value;

/// Decode the first `results[]` entry of a single-query response body.
/// Backend requests issued by this crate are always single-statement, so
/// a response with more than one result (or none) is a decode error.
pub fn decode_single_result(body: &Value) -> Result<TabularResult> {
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| CleanfluxError::BackendDecode("missing \"results\" array".into()))?;
    let result = results
        .first()
        .ok_or_else(|| CleanfluxError::BackendDecode("empty \"results\" array".into()))?;

    if let Some(error) = result.get("error").and_then(Value::as_str) {
        return Err(CleanfluxError::BackendDecode(error.to_string()));
    }

    let mut out = TabularResult::new();
    let series = result.get("series").and_then(Value::as_array).cloned().unwrap_or_default();
    for entry in series {
        let (key, table) = decode_series(&entry)?;
        out.insert(key, table);
    }
    Ok(out)
}

fn decode_series(entry: &Value) -> Result<(SeriesKey, Table)> {
    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| CleanfluxError::BackendDecode("series missing \"name\"".into()))?
        .to_string();

    let key = match entry.get("tags").and_then(Value::as_object) {
        Some(tags) if !tags.is_empty() => {
            let mut pairs: Vec<(String, String)> = tags
                .iter()
                .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                .collect();
            pairs.sort();
            SeriesKey::Tagged(name, pairs)
        }
        _ => SeriesKey::Bare(name),
    };

    let all_columns: Vec<String> = entry
        .get("columns")
        .and_then(Value::as_array)
        .ok_or_else(|| CleanfluxError::BackendDecode("series missing \"columns\"".into()))?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    // the backend always echoes "time" first; everything after it is a
    // field column.
    let columns: Vec<String> = all_columns.iter().skip(1).cloned().collect();

    let mut table = Table::new(columns);
    let values = entry.get("values").and_then(Value::as_array).cloned().unwrap_or_default();
    for row in values {
        let cells = row
            .as_array()
            .ok_or_else(|| CleanfluxError::BackendDecode("row is not an array".into()))?;
        let timestamp_ns = cells
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| CleanfluxError::BackendDecode("row missing timestamp".into()))?;
        let field_values: Vec<Cell> = cells.iter().skip(1).map(decode_cell).collect();
        table.rows.push(Row {
            timestamp_ns,
            values: field_values,
        });
    }
    Ok((key, table))
}

/// Preserve the backend's own integer/float distinction rather than
/// routing every number through `f64` (spec §4.7: "integers serialize as
/// integers, floats as floats"); anything non-numeric (strings, bools,
/// nested arrays) passes through untouched as an opaque JSON value.
fn decode_cell(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Null,
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Cell::Int(i)
            } else if let Some(f) = n.as_f64() {
                Cell::Float(f)
            } else {
                Cell::Null
            }
        }
        other => Cell::Other(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_bare_series_dropping_time_column() {
        let body = json!({
            "results": [{
                "series": [{
                    "name": "cpu",
                    "columns": ["time", "mean"],
                    "values": [[1_000_000_000i64, 42.5], [2_000_000_000i64, null]]
                }]
            }]
        });
        let result = decode_single_result(&body).unwrap();
        let table = &result[&SeriesKey::Bare("cpu".into())];
        assert_eq!(table.columns, vec!["mean".to_string()]);
        pretty_assertions::assert_eq!(table.rows[0], Row { timestamp_ns: 1_000_000_000, values: vec![Cell::Float(42.5)] });
        pretty_assertions::assert_eq!(table.rows[1], Row { timestamp_ns: 2_000_000_000, values: vec![Cell::Null] });
    }

    #[test]
    fn decodes_integer_valued_column_as_int_not_float() {
        let body = json!({
            "results": [{
                "series": [{
                    "name": "cpu",
                    "columns": ["time", "count"],
                    "values": [[0, 5]]
                }]
            }]
        });
        let result = decode_single_result(&body).unwrap();
        let table = &result[&SeriesKey::Bare("cpu".into())];
        assert_eq!(table.rows[0].values[0], Cell::Int(5));
        assert_ne!(table.rows[0].values[0], Cell::Float(5.0));
    }

    #[test]
    fn decodes_tagged_series() {
        let body = json!({
            "results": [{
                "series": [{
                    "name": "cpu",
                    "tags": {"host": "a"},
                    "columns": ["time", "mean"],
                    "values": [[0, 1.0]]
                }]
            }]
        });
        let result = decode_single_result(&body).unwrap();
        let key = result.keys().next().unwrap();
        assert_eq!(key.measurement(), "cpu");
        assert_eq!(key.tags(), Some(&[("host".to_string(), "a".to_string())][..]));
    }

    #[test]
    fn backend_side_error_surfaces_as_decode_error() {
        let body = json!({"results": [{"error": "measurement not found"}]});
        assert!(decode_single_result(&body).is_err());
    }
}
