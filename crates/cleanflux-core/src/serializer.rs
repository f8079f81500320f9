//! Result re-serialization into the backend's JSON response envelope
//! (spec §4.7).
//!
//! Builds the envelope by hand with `serde_json::json!` rather than
//! deriving `Serialize` on [`TabularResult`] itself — the shape (a
//! `"tags"` key that's present only for tagged series, the epoch-precision
//! switch on timestamps) doesn't map onto a single derive.

use serde_json::{json, Map, Value};

use crate::interval::Unit;
use crate::tabular::{Cell, SeriesKey, Table, TabularResult};

/// Build one `results[]` entry from a single query's tabular result.
pub fn serialize_result(result: &TabularResult, epoch: Option<&str>) -> Value {
    let unit = epoch_unit(epoch);
    let series: Vec<Value> = result
        .iter()
        .map(|(key, table)| serialize_series(key, table, unit))
        .collect();
    json!({ "series": series })
}

/// Wrap one or more per-query results into the top-level `{"results": [...]}`
/// envelope, preserving request order.
pub fn serialize_envelope(results: &[TabularResult], epoch: Option<&str>) -> Value {
    let entries: Vec<Value> = results.iter().map(|r| serialize_result(r, epoch)).collect();
    json!({ "results": entries })
}

fn serialize_series(key: &SeriesKey, table: &Table, unit: Unit) -> Value {
    let mut columns = Vec::with_capacity(table.columns.len() + 1);
    columns.push(Value::String("time".to_string()));
    columns.extend(table.columns.iter().cloned().map(Value::String));

    let values: Vec<Value> = table
        .rows
        .iter()
        .map(|row| {
            let mut cells = Vec::with_capacity(row.values.len() + 1);
            cells.push(serialize_timestamp(row.timestamp_ns, unit));
            cells.extend(row.values.iter().map(serialize_cell));
            Value::Array(cells)
        })
        .collect();

    let mut obj = Map::new();
    obj.insert("name".to_string(), Value::String(key.measurement().to_string()));
    if let Some(tags) = key.tags() {
        let mut tag_obj = Map::new();
        for (k, v) in tags {
            tag_obj.insert(k.clone(), Value::String(v.clone()));
        }
        obj.insert("tags".to_string(), Value::Object(tag_obj));
    }
    obj.insert("columns".to_string(), Value::Array(columns));
    obj.insert("values".to_string(), Value::Array(values));
    Value::Object(obj)
}

/// NaN/missing values serialize as JSON `null`; integers and floats keep
/// their own JSON number representation (spec §4.7) rather than both
/// collapsing to a float; anything else round-trips as whatever JSON
/// value it was decoded from (spec §4.7 "array-typed cells flatten to
/// JSON arrays").
fn serialize_cell(cell: &Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Int(i) => Value::Number((*i).into()),
        Cell::Float(f) if f.is_nan() => Value::Null,
        Cell::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Cell::Other(v) => v.clone(),
    }
}

fn serialize_timestamp(timestamp_ns: i64, unit: Unit) -> Value {
    let factor = unit.nanos_factor().max(1);
    Value::Number((timestamp_ns / factor).into())
}

/// Absent or unrecognized `epoch` param resolves to nanoseconds.
fn epoch_unit(epoch: Option<&str>) -> Unit {
    match epoch {
        Some("ns") => Unit::Ns,
        Some("u") | Some("\u{b5}") => Unit::Us,
        Some("ms") => Unit::Ms,
        Some("s") => Unit::S,
        Some("m") => Unit::M,
        Some("h") => Unit::H,
        _ => Unit::Ns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabular::Row;

    #[test]
    fn serializes_bare_series_without_tags() {
        let mut table = Table::new(vec!["value".into()]);
        table.rows.push(Row {
            timestamp_ns: 1_000_000_000,
            values: vec![Cell::Float(42.0)],
        });
        let mut result = TabularResult::new();
        result.insert(SeriesKey::Bare("cpu".into()), table);

        let value = serialize_result(&result, Some("s"));
        let series = &value["series"][0];
        assert_eq!(series["name"], "cpu");
        assert!(series.get("tags").is_none());
        assert_eq!(series["columns"], json!(["time", "value"]));
        pretty_assertions::assert_eq!(series["values"], json!([[1, 42.0]]));
    }

    #[test]
    fn integer_cell_serializes_without_a_decimal_point() {
        let mut table = Table::new(vec!["count".into()]);
        table.rows.push(Row {
            timestamp_ns: 0,
            values: vec![Cell::Int(5)],
        });
        let mut result = TabularResult::new();
        result.insert(SeriesKey::Bare("cpu".into()), table);

        let value = serialize_result(&result, Some("ns"));
        assert_eq!(value["series"][0]["values"], json!([[0, 5]]));
        assert!(!value["series"][0]["values"][0][1].is_f64());
    }

    #[test]
    fn serializes_tagged_series_with_null_for_missing() {
        let mut table = Table::new(vec!["value".into()]);
        table.rows.push(Row {
            timestamp_ns: 5,
            values: vec![Cell::Null],
        });
        let mut result = TabularResult::new();
        result.insert(
            SeriesKey::Tagged("cpu".into(), vec![("host".into(), "a".into())]),
            table,
        );

        let value = serialize_result(&result, None);
        let series = &value["series"][0];
        assert_eq!(series["tags"], json!({"host": "a"}));
        assert_eq!(series["values"], json!([[5, null]]));
    }
}
