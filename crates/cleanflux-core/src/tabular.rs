//! The backend-agnostic result shape (spec §3 "TabularResult"), grounded
//! on the `result_df_dict` (`{series_key: DataFrame}`) the original
//! implementation passes between querying, corrective rules and
//! serialization. A `DataFrame` indexed by timestamp with one column per
//! field becomes a [`Table`] here: an ordered list of rows, each holding
//! one [`Cell`] per declared column (absent/NULL preserved, not dropped,
//! so downstream rules can tell "no data" from "zero").

use std::collections::BTreeMap;

use serde_json::Value;

/// Identity of one series within a query's result: a bare measurement
/// name, or a measurement paired with its tag set (spec §3
/// "TabularResult").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SeriesKey {
    Bare(String),
    Tagged(String, Vec<(String, String)>),
}

impl SeriesKey {
    pub fn measurement(&self) -> &str {
        match self {
            SeriesKey::Bare(name) => name,
            SeriesKey::Tagged(name, _) => name,
        }
    }

    pub fn tags(&self) -> Option<&[(String, String)]> {
        match self {
            SeriesKey::Bare(_) => None,
            SeriesKey::Tagged(_, tags) => Some(tags),
        }
    }
}

/// One field value in a decoded row. The backend's JSON distinguishes
/// integer- and float-valued numbers, and spec §4.7 requires that
/// distinction survive the round trip ("integers serialize as integers,
/// floats as floats"); a bare `f64` can't carry it, so this tags the two
/// separately. Anything that isn't a plain number (a string, a bool, or
/// an array-typed cell) round-trips as an opaque JSON value rather than
/// being coerced or dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Other(Value),
}

impl Cell {
    /// The value as a float for arithmetic, when it is numeric at all.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            Cell::Null | Cell::Other(_) => None,
        }
    }

    /// Build a cell from a value a corrective rule computed. Rule
    /// arithmetic is all IEEE-754 double per spec §4.6/§4.7, so a
    /// computed result is always a `Float`; NaN collapses to `Null`,
    /// matching the rest of the pipeline's "no value" sentinel.
    pub fn from_computed(value: f64) -> Cell {
        if value.is_nan() {
            Cell::Null
        } else {
            Cell::Float(value)
        }
    }

    /// Whether this cell counts as data rather than a gap — `Null` and
    /// NaN floats both read as "missing" (mirrors `df.dropna`'s NaN
    /// handling in the original).
    pub fn is_present(&self) -> bool {
        match self {
            Cell::Null => false,
            Cell::Float(f) => !f.is_nan(),
            Cell::Int(_) | Cell::Other(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub timestamp_ns: i64,
    pub values: Vec<Cell>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Drop rows that are entirely null across every declared column —
    /// mirrors `df.dropna(how='all')`.
    pub fn drop_all_null_rows(&mut self) {
        self.rows.retain(|row| row.values.iter().any(Cell::is_present));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Query result as a map from series identity to its table. `BTreeMap` so
/// serialization order is deterministic without a separate sort step.
pub type TabularResult = BTreeMap<SeriesKey, Table>;

/// Backend query execution contract (spec §4.6). Lives in `cleanflux-core`
/// (rather than `cleanflux-backend`, which implements it) because the
/// rewrite pipeline and corrective rules both need to issue follow-up
/// queries and a `cleanflux-backend -> cleanflux-core` dependency would be
/// a cycle the other way around.
pub trait BackendClient {
    fn execute(&self, schema: &str, user: &str, password: &str, query: &str) -> crate::error::Result<TabularResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_all_null_rows_keeps_partial_rows() {
        let mut table = Table::new(vec!["a".into(), "b".into()]);
        table.rows.push(Row {
            timestamp_ns: 1,
            values: vec![Cell::Null, Cell::Null],
        });
        table.rows.push(Row {
            timestamp_ns: 2,
            values: vec![Cell::Float(1.0), Cell::Null],
        });
        table.drop_all_null_rows();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].timestamp_ns, 2);
    }

    #[test]
    fn nan_float_counts_as_absent() {
        let mut table = Table::new(vec!["a".into()]);
        table.rows.push(Row {
            timestamp_ns: 1,
            values: vec![Cell::Float(f64::NAN)],
        });
        table.drop_all_null_rows();
        assert!(table.is_empty());
    }

    #[test]
    fn int_cells_are_distinct_from_float_cells() {
        assert_ne!(Cell::Int(5), Cell::Float(5.0));
        assert_eq!(Cell::Int(5).as_f64(), Some(5.0));
    }
}
