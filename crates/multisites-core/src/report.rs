//! Tabular report model shared by the merge, evolution and pipeline stages.
//!
//! A [`Report`] is either a plain [`ReportTable`] or a [`ReportGroup`] of
//! nested reports (one per site or per sub-period). Every stage that touches
//! both shapes walks them through [`Report::tables_mut`] so the two shapes
//! share one algorithm.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Row column holding the display label (a site id until names are resolved).
pub const LABEL_COLUMN: &str = "label";

/// Row metadata key holding the numeric site id.
pub const IDSITE_METADATA: &str = "idsite";

/// A single cell or metadata value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the value. Numeric strings are accepted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Float(_) => None,
            Value::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_f64().is_some_and(|v| v == 0.0)
    }

    /// Collapse whole floats back to integers so archive counters stay integral.
    pub fn from_f64(v: f64) -> Self {
        if v.fract() == 0.0 && v.abs() < 9_007_199_254_740_992.0 {
            Value::Int(v as i64)
        } else {
            Value::Float(v)
        }
    }

    /// Numeric addition. Integer overflow and non-integer operands widen to float.
    pub fn add(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => match a.checked_add(*b) {
                Some(sum) => Value::Int(sum),
                None => Value::Float(*a as f64 + *b as f64),
            },
            _ => Value::Float(self.as_f64().unwrap_or(0.0) + other.as_f64().unwrap_or(0.0)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Insertion-ordered column map. Serialises as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns(Vec<(String, Value)>);

impl Columns {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        match self.0.iter_mut().find(|(k, _)| k == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name.to_string(), value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.0.iter().position(|(k, _)| k == name)?;
        Some(self.0.remove(idx).1)
    }

    /// Rename `from` to `to` in place, keeping the column position.
    pub fn rename(&mut self, from: &str, to: &str) {
        if from == to || self.get(from).is_none() {
            return;
        }
        self.0.retain(|(k, _)| k != to);
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| k == from) {
            entry.0 = to.to_string();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Columns {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportRow {
    pub columns: Columns,
    pub metadata: BTreeMap<String, Value>,
}

impl ReportRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.columns.set(name, value.into());
        self
    }

    pub fn column(&self, name: &str) -> Option<&Value> {
        self.columns.get(name)
    }

    pub fn set_column(&mut self, name: &str, value: impl Into<Value>) {
        self.columns.set(name, value.into());
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Value> {
        self.columns.remove(name)
    }

    pub fn label(&self) -> Option<&Value> {
        self.columns.get(LABEL_COLUMN)
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }
}

/// One site/period worth of rows plus table-level metadata (totals etc).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportTable {
    pub rows: Vec<ReportRow>,
    pub metadata: BTreeMap<String, Value>,
}

impl ReportTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<ReportRow>) -> Self {
        Self {
            rows,
            metadata: BTreeMap::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    /// Find a row by label, comparing labels numerically when both sides are numeric.
    pub fn row_by_label(&self, label: &Value) -> Option<&ReportRow> {
        self.rows.iter().find(|row| match row.label() {
            Some(candidate) => labels_equal(candidate, label),
            None => false,
        })
    }
}

fn labels_equal(a: &Value, b: &Value) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => a.to_string() == b.to_string(),
    }
}

/// What the entries of a [`ReportGroup`] are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Site,
    Period,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupEntry {
    pub key: String,
    pub report: Report,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportGroup {
    #[serde(rename = "group_by")]
    pub kind: GroupKind,
    #[serde(rename = "tables")]
    pub entries: Vec<GroupEntry>,
}

impl ReportGroup {
    pub fn new(kind: GroupKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, key: impl Into<String>, report: Report) {
        self.entries.push(GroupEntry {
            key: key.into(),
            report,
        });
    }

    pub fn get(&self, key: &str) -> Option<&Report> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.report)
    }
}

/// A report in either of its two shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
    Plain(ReportTable),
    Grouped(ReportGroup),
}

impl Default for Report {
    fn default() -> Self {
        Report::Plain(ReportTable::default())
    }
}

impl Report {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_grouped(&self) -> bool {
        matches!(self, Report::Grouped(_))
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            Report::Plain(_) => "plain",
            Report::Grouped(_) => "grouped",
        }
    }

    pub fn as_table(&self) -> Option<&ReportTable> {
        match self {
            Report::Plain(t) => Some(t),
            Report::Grouped(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&ReportGroup> {
        match self {
            Report::Plain(_) => None,
            Report::Grouped(g) => Some(g),
        }
    }

    /// Every plain table in the report, depth-first, in entry order.
    pub fn tables(&self) -> Vec<&ReportTable> {
        let mut out = Vec::new();
        self.collect_tables(&mut out);
        out
    }

    fn collect_tables<'a>(&'a self, out: &mut Vec<&'a ReportTable>) {
        match self {
            Report::Plain(t) => out.push(t),
            Report::Grouped(g) => {
                for entry in &g.entries {
                    entry.report.collect_tables(out);
                }
            }
        }
    }

    /// Mutable counterpart of [`Report::tables`].
    pub fn tables_mut(&mut self) -> Vec<&mut ReportTable> {
        let mut out = Vec::new();
        self.collect_tables_mut(&mut out);
        out
    }

    fn collect_tables_mut<'a>(&'a mut self, out: &mut Vec<&'a mut ReportTable>) {
        match self {
            Report::Plain(t) => out.push(t),
            Report::Grouped(g) => {
                for entry in g.entries.iter_mut() {
                    entry.report.collect_tables_mut(out);
                }
            }
        }
    }

    /// Total number of rows across all tables.
    pub fn row_count(&self) -> usize {
        self.tables().iter().map(|t| t.row_count()).sum()
    }
}
