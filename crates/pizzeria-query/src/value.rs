//! Typed SQL values, bind parameters and result rows.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

// ============================================================================
// SQL Values
// ============================================================================

/// SQL value types for parameterized statements and decoded columns.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl SqlValue {
    /// Get the value as a string for display/debugging.
    pub fn as_display_str(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Null => "NULL".to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Interprets the value as an integer.
    ///
    /// Drivers may hand numeric columns back as text; those are parsed the
    /// same way a leading-integer parse would treat them (`"90"` -> 90,
    /// `"12.7"` -> 12). Anything that does not start with digits yields `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Self::Text(s) => parse_leading_int(s),
            _ => None,
        }
    }

    /// Converts a scalar JSON value. Arrays and objects have no SQL
    /// counterpart and return `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Boolean(*b)),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Null => Value::Null,
        }
    }
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let trimmed = s.trim_start();
    let (sign, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1, &trimmed[1..]),
        Some(b'+') => (1, &trimmed[1..]),
        _ => (1, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

// ============================================================================
// Bind Parameters
// ============================================================================

/// Logical type of a value returned through an out-bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutType {
    String,
    Number,
}

/// A single named bind: either an input value or an out-bind declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    In(SqlValue),
    Out(OutType),
}

/// Insertion-ordered named bind parameters.
///
/// Placeholder generation iterates in insertion order, so the same inputs
/// always produce the same SQL text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindParams {
    entries: IndexMap<String, BindValue>,
}

impl BindParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of an input value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert_in(name, value);
        self
    }

    pub fn insert_in(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        self.entries
            .insert(name.into(), BindValue::In(value.into()));
    }

    pub fn insert_out(&mut self, name: impl Into<String>, out_type: OutType) {
        self.entries.insert(name.into(), BindValue::Out(out_type));
    }

    pub fn get(&self, name: &str) -> Option<&BindValue> {
        self.entries.get(name)
    }

    /// Returns the input value bound under `name`, if any.
    pub fn in_value(&self, name: &str) -> Option<&SqlValue> {
        match self.entries.get(name) {
            Some(BindValue::In(value)) => Some(value),
            _ => None,
        }
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BindValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names of the input binds, in insertion order.
    pub fn in_names(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, v)| matches!(v, BindValue::In(_)))
            .map(|(k, _)| k)
    }

    /// Declared out-binds, in insertion order.
    pub fn out_binds(&self) -> impl Iterator<Item = (&str, OutType)> {
        self.iter().filter_map(|(k, v)| match v {
            BindValue::Out(t) => Some((k, *t)),
            BindValue::In(_) => None,
        })
    }

    pub fn has_out_binds(&self) -> bool {
        self.out_binds().next().is_some()
    }

    /// Appends every entry of `other`, overwriting existing names.
    pub fn extend(&mut self, other: BindParams) {
        self.entries.extend(other.entries);
    }
}

impl FromIterator<(String, BindValue)> for BindParams {
    fn from_iter<I: IntoIterator<Item = (String, BindValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Rows
// ============================================================================

/// A decoded result row, keyed by column alias in select order.
pub type Row = IndexMap<String, SqlValue>;

/// A flat resource record keyed by attribute name.
pub type RawResource = IndexMap<String, SqlValue>;

/// Values returned per out-bind: one element per affected row.
pub type OutBinds = IndexMap<String, Vec<SqlValue>>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_as_i64_coerces_driver_strings() {
        assert_eq!(SqlValue::from("90").as_i64(), Some(90));
        assert_eq!(SqlValue::from("12.7").as_i64(), Some(12));
        assert_eq!(SqlValue::from("-3").as_i64(), Some(-3));
        assert_eq!(SqlValue::from("abc").as_i64(), None);
        assert_eq!(SqlValue::Integer(7).as_i64(), Some(7));
        assert_eq!(SqlValue::Float(2.9).as_i64(), Some(2));
        assert_eq!(SqlValue::Null.as_i64(), None);
    }

    #[test]
    fn test_from_json_rejects_composites() {
        assert_eq!(SqlValue::from_json(&json!(5)), Some(SqlValue::Integer(5)));
        assert_eq!(SqlValue::from_json(&json!(null)), Some(SqlValue::Null));
        assert_eq!(
            SqlValue::from_json(&json!("x")),
            Some(SqlValue::Text("x".into()))
        );
        assert_eq!(SqlValue::from_json(&json!([1])), None);
        assert_eq!(SqlValue::from_json(&json!({"a": 1})), None);
    }

    #[test]
    fn test_bind_params_preserve_order_and_split_directions() {
        let mut params = BindParams::new().with("name", "Neapolitan");
        params.insert_out("idOut", OutType::String);
        params.insert_in("proofTime", 24);

        let names: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["name", "idOut", "proofTime"]);

        let ins: Vec<&str> = params.in_names().collect();
        assert_eq!(ins, vec!["name", "proofTime"]);

        assert!(params.has_out_binds());
        assert_eq!(params.in_value("proofTime"), Some(&SqlValue::Integer(24)));
        assert_eq!(params.in_value("idOut"), None);
    }
}
