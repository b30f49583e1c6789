use crate::decimal::Decimal;
use bytes::Bytes;
use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use std::sync::Arc;

/// Generic per-row value exchanged with converters
#[derive(Debug, Clone)]
pub enum OrcValue {
    Boolean(bool),
    // All integer widths share one kind
    Integer(i64),
    // Float and double
    Float(OrderedFloat<f64>),
    String(Arc<str>),
    Binary(Bytes),

    Date(jiff::civil::Date),
    Timestamp(jiff::Zoned),
    Decimal(Decimal),

    List(Vec<OrcValue>),
    Map(Vec<(OrcValue, OrcValue)>), // Ordered entries, as stored
    Tuple(Vec<OrcValue>),           // Struct in tuple representation
    Record(IndexMap<Arc<str>, OrcValue>), // Struct in record representation

    Null,
}

impl PartialEq for OrcValue {
    fn eq(&self, other: &Self) -> bool {
        use OrcValue::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Binary(a), Binary(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            // Same instant, regardless of the zone used to display it
            (Timestamp(a), Timestamp(b)) => a.timestamp() == b.timestamp(),
            (Decimal(a), Decimal(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Tuple(a), Tuple(b)) => a == b,
            (Record(a), Record(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y),
            (Null, Null) => true,
            _ => false,
        }
    }
}

impl Eq for OrcValue {}

impl std::hash::Hash for OrcValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            OrcValue::Boolean(b) => b.hash(state),
            OrcValue::Integer(i) => i.hash(state),
            OrcValue::Float(f) => f.hash(state),
            OrcValue::String(s) => s.hash(state),
            OrcValue::Binary(b) => b.hash(state),
            OrcValue::Date(d) => d.hash(state),
            OrcValue::Timestamp(ts) => ts.timestamp().hash(state),
            OrcValue::Decimal(d) => d.hash(state),
            OrcValue::List(l) | OrcValue::Tuple(l) => l.hash(state),
            OrcValue::Map(m) => m.hash(state),
            OrcValue::Record(r) => {
                for (k, v) in r {
                    k.hash(state);
                    v.hash(state);
                }
            }
            OrcValue::Null => 0_i32.hash(state),
        }
    }
}

impl OrcValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, OrcValue::Null)
    }

    /// Get the type name of the value
    pub fn type_name(&self) -> &'static str {
        match self {
            OrcValue::Boolean(_) => "Boolean",
            OrcValue::Integer(_) => "Integer",
            OrcValue::Float(_) => "Float",
            OrcValue::String(_) => "String",
            OrcValue::Binary(_) => "Binary",
            OrcValue::Date(_) => "Date",
            OrcValue::Timestamp(_) => "Timestamp",
            OrcValue::Decimal(_) => "Decimal",
            OrcValue::List(_) => "List",
            OrcValue::Map(_) => "Map",
            OrcValue::Tuple(_) => "Tuple",
            OrcValue::Record(_) => "Record",
            OrcValue::Null => "Null",
        }
    }

    /// Build a record from (name, value) pairs
    pub fn record<K: Into<Arc<str>>, I: IntoIterator<Item = (K, OrcValue)>>(fields: I) -> Self {
        OrcValue::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<bool> for OrcValue {
    fn from(value: bool) -> Self {
        OrcValue::Boolean(value)
    }
}

impl From<i64> for OrcValue {
    fn from(value: i64) -> Self {
        OrcValue::Integer(value)
    }
}

impl From<i32> for OrcValue {
    fn from(value: i32) -> Self {
        OrcValue::Integer(value as i64)
    }
}

impl From<f64> for OrcValue {
    fn from(value: f64) -> Self {
        OrcValue::Float(OrderedFloat(value))
    }
}

impl From<&str> for OrcValue {
    fn from(value: &str) -> Self {
        OrcValue::String(Arc::from(value))
    }
}

impl From<String> for OrcValue {
    fn from(value: String) -> Self {
        OrcValue::String(Arc::from(value))
    }
}

impl From<Bytes> for OrcValue {
    fn from(value: Bytes) -> Self {
        OrcValue::Binary(value)
    }
}

impl From<Decimal> for OrcValue {
    fn from(value: Decimal) -> Self {
        OrcValue::Decimal(value)
    }
}

impl From<jiff::civil::Date> for OrcValue {
    fn from(value: jiff::civil::Date) -> Self {
        OrcValue::Date(value)
    }
}

impl From<jiff::Zoned> for OrcValue {
    fn from(value: jiff::Zoned) -> Self {
        OrcValue::Timestamp(value)
    }
}

impl<T: Into<OrcValue>> From<Option<T>> for OrcValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(OrcValue::Null)
    }
}
