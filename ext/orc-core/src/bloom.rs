//! Bloom filter membership pre-checks

use crate::batch::is_decimal64;
use crate::converter::ConverterOptions;
use crate::decimal::scale_to_string;
use crate::engine::stats::timestamp_millis;
use crate::engine::BloomFilterIndex;
use crate::types::{TypeKind, TypeRef};
use crate::OrcValue;
use std::sync::Arc;

/// Value encoded the way the writer feeds the filter
#[derive(Debug, Clone, PartialEq)]
enum Key {
    Long(i64),
    Double(f64),
    Bytes(Vec<u8>),
}

/// Tests values of one column against its bloom filter entries
#[derive(Debug, Clone)]
pub struct BloomFilterTester {
    kind: TypeKind,
    precision: u32,
    scale: u32,
    options: Arc<ConverterOptions>,
}

impl BloomFilterTester {
    pub fn new(ty: TypeRef<'_>, options: Arc<ConverterOptions>) -> Self {
        Self {
            kind: ty.kind(),
            precision: ty.precision(),
            scale: ty.scale(),
            options,
        }
    }

    /// `false` only when every entry of `index` rules `value` out.
    ///
    /// Values without a key for this column (nulls, 128-bit
    /// decimals, compound kinds, values of the wrong type) are possibly present.
    pub fn test(&self, index: &BloomFilterIndex, value: &OrcValue) -> bool {
        match self.key(value) {
            Some(Key::Long(v)) => index.test_long(v),
            Some(Key::Double(v)) => index.test_double(v),
            Some(Key::Bytes(v)) => index.test_bytes(&v),
            None => true,
        }
    }

    fn key(&self, value: &OrcValue) -> Option<Key> {
        if self.options.is_null(value) {
            return None;
        }
        let converters = &self.options.converters;
        match self.kind {
            TypeKind::Boolean
            | TypeKind::Byte
            | TypeKind::Short
            | TypeKind::Int
            | TypeKind::Long => match value {
                OrcValue::Integer(v) => Some(Key::Long(*v)),
                OrcValue::Boolean(b) => Some(Key::Long(*b as i64)),
                _ => None,
            },
            TypeKind::Float | TypeKind::Double => {
                let v = match value {
                    OrcValue::Float(f) => f.0,
                    OrcValue::Integer(i) => *i as f64,
                    _ => return None,
                };
                // Float columns store the f32-rounded value
                let v = if self.kind == TypeKind::Float {
                    v as f32 as f64
                } else {
                    v
                };
                Some(Key::Double(v))
            }
            TypeKind::String | TypeKind::Char | TypeKind::Varchar | TypeKind::Binary => {
                match value {
                    OrcValue::String(s) => Some(Key::Bytes(s.as_bytes().to_vec())),
                    OrcValue::Binary(b) => Some(Key::Bytes(b.to_vec())),
                    _ => None,
                }
            }
            TypeKind::Date => converters.date.to_orc(value).ok().map(Key::Long),
            TypeKind::Timestamp | TypeKind::TimestampInstant => converters
                .timestamp
                .to_orc(value, &self.options.timezone)
                .ok()
                .map(|(seconds, nanos)| Key::Long(timestamp_millis(seconds, nanos))),
            TypeKind::Decimal if is_decimal64(self.precision) => {
                let decimal = converters
                    .decimal
                    .to_orc(self.precision, self.scale, value)
                    .ok()?
                    .rescale(self.scale);
                Some(Key::Bytes(
                    scale_to_string(decimal.unscaled(), self.scale).into_bytes(),
                ))
            }
            _ => None,
        }
    }
}
