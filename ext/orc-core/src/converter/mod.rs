//! Per-kind codecs between column batches and [`OrcValue`]s
//!
//! One converter is built per type node with [`create_converter`]; compound
//! kinds own their child converters. A converter is bound to a batch by
//! [`Converter::reset`] and may only decode from that batch until the batch is
//! refilled, which is checked through the batch generation.

mod decimal;
mod nested;
mod scalar;
mod temporal;

use crate::batch::ColumnVectorBatch;
use crate::decimal::Decimal;
use crate::types::{TypeKind, TypeRef};
use crate::{OrcError, OrcValue, Result};
use jiff::tz::TimeZone;
use std::sync::Arc;

pub use self::decimal::DecimalColumnConverter;
pub use self::nested::{ListConverter, MapConverter, StructConverter, UnionConverter};
pub use self::scalar::{BinaryConverter, BooleanConverter, FloatConverter, IntegerConverter, StringConverter};
pub use self::temporal::{DateColumnConverter, TimestampColumnConverter};

/// Codec between one type node's batch storage and row values
pub trait Converter {
    /// Bind to a freshly filled batch (and its children)
    fn reset(&mut self, batch: &ColumnVectorBatch) -> Result<()>;

    /// Value at `row`, or the null placeholder for invalid rows
    fn decode(&self, batch: &ColumnVectorBatch, row: usize) -> Result<OrcValue>;

    /// Store `value` at `row`. The null placeholder marks the row invalid.
    fn encode(&mut self, batch: &mut ColumnVectorBatch, row: usize, value: &OrcValue)
        -> Result<()>;

    /// Forget per-batch encoding state before the batch is reused
    fn clear(&mut self) {}
}

/// How struct values are represented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructRepr {
    /// Positional `OrcValue::Tuple`
    #[default]
    Tuple = 0,
    /// Named `OrcValue::Record`
    Record = 1,
}

/// Pluggable codec for DATE columns
pub trait DateConverter: Send + Sync {
    fn from_orc(&self, days: i64) -> Result<OrcValue>;
    fn to_orc(&self, value: &OrcValue) -> Result<i64>;
}

/// Pluggable codec for TIMESTAMP columns
pub trait TimestampConverter: Send + Sync {
    fn from_orc(&self, seconds: i64, nanoseconds: i64, timezone: &TimeZone) -> Result<OrcValue>;
    fn to_orc(&self, value: &OrcValue, timezone: &TimeZone) -> Result<(i64, i64)>;
}

/// Pluggable codec for DECIMAL columns
pub trait DecimalConverter: Send + Sync {
    fn from_orc(&self, decimal: Decimal) -> Result<OrcValue>;
    fn to_orc(&self, precision: u32, scale: u32, value: &OrcValue) -> Result<Decimal>;
}

/// Days since 1970-01-01 as a civil date
#[derive(Debug, Default)]
pub struct DefaultDateConverter;

impl DateConverter for DefaultDateConverter {
    fn from_orc(&self, days: i64) -> Result<OrcValue> {
        let seconds = days
            .checked_mul(86400)
            .ok_or_else(|| OrcError::value(format!("Date out of range: {} days", days)))?;
        let ts = jiff::Timestamp::from_second(seconds)?;
        Ok(OrcValue::Date(ts.to_zoned(TimeZone::UTC).date()))
    }

    fn to_orc(&self, value: &OrcValue) -> Result<i64> {
        match value {
            OrcValue::Date(date) => {
                let seconds = date.to_zoned(TimeZone::UTC)?.timestamp().as_second();
                Ok(seconds.div_euclid(86400))
            }
            other => Err(OrcError::type_error(format!(
                "Invalid value {:?} for date",
                other
            ))),
        }
    }
}

/// Seconds and nanoseconds since the epoch as a zoned instant
#[derive(Debug, Default)]
pub struct DefaultTimestampConverter;

impl TimestampConverter for DefaultTimestampConverter {
    fn from_orc(&self, seconds: i64, nanoseconds: i64, timezone: &TimeZone) -> Result<OrcValue> {
        let nanos = i32::try_from(nanoseconds)
            .map_err(|_| OrcError::value(format!("Invalid nanoseconds {}", nanoseconds)))?;
        let ts = jiff::Timestamp::new(seconds, nanos)?;
        Ok(OrcValue::Timestamp(ts.to_zoned(timezone.clone())))
    }

    fn to_orc(&self, value: &OrcValue, _timezone: &TimeZone) -> Result<(i64, i64)> {
        match value {
            OrcValue::Timestamp(zoned) => {
                let ts = zoned.timestamp();
                let mut seconds = ts.as_second();
                let mut nanos = ts.subsec_nanosecond() as i64;
                // ORC keeps nanoseconds non-negative
                if nanos < 0 {
                    seconds -= 1;
                    nanos += 1_000_000_000;
                }
                Ok((seconds, nanos))
            }
            other => Err(OrcError::type_error(format!(
                "Invalid value {:?} for timestamp",
                other
            ))),
        }
    }
}

/// Exact decimals, rescaled to the column's scale on write
#[derive(Debug, Default)]
pub struct DefaultDecimalConverter;

impl DecimalConverter for DefaultDecimalConverter {
    fn from_orc(&self, decimal: Decimal) -> Result<OrcValue> {
        Ok(OrcValue::Decimal(decimal))
    }

    fn to_orc(&self, precision: u32, scale: u32, value: &OrcValue) -> Result<Decimal> {
        match value {
            OrcValue::Decimal(d) => d.quantize(precision, scale),
            OrcValue::Integer(i) => Decimal::from(*i).quantize(precision, scale),
            other => Err(OrcError::type_error(format!(
                "Invalid value {:?} for decimal",
                other
            ))),
        }
    }
}

/// The date, timestamp and decimal codecs in use
#[derive(Clone)]
pub struct ConverterTable {
    pub date: Arc<dyn DateConverter>,
    pub timestamp: Arc<dyn TimestampConverter>,
    pub decimal: Arc<dyn DecimalConverter>,
}

impl Default for ConverterTable {
    fn default() -> Self {
        Self {
            date: Arc::new(DefaultDateConverter),
            timestamp: Arc::new(DefaultTimestampConverter),
            decimal: Arc::new(DefaultDecimalConverter),
        }
    }
}

impl ConverterTable {
    pub fn with_date<C: DateConverter + 'static>(mut self, converter: C) -> Self {
        self.date = Arc::new(converter);
        self
    }

    pub fn with_timestamp<C: TimestampConverter + 'static>(mut self, converter: C) -> Self {
        self.timestamp = Arc::new(converter);
        self
    }

    pub fn with_decimal<C: DecimalConverter + 'static>(mut self, converter: C) -> Self {
        self.decimal = Arc::new(converter);
        self
    }
}

impl std::fmt::Debug for ConverterTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterTable").finish_non_exhaustive()
    }
}

/// Configuration shared by every converter of one reader or writer
#[derive(Debug, Clone)]
pub struct ConverterOptions {
    pub timezone: TimeZone,
    pub struct_repr: StructRepr,
    pub null_value: OrcValue,
    pub converters: ConverterTable,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self {
            timezone: TimeZone::UTC,
            struct_repr: StructRepr::Tuple,
            null_value: OrcValue::Null,
            converters: ConverterTable::default(),
        }
    }
}

impl ConverterOptions {
    pub(crate) fn is_null(&self, value: &OrcValue) -> bool {
        *value == self.null_value
    }
}

/// Build the converter tree for `ty`
pub fn create_converter(
    ty: TypeRef<'_>,
    options: &Arc<ConverterOptions>,
) -> Result<Box<dyn Converter>> {
    let options = Arc::clone(options);
    Ok(match ty.kind() {
        TypeKind::Boolean => Box::new(BooleanConverter::new(options)),
        TypeKind::Byte | TypeKind::Short | TypeKind::Int | TypeKind::Long => {
            Box::new(IntegerConverter::new(ty.kind(), options))
        }
        TypeKind::Float | TypeKind::Double => Box::new(FloatConverter::new(ty.kind(), options)),
        TypeKind::String | TypeKind::Char | TypeKind::Varchar => {
            Box::new(StringConverter::new(ty.kind(), options))
        }
        TypeKind::Binary => Box::new(BinaryConverter::new(options)),
        TypeKind::Date => Box::new(DateColumnConverter::new(options)),
        TypeKind::Timestamp | TypeKind::TimestampInstant => {
            Box::new(TimestampColumnConverter::new(options))
        }
        TypeKind::Decimal => Box::new(DecimalColumnConverter::new(
            ty.precision(),
            ty.scale(),
            options,
        )),
        TypeKind::List => Box::new(ListConverter::new(ty, options)?),
        TypeKind::Map => Box::new(MapConverter::new(ty, options)?),
        TypeKind::Struct => Box::new(StructConverter::new(ty, options)?),
        TypeKind::Union => Box::new(UnionConverter::new(ty, options)?),
    })
}

/// Generation tracking shared by all converters
#[derive(Debug, Default)]
pub(crate) struct BatchView {
    generation: Option<u64>,
}

impl BatchView {
    pub(crate) fn bind(&mut self, batch: &ColumnVectorBatch) {
        self.generation = Some(batch.generation());
    }

    /// Fails unless `batch` is the one bound by the last reset and `row` is populated
    pub(crate) fn check(&self, batch: &ColumnVectorBatch, row: usize) -> Result<()> {
        if self.generation != Some(batch.generation()) {
            return Err(OrcError::internal(
                "Converter used on a batch it was not reset on",
            ));
        }
        if row >= batch.num_elements {
            return Err(OrcError::index(format!(
                "Row {} out of range for a batch of {} elements",
                row, batch.num_elements
            )));
        }
        Ok(())
    }
}

pub(crate) fn unknown_batch() -> OrcError {
    OrcError::value("unknown batch type")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeDescription;

    pub(crate) fn roundtrip(schema: &str, options: ConverterOptions, values: &[OrcValue]) -> Vec<OrcValue> {
        let ty: TypeDescription = schema.parse().unwrap();
        let options = Arc::new(options);
        let mut converter = create_converter(ty.root(), &options).unwrap();
        let mut batch = ColumnVectorBatch::new(ty.root(), values.len());
        for (row, value) in values.iter().enumerate() {
            converter.encode(&mut batch, row, value).unwrap();
        }
        batch.mark_refilled();
        converter.reset(&batch).unwrap();
        (0..batch.num_elements)
            .map(|row| converter.decode(&batch, row).unwrap())
            .collect()
    }

    #[test]
    fn test_decode_requires_reset() {
        let ty = TypeDescription::primitive(TypeKind::Long).unwrap();
        let options = Arc::new(ConverterOptions::default());
        let mut converter = create_converter(ty.root(), &options).unwrap();
        let mut batch = ColumnVectorBatch::new(ty.root(), 4);
        converter.encode(&mut batch, 0, &OrcValue::Integer(7)).unwrap();

        assert!(matches!(converter.decode(&batch, 0), Err(OrcError::Internal(_))));
        converter.reset(&batch).unwrap();
        assert_eq!(converter.decode(&batch, 0).unwrap(), OrcValue::Integer(7));

        batch.mark_refilled();
        assert!(matches!(converter.decode(&batch, 0), Err(OrcError::Internal(_))));
        converter.reset(&batch).unwrap();
        assert!(matches!(converter.decode(&batch, 1), Err(OrcError::Index(_))));
    }

    #[test]
    fn test_default_date_converter() {
        let conv = DefaultDateConverter;
        let date = jiff::civil::date(2000, 2, 29);
        let days = conv.to_orc(&OrcValue::Date(date)).unwrap();
        assert_eq!(days, 11016);
        assert_eq!(conv.from_orc(days).unwrap(), OrcValue::Date(date));
        assert_eq!(
            conv.from_orc(-1).unwrap(),
            OrcValue::Date(jiff::civil::date(1969, 12, 31))
        );
        assert!(matches!(conv.to_orc(&OrcValue::Integer(1)), Err(OrcError::Type(_))));
    }

    #[test]
    fn test_default_timestamp_converter_floors_seconds() {
        let conv = DefaultTimestampConverter;
        let ts = jiff::Timestamp::new(-2, -500_000_000).unwrap();
        let value = OrcValue::Timestamp(ts.to_zoned(TimeZone::UTC));
        assert_eq!(conv.to_orc(&value, &TimeZone::UTC).unwrap(), (-3, 500_000_000));
        assert_eq!(conv.from_orc(-3, 500_000_000, &TimeZone::UTC).unwrap(), value);
    }

    #[test]
    fn test_custom_converter_table() {
        struct DaysAsInteger;
        impl DateConverter for DaysAsInteger {
            fn from_orc(&self, days: i64) -> Result<OrcValue> {
                Ok(OrcValue::Integer(days))
            }
            fn to_orc(&self, value: &OrcValue) -> Result<i64> {
                match value {
                    OrcValue::Integer(i) => Ok(*i),
                    _ => Err(OrcError::type_error("expected days")),
                }
            }
        }

        let options = ConverterOptions {
            converters: ConverterTable::default().with_date(DaysAsInteger),
            ..Default::default()
        };
        let values = [OrcValue::Integer(18000), OrcValue::Null];
        assert_eq!(roundtrip("date", options, &values), values.to_vec());
    }
}
