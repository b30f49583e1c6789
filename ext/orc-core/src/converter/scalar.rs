use super::{unknown_batch, BatchView, Converter, ConverterOptions};
use crate::batch::{ColumnVectorBatch, VectorData};
use crate::types::TypeKind;
use crate::{OrcError, OrcValue, Result};
use bytes::Bytes;
use ordered_float::OrderedFloat;
use std::sync::Arc;

fn longs(batch: &ColumnVectorBatch) -> Result<&[i64]> {
    match &batch.data {
        VectorData::Long(v) => Ok(v),
        _ => Err(unknown_batch()),
    }
}

fn write_long(batch: &mut ColumnVectorBatch, row: usize, value: i64) -> Result<()> {
    batch.set_valid(row);
    match &mut batch.data {
        VectorData::Long(v) => {
            v[row] = value;
            Ok(())
        }
        _ => Err(unknown_batch()),
    }
}

fn byte_values(batch: &ColumnVectorBatch) -> Result<&[Bytes]> {
    match &batch.data {
        VectorData::Bytes(v) => Ok(v),
        _ => Err(unknown_batch()),
    }
}

fn write_bytes(batch: &mut ColumnVectorBatch, row: usize, value: Bytes) -> Result<()> {
    batch.set_valid(row);
    match &mut batch.data {
        VectorData::Bytes(v) => {
            v[row] = value;
            Ok(())
        }
        _ => Err(unknown_batch()),
    }
}

pub struct BooleanConverter {
    view: BatchView,
    options: Arc<ConverterOptions>,
}

impl BooleanConverter {
    pub fn new(options: Arc<ConverterOptions>) -> Self {
        Self {
            view: BatchView::default(),
            options,
        }
    }
}

impl Converter for BooleanConverter {
    fn reset(&mut self, batch: &ColumnVectorBatch) -> Result<()> {
        longs(batch)?;
        self.view.bind(batch);
        Ok(())
    }

    fn decode(&self, batch: &ColumnVectorBatch, row: usize) -> Result<OrcValue> {
        self.view.check(batch, row)?;
        if batch.is_null(row) {
            return Ok(self.options.null_value.clone());
        }
        Ok(OrcValue::Boolean(longs(batch)?[row] != 0))
    }

    fn encode(&mut self, batch: &mut ColumnVectorBatch, row: usize, value: &OrcValue) -> Result<()> {
        if self.options.is_null(value) {
            batch.set_null(row);
            return Ok(());
        }
        let raw = match value {
            OrcValue::Boolean(b) => *b as i64,
            OrcValue::Integer(i @ (0 | 1)) => *i,
            other => {
                return Err(OrcError::type_error(format!(
                    "Invalid value {:?} for boolean",
                    other
                )))
            }
        };
        write_long(batch, row, raw)
    }
}

/// Byte, short, int and long columns
pub struct IntegerConverter {
    kind: TypeKind,
    min: i64,
    max: i64,
    view: BatchView,
    options: Arc<ConverterOptions>,
}

impl IntegerConverter {
    pub fn new(kind: TypeKind, options: Arc<ConverterOptions>) -> Self {
        let (min, max) = match kind {
            TypeKind::Byte => (i8::MIN as i64, i8::MAX as i64),
            TypeKind::Short => (i16::MIN as i64, i16::MAX as i64),
            TypeKind::Int => (i32::MIN as i64, i32::MAX as i64),
            _ => (i64::MIN, i64::MAX),
        };
        Self {
            kind,
            min,
            max,
            view: BatchView::default(),
            options,
        }
    }
}

impl Converter for IntegerConverter {
    fn reset(&mut self, batch: &ColumnVectorBatch) -> Result<()> {
        longs(batch)?;
        self.view.bind(batch);
        Ok(())
    }

    fn decode(&self, batch: &ColumnVectorBatch, row: usize) -> Result<OrcValue> {
        self.view.check(batch, row)?;
        if batch.is_null(row) {
            return Ok(self.options.null_value.clone());
        }
        Ok(OrcValue::Integer(longs(batch)?[row]))
    }

    fn encode(&mut self, batch: &mut ColumnVectorBatch, row: usize, value: &OrcValue) -> Result<()> {
        if self.options.is_null(value) {
            batch.set_null(row);
            return Ok(());
        }
        let raw = match value {
            OrcValue::Integer(i) => *i,
            OrcValue::Boolean(b) => *b as i64,
            other => {
                return Err(OrcError::type_error(format!(
                    "Invalid value {:?} for {}",
                    other, self.kind
                )))
            }
        };
        if raw < self.min || raw > self.max {
            return Err(OrcError::value(format!(
                "Value {} out of range for {}",
                raw, self.kind
            )));
        }
        write_long(batch, row, raw)
    }
}

/// Float and double columns. Floats are stored with single precision.
pub struct FloatConverter {
    kind: TypeKind,
    view: BatchView,
    options: Arc<ConverterOptions>,
}

impl FloatConverter {
    pub fn new(kind: TypeKind, options: Arc<ConverterOptions>) -> Self {
        Self {
            kind,
            view: BatchView::default(),
            options,
        }
    }
}

impl Converter for FloatConverter {
    fn reset(&mut self, batch: &ColumnVectorBatch) -> Result<()> {
        if !matches!(batch.data, VectorData::Double(_)) {
            return Err(unknown_batch());
        }
        self.view.bind(batch);
        Ok(())
    }

    fn decode(&self, batch: &ColumnVectorBatch, row: usize) -> Result<OrcValue> {
        self.view.check(batch, row)?;
        if batch.is_null(row) {
            return Ok(self.options.null_value.clone());
        }
        match &batch.data {
            VectorData::Double(v) => Ok(OrcValue::Float(OrderedFloat(v[row]))),
            _ => Err(unknown_batch()),
        }
    }

    fn encode(&mut self, batch: &mut ColumnVectorBatch, row: usize, value: &OrcValue) -> Result<()> {
        if self.options.is_null(value) {
            batch.set_null(row);
            return Ok(());
        }
        let mut raw = match value {
            OrcValue::Float(f) => f.0,
            OrcValue::Integer(i) => *i as f64,
            other => {
                return Err(OrcError::type_error(format!(
                    "Invalid value {:?} for {}",
                    other, self.kind
                )))
            }
        };
        if self.kind == TypeKind::Float {
            raw = raw as f32 as f64;
        }
        batch.set_valid(row);
        match &mut batch.data {
            VectorData::Double(v) => {
                v[row] = raw;
                Ok(())
            }
            _ => Err(unknown_batch()),
        }
    }
}

/// String, char and varchar columns
pub struct StringConverter {
    kind: TypeKind,
    view: BatchView,
    options: Arc<ConverterOptions>,
}

impl StringConverter {
    pub fn new(kind: TypeKind, options: Arc<ConverterOptions>) -> Self {
        Self {
            kind,
            view: BatchView::default(),
            options,
        }
    }
}

impl Converter for StringConverter {
    fn reset(&mut self, batch: &ColumnVectorBatch) -> Result<()> {
        byte_values(batch)?;
        self.view.bind(batch);
        Ok(())
    }

    fn decode(&self, batch: &ColumnVectorBatch, row: usize) -> Result<OrcValue> {
        self.view.check(batch, row)?;
        if batch.is_null(row) {
            return Ok(self.options.null_value.clone());
        }
        let raw = &byte_values(batch)?[row];
        let text = std::str::from_utf8(raw)
            .map_err(|e| OrcError::value(format!("Invalid UTF-8 in {} column: {}", self.kind, e)))?;
        Ok(OrcValue::String(Arc::from(text)))
    }

    fn encode(&mut self, batch: &mut ColumnVectorBatch, row: usize, value: &OrcValue) -> Result<()> {
        if self.options.is_null(value) {
            batch.set_null(row);
            return Ok(());
        }
        let raw = match value {
            OrcValue::String(s) => Bytes::copy_from_slice(s.as_bytes()),
            OrcValue::Binary(b) => {
                std::str::from_utf8(b).map_err(|e| {
                    OrcError::type_error(format!("Invalid UTF-8 for {}: {}", self.kind, e))
                })?;
                b.clone()
            }
            other => {
                return Err(OrcError::type_error(format!(
                    "Invalid value {:?} for {}",
                    other, self.kind
                )))
            }
        };
        write_bytes(batch, row, raw)
    }
}

pub struct BinaryConverter {
    view: BatchView,
    options: Arc<ConverterOptions>,
}

impl BinaryConverter {
    pub fn new(options: Arc<ConverterOptions>) -> Self {
        Self {
            view: BatchView::default(),
            options,
        }
    }
}

impl Converter for BinaryConverter {
    fn reset(&mut self, batch: &ColumnVectorBatch) -> Result<()> {
        byte_values(batch)?;
        self.view.bind(batch);
        Ok(())
    }

    fn decode(&self, batch: &ColumnVectorBatch, row: usize) -> Result<OrcValue> {
        self.view.check(batch, row)?;
        if batch.is_null(row) {
            return Ok(self.options.null_value.clone());
        }
        Ok(OrcValue::Binary(byte_values(batch)?[row].clone()))
    }

    fn encode(&mut self, batch: &mut ColumnVectorBatch, row: usize, value: &OrcValue) -> Result<()> {
        if self.options.is_null(value) {
            batch.set_null(row);
            return Ok(());
        }
        let raw = match value {
            OrcValue::Binary(b) => b.clone(),
            OrcValue::String(s) => Bytes::copy_from_slice(s.as_bytes()),
            other => {
                return Err(OrcError::type_error(format!(
                    "Invalid value {:?} for binary",
                    other
                )))
            }
        };
        write_bytes(batch, row, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::roundtrip;
    use super::super::{create_converter, ConverterOptions};
    use crate::batch::ColumnVectorBatch;
    use crate::types::TypeDescription;
    use crate::{OrcError, OrcValue};
    use bytes::Bytes;
    use std::sync::Arc;

    fn encode_one(schema: &str, value: OrcValue) -> crate::Result<()> {
        let ty: TypeDescription = schema.parse().unwrap();
        let options = Arc::new(ConverterOptions::default());
        let mut converter = create_converter(ty.root(), &options).unwrap();
        let mut batch = ColumnVectorBatch::new(ty.root(), 1);
        converter.encode(&mut batch, 0, &value)
    }

    #[test]
    fn test_integer_boundaries() {
        let values = [
            OrcValue::Integer(i64::MIN),
            OrcValue::Integer(0),
            OrcValue::Null,
            OrcValue::Integer(i64::MAX),
        ];
        assert_eq!(roundtrip("bigint", Default::default(), &values), values.to_vec());

        let bytes = [OrcValue::Integer(-128), OrcValue::Integer(127)];
        assert_eq!(roundtrip("tinyint", Default::default(), &bytes), bytes.to_vec());
    }

    #[test]
    fn test_integer_range_and_type_checks() {
        assert!(matches!(
            encode_one("tinyint", OrcValue::Integer(128)),
            Err(OrcError::Value(_))
        ));
        assert!(matches!(
            encode_one("int", OrcValue::Integer(i32::MAX as i64 + 1)),
            Err(OrcError::Value(_))
        ));
        assert!(matches!(
            encode_one("int", OrcValue::from("12")),
            Err(OrcError::Type(_))
        ));
        assert!(encode_one("smallint", OrcValue::Boolean(true)).is_ok());
    }

    #[test]
    fn test_boolean() {
        let values = [
            OrcValue::Boolean(true),
            OrcValue::Null,
            OrcValue::Boolean(false),
        ];
        assert_eq!(roundtrip("boolean", Default::default(), &values), values.to_vec());

        let err = encode_one("boolean", OrcValue::Integer(2)).unwrap_err();
        assert!(matches!(err, OrcError::Type(_)));
        assert!(err.to_string().contains("for boolean"));
        assert!(encode_one("boolean", OrcValue::Integer(1)).is_ok());
    }

    #[test]
    fn test_float_and_double() {
        let doubles = [OrcValue::from(0.1), OrcValue::from(-1e300), OrcValue::from(3)];
        let decoded = roundtrip("double", Default::default(), &doubles);
        assert_eq!(decoded[0], OrcValue::from(0.1));
        assert_eq!(decoded[2], OrcValue::from(3.0));

        let floats = [OrcValue::from(1.5), OrcValue::from(0.1)];
        let decoded = roundtrip("float", Default::default(), &floats);
        assert_eq!(decoded[0], OrcValue::from(1.5));
        assert_eq!(decoded[1], OrcValue::from(0.1f32 as f64));
    }

    #[test]
    fn test_strings() {
        let values = [
            OrcValue::from(""),
            OrcValue::from("héllo wörld"),
            OrcValue::Null,
        ];
        assert_eq!(roundtrip("string", Default::default(), &values), values.to_vec());
        assert_eq!(roundtrip("varchar(3)", Default::default(), &values), values.to_vec());

        let from_bytes = roundtrip(
            "string",
            Default::default(),
            &[OrcValue::Binary(Bytes::from_static(b"abc"))],
        );
        assert_eq!(from_bytes, vec![OrcValue::from("abc")]);

        let bad = OrcValue::Binary(Bytes::from_static(&[0xff, 0xfe]));
        assert!(matches!(encode_one("string", bad), Err(OrcError::Type(_))));
        assert!(matches!(
            encode_one("string", OrcValue::Integer(1)),
            Err(OrcError::Type(_))
        ));
    }

    #[test]
    fn test_binary() {
        let values = [
            OrcValue::Binary(Bytes::from_static(&[0, 1, 255])),
            OrcValue::Binary(Bytes::new()),
            OrcValue::Null,
        ];
        assert_eq!(roundtrip("binary", Default::default(), &values), values.to_vec());
        assert!(matches!(
            encode_one("binary", OrcValue::from(1.0)),
            Err(OrcError::Type(_))
        ));
    }

    #[test]
    fn test_custom_null_placeholder() {
        let options = ConverterOptions {
            null_value: OrcValue::Integer(-1),
            ..Default::default()
        };
        let values = [OrcValue::Integer(5), OrcValue::Integer(-1)];
        assert_eq!(roundtrip("int", options, &values), values.to_vec());
    }
}
