use super::{unknown_batch, BatchView, Converter, ConverterOptions};
use crate::batch::{ColumnVectorBatch, VectorData};
use crate::decimal::Decimal;
use crate::{OrcError, OrcValue, Result};
use std::sync::Arc;

/// DECIMAL columns in both the 64-bit and 128-bit layouts
pub struct DecimalColumnConverter {
    precision: u32,
    scale: u32,
    view: BatchView,
    options: Arc<ConverterOptions>,
}

impl DecimalColumnConverter {
    pub fn new(precision: u32, scale: u32, options: Arc<ConverterOptions>) -> Self {
        Self {
            precision,
            scale,
            view: BatchView::default(),
            options,
        }
    }

    fn overflow(&self, value: &Decimal) -> OrcError {
        OrcError::value(format!(
            "Value {} does not fit decimal({},{}) for decimal",
            value, self.precision, self.scale
        ))
    }
}

impl Converter for DecimalColumnConverter {
    fn reset(&mut self, batch: &ColumnVectorBatch) -> Result<()> {
        if !matches!(
            batch.data,
            VectorData::Decimal64 { .. } | VectorData::Decimal128 { .. }
        ) {
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
        let decimal = match &batch.data {
            VectorData::Decimal64 { values, scale, .. } => Decimal::new(values[row], *scale),
            VectorData::Decimal128 { values, scale, .. } => Decimal::new(values[row], *scale),
            _ => return Err(unknown_batch()),
        };
        self.options.converters.decimal.from_orc(decimal)
    }

    fn encode(&mut self, batch: &mut ColumnVectorBatch, row: usize, value: &OrcValue) -> Result<()> {
        if self.options.is_null(value) {
            batch.set_null(row);
            return Ok(());
        }
        let decimal = self
            .options
            .converters
            .decimal
            .to_orc(self.precision, self.scale, value)?
            .rescale(self.scale);
        let unscaled = decimal.to_i128().ok_or_else(|| self.overflow(&decimal))?;
        if matches!(batch.data, VectorData::Decimal64 { .. }) {
            i64::try_from(unscaled).map_err(|_| self.overflow(&decimal))?;
        }
        batch.set_valid(row);
        match &mut batch.data {
            VectorData::Decimal64 { values, .. } => values[row] = unscaled as i64,
            VectorData::Decimal128 { values, .. } => values[row] = unscaled,
            _ => return Err(unknown_batch()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::roundtrip;
    use super::super::{create_converter, ConverterOptions};
    use crate::batch::{ColumnVectorBatch, VectorData};
    use crate::decimal::Decimal;
    use crate::types::TypeDescription;
    use crate::{OrcError, OrcValue};
    use std::sync::Arc;

    fn dec(text: &str) -> OrcValue {
        OrcValue::Decimal(text.parse::<Decimal>().unwrap())
    }

    #[test]
    fn test_decimal64_rescales_on_write() {
        let values = [dec("123.45"), dec("-0.05"), OrcValue::Null, dec("1.005")];
        let decoded = roundtrip("decimal(10,2)", Default::default(), &values);
        assert_eq!(decoded[0].clone(), dec("123.45"));
        assert_eq!(decoded[1].clone(), dec("-0.05"));
        assert_eq!(decoded[2], OrcValue::Null);
        // 1.005 rounds half to even
        assert_eq!(decoded[3].clone(), dec("1.00"));

        let OrcValue::Decimal(d) = &decoded[1] else {
            panic!("expected decimal");
        };
        assert_eq!(d.to_string(), "-0.05");
        assert_eq!(d.scale(), 2);
    }

    #[test]
    fn test_decimal128_layout() {
        let ty: TypeDescription = "decimal(38,10)".parse().unwrap();
        let options = Arc::new(ConverterOptions::default());
        let mut converter = create_converter(ty.root(), &options).unwrap();
        let mut batch = ColumnVectorBatch::new(ty.root(), 2);
        let big = dec("1234567890123456789012345678.0123456789");
        converter.encode(&mut batch, 0, &big).unwrap();
        assert!(matches!(batch.data, VectorData::Decimal128 { .. }));
        batch.mark_refilled();
        converter.reset(&batch).unwrap();
        assert_eq!(converter.decode(&batch, 0).unwrap(), big);
    }

    #[test]
    fn test_decimal_precision_overflow() {
        let ty: TypeDescription = "decimal(4,2)".parse().unwrap();
        let options = Arc::new(ConverterOptions::default());
        let mut converter = create_converter(ty.root(), &options).unwrap();
        let mut batch = ColumnVectorBatch::new(ty.root(), 1);
        let err = converter.encode(&mut batch, 0, &dec("123.4")).unwrap_err();
        assert!(matches!(err, OrcError::Value(_)));
        assert!(err.to_string().contains("for decimal"));
        assert_eq!(batch.num_elements, 0);

        let err = converter.encode(&mut batch, 0, &OrcValue::from("1.0")).unwrap_err();
        assert!(matches!(err, OrcError::Type(_)));
    }

    #[test]
    fn test_integer_input() {
        let decoded = roundtrip("decimal(5,1)", Default::default(), &[OrcValue::Integer(42)]);
        assert_eq!(decoded, vec![dec("42.0")]);
    }
}
