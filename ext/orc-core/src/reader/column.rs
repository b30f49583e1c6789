use super::cursor::RowCursor;
use super::Whence;
use crate::batch::{ColumnVectorBatch, VectorData};
use crate::bloom::BloomFilterTester;
use crate::converter::{unknown_batch, ConverterOptions};
use crate::decimal::Decimal;
use crate::engine::{BloomFilterIndex, ColumnStatistics, StatisticsData};
use crate::types::{find_type, TypeKind, TypeRef};
use crate::{OrcError, OrcValue, Result};
use std::sync::Arc;

/// The batch holding column `column_id` inside `batch`, whose type is `ty`.
///
/// Descends in lockstep with the type tree: lists into their elements, maps
/// into keys or values, structs and unions into the child whose id range
/// contains the target.
pub fn select_batch<'a>(
    ty: TypeRef<'_>,
    batch: &'a ColumnVectorBatch,
    column_id: u64,
) -> Result<&'a ColumnVectorBatch> {
    let mut ty = ty;
    let mut batch = batch;
    loop {
        if ty.column_id() == column_id {
            return Ok(batch);
        }
        if !ty.contains_id(column_id) {
            return Err(OrcError::index(format!("Column {} not found", column_id)));
        }
        let (child_ty, child_batch) = match &batch.data {
            VectorData::List { elements, .. } => (ty.child(0), elements.as_ref()),
            VectorData::Map { keys, elements, .. } => {
                let key = ty.child(0);
                if key.is_some_and(|k| k.contains_id(column_id)) {
                    (key, keys.as_ref())
                } else {
                    (ty.child(1), elements.as_ref())
                }
            }
            VectorData::Struct { fields: children } | VectorData::Union { children, .. } => {
                let pos = ty
                    .children()
                    .position(|c| c.contains_id(column_id))
                    .ok_or_else(|| OrcError::index(format!("Column {} not found", column_id)))?;
                let child = children.get(pos).ok_or_else(unknown_batch)?;
                (ty.child(pos), child)
            }
            _ => return Err(unknown_batch()),
        };
        ty = child_ty.ok_or_else(unknown_batch)?;
        batch = child_batch;
    }
}

/// Column statistics with bounds decoded through the converter table
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub kind: TypeKind,
    pub has_null: bool,
    pub number_of_values: u64,
    pub minimum: Option<OrcValue>,
    pub maximum: Option<OrcValue>,
    pub sum: Option<OrcValue>,
    pub total_length: Option<u64>,
    pub false_count: Option<u64>,
    pub true_count: Option<u64>,
}

impl Statistics {
    pub(crate) fn new(
        kind: TypeKind,
        stats: &ColumnStatistics,
        options: &ConverterOptions,
    ) -> Result<Self> {
        let mut out = Statistics {
            kind,
            has_null: stats.has_null,
            number_of_values: stats.number_of_values,
            minimum: None,
            maximum: None,
            sum: None,
            total_length: None,
            false_count: None,
            true_count: None,
        };
        let converters = &options.converters;
        let timestamp = |millis: i64| {
            converters.timestamp.from_orc(
                millis.div_euclid(1000),
                millis.rem_euclid(1000) * 1_000_000,
                &options.timezone,
            )
        };
        match &stats.data {
            StatisticsData::None => {}
            StatisticsData::Boolean {
                false_count,
                true_count,
            } => {
                out.false_count = Some(*false_count);
                out.true_count = Some(*true_count);
            }
            StatisticsData::Integer {
                minimum,
                maximum,
                sum,
            } => {
                out.minimum = Some(OrcValue::from(*minimum));
                out.maximum = Some(OrcValue::from(*maximum));
                out.sum = sum.map(OrcValue::from);
            }
            StatisticsData::Double {
                minimum,
                maximum,
                sum,
            } => {
                out.minimum = Some(OrcValue::from(*minimum));
                out.maximum = Some(OrcValue::from(*maximum));
                out.sum = Some(OrcValue::from(*sum));
            }
            StatisticsData::String {
                minimum,
                maximum,
                total_length,
            } => {
                out.minimum = Some(OrcValue::from(minimum.as_str()));
                out.maximum = Some(OrcValue::from(maximum.as_str()));
                out.total_length = Some(*total_length);
            }
            StatisticsData::Binary { total_length } => out.total_length = Some(*total_length),
            StatisticsData::Date { minimum, maximum } => {
                out.minimum = Some(converters.date.from_orc(*minimum)?);
                out.maximum = Some(converters.date.from_orc(*maximum)?);
            }
            StatisticsData::Timestamp { minimum, maximum } => {
                out.minimum = Some(timestamp(*minimum)?);
                out.maximum = Some(timestamp(*maximum)?);
            }
            StatisticsData::Decimal {
                minimum,
                maximum,
                sum,
                scale,
            } => {
                out.minimum = Some(converters.decimal.from_orc(Decimal::new(*minimum, *scale))?);
                out.maximum = Some(converters.decimal.from_orc(Decimal::new(*maximum, *scale))?);
                out.sum = match sum {
                    Some(sum) => Some(converters.decimal.from_orc(Decimal::new(*sum, *scale))?),
                    None => None,
                };
            }
        }
        Ok(out)
    }
}

/// Single-column view over a reader or a stripe.
///
/// Iterates the values of one column id; a column nested in a list or map
/// yields every element. Seeks are in rows of the enclosing reader or stripe.
pub struct Column {
    column_id: u64,
    kind: TypeKind,
    cursor: RowCursor,
    statistics: ColumnStatistics,
    bloom_filter: Option<BloomFilterIndex>,
    tester: BloomFilterTester,
    options: Arc<ConverterOptions>,
}

impl Column {
    pub(crate) fn new(
        column_id: u64,
        cursor: RowCursor,
        statistics: ColumnStatistics,
        bloom_filter: Option<BloomFilterIndex>,
        options: Arc<ConverterOptions>,
    ) -> Result<Self> {
        let ty = find_type(cursor.selected_type().root(), column_id)?;
        let kind = ty.kind();
        let tester = BloomFilterTester::new(ty, Arc::clone(&options));
        Ok(Self {
            column_id,
            kind,
            cursor,
            statistics,
            bloom_filter,
            tester,
            options,
        })
    }

    pub fn column_id(&self) -> u64 {
        self.column_id
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn has_bloom_filter(&self) -> bool {
        self.bloom_filter.is_some()
    }

    pub fn raw_statistics(&self) -> &ColumnStatistics {
        &self.statistics
    }

    pub fn statistics(&self) -> Result<Statistics> {
        Statistics::new(self.kind, &self.statistics, &self.options)
    }

    pub fn current_row(&self) -> u64 {
        self.cursor.current_row()
    }

    pub fn seek(&mut self, row: i64, whence: Whence) -> Result<u64> {
        self.cursor.seek(row, whence)
    }

    pub fn read(&mut self, num: Option<usize>) -> Result<Vec<OrcValue>> {
        self.cursor.read(num)
    }

    /// Whether any value of the column equals `value`.
    ///
    /// A bloom filter miss answers without reading. Otherwise the column is
    /// scanned from its first row and the cursor position is restored.
    pub fn contains(&mut self, value: &OrcValue) -> Result<bool> {
        if let Some(index) = &self.bloom_filter {
            if !self.tester.test(index, value) {
                return Ok(false);
            }
        }
        let checkpoint = self.cursor.checkpoint();
        let found = (|| -> Result<bool> {
            self.cursor.jump_to(0)?;
            while let Some(item) = self.cursor.next_value()? {
                if item == *value {
                    return Ok(true);
                }
            }
            Ok(false)
        })();
        self.cursor.restore(checkpoint)?;
        found
    }
}

impl Iterator for Column {
    type Item = Result<OrcValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next()
    }
}
