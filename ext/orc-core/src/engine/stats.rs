//! Column statistics kept per row group, per stripe and per file

use crate::batch::{ColumnVectorBatch, VectorData};
use crate::types::{TypeKind, TypeRef};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Milliseconds since the epoch, rounded down, as used by timestamp statistics
/// and bloom filters
pub(crate) fn timestamp_millis(seconds: i64, nanoseconds: i64) -> i64 {
    seconds
        .saturating_mul(1000)
        .saturating_add(nanoseconds.div_euclid(1_000_000))
}

/// Nanoseconds since the epoch
pub(crate) fn timestamp_nanos(seconds: i64, nanoseconds: i64) -> i128 {
    seconds as i128 * 1_000_000_000 + nanoseconds as i128
}

/// Kind-specific part of [`ColumnStatistics`]. `None` when no value was seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum StatisticsData {
    #[default]
    None,
    Boolean {
        false_count: u64,
        true_count: u64,
    },
    Integer {
        minimum: i64,
        maximum: i64,
        /// `None` after an overflow
        sum: Option<i64>,
    },
    Double {
        minimum: f64,
        maximum: f64,
        sum: f64,
    },
    String {
        minimum: String,
        maximum: String,
        total_length: u64,
    },
    Binary {
        total_length: u64,
    },
    Date {
        minimum: i64,
        maximum: i64,
    },
    /// Milliseconds since the epoch, rounded down. The true maximum may lie up
    /// to 999 999 ns past `maximum`.
    Timestamp {
        minimum: i64,
        maximum: i64,
    },
    /// Unscaled values at the column scale
    Decimal {
        minimum: i128,
        maximum: i128,
        sum: Option<i128>,
        scale: u32,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub number_of_values: u64,
    pub has_null: bool,
    pub data: StatisticsData,
}

impl ColumnStatistics {
    /// Statistics of rows `rows` of `batch`
    pub fn from_rows(ty: TypeRef<'_>, batch: &ColumnVectorBatch, rows: Range<usize>) -> Self {
        let mut stats = ColumnStatistics::default();
        let mut valid = Vec::with_capacity(rows.len());
        for row in rows {
            if batch.is_null(row) {
                stats.has_null = true;
            } else {
                valid.push(row);
            }
        }
        stats.number_of_values = valid.len() as u64;
        if valid.is_empty() {
            return stats;
        }
        stats.data = match (&batch.data, ty.kind()) {
            (VectorData::Long(v), TypeKind::Boolean) => {
                let true_count = valid.iter().filter(|&&r| v[r] != 0).count() as u64;
                StatisticsData::Boolean {
                    false_count: valid.len() as u64 - true_count,
                    true_count,
                }
            }
            (VectorData::Long(v), TypeKind::Date) => StatisticsData::Date {
                minimum: valid.iter().map(|&r| v[r]).min().unwrap_or_default(),
                maximum: valid.iter().map(|&r| v[r]).max().unwrap_or_default(),
            },
            (VectorData::Long(v), _) => StatisticsData::Integer {
                minimum: valid.iter().map(|&r| v[r]).min().unwrap_or_default(),
                maximum: valid.iter().map(|&r| v[r]).max().unwrap_or_default(),
                sum: valid
                    .iter()
                    .try_fold(0i64, |acc, &r| acc.checked_add(v[r])),
            },
            (VectorData::Double(v), _) => StatisticsData::Double {
                minimum: valid.iter().map(|&r| v[r]).fold(f64::INFINITY, f64::min),
                maximum: valid.iter().map(|&r| v[r]).fold(f64::NEG_INFINITY, f64::max),
                sum: valid.iter().map(|&r| v[r]).sum(),
            },
            (VectorData::Bytes(v), TypeKind::Binary) => StatisticsData::Binary {
                total_length: valid.iter().map(|&r| v[r].len() as u64).sum(),
            },
            (VectorData::Bytes(v), _) => {
                let texts: Vec<String> = valid
                    .iter()
                    .map(|&r| String::from_utf8_lossy(&v[r]).into_owned())
                    .collect();
                StatisticsData::String {
                    total_length: valid.iter().map(|&r| v[r].len() as u64).sum(),
                    minimum: texts.iter().min().cloned().unwrap_or_default(),
                    maximum: texts.iter().max().cloned().unwrap_or_default(),
                }
            }
            (
                VectorData::Timestamp {
                    seconds,
                    nanoseconds,
                },
                _,
            ) => {
                let millis = || valid.iter().map(|&r| timestamp_millis(seconds[r], nanoseconds[r]));
                StatisticsData::Timestamp {
                    minimum: millis().min().unwrap_or_default(),
                    maximum: millis().max().unwrap_or_default(),
                }
            }
            (VectorData::Decimal64 { values, scale, .. }, _) => {
                decimal_data(valid.iter().map(|&r| values[r] as i128), *scale)
            }
            (VectorData::Decimal128 { values, scale, .. }, _) => {
                decimal_data(valid.iter().map(|&r| values[r]), *scale)
            }
            _ => StatisticsData::None,
        };
        stats
    }

    /// Fold `other` into `self`
    pub fn merge(&mut self, other: &ColumnStatistics) {
        self.number_of_values += other.number_of_values;
        self.has_null |= other.has_null;
        let merged = match (&self.data, &other.data) {
            (_, StatisticsData::None) => return,
            (StatisticsData::None, data) => data.clone(),
            (
                StatisticsData::Boolean {
                    false_count,
                    true_count,
                },
                StatisticsData::Boolean {
                    false_count: f,
                    true_count: t,
                },
            ) => StatisticsData::Boolean {
                false_count: false_count + f,
                true_count: true_count + t,
            },
            (
                StatisticsData::Integer {
                    minimum,
                    maximum,
                    sum,
                },
                StatisticsData::Integer {
                    minimum: lo,
                    maximum: hi,
                    sum: s,
                },
            ) => StatisticsData::Integer {
                minimum: *minimum.min(lo),
                maximum: *maximum.max(hi),
                sum: sum.zip(*s).and_then(|(a, b)| a.checked_add(b)),
            },
            (
                StatisticsData::Double {
                    minimum,
                    maximum,
                    sum,
                },
                StatisticsData::Double {
                    minimum: lo,
                    maximum: hi,
                    sum: s,
                },
            ) => StatisticsData::Double {
                minimum: minimum.min(*lo),
                maximum: maximum.max(*hi),
                sum: sum + s,
            },
            (
                StatisticsData::String {
                    minimum,
                    maximum,
                    total_length,
                },
                StatisticsData::String {
                    minimum: lo,
                    maximum: hi,
                    total_length: len,
                },
            ) => StatisticsData::String {
                minimum: minimum.min(lo).clone(),
                maximum: maximum.max(hi).clone(),
                total_length: total_length + len,
            },
            (
                StatisticsData::Binary { total_length },
                StatisticsData::Binary { total_length: len },
            ) => StatisticsData::Binary {
                total_length: total_length + len,
            },
            (
                StatisticsData::Date { minimum, maximum },
                StatisticsData::Date {
                    minimum: lo,
                    maximum: hi,
                },
            ) => StatisticsData::Date {
                minimum: *minimum.min(lo),
                maximum: *maximum.max(hi),
            },
            (
                StatisticsData::Timestamp { minimum, maximum },
                StatisticsData::Timestamp {
                    minimum: lo,
                    maximum: hi,
                },
            ) => StatisticsData::Timestamp {
                minimum: *minimum.min(lo),
                maximum: *maximum.max(hi),
            },
            (
                StatisticsData::Decimal {
                    minimum,
                    maximum,
                    sum,
                    scale,
                },
                StatisticsData::Decimal {
                    minimum: lo,
                    maximum: hi,
                    sum: s,
                    ..
                },
            ) => StatisticsData::Decimal {
                minimum: *minimum.min(lo),
                maximum: *maximum.max(hi),
                sum: sum.zip(*s).and_then(|(a, b)| a.checked_add(b)),
                scale: *scale,
            },
            // Kinds never change within a column
            _ => return,
        };
        self.data = merged;
    }
}

fn decimal_data<I: Iterator<Item = i128> + Clone>(values: I, scale: u32) -> StatisticsData {
    StatisticsData::Decimal {
        minimum: values.clone().min().unwrap_or_default(),
        maximum: values.clone().max().unwrap_or_default(),
        sum: values.fold(Some(0i128), |acc, v| acc.and_then(|a| a.checked_add(v))),
        scale,
    }
}

/// Call `f` for every node of `ty` with the batch and row range holding that
/// node's values for rows `rows` of the root
pub(crate) fn visit_columns(
    ty: TypeRef<'_>,
    batch: &ColumnVectorBatch,
    rows: Range<usize>,
    f: &mut dyn FnMut(TypeRef<'_>, &ColumnVectorBatch, Range<usize>),
) {
    f(ty, batch, rows.clone());
    match &batch.data {
        VectorData::List { offsets, elements } => {
            if let Some(child) = ty.child(0) {
                visit_columns(child, elements, child_range(offsets, &rows), f);
            }
        }
        VectorData::Map {
            offsets,
            keys,
            elements,
        } => {
            let range = child_range(offsets, &rows);
            if let (Some(key), Some(value)) = (ty.child(0), ty.child(1)) {
                visit_columns(key, keys, range.clone(), f);
                visit_columns(value, elements, range, f);
            }
        }
        VectorData::Struct { fields } => {
            for (child, field) in ty.children().zip(fields) {
                visit_columns(child, field, rows.clone(), f);
            }
        }
        VectorData::Union {
            tags,
            offsets,
            children,
        } => {
            for (tag, (child, child_batch)) in ty.children().zip(children).enumerate() {
                let mut range: Option<Range<usize>> = None;
                for row in rows.clone() {
                    if batch.is_null(row) || tags[row] as usize != tag {
                        continue;
                    }
                    let offset = offsets[row] as usize;
                    range = Some(match range {
                        Some(r) => r.start.min(offset)..r.end.max(offset + 1),
                        None => offset..offset + 1,
                    });
                }
                visit_columns(child, child_batch, range.unwrap_or(0..0), f);
            }
        }
        _ => {}
    }
}

fn child_range(offsets: &[i64], rows: &Range<usize>) -> Range<usize> {
    let at = |row: usize| offsets.get(row).copied().unwrap_or(0).max(0) as usize;
    let start = at(rows.start);
    start..at(rows.end).max(start)
}

/// Statistics for every column id of `ty`, indexed by column id
pub(crate) fn collect_statistics(
    ty: TypeRef<'_>,
    batch: &ColumnVectorBatch,
    rows: Range<usize>,
) -> Vec<ColumnStatistics> {
    let mut out = vec![ColumnStatistics::default(); ty.max_column_id() as usize + 1];
    visit_columns(ty, batch, rows, &mut |node, node_batch, node_rows| {
        out[node.column_id() as usize] = ColumnStatistics::from_rows(node, node_batch, node_rows);
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{create_converter, ConverterOptions};
    use crate::types::TypeDescription;
    use crate::OrcValue;
    use std::sync::Arc;

    fn build(schema: &str, rows: &[OrcValue]) -> (TypeDescription, ColumnVectorBatch) {
        let ty: TypeDescription = schema.parse().unwrap();
        let options = Arc::new(ConverterOptions::default());
        let mut converter = create_converter(ty.root(), &options).unwrap();
        let mut batch = ColumnVectorBatch::new(ty.root(), rows.len());
        for (row, value) in rows.iter().enumerate() {
            converter.encode(&mut batch, row, value).unwrap();
        }
        (ty, batch)
    }

    #[test]
    fn test_collect_nested_statistics() {
        let rows = [
            OrcValue::Tuple(vec![
                OrcValue::from(3),
                OrcValue::from("b"),
                OrcValue::List(vec![OrcValue::from(10), OrcValue::from(-1)]),
            ]),
            OrcValue::Tuple(vec![OrcValue::Null, OrcValue::from("abc"), OrcValue::List(vec![])]),
            OrcValue::Tuple(vec![OrcValue::from(-7), OrcValue::Null, OrcValue::Null]),
        ];
        let (ty, batch) = build("struct<a:int,b:string,c:array<bigint>>", &rows);
        let stats = collect_statistics(ty.root(), &batch, 0..3);
        assert_eq!(stats.len(), 5);

        assert_eq!(stats[0].number_of_values, 3);
        assert_eq!(stats[1].number_of_values, 2);
        assert!(stats[1].has_null);
        assert_eq!(
            stats[1].data,
            StatisticsData::Integer {
                minimum: -7,
                maximum: 3,
                sum: Some(-4)
            }
        );
        assert_eq!(
            stats[2].data,
            StatisticsData::String {
                minimum: "abc".into(),
                maximum: "b".into(),
                total_length: 4
            }
        );
        assert_eq!(stats[4].number_of_values, 2);
        assert!(!stats[4].has_null);
    }

    #[test]
    fn test_merge() {
        let (ty, batch) = build(
            "double",
            &[OrcValue::from(1.5), OrcValue::Null, OrcValue::from(-2.0)],
        );
        let mut first = ColumnStatistics::from_rows(ty.root(), &batch, 0..2);
        let second = ColumnStatistics::from_rows(ty.root(), &batch, 2..3);
        first.merge(&second);
        assert_eq!(first.number_of_values, 2);
        assert!(first.has_null);
        assert_eq!(
            first.data,
            StatisticsData::Double {
                minimum: -2.0,
                maximum: 1.5,
                sum: -0.5
            }
        );

        let mut empty = ColumnStatistics::default();
        empty.merge(&first);
        assert_eq!(empty, first);
    }

    #[test]
    fn test_integer_sum_overflow() {
        let (ty, batch) = build("bigint", &[OrcValue::from(i64::MAX), OrcValue::from(1)]);
        let stats = ColumnStatistics::from_rows(ty.root(), &batch, 0..2);
        assert!(matches!(stats.data, StatisticsData::Integer { sum: None, .. }));
    }

    #[test]
    fn test_timestamp_millis_rounds_down() {
        assert_eq!(timestamp_millis(1, 999_999_999), 1999);
        assert_eq!(timestamp_millis(-1, 500_000_000), -500);
        assert_eq!(timestamp_millis(-1, 500_000_001), -500);
        assert_eq!(timestamp_nanos(-1, 500_000_001), -499_999_999);
    }
}
