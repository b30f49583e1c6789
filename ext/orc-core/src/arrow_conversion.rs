//! Conversion of ORC schemas and column batches to and from Arrow
//!
//! Batches are converted column by column straight from their vectors, so no
//! intermediate [`crate::OrcValue`]s are built. Exported union columns have no
//! Arrow counterpart here and are rejected; imported Arrow unions (dense or
//! sparse) become union batches.

use crate::batch::{ColumnVectorBatch, VectorData};
use crate::types::{TypeDescription, TypeKind, TypeRef};
use crate::{OrcError, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::{
    Date32Type, Decimal128Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type,
    Int8Type, TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType,
};
use arrow_array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Decimal128Array, Float32Array,
    Float64Array, Int16Array, Int32Array, Int64Array, Int8Array, ListArray, MapArray, RecordBatch,
    StringArray, StructArray, TimestampNanosecondArray,
};
use arrow_buffer::{NullBuffer, OffsetBuffer, ScalarBuffer};
use arrow_schema::{DataType, Field, Fields, Schema, TimeUnit, UnionMode};
use bytes::Bytes;
use std::sync::Arc;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

const MAX_ARROW_DECIMAL_PRECISION: u32 = 38;

/// Arrow type of an ORC type node
pub fn orc_type_to_arrow(ty: TypeRef<'_>) -> Result<DataType> {
    Ok(match ty.kind() {
        TypeKind::Boolean => DataType::Boolean,
        TypeKind::Byte => DataType::Int8,
        TypeKind::Short => DataType::Int16,
        TypeKind::Int => DataType::Int32,
        TypeKind::Long => DataType::Int64,
        TypeKind::Float => DataType::Float32,
        TypeKind::Double => DataType::Float64,
        TypeKind::String | TypeKind::Char | TypeKind::Varchar => DataType::Utf8,
        TypeKind::Binary => DataType::Binary,
        TypeKind::Date => DataType::Date32,
        TypeKind::Timestamp => DataType::Timestamp(TimeUnit::Nanosecond, None),
        TypeKind::TimestampInstant => {
            DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into()))
        }
        TypeKind::Decimal => {
            let precision = match ty.precision() {
                0 => MAX_ARROW_DECIMAL_PRECISION,
                p => p,
            };
            DataType::Decimal128(precision as u8, ty.scale() as i8)
        }
        TypeKind::List => DataType::List(Arc::new(Field::new(
            "item",
            orc_type_to_arrow(child(ty, 0)?)?,
            true,
        ))),
        TypeKind::Map => DataType::Map(Arc::new(map_entries_field(ty)?), false),
        TypeKind::Struct => DataType::Struct(struct_fields(ty)?),
        TypeKind::Union => {
            return Err(OrcError::unsupported(
                "Union columns cannot be converted to Arrow",
            ))
        }
    })
}

/// Arrow schema of a struct schema; each top-level field becomes a column
pub fn schema_to_arrow(schema: &TypeDescription) -> Result<Schema> {
    let root = schema.root();
    if root.kind() != TypeKind::Struct {
        return Err(OrcError::unsupported(format!(
            "Only struct schemas map to Arrow schemas, got {}",
            schema
        )));
    }
    Ok(Schema::new(struct_fields(root)?))
}

fn child(ty: TypeRef<'_>, pos: usize) -> Result<TypeRef<'_>> {
    ty.child(pos)
        .ok_or_else(|| OrcError::internal(format!("{} type without child {}", ty.kind(), pos)))
}

fn struct_fields(ty: TypeRef<'_>) -> Result<Fields> {
    ty.fields()
        .map(|(name, field)| Ok(Field::new(name, orc_type_to_arrow(field)?, true)))
        .collect::<Result<Vec<_>>>()
        .map(Fields::from)
}

fn map_entries_field(ty: TypeRef<'_>) -> Result<Field> {
    let entries = Fields::from(vec![
        Field::new("keys", orc_type_to_arrow(child(ty, 0)?)?, false),
        Field::new("values", orc_type_to_arrow(child(ty, 1)?)?, true),
    ]);
    Ok(Field::new("entries", DataType::Struct(entries), false))
}

fn nulls(batch: &ColumnVectorBatch) -> Option<NullBuffer> {
    if !batch.has_nulls {
        return None;
    }
    let valid: Vec<bool> = (0..batch.num_elements).map(|row| !batch.is_null(row)).collect();
    Some(NullBuffer::from(valid))
}

fn offsets_i32(offsets: &[i64], len: usize) -> Result<OffsetBuffer<i32>> {
    let offsets = offsets
        .get(..=len)
        .ok_or_else(|| OrcError::internal("Offsets shorter than the batch"))?
        .iter()
        .map(|o| i32::try_from(*o).map_err(|_| OrcError::value(format!("Offset {} exceeds i32", o))))
        .collect::<Result<Vec<i32>>>()?;
    if offsets.windows(2).any(|w| w[0] > w[1]) {
        return Err(OrcError::internal("Offsets are not monotonic"));
    }
    Ok(OffsetBuffer::new(ScalarBuffer::from(offsets)))
}

fn strings(values: &[bytes::Bytes], batch: &ColumnVectorBatch) -> Result<ArrayRef> {
    let values = values[..batch.num_elements]
        .iter()
        .enumerate()
        .map(|(row, v)| {
            if batch.is_null(row) {
                return Ok(None);
            }
            std::str::from_utf8(v)
                .map(Some)
                .map_err(|e| OrcError::value(format!("Invalid UTF-8 at row {}: {}", row, e)))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(StringArray::from(values)))
}

/// Arrow array holding the rows of `batch`, whose type is `ty`
pub fn batch_to_arrow(ty: TypeRef<'_>, batch: &ColumnVectorBatch) -> Result<ArrayRef> {
    let len = batch.num_elements;
    let valid = |row: usize| !batch.is_null(row);
    let array: ArrayRef = match (&batch.data, ty.kind()) {
        (VectorData::Long(v), TypeKind::Boolean) => Arc::new(BooleanArray::from(
            (0..len).map(|r| valid(r).then(|| v[r] != 0)).collect::<Vec<_>>(),
        )),
        (VectorData::Long(v), TypeKind::Byte) => Arc::new(Int8Array::from(
            (0..len).map(|r| valid(r).then(|| v[r] as i8)).collect::<Vec<_>>(),
        )),
        (VectorData::Long(v), TypeKind::Short) => Arc::new(Int16Array::from(
            (0..len).map(|r| valid(r).then(|| v[r] as i16)).collect::<Vec<_>>(),
        )),
        (VectorData::Long(v), TypeKind::Int) => Arc::new(Int32Array::from(
            (0..len).map(|r| valid(r).then(|| v[r] as i32)).collect::<Vec<_>>(),
        )),
        (VectorData::Long(v), TypeKind::Long) => Arc::new(Int64Array::from(
            (0..len).map(|r| valid(r).then(|| v[r])).collect::<Vec<_>>(),
        )),
        (VectorData::Long(v), TypeKind::Date) => Arc::new(Date32Array::from(
            (0..len)
                .map(|r| valid(r).then(|| v[r] as i32))
                .collect::<Vec<_>>(),
        )),
        (VectorData::Double(v), TypeKind::Float) => Arc::new(Float32Array::from(
            (0..len).map(|r| valid(r).then(|| v[r] as f32)).collect::<Vec<_>>(),
        )),
        (VectorData::Double(v), TypeKind::Double) => Arc::new(Float64Array::from(
            (0..len).map(|r| valid(r).then(|| v[r])).collect::<Vec<_>>(),
        )),
        (VectorData::Bytes(v), TypeKind::Binary) => Arc::new(BinaryArray::from(
            (0..len)
                .map(|r| valid(r).then(|| v[r].as_ref()))
                .collect::<Vec<Option<&[u8]>>>(),
        )),
        (VectorData::Bytes(v), _) => strings(v, batch)?,
        (
            VectorData::Timestamp {
                seconds,
                nanoseconds,
            },
            kind,
        ) => {
            let values = (0..len)
                .map(|r| {
                    if !valid(r) {
                        return Ok(None);
                    }
                    seconds[r]
                        .checked_mul(1_000_000_000)
                        .and_then(|s| s.checked_add(nanoseconds[r]))
                        .map(Some)
                        .ok_or_else(|| {
                            OrcError::value(format!(
                                "Timestamp {}s out of range for nanoseconds",
                                seconds[r]
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            let array = TimestampNanosecondArray::from(values);
            if kind == TypeKind::TimestampInstant {
                Arc::new(array.with_timezone("UTC"))
            } else {
                Arc::new(array)
            }
        }
        (VectorData::Decimal64 { values, .. }, _) => decimals(
            ty,
            (0..len).map(|r| valid(r).then(|| values[r] as i128)).collect(),
        )?,
        (VectorData::Decimal128 { values, .. }, _) => decimals(
            ty,
            (0..len).map(|r| valid(r).then(|| values[r])).collect(),
        )?,
        (VectorData::List { offsets, elements }, TypeKind::List) => {
            let item = child(ty, 0)?;
            let values = batch_to_arrow(item, elements)?;
            let field = Arc::new(Field::new("item", values.data_type().clone(), true));
            Arc::new(ListArray::try_new(
                field,
                offsets_i32(offsets, len)?,
                values,
                nulls(batch),
            )?)
        }
        (
            VectorData::Map {
                offsets,
                keys,
                elements,
            },
            TypeKind::Map,
        ) => {
            let key_array = batch_to_arrow(child(ty, 0)?, keys)?;
            let value_array = batch_to_arrow(child(ty, 1)?, elements)?;
            let entries_fields = Fields::from(vec![
                Field::new("keys", key_array.data_type().clone(), false),
                Field::new("values", value_array.data_type().clone(), true),
            ]);
            let entries =
                StructArray::try_new(entries_fields.clone(), vec![key_array, value_array], None)?;
            Arc::new(MapArray::try_new(
                Arc::new(Field::new("entries", DataType::Struct(entries_fields), false)),
                offsets_i32(offsets, len)?,
                entries,
                nulls(batch),
                false,
            )?)
        }
        (VectorData::Struct { fields }, TypeKind::Struct) => {
            let (arrow_fields, arrays) = struct_columns(ty, fields, len)?;
            Arc::new(StructArray::try_new(arrow_fields, arrays, nulls(batch))?)
        }
        (VectorData::Union { .. }, _) => {
            return Err(OrcError::unsupported(
                "Union columns cannot be converted to Arrow",
            ))
        }
        (_, kind) => {
            return Err(OrcError::value(format!(
                "unknown batch type for a {} column",
                kind
            )))
        }
    };
    Ok(array)
}

fn decimals(ty: TypeRef<'_>, values: Vec<Option<i128>>) -> Result<ArrayRef> {
    let DataType::Decimal128(precision, scale) = orc_type_to_arrow(ty)? else {
        return Err(OrcError::value("Decimal vector for a non-decimal column"));
    };
    Ok(Arc::new(
        Decimal128Array::from(values).with_precision_and_scale(precision, scale)?,
    ))
}

fn struct_columns(
    ty: TypeRef<'_>,
    fields: &[ColumnVectorBatch],
    len: usize,
) -> Result<(Fields, Vec<ArrayRef>)> {
    let mut arrow_fields = Vec::with_capacity(fields.len());
    let mut arrays = Vec::with_capacity(fields.len());
    for ((name, field_ty), field) in ty.fields().zip(fields) {
        let array = batch_to_arrow(field_ty, field)?;
        let array = if array.len() > len {
            array.slice(0, len)
        } else {
            array
        };
        arrow_fields.push(Field::new(name, array.data_type().clone(), true));
        arrays.push(array);
    }
    Ok((Fields::from(arrow_fields), arrays))
}

/// Record batch with one column per top-level field of a struct batch
pub fn batch_to_record_batch(
    schema: &TypeDescription,
    batch: &ColumnVectorBatch,
) -> Result<RecordBatch> {
    let root = schema.root();
    let VectorData::Struct { fields } = &batch.data else {
        return Err(OrcError::unsupported(
            "Only struct batches map to Arrow record batches",
        ));
    };
    let (arrow_fields, arrays) = struct_columns(root, fields, batch.num_elements)?;
    Ok(RecordBatch::try_new(
        Arc::new(Schema::new(arrow_fields)),
        arrays,
    )?)
}

/// ORC type of an Arrow type
pub fn arrow_to_orc_type(data_type: &DataType) -> Result<TypeDescription> {
    let primitive = TypeDescription::primitive;
    match data_type {
        DataType::Boolean => primitive(TypeKind::Boolean),
        DataType::Int8 => primitive(TypeKind::Byte),
        DataType::Int16 => primitive(TypeKind::Short),
        DataType::Int32 => primitive(TypeKind::Int),
        DataType::Int64 => primitive(TypeKind::Long),
        DataType::Float32 => primitive(TypeKind::Float),
        DataType::Float64 => primitive(TypeKind::Double),
        DataType::Utf8 | DataType::LargeUtf8 => primitive(TypeKind::String),
        DataType::Binary | DataType::LargeBinary => primitive(TypeKind::Binary),
        DataType::Date32 => primitive(TypeKind::Date),
        DataType::Timestamp(_, None) => primitive(TypeKind::Timestamp),
        DataType::Timestamp(_, Some(_)) => primitive(TypeKind::TimestampInstant),
        DataType::Decimal128(precision, scale) if *scale >= 0 => {
            TypeDescription::decimal(*precision as u32, *scale as u32)
        }
        DataType::List(item) | DataType::LargeList(item) => {
            Ok(TypeDescription::list(arrow_to_orc_type(item.data_type())?))
        }
        DataType::Map(entries, _) => {
            let DataType::Struct(kv) = entries.data_type() else {
                return Err(OrcError::type_error("Map entries must be a struct"));
            };
            match kv.iter().collect::<Vec<_>>().as_slice() {
                [key, value] => Ok(TypeDescription::map(
                    arrow_to_orc_type(key.data_type())?,
                    arrow_to_orc_type(value.data_type())?,
                )),
                _ => Err(OrcError::type_error("Map entries must have two fields")),
            }
        }
        DataType::Struct(fields) => Ok(TypeDescription::struct_type(
            fields
                .iter()
                .map(|f| Ok((f.name().clone(), arrow_to_orc_type(f.data_type())?)))
                .collect::<Result<Vec<_>>>()?,
        )),
        DataType::Union(fields, _) => Ok(TypeDescription::union(
            fields
                .iter()
                .map(|(_, f)| arrow_to_orc_type(f.data_type()))
                .collect::<Result<Vec<_>>>()?,
        )),
        other => Err(OrcError::unsupported(format!(
            "Arrow type {} has no ORC counterpart",
            other
        ))),
    }
}

/// Struct schema with one field per Arrow schema column
pub fn schema_from_arrow(schema: &Schema) -> Result<TypeDescription> {
    arrow_to_orc_type(&DataType::Struct(schema.fields().clone()))
}

fn mismatch(ty: TypeRef<'_>, array: &dyn Array) -> OrcError {
    OrcError::type_error(format!(
        "Arrow {} cannot fill a {} column",
        array.data_type(),
        ty.kind()
    ))
}

/// Batch holding the rows of `array`, shaped after `ty`
pub fn arrow_to_batch(ty: TypeRef<'_>, array: &dyn Array) -> Result<ColumnVectorBatch> {
    let len = array.len();
    let mut batch = ColumnVectorBatch::new(ty, len);
    batch.num_elements = len;
    batch.not_null = (0..len).map(|row| array.is_valid(row)).collect();
    batch.has_nulls = batch.not_null.iter().any(|v| !*v);

    let data = match (ty.kind(), array.data_type()) {
        (TypeKind::Boolean, DataType::Boolean) => {
            let values = array.as_boolean();
            VectorData::Long((0..len).map(|r| values.value(r) as i64).collect())
        }
        (TypeKind::Byte, DataType::Int8) => longs(array.as_primitive::<Int8Type>().values()),
        (TypeKind::Short, DataType::Int16) => longs(array.as_primitive::<Int16Type>().values()),
        (TypeKind::Int, DataType::Int32) => longs(array.as_primitive::<Int32Type>().values()),
        (TypeKind::Long, DataType::Int64) => longs(array.as_primitive::<Int64Type>().values()),
        (TypeKind::Date, DataType::Date32) => longs(array.as_primitive::<Date32Type>().values()),
        (TypeKind::Float, DataType::Float32) => VectorData::Double(
            array
                .as_primitive::<Float32Type>()
                .values()
                .iter()
                .map(|v| *v as f64)
                .collect(),
        ),
        (TypeKind::Double, DataType::Float64) => {
            VectorData::Double(array.as_primitive::<Float64Type>().values().to_vec())
        }
        (
            TypeKind::String | TypeKind::Char | TypeKind::Varchar | TypeKind::Binary,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Binary | DataType::LargeBinary,
        ) => VectorData::Bytes(byte_values(array)),
        (TypeKind::Timestamp | TypeKind::TimestampInstant, DataType::Timestamp(unit, _)) => {
            let nanos = timestamp_nanos(array, unit);
            VectorData::Timestamp {
                seconds: nanos
                    .iter()
                    .map(|n| n.div_euclid(NANOS_PER_SECOND) as i64)
                    .collect(),
                nanoseconds: nanos
                    .iter()
                    .map(|n| n.rem_euclid(NANOS_PER_SECOND) as i64)
                    .collect(),
            }
        }
        (TypeKind::Decimal, DataType::Decimal128(_, scale)) => {
            if *scale as i64 != ty.scale() as i64 {
                return Err(OrcError::value(format!(
                    "Arrow decimal scale {} does not match column scale {}",
                    scale,
                    ty.scale()
                )));
            }
            let values = array.as_primitive::<Decimal128Type>().values();
            match batch.data {
                VectorData::Decimal64 {
                    precision, scale, ..
                } => VectorData::Decimal64 {
                    values: values
                        .iter()
                        .map(|v| {
                            i64::try_from(*v).map_err(|_| {
                                OrcError::value(format!("Decimal {} exceeds 18 digits", v))
                            })
                        })
                        .collect::<Result<_>>()?,
                    precision,
                    scale,
                },
                VectorData::Decimal128 {
                    precision, scale, ..
                } => VectorData::Decimal128 {
                    values: values.to_vec(),
                    precision,
                    scale,
                },
                _ => return Err(mismatch(ty, array)),
            }
        }
        (TypeKind::List, DataType::List(_)) => {
            let list = array.as_list::<i32>();
            let (offsets, start, end) = rebased(list.value_offsets());
            VectorData::List {
                offsets,
                elements: Box::new(arrow_to_batch(
                    child(ty, 0)?,
                    list.values().slice(start, end - start).as_ref(),
                )?),
            }
        }
        (TypeKind::List, DataType::LargeList(_)) => {
            let list = array.as_list::<i64>();
            let (offsets, start, end) = rebased(list.value_offsets());
            VectorData::List {
                offsets,
                elements: Box::new(arrow_to_batch(
                    child(ty, 0)?,
                    list.values().slice(start, end - start).as_ref(),
                )?),
            }
        }
        (TypeKind::Map, DataType::Map(_, _)) => {
            let map = array.as_map();
            let (offsets, start, end) = rebased(map.value_offsets());
            VectorData::Map {
                offsets,
                keys: Box::new(arrow_to_batch(
                    child(ty, 0)?,
                    map.keys().slice(start, end - start).as_ref(),
                )?),
                elements: Box::new(arrow_to_batch(
                    child(ty, 1)?,
                    map.values().slice(start, end - start).as_ref(),
                )?),
            }
        }
        (TypeKind::Struct, DataType::Struct(_)) => {
            let columns = array.as_struct().columns();
            if columns.len() != ty.children_count() {
                return Err(OrcError::type_error(format!(
                    "Expected {} struct fields, got {}",
                    ty.children_count(),
                    columns.len()
                )));
            }
            VectorData::Struct {
                fields: ty
                    .children()
                    .zip(columns)
                    .map(|(field, column)| arrow_to_batch(field, column.as_ref()))
                    .collect::<Result<_>>()?,
            }
        }
        (TypeKind::Union, DataType::Union(fields, mode)) => {
            let union = array.as_union();
            let type_ids: Vec<i8> = fields.iter().map(|(id, _)| id).collect();
            if type_ids.len() != ty.children_count() {
                return Err(OrcError::type_error(format!(
                    "Expected {} union variants, got {}",
                    ty.children_count(),
                    type_ids.len()
                )));
            }
            let tags = (0..len)
                .map(|row| {
                    let id = union.type_id(row);
                    type_ids
                        .iter()
                        .position(|t| *t == id)
                        .map(|pos| pos as u8)
                        .ok_or_else(|| OrcError::value(format!("Unknown union type id {}", id)))
                })
                .collect::<Result<Vec<u8>>>()?;
            let mut children = Vec::with_capacity(type_ids.len());
            for (pos, variant) in ty.children().enumerate() {
                let full = arrow_to_batch(variant, union.child(type_ids[pos]).as_ref())?;
                children.push(match mode {
                    UnionMode::Dense => full,
                    UnionMode::Sparse => {
                        let mut compact = ColumnVectorBatch::new(variant, 0);
                        for row in (0..len).filter(|r| tags[*r] as usize == pos) {
                            compact.append(&full.slice(row, 1))?;
                        }
                        compact
                    }
                });
            }
            let offsets = match mode {
                UnionMode::Dense => (0..len).map(|row| union.value_offset(row) as u64).collect(),
                UnionMode::Sparse => {
                    let mut seen = vec![0u64; type_ids.len()];
                    tags.iter()
                        .map(|tag| {
                            let slot = &mut seen[*tag as usize];
                            *slot += 1;
                            *slot - 1
                        })
                        .collect()
                }
            };
            VectorData::Union {
                tags,
                offsets,
                children,
            }
        }
        _ => return Err(mismatch(ty, array)),
    };
    batch.data = data;
    Ok(batch)
}

/// Struct batch with one field per record batch column
pub fn record_batch_to_batch(
    schema: &TypeDescription,
    record_batch: &RecordBatch,
) -> Result<ColumnVectorBatch> {
    if schema.kind() != TypeKind::Struct {
        return Err(OrcError::unsupported(
            "Only struct schemas map to Arrow record batches",
        ));
    }
    let columns = StructArray::from(record_batch.clone());
    arrow_to_batch(schema.root(), &columns)
}

fn longs<T: Copy + Into<i64>>(values: &[T]) -> VectorData {
    VectorData::Long(values.iter().map(|v| (*v).into()).collect())
}

/// Offsets starting at zero plus the referenced child range
fn rebased<O: Copy + Into<i64>>(offsets: &[O]) -> (Vec<i64>, usize, usize) {
    let first = offsets.first().map_or(0, |o| (*o).into());
    let last = offsets.last().map_or(0, |o| (*o).into());
    let rebased = offsets.iter().map(|o| (*o).into() - first).collect();
    (rebased, first as usize, last as usize)
}

fn byte_values(array: &dyn Array) -> Vec<Bytes> {
    let copy = |value: Option<&[u8]>| value.map_or_else(Bytes::new, Bytes::copy_from_slice);
    match array.data_type() {
        DataType::Utf8 => array
            .as_string::<i32>()
            .iter()
            .map(|v| copy(v.map(str::as_bytes)))
            .collect(),
        DataType::LargeUtf8 => array
            .as_string::<i64>()
            .iter()
            .map(|v| copy(v.map(str::as_bytes)))
            .collect(),
        DataType::Binary => array.as_binary::<i32>().iter().map(copy).collect(),
        _ => array.as_binary::<i64>().iter().map(copy).collect(),
    }
}

fn timestamp_nanos(array: &dyn Array, unit: &TimeUnit) -> Vec<i128> {
    let (values, factor): (Vec<i64>, i128) = match unit {
        TimeUnit::Second => (
            array.as_primitive::<TimestampSecondType>().values().to_vec(),
            NANOS_PER_SECOND,
        ),
        TimeUnit::Millisecond => (
            array.as_primitive::<TimestampMillisecondType>().values().to_vec(),
            1_000_000,
        ),
        TimeUnit::Microsecond => (
            array.as_primitive::<TimestampMicrosecondType>().values().to_vec(),
            1_000,
        ),
        TimeUnit::Nanosecond => (
            array.as_primitive::<TimestampNanosecondType>().values().to_vec(),
            1,
        ),
    };
    values.into_iter().map(|v| v as i128 * factor).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{create_converter, ConverterOptions};
    use crate::OrcValue;
    use arrow_array::builder::{Int32Builder, ListBuilder, StringBuilder};
    use arrow_array::{TimestampMillisecondArray, UnionArray};
    use arrow_schema::UnionFields;

    fn fill(schema: &TypeDescription, rows: &[OrcValue]) -> ColumnVectorBatch {
        let options = Arc::new(ConverterOptions::default());
        let mut converter = create_converter(schema.root(), &options).unwrap();
        let mut batch = ColumnVectorBatch::new(schema.root(), rows.len());
        for (row, value) in rows.iter().enumerate() {
            converter.encode(&mut batch, row, value).unwrap();
        }
        batch
    }

    #[test]
    fn test_schema_mapping() {
        let schema: TypeDescription =
            "struct<a:tinyint,b:decimal(10,2),c:array<string>,d:map<string,double>,e:timestamp with local time zone>"
                .parse()
                .unwrap();
        let arrow = schema_to_arrow(&schema).unwrap();
        assert_eq!(arrow.field(0).data_type(), &DataType::Int8);
        assert_eq!(arrow.field(1).data_type(), &DataType::Decimal128(10, 2));
        assert!(matches!(arrow.field(2).data_type(), DataType::List(_)));
        assert!(matches!(arrow.field(3).data_type(), DataType::Map(_, false)));
        assert_eq!(
            arrow.field(4).data_type(),
            &DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into()))
        );

        let union: TypeDescription = "struct<u:uniontype<int,string>>".parse().unwrap();
        assert!(matches!(
            schema_to_arrow(&union),
            Err(OrcError::Unsupported(_))
        ));
    }

    #[test]
    fn test_record_batch_export() {
        let schema: TypeDescription = "struct<a:int,b:string,c:array<bigint>>".parse().unwrap();
        let batch = fill(
            &schema,
            &[
                OrcValue::Tuple(vec![
                    OrcValue::from(1),
                    OrcValue::from("x"),
                    OrcValue::List(vec![OrcValue::from(10), OrcValue::from(11)]),
                ]),
                OrcValue::Tuple(vec![OrcValue::Null, OrcValue::from("y"), OrcValue::Null]),
            ],
        );
        let record_batch = batch_to_record_batch(&schema, &batch).unwrap();
        assert_eq!(record_batch.num_rows(), 2);
        assert_eq!(record_batch.num_columns(), 3);

        let a = record_batch.column(0).as_primitive::<Int32Type>();
        assert_eq!(a.value(0), 1);
        assert!(a.is_null(1));
        let b = record_batch.column(1).as_string::<i32>();
        assert_eq!(b.value(1), "y");
        let c = record_batch.column(2).as_list::<i32>();
        let first: Vec<Option<i64>> = c.value(0).as_primitive::<Int64Type>().iter().collect();
        assert_eq!(first, vec![Some(10), Some(11)]);
        assert!(c.is_null(1));
    }

    #[test]
    fn test_decimal_export() {
        let schema: TypeDescription = "decimal(5,2)".parse().unwrap();
        let batch = fill(&schema, &[OrcValue::Decimal("1.25".parse().unwrap())]);
        let array = batch_to_arrow(schema.root(), &batch).unwrap();
        let decimals = array.as_any().downcast_ref::<Decimal128Array>().unwrap();
        assert_eq!(decimals.value(0), 125);
        assert_eq!(decimals.value_as_string(0), "1.25");
    }

    #[test]
    fn test_arrow_schema_import() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("name", DataType::LargeUtf8, true),
            Field::new(
                "seen",
                DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
                true,
            ),
            Field::new_list("tags", Field::new("item", DataType::Utf8, true), true),
            Field::new("price", DataType::Decimal128(10, 2), true),
        ]);
        let orc = schema_from_arrow(&schema).unwrap();
        assert_eq!(
            orc.to_string(),
            "struct<id:int,name:string,seen:timestamp with local time zone,tags:array<string>,price:decimal(10,2)>"
        );
        assert!(matches!(
            arrow_to_orc_type(&DataType::UInt32),
            Err(OrcError::Unsupported(_))
        ));
    }

    #[test]
    fn test_sliced_list_import_rebases_offsets() {
        let mut builder = ListBuilder::new(Int32Builder::new());
        builder.append_value([Some(1), Some(2)]);
        builder.append_value([Some(3)]);
        builder.append_null();
        builder.append_value([Some(4), None, Some(6)]);
        let list = builder.finish().slice(1, 3);

        let ty: TypeDescription = "array<int>".parse().unwrap();
        let batch = arrow_to_batch(ty.root(), &list).unwrap();
        assert_eq!(batch.num_elements, 3);
        assert!(batch.is_null(1));
        let VectorData::List { offsets, elements } = &batch.data else {
            panic!("expected a list batch");
        };
        assert_eq!(offsets, &vec![0, 1, 1, 4]);
        assert_eq!(elements.num_elements, 4);
        assert!(elements.is_null(2));
        let VectorData::Long(values) = &elements.data else {
            panic!("expected longs");
        };
        assert_eq!(values[0], 3);
        assert_eq!(values[3], 6);
    }

    #[test]
    fn test_timestamp_units_import_to_seconds_and_nanos() {
        let ty: TypeDescription = "timestamp".parse().unwrap();
        let array = TimestampMillisecondArray::from(vec![Some(-1), None, Some(1500)]);
        let batch = arrow_to_batch(ty.root(), &array).unwrap();
        let VectorData::Timestamp {
            seconds,
            nanoseconds,
        } = &batch.data
        else {
            panic!("expected timestamps");
        };
        assert_eq!(seconds, &vec![-1, 0, 1]);
        assert_eq!(nanoseconds, &vec![999_000_000, 0, 500_000_000]);
        assert!(batch.is_null(1));
    }

    #[test]
    fn test_sparse_union_import_compacts_children() {
        let fields = UnionFields::new(
            vec![0, 1],
            vec![
                Field::new("int", DataType::Int32, true),
                Field::new("string", DataType::Utf8, true),
            ],
        );
        let ints: ArrayRef = Arc::new(Int32Array::from(vec![Some(1), None, Some(3)]));
        let strings: ArrayRef = Arc::new(StringArray::from(vec![None, Some("b"), None]));
        let union = UnionArray::try_new(
            fields,
            ScalarBuffer::from(vec![0i8, 1, 0]),
            None,
            vec![ints, strings],
        )
        .unwrap();

        let ty: TypeDescription = "uniontype<int,string>".parse().unwrap();
        let batch = arrow_to_batch(ty.root(), &union).unwrap();
        let VectorData::Union {
            tags,
            offsets,
            children,
        } = &batch.data
        else {
            panic!("expected a union batch");
        };
        assert_eq!(tags, &vec![0, 1, 0]);
        assert_eq!(offsets, &vec![0, 0, 1]);
        assert_eq!(children[0].num_elements, 2);
        assert_eq!(children[1].num_elements, 1);
        let VectorData::Bytes(values) = &children[1].data else {
            panic!("expected strings");
        };
        assert_eq!(values[0].as_ref(), b"b");
    }

    #[test]
    fn test_mismatched_arrow_type_is_rejected() {
        let ty: TypeDescription = "int".parse().unwrap();
        let wide = Int64Array::from(vec![1i64]);
        assert!(matches!(
            arrow_to_batch(ty.root(), &wide),
            Err(OrcError::Type(_))
        ));

        let ty: TypeDescription = "string".parse().unwrap();
        let mut names = StringBuilder::new();
        names.append_value("ok");
        names.append_null();
        let batch = arrow_to_batch(ty.root(), &names.finish()).unwrap();
        assert!(batch.is_null(1));
    }
}
