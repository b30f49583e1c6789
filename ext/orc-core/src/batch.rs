//! Columnar row batches
//!
//! A [`ColumnVectorBatch`] holds up to `capacity` rows of one type node. The
//! layout mirrors the ORC vector batches: a validity bitmap plus one
//! kind-specific payload. Nested kinds own their child batches.

use crate::types::{TypeKind, TypeRef};
use crate::{OrcError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Kind-specific payload of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VectorData {
    /// boolean, byte, short, int, long and date
    Long(Vec<i64>),
    /// float and double
    Double(Vec<f64>),
    /// string, char, varchar and binary
    Bytes(Vec<Bytes>),
    Timestamp {
        seconds: Vec<i64>,
        nanoseconds: Vec<i64>,
    },
    Decimal64 {
        values: Vec<i64>,
        precision: u32,
        scale: u32,
    },
    Decimal128 {
        values: Vec<i128>,
        precision: u32,
        scale: u32,
    },
    List {
        offsets: Vec<i64>,
        elements: Box<ColumnVectorBatch>,
    },
    Map {
        offsets: Vec<i64>,
        keys: Box<ColumnVectorBatch>,
        elements: Box<ColumnVectorBatch>,
    },
    Struct {
        fields: Vec<ColumnVectorBatch>,
    },
    Union {
        tags: Vec<u8>,
        offsets: Vec<u64>,
        children: Vec<ColumnVectorBatch>,
    },
}

/// Columnar buffer for one type node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnVectorBatch {
    capacity: usize,
    pub num_elements: usize,
    pub has_nulls: bool,
    pub not_null: Vec<bool>,
    pub data: VectorData,
    #[serde(skip)]
    generation: u64,
}

/// Decimals with 1..=18 digits use the 64-bit layout
pub fn is_decimal64(precision: u32) -> bool {
    (1..=18).contains(&precision)
}

impl ColumnVectorBatch {
    /// Create an empty batch shaped after `ty`
    pub fn new(ty: TypeRef<'_>, capacity: usize) -> Self {
        let data = match ty.kind() {
            TypeKind::Boolean
            | TypeKind::Byte
            | TypeKind::Short
            | TypeKind::Int
            | TypeKind::Long
            | TypeKind::Date => VectorData::Long(Vec::with_capacity(capacity)),
            TypeKind::Float | TypeKind::Double => VectorData::Double(Vec::with_capacity(capacity)),
            TypeKind::String | TypeKind::Char | TypeKind::Varchar | TypeKind::Binary => {
                VectorData::Bytes(Vec::with_capacity(capacity))
            }
            TypeKind::Timestamp | TypeKind::TimestampInstant => VectorData::Timestamp {
                seconds: Vec::with_capacity(capacity),
                nanoseconds: Vec::with_capacity(capacity),
            },
            TypeKind::Decimal if is_decimal64(ty.precision()) => VectorData::Decimal64 {
                values: Vec::with_capacity(capacity),
                precision: ty.precision(),
                scale: ty.scale(),
            },
            TypeKind::Decimal => VectorData::Decimal128 {
                values: Vec::with_capacity(capacity),
                precision: ty.precision(),
                scale: ty.scale(),
            },
            TypeKind::List => VectorData::List {
                offsets: vec![0],
                elements: Box::new(Self::child(ty, 0, capacity)),
            },
            TypeKind::Map => VectorData::Map {
                offsets: vec![0],
                keys: Box::new(Self::child(ty, 0, capacity)),
                elements: Box::new(Self::child(ty, 1, capacity)),
            },
            TypeKind::Struct => VectorData::Struct {
                fields: ty.children().map(|c| Self::new(c, capacity)).collect(),
            },
            TypeKind::Union => VectorData::Union {
                tags: Vec::with_capacity(capacity),
                offsets: Vec::with_capacity(capacity),
                children: ty.children().map(|c| Self::new(c, capacity)).collect(),
            },
        };
        Self {
            capacity,
            num_elements: 0,
            has_nulls: false,
            not_null: Vec::with_capacity(capacity),
            data,
            generation: next_generation(),
        }
    }

    fn child(ty: TypeRef<'_>, pos: usize, capacity: usize) -> Self {
        match ty.child(pos) {
            Some(child) => Self::new(child, capacity),
            // A malformed compound without children still gets a well-formed batch
            None => Self::empty_long(capacity),
        }
    }

    fn empty_long(capacity: usize) -> Self {
        Self {
            capacity,
            num_elements: 0,
            has_nulls: false,
            not_null: Vec::new(),
            data: VectorData::Long(Vec::new()),
            generation: next_generation(),
        }
    }

    /// Number of rows the batch is meant to hold per refill
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn len(&self) -> usize {
        self.num_elements
    }

    pub fn is_empty(&self) -> bool {
        self.num_elements == 0
    }

    /// Token identifying the current contents; changes on every refill
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stamp this batch and all children with a fresh generation
    pub fn mark_refilled(&mut self) {
        let generation = next_generation();
        self.visit_mut(&mut |batch| batch.generation = generation);
    }

    fn visit_mut(&mut self, f: &mut dyn FnMut(&mut ColumnVectorBatch)) {
        f(self);
        match &mut self.data {
            VectorData::List { elements, .. } => elements.visit_mut(f),
            VectorData::Map { keys, elements, .. } => {
                keys.visit_mut(f);
                elements.visit_mut(f);
            }
            VectorData::Struct { fields: children } | VectorData::Union { children, .. } => {
                for child in children.iter_mut() {
                    child.visit_mut(f);
                }
            }
            _ => {}
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.has_nulls && !self.not_null.get(row).copied().unwrap_or(true)
    }

    /// Grow the validity bitmap and the payload so `rows` rows are addressable.
    /// Child batches of nested kinds are grown by their own writers.
    pub fn ensure_rows(&mut self, rows: usize) {
        if self.not_null.len() < rows {
            self.not_null.resize(rows, true);
        }
        match &mut self.data {
            VectorData::Long(v) => grow(v, rows, 0),
            VectorData::Double(v) => grow(v, rows, 0.0),
            VectorData::Bytes(v) => grow(v, rows, Bytes::new()),
            VectorData::Timestamp {
                seconds,
                nanoseconds,
            } => {
                grow(seconds, rows, 0);
                grow(nanoseconds, rows, 0);
            }
            VectorData::Decimal64 { values, .. } => grow(values, rows, 0),
            VectorData::Decimal128 { values, .. } => grow(values, rows, 0),
            VectorData::List { offsets, .. } | VectorData::Map { offsets, .. } => {
                grow(offsets, rows + 1, 0)
            }
            VectorData::Struct { .. } => {}
            VectorData::Union { tags, offsets, .. } => {
                grow(tags, rows, 0);
                grow(offsets, rows, 0);
            }
        }
    }

    /// Mark `row` invalid and extend the element count to cover it
    pub fn set_null(&mut self, row: usize) {
        self.ensure_rows(row + 1);
        self.not_null[row] = false;
        self.has_nulls = true;
        self.num_elements = row + 1;
    }

    /// Mark `row` valid and extend the element count to cover it
    pub fn set_valid(&mut self, row: usize) {
        self.ensure_rows(row + 1);
        self.not_null[row] = true;
        self.num_elements = row + 1;
    }

    /// Reset to zero rows, releasing retained byte buffers
    pub fn clear(&mut self) {
        self.truncate(0);
        self.has_nulls = false;
    }

    /// Drop everything past the first `rows` rows, including unreferenced
    /// child entries
    pub fn truncate(&mut self, rows: usize) {
        let rows = rows.min(self.num_elements);
        self.num_elements = rows;
        self.not_null.truncate(rows);
        match &mut self.data {
            VectorData::Long(v) => v.truncate(rows),
            VectorData::Double(v) => v.truncate(rows),
            VectorData::Bytes(v) => v.truncate(rows),
            VectorData::Timestamp {
                seconds,
                nanoseconds,
            } => {
                seconds.truncate(rows);
                nanoseconds.truncate(rows);
            }
            VectorData::Decimal64 { values, .. } => values.truncate(rows),
            VectorData::Decimal128 { values, .. } => values.truncate(rows),
            VectorData::List { offsets, elements } => {
                grow(offsets, rows + 1, 0);
                offsets.truncate(rows + 1);
                elements.truncate(offsets[rows].max(0) as usize);
            }
            VectorData::Map {
                offsets,
                keys,
                elements,
            } => {
                grow(offsets, rows + 1, 0);
                offsets.truncate(rows + 1);
                let end = offsets[rows].max(0) as usize;
                keys.truncate(end);
                elements.truncate(end);
            }
            VectorData::Struct { fields } => fields.iter_mut().for_each(|f| f.truncate(rows)),
            VectorData::Union {
                tags,
                offsets,
                children,
            } => {
                tags.truncate(rows);
                offsets.truncate(rows);
                let mut used = vec![0usize; children.len()];
                for row in 0..rows {
                    if self.not_null.get(row).copied().unwrap_or(true) {
                        let tag = tags[row] as usize;
                        if let Some(slot) = used.get_mut(tag) {
                            *slot = (*slot).max(offsets[row] as usize + 1);
                        }
                    }
                }
                for (child, end) in children.iter_mut().zip(used) {
                    child.truncate(end);
                }
            }
        }
        if self.not_null.iter().all(|v| *v) {
            self.has_nulls = false;
        }
    }

    /// Copy of rows `[start, start + len)`, with nested offsets rebased
    pub fn slice(&self, start: usize, len: usize) -> ColumnVectorBatch {
        let end = start.saturating_add(len).min(self.num_elements);
        let start = start.min(end);
        let not_null: Vec<bool> = (start..end)
            .map(|row| self.not_null.get(row).copied().unwrap_or(true))
            .collect();
        let has_nulls = self.has_nulls && not_null.iter().any(|v| !*v);
        let data = match &self.data {
            VectorData::Long(v) => VectorData::Long(v[start..end].to_vec()),
            VectorData::Double(v) => VectorData::Double(v[start..end].to_vec()),
            VectorData::Bytes(v) => VectorData::Bytes(v[start..end].to_vec()),
            VectorData::Timestamp {
                seconds,
                nanoseconds,
            } => VectorData::Timestamp {
                seconds: seconds[start..end].to_vec(),
                nanoseconds: nanoseconds[start..end].to_vec(),
            },
            VectorData::Decimal64 {
                values,
                precision,
                scale,
            } => VectorData::Decimal64 {
                values: values[start..end].to_vec(),
                precision: *precision,
                scale: *scale,
            },
            VectorData::Decimal128 {
                values,
                precision,
                scale,
            } => VectorData::Decimal128 {
                values: values[start..end].to_vec(),
                precision: *precision,
                scale: *scale,
            },
            VectorData::List { offsets, elements } => {
                let (offsets, lo, hi) = rebase_offsets(offsets, start, end);
                VectorData::List {
                    offsets,
                    elements: Box::new(elements.slice(lo, hi - lo)),
                }
            }
            VectorData::Map {
                offsets,
                keys,
                elements,
            } => {
                let (offsets, lo, hi) = rebase_offsets(offsets, start, end);
                VectorData::Map {
                    offsets,
                    keys: Box::new(keys.slice(lo, hi - lo)),
                    elements: Box::new(elements.slice(lo, hi - lo)),
                }
            }
            VectorData::Struct { fields } => VectorData::Struct {
                fields: fields.iter().map(|f| f.slice(start, end - start)).collect(),
            },
            VectorData::Union {
                tags,
                offsets,
                children,
            } => {
                let mut ranges = vec![(usize::MAX, 0usize); children.len()];
                for row in start..end {
                    if self.not_null.get(row).copied().unwrap_or(true) {
                        if let Some(range) = ranges.get_mut(tags[row] as usize) {
                            let offset = offsets[row] as usize;
                            range.0 = range.0.min(offset);
                            range.1 = range.1.max(offset + 1);
                        }
                    }
                }
                let new_offsets = (start..end)
                    .map(|row| {
                        let lo = ranges
                            .get(tags[row] as usize)
                            .map(|r| r.0)
                            .unwrap_or(0);
                        offsets[row].saturating_sub(lo as u64)
                    })
                    .collect();
                let new_children = children
                    .iter()
                    .zip(&ranges)
                    .map(|(child, &(lo, hi))| {
                        if lo == usize::MAX {
                            child.slice(0, 0)
                        } else {
                            child.slice(lo, hi - lo)
                        }
                    })
                    .collect();
                VectorData::Union {
                    tags: tags[start..end].to_vec(),
                    offsets: new_offsets,
                    children: new_children,
                }
            }
        };
        ColumnVectorBatch {
            capacity: end - start,
            num_elements: end - start,
            has_nulls,
            not_null,
            data,
            generation: next_generation(),
        }
    }

    /// Append all rows of `other`, which must have the same shape
    pub fn append(&mut self, other: &ColumnVectorBatch) -> Result<()> {
        let own_rows = self.num_elements;
        self.truncate(own_rows);
        let other = other.slice(0, other.num_elements);
        match (&mut self.data, &other.data) {
            (VectorData::Long(a), VectorData::Long(b)) => a.extend_from_slice(b),
            (VectorData::Double(a), VectorData::Double(b)) => a.extend_from_slice(b),
            (VectorData::Bytes(a), VectorData::Bytes(b)) => a.extend_from_slice(b),
            (
                VectorData::Timestamp {
                    seconds,
                    nanoseconds,
                },
                VectorData::Timestamp {
                    seconds: other_seconds,
                    nanoseconds: other_nanos,
                },
            ) => {
                seconds.extend_from_slice(other_seconds);
                nanoseconds.extend_from_slice(other_nanos);
            }
            (
                VectorData::Decimal64 { values, .. },
                VectorData::Decimal64 {
                    values: other_values,
                    ..
                },
            ) => values.extend_from_slice(other_values),
            (
                VectorData::Decimal128 { values, .. },
                VectorData::Decimal128 {
                    values: other_values,
                    ..
                },
            ) => values.extend_from_slice(other_values),
            (
                VectorData::List { offsets, elements },
                VectorData::List {
                    offsets: other_offsets,
                    elements: other_elements,
                },
            ) => {
                let base = offsets[own_rows];
                offsets.extend(other_offsets.iter().skip(1).map(|o| o + base));
                elements.append(other_elements)?;
            }
            (
                VectorData::Map {
                    offsets,
                    keys,
                    elements,
                },
                VectorData::Map {
                    offsets: other_offsets,
                    keys: other_keys,
                    elements: other_elements,
                },
            ) => {
                let base = offsets[own_rows];
                offsets.extend(other_offsets.iter().skip(1).map(|o| o + base));
                keys.append(other_keys)?;
                elements.append(other_elements)?;
            }
            (VectorData::Struct { fields }, VectorData::Struct { fields: other_fields })
                if fields.len() == other_fields.len() =>
            {
                for (field, other_field) in fields.iter_mut().zip(other_fields) {
                    field.append(other_field)?;
                }
            }
            (
                VectorData::Union {
                    tags,
                    offsets,
                    children,
                },
                VectorData::Union {
                    tags: other_tags,
                    offsets: other_offsets,
                    children: other_children,
                },
            ) if children.len() == other_children.len() => {
                let bases: Vec<u64> = children.iter().map(|c| c.num_elements as u64).collect();
                for (tag, offset) in other_tags.iter().zip(other_offsets) {
                    tags.push(*tag);
                    offsets.push(offset + bases.get(*tag as usize).copied().unwrap_or(0));
                }
                for (child, other_child) in children.iter_mut().zip(other_children) {
                    child.append(other_child)?;
                }
            }
            _ => {
                return Err(OrcError::internal(
                    "Cannot append batches of different shapes",
                ))
            }
        }
        self.not_null.extend_from_slice(&other.not_null);
        self.has_nulls |= other.has_nulls;
        self.num_elements += other.num_elements;
        Ok(())
    }

    /// Rough in-memory footprint, used to decide when a stripe is full
    pub fn estimated_size(&self) -> usize {
        let rows = self.num_elements;
        let payload = match &self.data {
            VectorData::Long(_) | VectorData::Double(_) | VectorData::Decimal64 { .. } => rows * 8,
            VectorData::Bytes(v) => v.iter().take(rows).map(|b| b.len() + 8).sum(),
            VectorData::Timestamp { .. } | VectorData::Decimal128 { .. } => rows * 16,
            VectorData::List { elements, .. } => rows * 8 + elements.estimated_size(),
            VectorData::Map { keys, elements, .. } => {
                rows * 8 + keys.estimated_size() + elements.estimated_size()
            }
            VectorData::Struct { fields } => fields.iter().map(|f| f.estimated_size()).sum(),
            VectorData::Union { children, .. } => {
                rows * 9 + children.iter().map(|c| c.estimated_size()).sum::<usize>()
            }
        };
        payload + rows
    }
}

fn grow<T: Clone>(v: &mut Vec<T>, len: usize, fill: T) {
    if v.len() < len {
        v.resize(len, fill);
    }
}

/// Offsets for rows `[start, end)` shifted to start at zero, plus the child range
fn rebase_offsets(offsets: &[i64], start: usize, end: usize) -> (Vec<i64>, usize, usize) {
    let at = |row: usize| offsets.get(row).copied().unwrap_or(0).max(0);
    let base = at(start);
    let stop = at(end).max(base);
    let rebased = (start..=end).map(|row| (at(row) - base).max(0)).collect();
    (rebased, base as usize, stop as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeDescription;

    fn long_batch(values: &[Option<i64>]) -> ColumnVectorBatch {
        let ty = TypeDescription::primitive(TypeKind::Long).unwrap();
        let mut batch = ColumnVectorBatch::new(ty.root(), values.len());
        for (row, value) in values.iter().enumerate() {
            match value {
                Some(v) => {
                    batch.set_valid(row);
                    if let VectorData::Long(data) = &mut batch.data {
                        data[row] = *v;
                    }
                }
                None => batch.set_null(row),
            }
        }
        batch
    }

    fn longs(batch: &ColumnVectorBatch) -> Vec<i64> {
        match &batch.data {
            VectorData::Long(v) => v[..batch.num_elements].to_vec(),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_layout_follows_type() {
        let ty: TypeDescription =
            "struct<a:decimal(10,2),b:decimal(38,4),c:map<string,timestamp>,d:uniontype<int,string>>"
                .parse()
                .unwrap();
        let batch = ColumnVectorBatch::new(ty.root(), 16);
        let VectorData::Struct { fields } = &batch.data else {
            panic!("expected struct");
        };
        assert!(matches!(fields[0].data, VectorData::Decimal64 { precision: 10, scale: 2, .. }));
        assert!(matches!(fields[1].data, VectorData::Decimal128 { precision: 38, .. }));
        assert!(matches!(fields[2].data, VectorData::Map { .. }));
        assert!(matches!(fields[3].data, VectorData::Union { ref children, .. } if children.len() == 2));
        assert_eq!(batch.capacity(), 16);
    }

    #[test]
    fn test_nulls_and_slice() {
        let batch = long_batch(&[Some(1), None, Some(3), Some(4)]);
        assert!(batch.has_nulls);
        assert!(batch.is_null(1));
        assert!(!batch.is_null(0));

        let tail = batch.slice(2, 10);
        assert_eq!(tail.num_elements, 2);
        assert!(!tail.has_nulls);
        assert_eq!(longs(&tail), vec![3, 4]);
    }

    #[test]
    fn test_append_rebases_list_offsets() {
        let ty: TypeDescription = "array<bigint>".parse().unwrap();
        let build = |rows: &[&[i64]]| {
            let mut batch = ColumnVectorBatch::new(ty.root(), rows.len());
            let mut flat = Vec::new();
            let mut offsets = vec![0i64];
            for row in rows {
                flat.extend_from_slice(row);
                offsets.push(flat.len() as i64);
            }
            if let VectorData::List { offsets: o, elements } = &mut batch.data {
                *o = offsets;
                elements.data = VectorData::Long(flat.clone());
                elements.not_null = vec![true; flat.len()];
                elements.num_elements = flat.len();
            }
            batch.not_null = vec![true; rows.len()];
            batch.num_elements = rows.len();
            batch
        };

        let mut a = build(&[&[1, 2], &[]]);
        let b = build(&[&[3], &[4, 5]]);
        a.append(&b).unwrap();
        assert_eq!(a.num_elements, 4);
        let VectorData::List { offsets, elements } = &a.data else {
            panic!("expected list");
        };
        assert_eq!(offsets, &vec![0, 2, 2, 3, 5]);
        assert_eq!(longs(elements), vec![1, 2, 3, 4, 5]);

        let middle = a.slice(1, 2);
        let VectorData::List { offsets, elements } = &middle.data else {
            panic!("expected list");
        };
        assert_eq!(offsets, &vec![0, 0, 1]);
        assert_eq!(longs(elements), vec![3]);
    }

    #[test]
    fn test_append_shape_mismatch() {
        let mut a = long_batch(&[Some(1)]);
        let ty = TypeDescription::primitive(TypeKind::Double).unwrap();
        let b = ColumnVectorBatch::new(ty.root(), 1);
        assert!(matches!(a.append(&b), Err(OrcError::Internal(_))));
    }

    #[test]
    fn test_clear_and_generation() {
        let mut batch = long_batch(&[Some(1), None]);
        let before = batch.generation();
        batch.mark_refilled();
        assert_ne!(before, batch.generation());
        batch.clear();
        assert_eq!(batch.num_elements, 0);
        assert!(!batch.has_nulls);
        assert!(longs(&batch).is_empty());
    }
}
