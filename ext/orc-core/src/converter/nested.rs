use super::{create_converter, unknown_batch, BatchView, Converter, ConverterOptions, StructRepr};
use crate::batch::{ColumnVectorBatch, VectorData};
use crate::error::ErrorContext;
use crate::types::TypeRef;
use crate::{OrcError, OrcValue, Result};
use indexmap::IndexMap;
use std::sync::Arc;

fn child_type<'a>(ty: TypeRef<'a>, pos: usize) -> Result<TypeRef<'a>> {
    ty.child(pos).ok_or_else(|| {
        OrcError::type_error(format!("{} type is missing child type {}", ty.kind(), pos))
    })
}

fn row_range(offsets: &[i64], row: usize) -> Result<std::ops::Range<usize>> {
    match (offsets.get(row), offsets.get(row + 1)) {
        (Some(&start), Some(&end)) if 0 <= start && start <= end => {
            Ok(start as usize..end as usize)
        }
        _ => Err(OrcError::internal(format!("Invalid offsets at row {}", row))),
    }
}

/// Sets `offsets[row + 1]`; `ensure_rows` must already cover `row`.
fn close_row(batch: &mut ColumnVectorBatch, row: usize, end: Option<i64>) {
    if let VectorData::List { offsets, .. } | VectorData::Map { offsets, .. } = &mut batch.data {
        offsets[row + 1] = end.unwrap_or(offsets[row]);
    }
}

pub struct ListConverter {
    element: Box<dyn Converter>,
    view: BatchView,
    options: Arc<ConverterOptions>,
}

impl ListConverter {
    pub fn new(ty: TypeRef<'_>, options: Arc<ConverterOptions>) -> Result<Self> {
        Ok(Self {
            element: create_converter(child_type(ty, 0)?, &options)?,
            view: BatchView::default(),
            options,
        })
    }
}

impl Converter for ListConverter {
    fn reset(&mut self, batch: &ColumnVectorBatch) -> Result<()> {
        let VectorData::List { elements, .. } = &batch.data else {
            return Err(unknown_batch());
        };
        self.view.bind(batch);
        self.element.reset(elements)
    }

    fn decode(&self, batch: &ColumnVectorBatch, row: usize) -> Result<OrcValue> {
        self.view.check(batch, row)?;
        if batch.is_null(row) {
            return Ok(self.options.null_value.clone());
        }
        let VectorData::List { offsets, elements } = &batch.data else {
            return Err(unknown_batch());
        };
        row_range(offsets, row)?
            .map(|idx| self.element.decode(elements, idx))
            .collect::<Result<Vec<_>>>()
            .map(OrcValue::List)
    }

    fn encode(&mut self, batch: &mut ColumnVectorBatch, row: usize, value: &OrcValue) -> Result<()> {
        if self.options.is_null(value) {
            batch.set_null(row);
            close_row(batch, row, None);
            return Ok(());
        }
        let items = match value {
            OrcValue::List(items) | OrcValue::Tuple(items) => items,
            other => {
                return Err(OrcError::type_error(format!(
                    "Invalid value {:?} for list",
                    other
                )))
            }
        };
        batch.ensure_rows(row + 1);
        let VectorData::List { offsets, elements } = &mut batch.data else {
            return Err(unknown_batch());
        };
        let base = offsets[row].max(0) as usize;
        for (pos, item) in items.iter().enumerate() {
            if let Err(err) = self.element.encode(elements, base + pos, item) {
                elements.truncate(base);
                return Err(err);
            }
        }
        batch.set_valid(row);
        close_row(batch, row, Some((base + items.len()) as i64));
        Ok(())
    }

    fn clear(&mut self) {
        self.element.clear();
    }
}

pub struct MapConverter {
    key: Box<dyn Converter>,
    value: Box<dyn Converter>,
    view: BatchView,
    options: Arc<ConverterOptions>,
}

impl MapConverter {
    pub fn new(ty: TypeRef<'_>, options: Arc<ConverterOptions>) -> Result<Self> {
        Ok(Self {
            key: create_converter(child_type(ty, 0)?, &options)?,
            value: create_converter(child_type(ty, 1)?, &options)?,
            view: BatchView::default(),
            options,
        })
    }
}

impl Converter for MapConverter {
    fn reset(&mut self, batch: &ColumnVectorBatch) -> Result<()> {
        let VectorData::Map { keys, elements, .. } = &batch.data else {
            return Err(unknown_batch());
        };
        self.view.bind(batch);
        self.key.reset(keys)?;
        self.value.reset(elements)
    }

    fn decode(&self, batch: &ColumnVectorBatch, row: usize) -> Result<OrcValue> {
        self.view.check(batch, row)?;
        if batch.is_null(row) {
            return Ok(self.options.null_value.clone());
        }
        let VectorData::Map {
            offsets,
            keys,
            elements,
        } = &batch.data
        else {
            return Err(unknown_batch());
        };
        row_range(offsets, row)?
            .map(|idx| Ok((self.key.decode(keys, idx)?, self.value.decode(elements, idx)?)))
            .collect::<Result<Vec<_>>>()
            .map(OrcValue::Map)
    }

    fn encode(&mut self, batch: &mut ColumnVectorBatch, row: usize, value: &OrcValue) -> Result<()> {
        if self.options.is_null(value) {
            batch.set_null(row);
            close_row(batch, row, None);
            return Ok(());
        }
        let entries: Vec<(OrcValue, &OrcValue)> = match value {
            OrcValue::Map(entries) => entries.iter().map(|(k, v)| (k.clone(), v)).collect(),
            OrcValue::Record(fields) => fields
                .iter()
                .map(|(k, v)| (OrcValue::String(Arc::clone(k)), v))
                .collect(),
            other => {
                return Err(OrcError::type_error(format!(
                    "Invalid value {:?} for map",
                    other
                )))
            }
        };
        batch.ensure_rows(row + 1);
        let VectorData::Map {
            offsets,
            keys,
            elements,
        } = &mut batch.data
        else {
            return Err(unknown_batch());
        };
        let base = offsets[row].max(0) as usize;
        for (pos, (key, item)) in entries.iter().enumerate() {
            let written = self
                .key
                .encode(keys, base + pos, key)
                .and_then(|_| self.value.encode(elements, base + pos, item));
            if let Err(err) = written {
                keys.truncate(base);
                elements.truncate(base);
                return Err(err);
            }
        }
        batch.set_valid(row);
        close_row(batch, row, Some((base + entries.len()) as i64));
        Ok(())
    }

    fn clear(&mut self) {
        self.key.clear();
        self.value.clear();
    }
}

/// STRUCT columns, as tuples or records depending on [`StructRepr`]
pub struct StructConverter {
    names: Vec<Arc<str>>,
    fields: Vec<Box<dyn Converter>>,
    view: BatchView,
    options: Arc<ConverterOptions>,
}

impl StructConverter {
    pub fn new(ty: TypeRef<'_>, options: Arc<ConverterOptions>) -> Result<Self> {
        let mut names = Vec::with_capacity(ty.children_count());
        let mut fields = Vec::with_capacity(ty.children_count());
        for (name, field) in ty.fields() {
            names.push(Arc::from(name));
            fields.push(create_converter(field, &options)?);
        }
        Ok(Self {
            names,
            fields,
            view: BatchView::default(),
            options,
        })
    }

    fn field_batches(batch: &ColumnVectorBatch) -> Result<&[ColumnVectorBatch]> {
        match &batch.data {
            VectorData::Struct { fields } => Ok(fields),
            _ => Err(unknown_batch()),
        }
    }

    fn field_batches_mut(batch: &mut ColumnVectorBatch) -> Result<&mut Vec<ColumnVectorBatch>> {
        match &mut batch.data {
            VectorData::Struct { fields } => Ok(fields),
            _ => Err(unknown_batch()),
        }
    }
}

impl Converter for StructConverter {
    fn reset(&mut self, batch: &ColumnVectorBatch) -> Result<()> {
        let batches = Self::field_batches(batch)?;
        if batches.len() != self.fields.len() {
            return Err(unknown_batch());
        }
        self.view.bind(batch);
        for (converter, field_batch) in self.fields.iter_mut().zip(batches) {
            converter.reset(field_batch)?;
        }
        Ok(())
    }

    fn decode(&self, batch: &ColumnVectorBatch, row: usize) -> Result<OrcValue> {
        self.view.check(batch, row)?;
        if batch.is_null(row) {
            return Ok(self.options.null_value.clone());
        }
        let batches = Self::field_batches(batch)?;
        let values = self
            .fields
            .iter()
            .zip(batches)
            .map(|(converter, field_batch)| converter.decode(field_batch, row));
        match self.options.struct_repr {
            StructRepr::Tuple => values.collect::<Result<Vec<_>>>().map(OrcValue::Tuple),
            StructRepr::Record => self
                .names
                .iter()
                .cloned()
                .zip(values)
                .map(|(name, value)| value.map(|v| (name, v)))
                .collect::<Result<IndexMap<_, _>>>()
                .map(OrcValue::Record),
        }
    }

    fn encode(&mut self, batch: &mut ColumnVectorBatch, row: usize, value: &OrcValue) -> Result<()> {
        let null = self.options.null_value.clone();
        if self.options.is_null(value) {
            let batches = Self::field_batches_mut(batch)?;
            for (converter, field_batch) in self.fields.iter_mut().zip(batches.iter_mut()) {
                converter.encode(field_batch, row, &null)?;
            }
            batch.set_null(row);
            return Ok(());
        }

        let values: Vec<&OrcValue> = match (self.options.struct_repr, value) {
            (StructRepr::Tuple, OrcValue::Tuple(items)) => {
                if items.len() != self.fields.len() {
                    return Err(OrcError::type_error(format!(
                        "Expected {} struct fields, got {}",
                        self.fields.len(),
                        items.len()
                    )));
                }
                items.iter().collect()
            }
            (StructRepr::Record, OrcValue::Record(entries)) => self
                .names
                .iter()
                .map(|name| {
                    entries
                        .get(name)
                        .ok_or_else(|| {
                            OrcError::type_error(format!("Missing struct field '{}'", name))
                        })
                })
                .collect::<Result<_>>()?,
            (repr, other) => {
                return Err(OrcError::type_error(format!(
                    "Invalid value {:?} for struct in {:?} representation",
                    other, repr
                )))
            }
        };

        let batches = Self::field_batches_mut(batch)?;
        for (pos, ((converter, field_batch), field_value)) in self
            .fields
            .iter_mut()
            .zip(batches.iter_mut())
            .zip(values)
            .enumerate()
        {
            let written = converter.encode(field_batch, row, field_value);
            if self.options.struct_repr == StructRepr::Record {
                written.with_context(|| format!("field '{}'", self.names[pos]))?;
            } else {
                written.with_context(|| format!("field {}", pos))?;
            }
        }
        batch.set_valid(row);
        Ok(())
    }

    fn clear(&mut self) {
        self.fields.iter_mut().for_each(|f| f.clear());
    }
}

/// UNION columns. A value is stored under the first variant that accepts it.
pub struct UnionConverter {
    variants: Vec<Box<dyn Converter>>,
    next_offsets: Vec<u64>,
    view: BatchView,
    options: Arc<ConverterOptions>,
}

impl UnionConverter {
    pub fn new(ty: TypeRef<'_>, options: Arc<ConverterOptions>) -> Result<Self> {
        let variants = ty
            .children()
            .map(|child| create_converter(child, &options))
            .collect::<Result<Vec<_>>>()?;
        if variants.len() > u8::MAX as usize + 1 {
            return Err(OrcError::type_error(format!(
                "Union with {} variants exceeds the tag range",
                variants.len()
            )));
        }
        Ok(Self {
            next_offsets: vec![0; variants.len()],
            variants,
            view: BatchView::default(),
            options,
        })
    }
}

impl Converter for UnionConverter {
    fn reset(&mut self, batch: &ColumnVectorBatch) -> Result<()> {
        let VectorData::Union { children, .. } = &batch.data else {
            return Err(unknown_batch());
        };
        if children.len() != self.variants.len() {
            return Err(unknown_batch());
        }
        self.view.bind(batch);
        for (converter, child) in self.variants.iter_mut().zip(children) {
            converter.reset(child)?;
        }
        Ok(())
    }

    fn decode(&self, batch: &ColumnVectorBatch, row: usize) -> Result<OrcValue> {
        self.view.check(batch, row)?;
        if batch.is_null(row) {
            return Ok(self.options.null_value.clone());
        }
        let VectorData::Union {
            tags,
            offsets,
            children,
        } = &batch.data
        else {
            return Err(unknown_batch());
        };
        let tag = tags[row] as usize;
        let converter = self
            .variants
            .get(tag)
            .ok_or_else(|| OrcError::internal(format!("Invalid union tag {}", tag)))?;
        converter.decode(&children[tag], offsets[row] as usize)
    }

    fn encode(&mut self, batch: &mut ColumnVectorBatch, row: usize, value: &OrcValue) -> Result<()> {
        if row == 0 {
            self.next_offsets.iter_mut().for_each(|o| *o = 0);
        }
        if self.options.is_null(value) {
            batch.set_null(row);
            return Ok(());
        }
        let VectorData::Union { children, .. } = &mut batch.data else {
            return Err(unknown_batch());
        };
        let mut last_err = None;
        let mut chosen = None;
        for (tag, (converter, child)) in self.variants.iter_mut().zip(children.iter_mut()).enumerate() {
            let offset = self.next_offsets[tag];
            match converter.encode(child, offset as usize, value) {
                Ok(()) => {
                    chosen = Some((tag, offset));
                    break;
                }
                Err(err) if err.is_conversion() => {
                    child.truncate(offset as usize);
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        let Some((tag, offset)) = chosen else {
            return Err(OrcError::type_error(format!(
                "No union variant accepts {:?}{}",
                value,
                last_err.map(|e| format!(" (last error: {})", e)).unwrap_or_default()
            )));
        };
        self.next_offsets[tag] = offset + 1;
        batch.set_valid(row);
        if let VectorData::Union { tags, offsets, .. } = &mut batch.data {
            tags[row] = tag as u8;
            offsets[row] = offset;
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.next_offsets.iter_mut().for_each(|o| *o = 0);
        self.variants.iter_mut().for_each(|v| v.clear());
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::roundtrip;
    use super::super::{create_converter, ConverterOptions, StructRepr};
    use crate::batch::{ColumnVectorBatch, VectorData};
    use crate::types::TypeDescription;
    use crate::{OrcError, OrcValue};
    use std::sync::Arc;

    fn ints(values: &[i64]) -> OrcValue {
        OrcValue::List(values.iter().map(|v| OrcValue::Integer(*v)).collect())
    }

    #[test]
    fn test_list_roundtrip() {
        let values = [ints(&[1, 2, 3]), OrcValue::Null, ints(&[]), ints(&[4])];
        assert_eq!(roundtrip("array<int>", Default::default(), &values), values.to_vec());
    }

    #[test]
    fn test_list_null_keeps_offsets_flat() {
        let ty: TypeDescription = "array<int>".parse().unwrap();
        let options = Arc::new(ConverterOptions::default());
        let mut converter = create_converter(ty.root(), &options).unwrap();
        let mut batch = ColumnVectorBatch::new(ty.root(), 3);
        converter.encode(&mut batch, 0, &ints(&[1, 2])).unwrap();
        converter.encode(&mut batch, 1, &OrcValue::Null).unwrap();
        converter.encode(&mut batch, 2, &ints(&[3])).unwrap();
        let VectorData::List { offsets, .. } = &batch.data else {
            panic!("expected list");
        };
        assert_eq!(offsets[..4], [0, 2, 2, 3]);
    }

    #[test]
    fn test_failed_list_element_rolls_back() {
        let ty: TypeDescription = "array<tinyint>".parse().unwrap();
        let options = Arc::new(ConverterOptions::default());
        let mut converter = create_converter(ty.root(), &options).unwrap();
        let mut batch = ColumnVectorBatch::new(ty.root(), 2);
        converter.encode(&mut batch, 0, &ints(&[1])).unwrap();
        assert!(converter.encode(&mut batch, 1, &ints(&[2, 300])).is_err());
        assert_eq!(batch.num_elements, 1);
        converter.encode(&mut batch, 1, &ints(&[5, 6])).unwrap();

        batch.mark_refilled();
        converter.reset(&batch).unwrap();
        assert_eq!(converter.decode(&batch, 1).unwrap(), ints(&[5, 6]));
    }

    #[test]
    fn test_map_roundtrip() {
        let entry = |k: &str, v: i64| (OrcValue::from(k), OrcValue::Integer(v));
        let values = [
            OrcValue::Map(vec![entry("a", 1), entry("b", 2)]),
            OrcValue::Null,
            OrcValue::Map(vec![]),
        ];
        assert_eq!(
            roundtrip("map<string,bigint>", Default::default(), &values),
            values.to_vec()
        );

        let from_record = roundtrip(
            "map<string,bigint>",
            Default::default(),
            &[OrcValue::record([("x", OrcValue::from(9))])],
        );
        assert_eq!(from_record, vec![OrcValue::Map(vec![entry("x", 9)])]);
    }

    #[test]
    fn test_struct_tuple_and_record() {
        let tuple = OrcValue::Tuple(vec![OrcValue::from(1), OrcValue::from("a")]);
        let values = [tuple.clone(), OrcValue::Null];
        assert_eq!(
            roundtrip("struct<x:int,y:string>", Default::default(), &values),
            values.to_vec()
        );

        let options = ConverterOptions {
            struct_repr: StructRepr::Record,
            ..Default::default()
        };
        let record = OrcValue::record([("x", OrcValue::from(1)), ("y", OrcValue::from("a"))]);
        assert_eq!(
            roundtrip("struct<x:int,y:string>", options, &[record.clone()]),
            vec![record]
        );
    }

    #[test]
    fn test_struct_errors_name_the_field() {
        let ty: TypeDescription = "struct<x:int,y:string>".parse().unwrap();
        let options = Arc::new(ConverterOptions {
            struct_repr: StructRepr::Record,
            ..Default::default()
        });
        let mut converter = create_converter(ty.root(), &options).unwrap();
        let mut batch = ColumnVectorBatch::new(ty.root(), 1);

        let bad = OrcValue::record([("x", OrcValue::from("nope")), ("y", OrcValue::from("a"))]);
        let err = converter.encode(&mut batch, 0, &bad).unwrap_err();
        assert!(matches!(err, OrcError::Type(_)));
        assert!(err.to_string().contains("field 'x'"));

        let missing = OrcValue::record([("x", OrcValue::from(1))]);
        let err = converter.encode(&mut batch, 0, &missing).unwrap_err();
        assert!(matches!(err, OrcError::Type(_)));
        assert!(err.to_string().contains("Missing struct field 'y'"));

        let tuple = OrcValue::Tuple(vec![OrcValue::from(1), OrcValue::from("a")]);
        assert!(matches!(
            converter.encode(&mut batch, 0, &tuple),
            Err(OrcError::Type(_))
        ));

        let options = Arc::new(ConverterOptions::default());
        let mut converter = create_converter(ty.root(), &options).unwrap();
        let short = OrcValue::Tuple(vec![OrcValue::from(1)]);
        let err = converter.encode(&mut batch, 0, &short).unwrap_err();
        assert!(matches!(err, OrcError::Type(_)));
        assert!(err.to_string().contains("Expected 2 struct fields, got 1"));
    }

    #[test]
    fn test_null_struct_nulls_children() {
        let ty: TypeDescription = "struct<x:int>".parse().unwrap();
        let options = Arc::new(ConverterOptions::default());
        let mut converter = create_converter(ty.root(), &options).unwrap();
        let mut batch = ColumnVectorBatch::new(ty.root(), 1);
        converter.encode(&mut batch, 0, &OrcValue::Null).unwrap();
        let VectorData::Struct { fields } = &batch.data else {
            panic!("expected struct");
        };
        assert!(batch.is_null(0));
        assert!(fields[0].is_null(0));
    }

    #[test]
    fn test_union_picks_first_accepting_variant() {
        let values = [
            OrcValue::from(7),
            OrcValue::from("seven"),
            OrcValue::Null,
            OrcValue::from(8),
        ];
        let ty: TypeDescription = "uniontype<int,string>".parse().unwrap();
        let options = Arc::new(ConverterOptions::default());
        let mut converter = create_converter(ty.root(), &options).unwrap();
        let mut batch = ColumnVectorBatch::new(ty.root(), values.len());
        for (row, value) in values.iter().enumerate() {
            converter.encode(&mut batch, row, value).unwrap();
        }
        let VectorData::Union { tags, offsets, .. } = &batch.data else {
            panic!("expected union");
        };
        assert_eq!(tags[..4], [0, 1, 0, 0]);
        assert_eq!(offsets[..4], [0, 0, 0, 1]);

        batch.mark_refilled();
        converter.reset(&batch).unwrap();
        let decoded: Vec<_> = (0..4).map(|r| converter.decode(&batch, r).unwrap()).collect();
        assert_eq!(decoded, values.to_vec());
    }

    #[test]
    fn test_union_rejects_unmatched_value() {
        let ty: TypeDescription = "uniontype<int,date>".parse().unwrap();
        let options = Arc::new(ConverterOptions::default());
        let mut converter = create_converter(ty.root(), &options).unwrap();
        let mut batch = ColumnVectorBatch::new(ty.root(), 1);
        let err = converter.encode(&mut batch, 0, &OrcValue::from("x")).unwrap_err();
        assert!(matches!(err, OrcError::Type(_)));
        assert_eq!(batch.num_elements, 0);
    }

    #[test]
    fn test_union_offsets_restart_after_clear() {
        let ty: TypeDescription = "uniontype<int,string>".parse().unwrap();
        let options = Arc::new(ConverterOptions::default());
        let mut converter = create_converter(ty.root(), &options).unwrap();
        let mut batch = ColumnVectorBatch::new(ty.root(), 2);
        converter.encode(&mut batch, 0, &OrcValue::from(1)).unwrap();
        converter.encode(&mut batch, 1, &OrcValue::from(2)).unwrap();

        batch.clear();
        converter.clear();
        converter.encode(&mut batch, 0, &OrcValue::from("a")).unwrap();
        converter.encode(&mut batch, 1, &OrcValue::from(3)).unwrap();
        let VectorData::Union { offsets, .. } = &batch.data else {
            panic!("expected union");
        };
        assert_eq!(offsets[..2], [0, 0]);
    }
}
