//! Core ORC reading functionality
//!
//! [`Reader`] serves the rows of a file one [`OrcValue`] at a time while the
//! storage engine refills a columnar batch underneath. [`Stripe`] does the same
//! for a single stripe and [`Column`] for a single column id.

mod column;
mod cursor;
mod stripe;

pub use column::{select_batch, Column, Statistics};
pub use cursor::RowCursor;
pub use stripe::Stripe;

use crate::converter::{ConverterOptions, ConverterTable, StructRepr};
use crate::engine::{
    open_file, ChunkReader, ColumnSelection, CompressionKind, FileReader, RowReaderOptions,
    StripeInformation, WriterId, WriterVersion,
};
use crate::predicate::{compile, Predicate};
use crate::types::TypeDescription;
use crate::{OrcError, OrcValue, Result};
use bytes::Bytes;
use jiff::tz::TimeZone;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Reference point of a seek
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Whence {
    #[default]
    Start = 0,
    Current = 1,
    End = 2,
}

impl TryFrom<i64> for Whence {
    type Error = OrcError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            other => Err(OrcError::value(format!("Invalid whence: {}", other))),
        }
    }
}

/// State shared by a reader and the stripe and column views created from it
pub(crate) struct StreamContext {
    pub(crate) file: Rc<dyn FileReader>,
    pub(crate) converter_options: Arc<ConverterOptions>,
    pub(crate) batch_size: usize,
    pub(crate) row_options: RowReaderOptions,
}

impl StreamContext {
    /// Cursor over the whole file, or over `stripe` only
    pub(crate) fn cursor(
        &self,
        stripe: Option<&StripeInformation>,
        column_id: Option<u64>,
    ) -> Result<RowCursor> {
        let (options, first_row, len) = match stripe {
            Some(info) => (
                self.row_options.clone().with_range(info.offset, info.length),
                info.first_row,
                info.num_rows,
            ),
            None => (self.row_options.clone(), 0, self.file.number_of_rows()),
        };
        let row_reader = Rc::clone(&self.file).create_row_reader(options)?;
        RowCursor::new(
            row_reader,
            column_id,
            &self.converter_options,
            self.batch_size,
            first_row,
            len,
        )
    }
}

/// Builder for [`Reader`]
///
/// Defaults: batches of 1024 rows, every column, UTC, tuple structs,
/// the default converters, no predicate and `OrcValue::Null` for nulls.
pub struct ReaderBuilder {
    batch_size: usize,
    column_indices: Option<Vec<usize>>,
    column_names: Option<Vec<String>>,
    converter_options: ConverterOptions,
    predicate: Option<Predicate>,
}

impl Default for ReaderBuilder {
    fn default() -> Self {
        Self {
            batch_size: 1024,
            column_indices: None,
            column_names: None,
            converter_options: ConverterOptions::default(),
            predicate: None,
        }
    }
}

impl ReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows per batch fetched from the storage engine
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Read only these top-level fields, by position
    pub fn with_column_indices(mut self, indices: Vec<usize>) -> Self {
        self.column_indices = Some(indices);
        self
    }

    /// Read only these top-level fields, by name
    pub fn with_column_names<S: Into<String>>(mut self, names: Vec<S>) -> Self {
        self.column_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Zone timestamps are presented in
    pub fn with_timezone(mut self, timezone: TimeZone) -> Self {
        self.converter_options.timezone = timezone;
        self
    }

    pub fn with_struct_repr(mut self, struct_repr: StructRepr) -> Self {
        self.converter_options.struct_repr = struct_repr;
        self
    }

    pub fn with_converters(mut self, converters: ConverterTable) -> Self {
        self.converter_options.converters = converters;
        self
    }

    /// Skip row groups whose statistics rule the predicate out
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Value returned for null rows
    pub fn with_null_value(mut self, null_value: OrcValue) -> Self {
        self.converter_options.null_value = null_value;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(OrcError::value("Batch size must be positive"));
        }
        if self.column_indices.is_some() && self.column_names.is_some() {
            return Err(OrcError::value(
                "Either column indices or column names can be set, not both",
            ));
        }
        Ok(())
    }

    /// Open `source`, an Apache ORC file or a native container
    pub fn build<R: ChunkReader + 'static>(self, source: R) -> Result<Reader> {
        self.validate()?;
        let file = open_file(source)?;
        self.build_with(file)
    }

    /// Read through an already opened storage engine
    pub fn build_with(self, file: Rc<dyn FileReader>) -> Result<Reader> {
        self.validate()?;
        let columns = match (self.column_indices, self.column_names) {
            (Some(indices), _) => ColumnSelection::Indices(indices),
            (_, Some(names)) => ColumnSelection::Names(names),
            _ => ColumnSelection::All,
        };
        let search_argument = self
            .predicate
            .as_ref()
            .map(|p| compile(p, file.schema(), &self.converter_options))
            .transpose()?;
        let row_options = RowReaderOptions {
            columns,
            range: None,
            search_argument,
        };

        let context = Rc::new(StreamContext {
            file,
            converter_options: Arc::new(self.converter_options),
            batch_size: self.batch_size,
            row_options,
        });
        let cursor = context.cursor(None, None)?;
        debug!(
            rows = context.file.number_of_rows(),
            stripes = context.file.number_of_stripes(),
            batch_size = context.batch_size,
            selected = %cursor.selected_type(),
            "Opened ORC reader"
        );
        Ok(Reader { context, cursor })
    }
}

/// Row-wise reader over an ORC file
///
/// Iterating yields one value per row: a tuple or record for struct schemas.
pub struct Reader {
    context: Rc<StreamContext>,
    cursor: RowCursor,
}

impl Reader {
    /// Open `source` with the default settings
    pub fn open<R: ChunkReader + 'static>(source: R) -> Result<Self> {
        ReaderBuilder::new().build(source)
    }

    pub fn builder() -> ReaderBuilder {
        ReaderBuilder::new()
    }

    /// Number of rows in the file
    pub fn len(&self) -> u64 {
        self.context.file.number_of_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_of_stripes(&self) -> usize {
        self.context.file.number_of_stripes()
    }

    /// Schema of the file
    pub fn schema(&self) -> &TypeDescription {
        self.context.file.schema()
    }

    /// Schema of the values this reader returns
    pub fn selected_schema(&self) -> &TypeDescription {
        self.cursor.selected_type()
    }

    pub fn user_metadata(&self) -> &BTreeMap<String, Bytes> {
        self.context.file.user_metadata()
    }

    pub fn compression(&self) -> CompressionKind {
        self.context.file.compression()
    }

    pub fn compression_block_size(&self) -> u64 {
        self.context.file.compression_block_size()
    }

    pub fn row_index_stride(&self) -> u64 {
        self.context.file.row_index_stride()
    }

    /// Implementation that wrote the file; see [`WriterId::name`]
    pub fn writer_id(&self) -> WriterId {
        self.context.file.writer_id()
    }

    pub fn writer_version(&self) -> WriterVersion {
        self.context.file.writer_version()
    }

    pub fn current_row(&self) -> u64 {
        self.cursor.current_row()
    }

    pub fn seek(&mut self, row: i64, whence: Whence) -> Result<u64> {
        self.cursor.seek(row, whence)
    }

    /// Up to `num` rows, or every remaining row for `None`
    pub fn read(&mut self, num: Option<usize>) -> Result<Vec<OrcValue>> {
        self.cursor.read(num)
    }

    /// Out-of-range indices are Value errors
    pub fn read_stripe(&self, index: usize) -> Result<Stripe> {
        Stripe::new(Rc::clone(&self.context), index)
    }

    pub fn iter_stripes(&self) -> impl Iterator<Item = Result<Stripe>> + '_ {
        (0..self.num_of_stripes()).map(move |index| self.read_stripe(index))
    }

    /// View of one column with the file-level statistics
    pub fn column(&self, column_id: u64) -> Result<Column> {
        let cursor = self.context.cursor(None, Some(column_id))?;
        let statistics = self.context.file.column_statistics(column_id)?;
        Column::new(
            column_id,
            cursor,
            statistics,
            None,
            Arc::clone(&self.context.converter_options),
        )
    }
}

impl Iterator for Reader {
    type Item = Result<OrcValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Writer;

    fn sample_file(rows: i64) -> Bytes {
        let mut buffer = Vec::new();
        {
            let mut writer = Writer::<Vec<u8>>::builder()
                .with_row_index_stride(4)
                .build(&mut buffer, "struct<id:bigint,tag:string>".parse().unwrap())
                .unwrap();
            for i in 0..rows {
                writer
                    .write(&OrcValue::Tuple(vec![
                        OrcValue::from(i),
                        OrcValue::from(format!("t{}", i % 3)),
                    ]))
                    .unwrap();
            }
            writer.close().unwrap();
        }
        Bytes::from(buffer)
    }

    #[test]
    fn test_whence_from_integer() {
        assert_eq!(Whence::try_from(2).unwrap(), Whence::End);
        assert!(matches!(Whence::try_from(3), Err(OrcError::Value(_))));
    }

    #[test]
    fn test_builder_validation() {
        let result = Reader::builder()
            .with_column_indices(vec![0])
            .with_column_names(vec!["id"])
            .build(sample_file(1));
        assert!(matches!(result, Err(OrcError::Value(_))));
        let result = Reader::builder().with_batch_size(0).build(sample_file(1));
        assert!(matches!(result, Err(OrcError::Value(_))));
    }

    #[test]
    fn test_reader_accessors() {
        let reader = Reader::builder()
            .with_column_names(vec!["tag"])
            .build(sample_file(10))
            .unwrap();
        assert_eq!(reader.len(), 10);
        assert_eq!(reader.num_of_stripes(), 1);
        assert_eq!(reader.row_index_stride(), 4);
        assert_eq!(reader.compression(), CompressionKind::Zlib);
        assert_eq!(reader.schema().to_string(), "struct<id:bigint,tag:string>");
        assert_eq!(reader.selected_schema().to_string(), "struct<tag:string>");
        let rows = reader.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(rows[4], OrcValue::Tuple(vec![OrcValue::from("t1")]));
    }

    #[test]
    fn test_column_view() {
        let reader = Reader::open(sample_file(10)).unwrap();
        let mut column = reader.column(2).unwrap();
        let stats = column.statistics().unwrap();
        assert_eq!(stats.number_of_values, 10);
        assert_eq!(stats.minimum, Some(OrcValue::from("t0")));
        assert_eq!(stats.maximum, Some(OrcValue::from("t2")));

        column.seek(5, Whence::Start).unwrap();
        assert!(column.contains(&OrcValue::from("t0")).unwrap());
        assert!(!column.contains(&OrcValue::from("t9")).unwrap());
        assert_eq!(column.current_row(), 5);
        assert_eq!(column.next().unwrap().unwrap(), OrcValue::from("t2"));

        assert!(matches!(reader.column(3), Err(OrcError::Index(_))));
    }

    #[test]
    fn test_stripe_views() {
        let reader = Reader::open(sample_file(6)).unwrap();
        let mut stripe = reader.read_stripe(0).unwrap();
        assert_eq!(stripe.len(), 6);
        assert_eq!(stripe.writer_timezone(), "UTC");
        assert_eq!(stripe.seek(-2, Whence::End).unwrap(), 4);
        assert_eq!(stripe.read(None).unwrap().len(), 2);
        assert!(stripe.bloom_filter_columns().unwrap().is_empty());
        assert!(matches!(reader.read_stripe(1), Err(OrcError::Value(_))));
        assert_eq!(reader.iter_stripes().count(), 1);
    }

    #[test]
    fn test_native_writer_identity() {
        let reader = Reader::open(sample_file(2)).unwrap();
        assert_eq!(reader.writer_id(), WriterId::Unknown(None));
        assert_eq!(reader.writer_id().name(), "UNKNOWN_WRITER");
        assert_eq!(reader.writer_version(), WriterVersion::Orc14);
        assert_eq!(reader.writer_version() as i32, 9);
    }
}
