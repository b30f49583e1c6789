//! Core ORC writing functionality

use crate::batch::ColumnVectorBatch;
use crate::converter::{create_converter, Converter, ConverterOptions, ConverterTable, StructRepr};
use crate::engine::sarg::ColumnRef;
use crate::engine::{
    CompressionKind, CompressionStrategy, FileFormat, FileWriter, NativeFileWriter, OrcFileWriter,
    WriterOptions,
};
use crate::types::TypeDescription;
use crate::{OrcError, OrcValue, Result};
use bytes::Bytes;
use jiff::tz::TimeZone;
use std::borrow::Borrow;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_BATCH_SIZE: usize = 1024;

/// Builder for creating a configured [`Writer`]
pub struct WriterBuilder {
    batch_size: usize,
    format: FileFormat,
    options: WriterOptions,
    bloom_filter_columns: Vec<ColumnRef>,
    converter_options: ConverterOptions,
}

impl Default for WriterBuilder {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            format: FileFormat::default(),
            options: WriterOptions::default(),
            bloom_filter_columns: Vec::new(),
            converter_options: ConverterOptions::default(),
        }
    }
}

impl WriterBuilder {
    /// Create a new WriterBuilder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows buffered before a batch is handed to the storage engine
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// On-disk layout; [`FileFormat::Orc`] takes struct schemas of primitive
    /// columns only and rejects bloom filters and user metadata
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    /// Buffered bytes after which a stripe is flushed
    pub fn with_stripe_size(mut self, stripe_size: u64) -> Self {
        self.options.stripe_size = stripe_size;
        self
    }

    pub fn with_row_index_stride(mut self, stride: u64) -> Self {
        self.options.row_index_stride = stride;
        self
    }

    pub fn with_compression(mut self, compression: CompressionKind) -> Self {
        self.options.compression = compression;
        self
    }

    pub fn with_compression_strategy(mut self, strategy: CompressionStrategy) -> Self {
        self.options.compression_strategy = strategy;
        self
    }

    pub fn with_compression_block_size(mut self, block_size: u64) -> Self {
        self.options.compression_block_size = block_size;
        self
    }

    /// Columns to build bloom filters for, by column id or dotted name
    pub fn with_bloom_filter_columns(mut self, columns: Vec<ColumnRef>) -> Self {
        self.bloom_filter_columns = columns;
        self
    }

    /// False positive probability of the bloom filters; must be in (0, 1)
    pub fn with_bloom_filter_fpp(mut self, fpp: f64) -> Self {
        self.options.bloom_filter_fpp = fpp;
        self
    }

    pub fn with_padding_tolerance(mut self, tolerance: f64) -> Self {
        self.options.padding_tolerance = tolerance;
        self
    }

    pub fn with_dictionary_key_size_threshold(mut self, threshold: f64) -> Self {
        self.options.dictionary_key_size_threshold = threshold;
        self
    }

    /// Zone recorded as the writer timezone of each stripe
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

    /// Value that marks a row as null
    pub fn with_null_value(mut self, null_value: OrcValue) -> Self {
        self.converter_options.null_value = null_value;
        self
    }

    /// Build a Writer with the configured settings
    pub fn build<W: Write>(self, sink: W, schema: TypeDescription) -> Result<Writer<W>> {
        if self.batch_size == 0 {
            return Err(OrcError::value("Batch size must be positive"));
        }
        let mut options = self.options;
        for column in &self.bloom_filter_columns {
            let id = match column {
                ColumnRef::Id(id) => *id,
                ColumnRef::Name(name) => schema.find_column_id(name)?,
            };
            options.bloom_filter_columns.insert(id);
        }
        options.timezone = timezone_name(&self.converter_options.timezone);

        let converter_options = Arc::new(self.converter_options);
        let converter = create_converter(schema.root(), &converter_options)?;
        debug!(
            batch_size = self.batch_size,
            format = ?self.format,
            bloom_filter_columns = ?options.bloom_filter_columns,
            "Created writer"
        );
        let inner = match self.format {
            FileFormat::Native => Engine::Native(NativeFileWriter::new(sink, schema, options)?),
            FileFormat::Orc => Engine::Orc(OrcFileWriter::new(sink, schema, &options)?),
        };
        let batch = inner.get().create_row_batch(self.batch_size);
        Ok(Writer {
            inner,
            converter,
            batch,
            batch_size: self.batch_size,
            batch_item: 0,
            current_row: 0,
        })
    }
}

fn timezone_name(timezone: &TimeZone) -> String {
    match timezone.iana_name() {
        Some(name) => name.to_string(),
        None => match timezone.to_fixed_offset() {
            Ok(offset) => offset.to_string(),
            Err(_) => format!("{:?}", timezone),
        },
    }
}

enum Engine<W: Write> {
    Native(NativeFileWriter<W>),
    Orc(OrcFileWriter<W>),
}

impl<W: Write> Engine<W> {
    fn get(&self) -> &dyn FileWriter {
        match self {
            Engine::Native(writer) => writer,
            Engine::Orc(writer) => writer,
        }
    }

    fn get_mut(&mut self) -> &mut dyn FileWriter {
        match self {
            Engine::Native(writer) => writer,
            Engine::Orc(writer) => writer,
        }
    }
}

/// Row-wise ORC writer over any [`Write`] sink
///
/// Rows are converted into a columnar batch that is handed to the storage
/// engine whenever it fills up. Dropping an open writer closes it.
pub struct Writer<W: Write> {
    inner: Engine<W>,
    converter: Box<dyn Converter>,
    batch: ColumnVectorBatch,
    batch_size: usize,
    batch_item: usize,
    current_row: u64,
}

impl<W: Write> Writer<W> {
    /// Create a new writer with default settings
    pub fn new(sink: W, schema: TypeDescription) -> Result<Self> {
        WriterBuilder::new().build(sink, schema)
    }

    pub fn builder() -> WriterBuilder {
        WriterBuilder::new()
    }

    pub fn schema(&self) -> &TypeDescription {
        self.inner.get().schema()
    }

    /// Number of rows written so far
    pub fn current_row(&self) -> u64 {
        self.current_row
    }

    /// Write one row. A row that fails to convert is not written.
    pub fn write(&mut self, row: &OrcValue) -> Result<()> {
        if self.inner.get().is_closed() {
            return Err(OrcError::Closed);
        }
        self.converter
            .encode(&mut self.batch, self.batch_item, row)?;
        self.batch_item += 1;
        self.current_row += 1;
        if self.batch_item == self.batch_size {
            self.flush_batch()?;
        }
        Ok(())
    }

    /// Write every row of `rows` and return how many were written
    pub fn writerows<I>(&mut self, rows: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Borrow<OrcValue>,
    {
        let mut count = 0;
        for row in rows {
            self.write(row.borrow())?;
            count += 1;
        }
        Ok(count)
    }

    pub fn add_user_metadata(&mut self, key: &str, value: Bytes) -> Result<()> {
        self.inner.get_mut().add_user_metadata(key, value)
    }

    fn flush_batch(&mut self) -> Result<()> {
        if self.batch_item > 0 {
            self.inner.get_mut().add(&self.batch)?;
        }
        self.converter.clear();
        self.batch.clear();
        self.batch_item = 0;
        Ok(())
    }

    /// Flush buffered rows and finish the file. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.inner.get().is_closed() {
            return Ok(());
        }
        self.flush_batch()?;
        self.inner.get_mut().close()
    }
}

impl<W: Write> Drop for Writer<W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close writer on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FileReader, NativeFileReader};

    #[test]
    fn test_write_and_close() {
        let mut buffer = Vec::new();
        {
            let mut writer = Writer::<Vec<u8>>::builder()
                .with_batch_size(2)
                .build(&mut buffer, "int".parse().unwrap())
                .unwrap();
            let written = writer
                .writerows([OrcValue::from(1), OrcValue::from(2), OrcValue::Null])
                .unwrap();
            assert_eq!(written, 3);
            assert_eq!(writer.current_row(), 3);
            writer
                .add_user_metadata("k", Bytes::from_static(b"v"))
                .unwrap();
            writer.close().unwrap();
            writer.close().unwrap();
            assert!(matches!(writer.write(&OrcValue::from(4)), Err(OrcError::Closed)));
        }
        let file = NativeFileReader::open(Bytes::from(buffer)).unwrap();
        assert_eq!(file.number_of_rows(), 3);
        assert_eq!(file.user_metadata()["k"], Bytes::from_static(b"v"));
        assert!(file.column_statistics(0).unwrap().has_null);
    }

    #[test]
    fn test_failed_row_is_not_counted() {
        let mut buffer = Vec::new();
        {
            let mut writer = Writer::new(&mut buffer, "struct<a:int,b:string>".parse().unwrap())
                .unwrap();
            writer
                .write(&OrcValue::Tuple(vec![OrcValue::from(1), OrcValue::from("x")]))
                .unwrap();
            let err = writer
                .write(&OrcValue::Tuple(vec![OrcValue::from(2), OrcValue::from(3)]))
                .unwrap_err();
            assert!(matches!(err, OrcError::Type(_)));
            assert_eq!(writer.current_row(), 1);
        }
        let file = NativeFileReader::open(Bytes::from(buffer)).unwrap();
        assert_eq!(file.number_of_rows(), 1);
    }

    #[test]
    fn test_drop_closes_the_file() {
        let mut buffer = Vec::new();
        {
            let mut writer = Writer::new(&mut buffer, "string".parse().unwrap()).unwrap();
            writer.write(&OrcValue::from("only")).unwrap();
        }
        let file = NativeFileReader::open(Bytes::from(buffer)).unwrap();
        assert_eq!(file.number_of_rows(), 1);
    }

    #[test]
    fn test_bloom_filter_columns_by_name() {
        let schema: TypeDescription = "struct<a:int,b:struct<c:string>>".parse().unwrap();
        let mut buffer = Vec::new();
        {
            let mut writer = Writer::<Vec<u8>>::builder()
                .with_bloom_filter_columns(vec![ColumnRef::Name("b.c".into()), ColumnRef::Id(1)])
                .build(&mut buffer, schema.clone())
                .unwrap();
            writer
                .write(&OrcValue::Tuple(vec![
                    OrcValue::from(7),
                    OrcValue::Tuple(vec![OrcValue::from("seven")]),
                ]))
                .unwrap();
        }
        let file = NativeFileReader::open(Bytes::from(buffer)).unwrap();
        let filters = file
            .bloom_filters(0, &(0..=3).collect())
            .unwrap();
        assert_eq!(filters.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert!(filters[&3].test_bytes(b"seven"));

        let result = Writer::<Vec<u8>>::builder()
            .with_bloom_filter_columns(vec![ColumnRef::Name("missing".into())])
            .build(Vec::new(), schema);
        assert!(matches!(result, Err(OrcError::Index(_))));
    }

    #[test]
    fn test_timezone_name() {
        assert_eq!(timezone_name(&TimeZone::UTC), "UTC");
        let fixed = TimeZone::fixed(jiff::tz::offset(-5));
        assert!(timezone_name(&fixed).starts_with("-05"));
    }
}
