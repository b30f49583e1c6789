//! Writer of the native container

use super::bloom_filter::{BloomFilter, BloomFilterIndex};
use super::stats::{collect_statistics, visit_columns, ColumnStatistics};
use super::{
    CompressionKind, CompressionStrategy, FileWriter, Footer, StripeIndex, StripeInformation,
    WriterVersion, NATIVE_MAGIC as MAGIC,
};
use crate::batch::ColumnVectorBatch;
use crate::types::{TypeDescription, TypeRef};
use crate::{OrcError, Result};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::ops::Range;
use tracing::debug;

/// Layout and tuning settings of a new file
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Buffered stripe size in bytes before a stripe is flushed
    pub stripe_size: u64,
    /// Rows per row group; 0 puts each stripe in a single group
    pub row_index_stride: u64,
    pub compression: CompressionKind,
    pub compression_strategy: CompressionStrategy,
    pub compression_block_size: u64,
    pub bloom_filter_columns: BTreeSet<u64>,
    pub bloom_filter_fpp: f64,
    pub padding_tolerance: f64,
    pub dictionary_key_size_threshold: f64,
    pub timezone: String,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            stripe_size: 64 * 1024 * 1024,
            row_index_stride: 10000,
            compression: CompressionKind::Zlib,
            compression_strategy: CompressionStrategy::Speed,
            compression_block_size: 64 * 1024,
            bloom_filter_columns: BTreeSet::new(),
            bloom_filter_fpp: 0.05,
            padding_tolerance: 0.0,
            dictionary_key_size_threshold: 0.0,
            timezone: "UTC".to_string(),
        }
    }
}

/// Writes batches into stripes of the native container
pub struct NativeFileWriter<W: Write> {
    sink: W,
    schema: TypeDescription,
    options: WriterOptions,
    position: u64,
    stripe_batch: ColumnVectorBatch,
    stripes: Vec<StripeInformation>,
    stripe_statistics: Vec<Vec<ColumnStatistics>>,
    number_of_rows: u64,
    user_metadata: BTreeMap<String, Bytes>,
    closed: bool,
}

impl<W: Write> NativeFileWriter<W> {
    pub fn new(mut sink: W, schema: TypeDescription, options: WriterOptions) -> Result<Self> {
        if !(options.bloom_filter_fpp > 0.0 && options.bloom_filter_fpp < 1.0) {
            return Err(OrcError::value(format!(
                "Bloom filter false positive probability must be between 0 and 1, got {}",
                options.bloom_filter_fpp
            )));
        }
        for id in &options.bloom_filter_columns {
            schema.find_type(*id)?;
        }
        sink.write_all(MAGIC)?;
        let stripe_batch = ColumnVectorBatch::new(schema.root(), 0);
        debug!(schema = %schema, "Opened native writer");
        Ok(Self {
            sink,
            schema,
            options,
            position: MAGIC.len() as u64,
            stripe_batch,
            stripes: Vec::new(),
            stripe_statistics: Vec::new(),
            number_of_rows: 0,
            user_metadata: BTreeMap::new(),
            closed: false,
        })
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Rows handed to [`FileWriter::add`] so far, flushed or not
    pub fn number_of_rows(&self) -> u64 {
        self.number_of_rows + self.stripe_batch.num_elements as u64
    }

    fn flush_stripe(&mut self) -> Result<()> {
        let rows = self.stripe_batch.num_elements;
        if rows == 0 {
            return Ok(());
        }
        let data = self.stripe_batch.slice(0, rows);
        let root = self.schema.root();
        let stride = match self.options.row_index_stride as usize {
            0 => rows,
            n => n,
        };

        let mut index = StripeIndex::default();
        let mut stripe_stats: Vec<ColumnStatistics> =
            vec![ColumnStatistics::default(); self.schema.max_column_id() as usize + 1];
        for start in (0..rows).step_by(stride) {
            let group = start..(start + stride).min(rows);
            let group_stats = collect_statistics(root, &data, group.clone());
            for (total, stats) in stripe_stats.iter_mut().zip(&group_stats) {
                total.merge(stats);
            }
            index.row_groups.push(group_stats);

            for &column_id in &self.options.bloom_filter_columns {
                let filter = self.bloom_filter_for(root, &data, group.clone(), column_id, stride);
                index
                    .bloom_filters
                    .entry(column_id)
                    .or_insert_with(BloomFilterIndex::default)
                    .entries
                    .push(filter);
            }
        }

        let index_bytes = bincode::serialize(&index)?;
        let data_bytes = bincode::serialize(&data)?;
        self.sink.write_all(&index_bytes)?;
        self.sink.write_all(&data_bytes)?;

        let info = StripeInformation {
            offset: self.position,
            length: (index_bytes.len() + data_bytes.len()) as u64,
            index_length: index_bytes.len() as u64,
            data_length: data_bytes.len() as u64,
            num_rows: rows as u64,
            first_row: self.number_of_rows,
            writer_timezone: self.options.timezone.clone(),
        };
        debug!(
            stripe = self.stripes.len(),
            rows,
            offset = info.offset,
            length = info.length,
            row_groups = index.row_groups.len(),
            "Flushed stripe"
        );
        self.position += info.length;
        self.number_of_rows += rows as u64;
        self.stripes.push(info);
        self.stripe_statistics.push(stripe_stats);
        self.stripe_batch.clear();
        Ok(())
    }

    fn bloom_filter_for(
        &self,
        root: TypeRef<'_>,
        data: &ColumnVectorBatch,
        rows: Range<usize>,
        column_id: u64,
        expected_entries: usize,
    ) -> BloomFilter {
        let mut filter = BloomFilter::new(expected_entries as u64, self.options.bloom_filter_fpp);
        visit_columns(root, data, rows, &mut |node, batch, node_rows| {
            if node.column_id() == column_id {
                filter.add_rows(batch, node_rows);
            }
        });
        filter
    }
}

impl<W: Write> FileWriter for NativeFileWriter<W> {
    fn schema(&self) -> &TypeDescription {
        &self.schema
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn create_row_batch(&self, capacity: usize) -> ColumnVectorBatch {
        ColumnVectorBatch::new(self.schema.root(), capacity)
    }

    fn add(&mut self, batch: &ColumnVectorBatch) -> Result<()> {
        if self.closed {
            return Err(OrcError::Closed);
        }
        self.stripe_batch.append(batch)?;
        if self.stripe_batch.estimated_size() as u64 >= self.options.stripe_size {
            self.flush_stripe()?;
        }
        Ok(())
    }

    fn add_user_metadata(&mut self, key: &str, value: Bytes) -> Result<()> {
        if self.closed {
            return Err(OrcError::Closed);
        }
        self.user_metadata.insert(key.to_string(), value);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush_stripe()?;

        let mut statistics =
            vec![ColumnStatistics::default(); self.schema.max_column_id() as usize + 1];
        for stripe in &self.stripe_statistics {
            for (total, stats) in statistics.iter_mut().zip(stripe) {
                total.merge(stats);
            }
        }
        let footer = Footer {
            schema: self.schema.clone(),
            stripes: self.stripes.clone(),
            stripe_statistics: self.stripe_statistics.clone(),
            statistics,
            number_of_rows: self.number_of_rows,
            row_index_stride: self.options.row_index_stride,
            user_metadata: std::mem::take(&mut self.user_metadata),
            compression: self.options.compression,
            compression_strategy: self.options.compression_strategy,
            compression_block_size: self.options.compression_block_size,
            padding_tolerance: self.options.padding_tolerance,
            dictionary_key_size_threshold: self.options.dictionary_key_size_threshold,
            writer_timezone: self.options.timezone.clone(),
            writer_version: WriterVersion::Orc14,
        };
        let footer_bytes = bincode::serialize(&footer)?;
        self.sink.write_all(&footer_bytes)?;
        self.sink.write_all(&(footer_bytes.len() as u64).to_le_bytes())?;
        self.sink.write_all(MAGIC)?;
        self.sink.flush()?;
        self.closed = true;
        debug!(
            rows = self.number_of_rows,
            stripes = self.stripes.len(),
            "Closed native writer"
        );
        Ok(())
    }
}
