//! Apache ORC reader on top of `orc-rust`
//!
//! Decoding is left to `orc-rust`'s Arrow reader; its record batches are
//! imported into [`ColumnVectorBatch`]es. Search arguments are evaluated
//! against stripe statistics only, since `orc-rust` exposes neither row
//! indexes nor bloom filters. Seeking backwards restarts the decode stream.

use super::chunk::ChunkReader;
use super::stats::{ColumnStatistics, StatisticsData};
use super::tail::{read_tail, FileTail};
use super::{
    project, resolve_selection, BloomFilterIndex, CompressionKind, FileReader, RowReader,
    RowReaderOptions, StripeInformation, WriterId, WriterVersion,
};
use crate::arrow_conversion::{record_batch_to_batch, schema_from_arrow};
use crate::batch::ColumnVectorBatch;
use crate::decimal::Decimal;
use crate::types::{TypeDescription, TypeRef};
use crate::{OrcError, Result};
use arrow_array::RecordBatchReader;
use bytes::Bytes;
use orc_rust::arrow_reader::{ArrowReader, ArrowReaderBuilder};
use orc_rust::statistics::{ColumnStatistics as OrcStatistics, TypeStatistics};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::rc::Rc;
use tracing::{debug, trace};

/// Rows decoded per `orc-rust` batch
const DECODE_BATCH_SIZE: usize = 8192;

fn codec_error(e: impl Display) -> OrcError {
    OrcError::parse(format!("ORC decode failed: {}", e))
}

pub struct OrcFileReader {
    data: Bytes,
    schema: TypeDescription,
    number_of_rows: u64,
    stripes: Vec<StripeInformation>,
    /// `None` where the file carries no usable statistics
    statistics: Vec<Option<ColumnStatistics>>,
    stripe_statistics: Vec<Vec<Option<ColumnStatistics>>>,
    user_metadata: BTreeMap<String, Bytes>,
    tail: FileTail,
}

impl OrcFileReader {
    pub fn open<R: ChunkReader + ?Sized>(source: &R) -> Result<Self> {
        let data = source.get_bytes(0, source.len() as usize)?;
        let tail = read_tail(&data)?;
        let builder = ArrowReaderBuilder::try_new(data.clone()).map_err(codec_error)?;

        let metadata = builder.file_metadata();
        let number_of_rows = metadata.number_of_rows();
        let user_metadata = metadata
            .user_custom_metadata()
            .iter()
            .map(|(k, v)| (k.clone(), Bytes::copy_from_slice(v)))
            .collect();
        let mut first_row = 0;
        let mut stripes = Vec::new();
        let mut stripe_stats = Vec::new();
        for stripe in metadata.stripe_metadatas() {
            stripes.push(StripeInformation {
                offset: stripe.offset(),
                length: stripe.index_length() + stripe.data_length() + stripe.footer_length(),
                index_length: stripe.index_length(),
                data_length: stripe.data_length(),
                num_rows: stripe.number_of_rows(),
                first_row,
                writer_timezone: "UTC".to_string(),
            });
            first_row += stripe.number_of_rows();
            stripe_stats.push(stripe.column_statistics().to_vec());
        }
        let file_stats = metadata.column_file_statistics().to_vec();

        let schema = schema_from_arrow(&builder.build().schema())?;
        let convert = |stats: &[OrcStatistics]| -> Vec<Option<ColumnStatistics>> {
            (0..=schema.max_column_id())
                .map(|id| {
                    let ty = schema.find_type(id).ok()?;
                    convert_statistics(ty, stats.get(id as usize)?)
                })
                .collect()
        };
        let statistics = convert(&file_stats);
        let stripe_statistics = stripe_stats.iter().map(|s| convert(s)).collect();

        debug!(
            rows = number_of_rows,
            stripes = stripes.len(),
            schema = %schema,
            writer = %tail.writer_id,
            "Opened ORC file"
        );
        Ok(Self {
            data,
            schema,
            number_of_rows,
            stripes,
            statistics,
            stripe_statistics,
            user_metadata,
            tail,
        })
    }

    fn stripe_info(&self, stripe: usize) -> Result<&StripeInformation> {
        self.stripes.get(stripe).ok_or_else(|| {
            OrcError::value(format!(
                "Stripe {} out of range for {} stripes",
                stripe,
                self.stripes.len()
            ))
        })
    }

    fn check_column(&self, column_id: u64) -> Result<()> {
        if column_id > self.schema.max_column_id() {
            return Err(OrcError::index(format!("Column {} not found", column_id)));
        }
        Ok(())
    }

    fn decode_stream(&self) -> Result<ArrowReader<Bytes>> {
        Ok(ArrowReaderBuilder::try_new(self.data.clone())
            .map_err(codec_error)?
            .with_batch_size(DECODE_BATCH_SIZE)
            .build())
    }
}

/// Statistics in this crate's form; `None` when `orc-rust` reports nothing usable
fn convert_statistics(ty: TypeRef<'_>, stats: &OrcStatistics) -> Option<ColumnStatistics> {
    let typed = stats.type_statistics();
    if stats.number_of_values() == 0 && !stats.has_null() && typed.is_none() {
        return None;
    }
    let decimal = |value: String| -> Option<i128> {
        value.parse::<Decimal>().ok()?.rescale(ty.scale()).to_i128()
    };
    let data = match typed {
        Some(TypeStatistics::Integer { min, max, sum }) => StatisticsData::Integer {
            minimum: *min,
            maximum: *max,
            sum: *sum,
        },
        Some(TypeStatistics::Double { min, max, sum }) => StatisticsData::Double {
            minimum: *min,
            maximum: *max,
            sum: sum.unwrap_or(0.0),
        },
        Some(TypeStatistics::String { min, max, sum }) => StatisticsData::String {
            minimum: min.clone(),
            maximum: max.clone(),
            total_length: *sum as u64,
        },
        Some(TypeStatistics::Bucket { true_count }) => StatisticsData::Boolean {
            false_count: stats.number_of_values().saturating_sub(*true_count),
            true_count: *true_count,
        },
        Some(TypeStatistics::Binary { sum }) => StatisticsData::Binary {
            total_length: *sum as u64,
        },
        Some(TypeStatistics::Date { min, max }) => StatisticsData::Date {
            minimum: *min as i64,
            maximum: *max as i64,
        },
        Some(TypeStatistics::Timestamp {
            min_utc, max_utc, ..
        }) => StatisticsData::Timestamp {
            minimum: *min_utc,
            maximum: *max_utc,
        },
        Some(TypeStatistics::Decimal { min, max, sum }) => {
            match (decimal(min.to_string()), decimal(max.to_string())) {
                (Some(minimum), Some(maximum)) => StatisticsData::Decimal {
                    minimum,
                    maximum,
                    sum: decimal(sum.to_string()),
                    scale: ty.scale(),
                },
                _ => StatisticsData::None,
            }
        }
        _ => StatisticsData::None,
    };
    Some(ColumnStatistics {
        number_of_values: stats.number_of_values(),
        has_null: stats.has_null(),
        data,
    })
}

impl FileReader for OrcFileReader {
    fn schema(&self) -> &TypeDescription {
        &self.schema
    }

    fn number_of_rows(&self) -> u64 {
        self.number_of_rows
    }

    fn number_of_stripes(&self) -> usize {
        self.stripes.len()
    }

    fn stripe(&self, index: usize) -> Result<StripeInformation> {
        self.stripe_info(index).cloned()
    }

    fn column_statistics(&self, column_id: u64) -> Result<ColumnStatistics> {
        self.check_column(column_id)?;
        Ok(self
            .statistics
            .get(column_id as usize)
            .cloned()
            .flatten()
            .unwrap_or_default())
    }

    fn stripe_statistics(&self, stripe: usize, column_id: u64) -> Result<ColumnStatistics> {
        self.stripe_info(stripe)?;
        self.check_column(column_id)?;
        Ok(self
            .stripe_statistics
            .get(stripe)
            .and_then(|s| s.get(column_id as usize))
            .cloned()
            .flatten()
            .unwrap_or_default())
    }

    fn bloom_filters(
        &self,
        stripe: usize,
        _column_ids: &BTreeSet<u64>,
    ) -> Result<BTreeMap<u64, BloomFilterIndex>> {
        self.stripe_info(stripe)?;
        Ok(BTreeMap::new())
    }

    fn create_row_reader(self: Rc<Self>, options: RowReaderOptions) -> Result<Box<dyn RowReader>> {
        let (selected, fields) = resolve_selection(&self.schema, &options.columns)?;
        let sarg = match &options.search_argument {
            Some(sarg) => Some((sarg, sarg.resolve_columns(&self.schema)?)),
            None => None,
        };

        let chosen: Vec<&StripeInformation> = self
            .stripes
            .iter()
            .filter(|info| match options.range {
                Some((offset, length)) => {
                    info.offset >= offset && info.offset < offset.saturating_add(length)
                }
                None => true,
            })
            .collect();
        let (start_row, end_row) = match (chosen.first(), chosen.last()) {
            (Some(first), Some(last)) => (first.first_row, last.first_row + last.num_rows),
            _ => (0, 0),
        };

        let mut ranges = Vec::new();
        for (stripe, info) in self.stripes.iter().enumerate() {
            if info.first_row < start_row || info.first_row >= end_row {
                continue;
            }
            let needed = match &sarg {
                Some((sarg, columns)) => {
                    let stats = self.stripe_statistics.get(stripe);
                    sarg.evaluate(columns, |id| {
                        stats.and_then(|s| s.get(id as usize)).and_then(Option::as_ref)
                    })
                    .is_needed()
                }
                None => true,
            };
            if needed {
                ranges.push((info.first_row, info.first_row + info.num_rows));
            } else {
                debug!(stripe, "Search argument skipped stripe");
            }
        }

        Ok(Box::new(OrcRowReader {
            file: self,
            selected,
            fields,
            ranges,
            start_row,
            end_row,
            position: start_row,
            row_number: start_row,
            stream: None,
        }))
    }

    fn user_metadata(&self) -> &BTreeMap<String, Bytes> {
        &self.user_metadata
    }

    fn compression(&self) -> CompressionKind {
        self.tail.compression
    }

    fn compression_block_size(&self) -> u64 {
        self.tail.compression_block_size
    }

    fn row_index_stride(&self) -> u64 {
        self.tail.row_index_stride
    }

    fn writer_id(&self) -> WriterId {
        self.tail.writer_id
    }

    fn writer_version(&self) -> WriterVersion {
        self.tail.writer_version
    }
}

/// Sequential decode position inside the file
struct DecodeStream {
    reader: ArrowReader<Bytes>,
    /// File row of the first row of `pending`, or of the next decoded batch
    next_row: u64,
    pending: Option<ColumnVectorBatch>,
}

struct OrcRowReader {
    file: Rc<OrcFileReader>,
    selected: TypeDescription,
    fields: Option<Vec<usize>>,
    /// Row ranges of the stripes left after byte range and search argument
    ranges: Vec<(u64, u64)>,
    start_row: u64,
    end_row: u64,
    position: u64,
    row_number: u64,
    stream: Option<DecodeStream>,
}

impl OrcRowReader {
    /// Up to `max_rows` decoded rows starting at file row `row`
    fn rows_at(&mut self, row: u64, max_rows: usize) -> Result<ColumnVectorBatch> {
        if self.stream.as_ref().map_or(true, |s| s.next_row > row) {
            trace!(row, "Restarting ORC decode stream");
            self.stream = Some(DecodeStream {
                reader: self.file.decode_stream()?,
                next_row: 0,
                pending: None,
            });
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| OrcError::internal("Decode stream missing"))?;
        loop {
            if let Some(pending) = &stream.pending {
                let end = stream.next_row + pending.len() as u64;
                if row < end {
                    return Ok(pending.slice((row - stream.next_row) as usize, max_rows));
                }
                stream.next_row = end;
                stream.pending = None;
            }
            let record_batch = stream
                .reader
                .next()
                .ok_or_else(|| {
                    OrcError::parse(format!("ORC data ended before row {}", row))
                })??;
            let batch = record_batch_to_batch(&self.file.schema, &record_batch)?;
            stream.pending = Some(match &self.fields {
                Some(fields) => project(batch, fields)?,
                None => batch,
            });
        }
    }
}

impl RowReader for OrcRowReader {
    fn selected_type(&self) -> &TypeDescription {
        &self.selected
    }

    fn create_row_batch(&self, capacity: usize) -> ColumnVectorBatch {
        ColumnVectorBatch::new(self.selected.root(), capacity)
    }

    fn next(&mut self, batch: &mut ColumnVectorBatch) -> Result<bool> {
        let capacity = batch.capacity().max(1);
        let position = self.position;
        let Some(&(range_start, range_end)) = self
            .ranges
            .iter()
            .find(|(_, end)| *end > position && position < self.end_row)
        else {
            self.position = self.end_row;
            batch.clear();
            batch.mark_refilled();
            return Ok(false);
        };
        let position = position.max(range_start);
        let wanted = ((range_end - position) as usize).min(capacity);
        let rows = self.rows_at(position, wanted)?;

        let count = rows.len();
        *batch = rows;
        batch.set_capacity(capacity);
        batch.mark_refilled();
        trace!(first_row = position, rows = count, "Refilled row batch");
        self.row_number = position;
        self.position = position + count as u64;
        Ok(true)
    }

    fn seek_to_row(&mut self, row: u64) -> Result<()> {
        self.position = row.clamp(self.start_row, self.end_row);
        self.row_number = self.position;
        Ok(())
    }

    fn row_number(&self) -> u64 {
        self.row_number
    }
}

