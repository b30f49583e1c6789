//! Reader of the native container

use super::bloom_filter::BloomFilterIndex;
use super::chunk::ChunkReader;
use super::sarg::SearchArgument;
use super::stats::ColumnStatistics;
use super::{
    project, resolve_selection, CompressionKind, FileReader, Footer, RowReader, RowReaderOptions,
    StripeIndex, StripeInformation, WriterId, WriterVersion, NATIVE_MAGIC as MAGIC,
};
use crate::batch::ColumnVectorBatch;
use crate::types::TypeDescription;
use crate::{OrcError, Result};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::{debug, trace};

const TRAILER_LEN: u64 = 8 + MAGIC.len() as u64;

/// Opens files written by [`super::NativeFileWriter`]
pub struct NativeFileReader<R: ChunkReader> {
    source: R,
    footer: Footer,
}

impl<R: ChunkReader> NativeFileReader<R> {
    pub fn open(source: R) -> Result<Self> {
        let len = source.len();
        if len < MAGIC.len() as u64 + TRAILER_LEN {
            return Err(OrcError::parse(format!(
                "File of {} bytes is too short for a native container",
                len
            )));
        }
        if source.get_bytes(0, MAGIC.len())?.as_ref() != MAGIC {
            return Err(OrcError::parse("Not a native container: bad header magic"));
        }
        let trailer = source.get_bytes(len - TRAILER_LEN, TRAILER_LEN as usize)?;
        if &trailer[8..] != MAGIC {
            return Err(OrcError::parse("Not a native container: bad trailer magic"));
        }
        let mut footer_len = [0u8; 8];
        footer_len.copy_from_slice(&trailer[..8]);
        let footer_len = u64::from_le_bytes(footer_len);
        let footer_start = (len - TRAILER_LEN)
            .checked_sub(footer_len)
            .filter(|start| *start >= MAGIC.len() as u64)
            .ok_or_else(|| OrcError::parse(format!("Invalid footer length {}", footer_len)))?;
        let footer_bytes = source.get_bytes(footer_start, footer_len as usize)?;
        let footer: Footer = bincode::deserialize(&footer_bytes)
            .map_err(|e| OrcError::parse(format!("Corrupt footer: {}", e)))?;
        debug!(
            rows = footer.number_of_rows,
            stripes = footer.stripes.len(),
            schema = %footer.schema,
            "Opened native container"
        );
        Ok(Self { source, footer })
    }

    fn stripe_info(&self, stripe: usize) -> Result<&StripeInformation> {
        self.footer.stripes.get(stripe).ok_or_else(|| {
            OrcError::value(format!(
                "Stripe {} out of range for {} stripes",
                stripe,
                self.footer.stripes.len()
            ))
        })
    }

    fn read_index(&self, stripe: usize) -> Result<StripeIndex> {
        let info = self.stripe_info(stripe)?;
        let bytes = self
            .source
            .get_bytes(info.offset, info.index_length as usize)?;
        bincode::deserialize(&bytes)
            .map_err(|e| OrcError::parse(format!("Corrupt index of stripe {}: {}", stripe, e)))
    }

    fn read_data(&self, stripe: usize) -> Result<ColumnVectorBatch> {
        let info = self.stripe_info(stripe)?;
        let bytes = self.source.get_bytes(
            info.offset + info.index_length,
            info.data_length as usize,
        )?;
        bincode::deserialize(&bytes)
            .map_err(|e| OrcError::parse(format!("Corrupt data of stripe {}: {}", stripe, e)))
    }

    /// Rows per row group in `stripe`
    fn stride(&self, info: &StripeInformation) -> u64 {
        match self.footer.row_index_stride {
            0 => info.num_rows.max(1),
            n => n,
        }
    }
}

impl<R: ChunkReader + 'static> FileReader for NativeFileReader<R> {
    fn schema(&self) -> &TypeDescription {
        &self.footer.schema
    }

    fn number_of_rows(&self) -> u64 {
        self.footer.number_of_rows
    }

    fn number_of_stripes(&self) -> usize {
        self.footer.stripes.len()
    }

    fn stripe(&self, index: usize) -> Result<StripeInformation> {
        self.stripe_info(index).cloned()
    }

    fn column_statistics(&self, column_id: u64) -> Result<ColumnStatistics> {
        self.footer
            .statistics
            .get(column_id as usize)
            .cloned()
            .ok_or_else(|| OrcError::index(format!("Column {} not found", column_id)))
    }

    fn stripe_statistics(&self, stripe: usize, column_id: u64) -> Result<ColumnStatistics> {
        self.stripe_info(stripe)?;
        self.footer
            .stripe_statistics
            .get(stripe)
            .ok_or_else(|| {
                OrcError::parse(format!("Footer has no statistics for stripe {}", stripe))
            })?
            .get(column_id as usize)
            .cloned()
            .ok_or_else(|| OrcError::index(format!("Column {} not found", column_id)))
    }

    fn bloom_filters(
        &self,
        stripe: usize,
        column_ids: &BTreeSet<u64>,
    ) -> Result<BTreeMap<u64, BloomFilterIndex>> {
        let mut index = self.read_index(stripe)?;
        index.bloom_filters.retain(|id, _| column_ids.contains(id));
        Ok(index.bloom_filters)
    }

    fn create_row_reader(self: Rc<Self>, options: RowReaderOptions) -> Result<Box<dyn RowReader>> {
        let schema = &self.footer.schema;
        let (selected, fields) = resolve_selection(schema, &options.columns)?;

        let sarg = match options.search_argument {
            Some(sarg) => {
                let columns = sarg.resolve_columns(schema)?;
                Some((sarg, columns))
            }
            None => None,
        };

        let stripes: Vec<usize> = self
            .footer
            .stripes
            .iter()
            .enumerate()
            .filter(|(_, info)| match options.range {
                Some((offset, length)) => {
                    info.offset >= offset && info.offset < offset.saturating_add(length)
                }
                None => true,
            })
            .map(|(idx, _)| idx)
            .collect();
        let (start_row, end_row) = match (stripes.first(), stripes.last()) {
            (Some(&first), Some(&last)) => {
                let last = &self.footer.stripes[last];
                (
                    self.footer.stripes[first].first_row,
                    last.first_row + last.num_rows,
                )
            }
            _ => (0, 0),
        };

        Ok(Box::new(NativeRowReader {
            file: self,
            selected,
            fields,
            stripes,
            start_row,
            end_row,
            sarg,
            position: start_row,
            row_number: start_row,
            loaded: None,
        }))
    }

    fn user_metadata(&self) -> &BTreeMap<String, Bytes> {
        &self.footer.user_metadata
    }

    fn compression(&self) -> CompressionKind {
        self.footer.compression
    }

    fn compression_block_size(&self) -> u64 {
        self.footer.compression_block_size
    }

    fn row_index_stride(&self) -> u64 {
        self.footer.row_index_stride
    }

    fn writer_id(&self) -> WriterId {
        WriterId::Unknown(None)
    }

    fn writer_version(&self) -> WriterVersion {
        self.footer.writer_version
    }
}

struct LoadedStripe {
    stripe: usize,
    /// `None` when every row group was excluded by the search argument
    data: Option<ColumnVectorBatch>,
    needed: Vec<bool>,
}

struct NativeRowReader<R: ChunkReader> {
    file: Rc<NativeFileReader<R>>,
    selected: TypeDescription,
    fields: Option<Vec<usize>>,
    stripes: Vec<usize>,
    start_row: u64,
    end_row: u64,
    sarg: Option<(SearchArgument, Vec<u64>)>,
    position: u64,
    row_number: u64,
    loaded: Option<LoadedStripe>,
}

impl<R: ChunkReader> NativeRowReader<R> {
    fn stripe_at(&self, row: u64) -> Option<usize> {
        self.stripes.iter().copied().find(|&idx| {
            let info = &self.file.footer.stripes[idx];
            info.first_row <= row && row < info.first_row + info.num_rows
        })
    }

    fn load(&mut self, stripe: usize) -> Result<&LoadedStripe> {
        if self.loaded.as_ref().map(|l| l.stripe) != Some(stripe) {
            let info = &self.file.footer.stripes[stripe];
            let stride = self.file.stride(info);
            let groups = info.num_rows.div_ceil(stride) as usize;
            let needed = match &self.sarg {
                Some((sarg, columns)) => {
                    let index = self.file.read_index(stripe)?;
                    let needed: Vec<bool> = (0..groups)
                        .map(|g| {
                            index.row_groups.get(g).map_or(true, |stats| {
                                sarg.evaluate(columns, |id| stats.get(id as usize))
                                    .is_needed()
                            })
                        })
                        .collect();
                    let skipped = needed.iter().filter(|n| !**n).count();
                    if skipped > 0 {
                        debug!(stripe, skipped, groups, "Search argument skipped row groups");
                    }
                    needed
                }
                None => vec![true; groups],
            };
            let data = if needed.iter().any(|n| *n) {
                let data = self.file.read_data(stripe)?;
                Some(match &self.fields {
                    Some(fields) => project(data, fields)?,
                    None => data,
                })
            } else {
                None
            };
            self.loaded = Some(LoadedStripe {
                stripe,
                data,
                needed,
            });
        }
        self.loaded
            .as_ref()
            .ok_or_else(|| OrcError::internal("Stripe was not loaded"))
    }
}

impl<R: ChunkReader> RowReader for NativeRowReader<R> {
    fn selected_type(&self) -> &TypeDescription {
        &self.selected
    }

    fn create_row_batch(&self, capacity: usize) -> ColumnVectorBatch {
        ColumnVectorBatch::new(self.selected.root(), capacity)
    }

    fn next(&mut self, batch: &mut ColumnVectorBatch) -> Result<bool> {
        let capacity = batch.capacity().max(1);
        loop {
            if self.position >= self.end_row {
                batch.clear();
                batch.mark_refilled();
                return Ok(false);
            }
            let stripe = self
                .stripe_at(self.position)
                .ok_or_else(|| OrcError::internal(format!("No stripe holds row {}", self.position)))?;
            let info = self.file.footer.stripes[stripe].clone();
            let stride = self.file.stride(&info);
            let position = self.position;
            let loaded = self.load(stripe)?;

            let local = position - info.first_row;
            let group = (local / stride) as usize;
            let Some(data) = loaded.data.as_ref().filter(|_| loaded.needed[group]) else {
                let next = match loaded.data {
                    None => info.num_rows,
                    Some(_) => (group as u64 + 1) * stride,
                };
                self.position = info.first_row + next.min(info.num_rows);
                continue;
            };

            let mut run_end = (group as u64 + 1) * stride;
            while run_end < info.num_rows && loaded.needed[(run_end / stride) as usize] {
                run_end += stride;
            }
            let run_end = run_end.min(info.num_rows);
            let rows = (run_end - local).min(capacity as u64) as usize;

            *batch = data.slice(local as usize, rows);
            batch.set_capacity(capacity);
            batch.mark_refilled();
            trace!(stripe, first_row = position, rows, "Refilled row batch");
            self.row_number = position;
            self.position = position + rows as u64;
            return Ok(true);
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::VectorData;
    use crate::converter::{create_converter, ConverterOptions};
    use crate::engine::sarg::{ColumnRef, Literal, PredicateDataType};
    use crate::engine::{ColumnSelection, FileWriter, NativeFileWriter, WriterOptions};
    use crate::OrcValue;
    use std::sync::Arc;

    fn write_file(rows: usize, options: WriterOptions, batch_rows: usize) -> Bytes {
        let schema: TypeDescription = "struct<id:bigint,name:string>".parse().unwrap();
        let converter_options = Arc::new(ConverterOptions::default());
        let mut converter = create_converter(schema.root(), &converter_options).unwrap();
        let mut buffer = Vec::new();
        let mut writer = NativeFileWriter::new(&mut buffer, schema.clone(), options).unwrap();
        let mut batch = writer.create_row_batch(batch_rows);
        for chunk_start in (0..rows).step_by(batch_rows) {
            batch.clear();
            converter.clear();
            for row in chunk_start..(chunk_start + batch_rows).min(rows) {
                let value = OrcValue::Tuple(vec![
                    OrcValue::from(row as i64),
                    OrcValue::from(format!("row-{}", row)),
                ]);
                converter.encode(&mut batch, row - chunk_start, &value).unwrap();
            }
            writer.add(&batch).unwrap();
        }
        writer.add_user_metadata("origin", Bytes::from_static(b"test")).unwrap();
        writer.close().unwrap();
        Bytes::from(buffer)
    }

    fn read_ids(reader: &mut dyn RowReader) -> Vec<i64> {
        let mut ids = Vec::new();
        let mut batch = reader.create_row_batch(7);
        while reader.next(&mut batch).unwrap() {
            let VectorData::Struct { fields } = &batch.data else {
                panic!("expected struct");
            };
            let VectorData::Long(values) = &fields[0].data else {
                panic!("expected longs");
            };
            ids.extend_from_slice(&values[..batch.num_elements]);
        }
        ids
    }

    #[test]
    fn test_footer_metadata() {
        let options = WriterOptions {
            compression: CompressionKind::Zstd,
            row_index_stride: 5,
            ..Default::default()
        };
        let file = NativeFileReader::open(write_file(12, options, 4)).unwrap();
        assert_eq!(file.number_of_rows(), 12);
        assert_eq!(file.number_of_stripes(), 1);
        assert_eq!(file.compression(), CompressionKind::Zstd);
        assert_eq!(file.row_index_stride(), 5);
        assert_eq!(file.user_metadata()["origin"], Bytes::from_static(b"test"));
        assert_eq!(file.column_statistics(1).unwrap().number_of_values, 12);
        assert!(matches!(file.column_statistics(9), Err(OrcError::Index(_))));
        assert!(matches!(file.stripe(1), Err(OrcError::Value(_))));
        assert_eq!(file.writer_id().name(), "UNKNOWN_WRITER");
        assert_eq!(file.writer_version(), WriterVersion::Orc14);
    }

    #[test]
    fn test_missing_stripe_statistics_are_parse_errors() {
        let mut file = NativeFileReader::open(write_file(4, WriterOptions::default(), 4)).unwrap();
        assert_eq!(file.stripe_statistics(0, 1).unwrap().number_of_values, 4);
        file.footer.stripe_statistics.clear();
        let err = file.stripe_statistics(0, 1).unwrap_err();
        assert!(matches!(err, OrcError::Parse(_)));
        assert!(err.to_string().contains("stripe 0"), "{}", err);
    }

    #[test]
    fn test_scan_and_seek() {
        let file = Rc::new(NativeFileReader::open(write_file(20, WriterOptions::default(), 6)).unwrap());
        let mut reader = file.create_row_reader(RowReaderOptions::default()).unwrap();
        assert_eq!(read_ids(reader.as_mut()), (0..20).collect::<Vec<_>>());

        reader.seek_to_row(15).unwrap();
        assert_eq!(reader.row_number(), 15);
        assert_eq!(read_ids(reader.as_mut()), (15..20).collect::<Vec<_>>());

        reader.seek_to_row(100).unwrap();
        assert_eq!(reader.row_number(), 20);
        let mut batch = reader.create_row_batch(4);
        assert!(!reader.next(&mut batch).unwrap());
    }

    #[test]
    fn test_projection_keeps_column_ids() {
        let file = Rc::new(NativeFileReader::open(write_file(3, WriterOptions::default(), 3)).unwrap());
        let options =
            RowReaderOptions::default().with_columns(ColumnSelection::Names(vec!["name".into()]));
        let mut reader = file.create_row_reader(options).unwrap();
        let selected = reader.selected_type().clone();
        assert_eq!(selected.to_string(), "struct<name:string>");
        assert_eq!(selected.root().child(0).unwrap().column_id(), 2);

        let mut batch = reader.create_row_batch(10);
        assert!(reader.next(&mut batch).unwrap());
        let VectorData::Struct { fields } = &batch.data else {
            panic!("expected struct");
        };
        assert_eq!(fields.len(), 1);
        assert!(matches!(fields[0].data, VectorData::Bytes(_)));
    }

    #[test]
    fn test_search_argument_skips_row_groups() {
        let options = WriterOptions {
            row_index_stride: 10,
            ..Default::default()
        };
        let file = Rc::new(NativeFileReader::open(write_file(50, options, 50)).unwrap());

        let mut builder = SearchArgument::builder();
        builder
            .equals(ColumnRef::Name("id".into()), PredicateDataType::Long, Literal::Long(23))
            .unwrap();
        let sarg = builder.build().unwrap();
        let mut reader = file
            .clone()
            .create_row_reader(RowReaderOptions::default().with_search_argument(sarg))
            .unwrap();
        assert_eq!(read_ids(reader.as_mut()), (20..30).collect::<Vec<_>>());

        let mut builder = SearchArgument::builder();
        builder
            .equals(ColumnRef::Name("missing".into()), PredicateDataType::Long, Literal::Long(1))
            .unwrap();
        let sarg = builder.build().unwrap();
        assert!(matches!(
            file.create_row_reader(RowReaderOptions::default().with_search_argument(sarg)),
            Err(OrcError::Type(_))
        ));
    }

    #[test]
    fn test_byte_range_selects_stripes() {
        let options = WriterOptions {
            stripe_size: 1,
            ..Default::default()
        };
        let file = Rc::new(NativeFileReader::open(write_file(9, options, 3)).unwrap());
        assert_eq!(file.number_of_stripes(), 3);
        let second = file.stripe(1).unwrap();
        let mut reader = file
            .create_row_reader(RowReaderOptions::default().with_range(second.offset, second.length))
            .unwrap();
        assert_eq!(read_ids(reader.as_mut()), vec![3, 4, 5]);
        reader.seek_to_row(0).unwrap();
        assert_eq!(reader.row_number(), 3);
    }

    #[test]
    fn test_rejects_corrupt_files() {
        assert!(matches!(
            NativeFileReader::open(Bytes::from_static(b"OCVB")),
            Err(OrcError::Parse(_))
        ));
        assert!(matches!(
            NativeFileReader::open(Bytes::from_static(b"PAR1............PAR1")),
            Err(OrcError::Parse(_))
        ));

        let mut bytes = write_file(2, WriterOptions::default(), 2).to_vec();
        let len = bytes.len();
        bytes[len - TRAILER_LEN as usize] ^= 0xff;
        assert!(matches!(
            NativeFileReader::open(Bytes::from(bytes)),
            Err(OrcError::Parse(_))
        ));
    }
}
