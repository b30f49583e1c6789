//! Storage engine interface and its two implementations
//!
//! The row cursor, column views and writer only talk to storage through
//! [`FileReader`], [`RowReader`] and [`FileWriter`].
//!
//! * [`OrcFileReader`] and [`OrcFileWriter`] read and write Apache ORC files
//!   through the `orc-rust` crate, converting its Arrow record batches to and
//!   from [`ColumnVectorBatch`]es. The file tail fields `orc-rust` keeps to
//!   itself (writer id and version, codec block size, row index stride) are
//!   decoded by [`tail`].
//! * [`NativeFileReader`] and [`NativeFileWriter`] keep a container of their
//!   own for what `orc-rust` cannot write: compound and temporal columns,
//!   decimals, unions, user metadata, row-group statistics and bloom filters.
//!   It is not ORC on disk; sections are bincode-serialized:
//!
//! ```text
//! "OCVB" | stripe 0 index | stripe 0 data | ... | footer | footer length (u64 LE) | "OCVB"
//! ```
//!
//! [`open_file`] tells the two apart by their last bytes.

pub mod bloom_filter;
pub mod chunk;
pub mod native_reader;
pub mod native_writer;
pub mod orc_reader;
pub mod orc_writer;
pub mod sarg;
pub mod stats;
pub mod tail;

use crate::batch::{ColumnVectorBatch, VectorData};
use crate::types::{TypeDescription, TypeKind};
use crate::{OrcError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

pub use bloom_filter::{BloomFilter, BloomFilterIndex};
pub use chunk::{ChunkReader, FileChunkReader};
pub use native_reader::NativeFileReader;
pub use native_writer::{NativeFileWriter, WriterOptions};
pub use orc_reader::OrcFileReader;
pub use orc_writer::OrcFileWriter;
pub use sarg::{Literal, Operator, PredicateDataType, SearchArgument, SearchArgumentBuilder, TruthValue};
pub use stats::{ColumnStatistics, StatisticsData};

/// Leading and trailing bytes of a native container
pub(crate) const NATIVE_MAGIC: &[u8; 4] = b"OCVB";

/// Layout a writer produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// The native container; every type and writer option is supported
    #[default]
    Native,
    /// Apache ORC through `orc-rust`: struct schemas of boolean, integer,
    /// floating point, string and binary columns
    Orc,
}

/// Open `source` with the engine matching its trailing bytes
pub fn open_file<R: ChunkReader + 'static>(source: R) -> Result<Rc<dyn FileReader>> {
    let len = source.len();
    let magic_len = NATIVE_MAGIC.len() as u64;
    let native = len >= magic_len
        && source.get_bytes(len - magic_len, NATIVE_MAGIC.len())?.as_ref() == NATIVE_MAGIC;
    if native {
        Ok(Rc::new(NativeFileReader::open(source)?))
    } else {
        Ok(Rc::new(OrcFileReader::open(&source)?))
    }
}

/// Implementation that wrote a file, as recorded in the ORC footer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterId {
    OrcJava,
    OrcCpp,
    Presto,
    ScritchleyGo,
    Trino,
    /// Unregistered code, or no code could be read
    Unknown(Option<u32>),
}

impl WriterId {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => WriterId::OrcJava,
            1 => WriterId::OrcCpp,
            2 => WriterId::Presto,
            3 => WriterId::ScritchleyGo,
            4 => WriterId::Trino,
            other => WriterId::Unknown(Some(other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WriterId::OrcJava => "ORC_JAVA_WRITER",
            WriterId::OrcCpp => "ORC_CPP_WRITER",
            WriterId::Presto => "PRESTO_WRITER",
            WriterId::ScritchleyGo => "SCRITCHLEY_GO",
            WriterId::Trino => "TRINO_WRITER",
            WriterId::Unknown(_) => "UNKNOWN_WRITER",
        }
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Writer bug-fix level recorded in the ORC postscript
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WriterVersion {
    Original = 0,
    Hive8732 = 1,
    Hive4243 = 2,
    Hive12055 = 3,
    Hive13083 = 4,
    Orc101 = 5,
    Orc135 = 6,
    Orc517 = 7,
    Orc203 = 8,
    Orc14 = 9,
    /// Versions newer than this library knows about
    Future = i32::MAX as isize,
}

impl WriterVersion {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => WriterVersion::Original,
            1 => WriterVersion::Hive8732,
            2 => WriterVersion::Hive4243,
            3 => WriterVersion::Hive12055,
            4 => WriterVersion::Hive13083,
            5 => WriterVersion::Orc101,
            6 => WriterVersion::Orc135,
            7 => WriterVersion::Orc517,
            8 => WriterVersion::Orc203,
            9 => WriterVersion::Orc14,
            _ => WriterVersion::Future,
        }
    }
}

impl CompressionKind {
    /// Codec of a postscript compression code
    pub fn from_code(code: u32) -> Result<Self> {
        Ok(match code {
            0 => CompressionKind::None,
            1 => CompressionKind::Zlib,
            2 => CompressionKind::Snappy,
            3 => CompressionKind::Lzo,
            4 => CompressionKind::Lz4,
            5 => CompressionKind::Zstd,
            other => return Err(OrcError::parse(format!("Unknown compression kind {}", other))),
        })
    }
}

/// Compression codec recorded for the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompressionKind {
    None = 0,
    #[default]
    Zlib = 1,
    Snappy = 2,
    Lzo = 3,
    Lz4 = 4,
    Zstd = 5,
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionKind::None => "NONE",
            CompressionKind::Zlib => "ZLIB",
            CompressionKind::Snappy => "SNAPPY",
            CompressionKind::Lzo => "LZO",
            CompressionKind::Lz4 => "LZ4",
            CompressionKind::Zstd => "ZSTD",
        };
        f.write_str(name)
    }
}

/// Trade-off the compressor is asked to make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompressionStrategy {
    #[default]
    Speed = 0,
    Compression = 1,
}

/// Location and size of one stripe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeInformation {
    pub offset: u64,
    pub length: u64,
    pub index_length: u64,
    pub data_length: u64,
    pub num_rows: u64,
    /// File-relative number of the stripe's first row
    pub first_row: u64,
    pub writer_timezone: String,
}

/// Index section of a stripe: per row group statistics and bloom filters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StripeIndex {
    /// `row_groups[g][column_id]`
    pub row_groups: Vec<Vec<ColumnStatistics>>,
    pub bloom_filters: BTreeMap<u64, BloomFilterIndex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Footer {
    pub schema: TypeDescription,
    pub stripes: Vec<StripeInformation>,
    /// `stripe_statistics[stripe][column_id]`
    pub stripe_statistics: Vec<Vec<ColumnStatistics>>,
    pub statistics: Vec<ColumnStatistics>,
    pub number_of_rows: u64,
    pub row_index_stride: u64,
    pub user_metadata: BTreeMap<String, Bytes>,
    pub compression: CompressionKind,
    pub compression_strategy: CompressionStrategy,
    pub compression_block_size: u64,
    pub padding_tolerance: f64,
    pub dictionary_key_size_threshold: f64,
    pub writer_timezone: String,
    pub writer_version: WriterVersion,
}

/// Which top-level fields a row reader returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ColumnSelection {
    #[default]
    All,
    Indices(Vec<usize>),
    Names(Vec<String>),
}

/// Options for [`FileReader::create_row_reader`]
#[derive(Debug, Clone, Default)]
pub struct RowReaderOptions {
    pub columns: ColumnSelection,
    /// Byte range `(offset, length)`; only stripes starting inside it are read
    pub range: Option<(u64, u64)>,
    pub search_argument: Option<SearchArgument>,
}

impl RowReaderOptions {
    pub fn with_columns(mut self, columns: ColumnSelection) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_range(mut self, offset: u64, length: u64) -> Self {
        self.range = Some((offset, length));
        self
    }

    pub fn with_search_argument(mut self, sarg: SearchArgument) -> Self {
        self.search_argument = Some(sarg);
        self
    }
}

/// Selected type of `schema` and, for struct roots with a field selection,
/// the sorted positions of the kept top-level fields
pub(crate) fn resolve_selection(
    schema: &TypeDescription,
    columns: &ColumnSelection,
) -> Result<(TypeDescription, Option<Vec<usize>>)> {
    let struct_root = schema.kind() == TypeKind::Struct;
    let (selected, mut positions) = match columns {
        ColumnSelection::All => return Ok((schema.clone(), None)),
        ColumnSelection::Indices(indices) => (schema.select_fields(indices)?, indices.clone()),
        ColumnSelection::Names(names) => {
            let selected = schema.select_names(names)?;
            let field_names = schema.root().field_names();
            let positions = names
                .iter()
                .filter_map(|name| field_names.iter().position(|n| n == name))
                .collect();
            (selected, positions)
        }
    };
    positions.sort_unstable();
    positions.dedup();
    Ok((selected, struct_root.then_some(positions)))
}

/// Keep only the top-level fields at `fields` (sorted positions)
pub(crate) fn project(batch: ColumnVectorBatch, fields: &[usize]) -> Result<ColumnVectorBatch> {
    let mut batch = batch;
    match &mut batch.data {
        VectorData::Struct { fields: children } => {
            let kept = std::mem::take(children)
                .into_iter()
                .enumerate()
                .filter(|(pos, _)| fields.contains(pos))
                .map(|(_, child)| child)
                .collect();
            *children = kept;
            Ok(batch)
        }
        _ => Err(OrcError::internal("Projection of a non-struct batch")),
    }
}

/// Read access to a stored file
pub trait FileReader {
    fn schema(&self) -> &TypeDescription;
    fn number_of_rows(&self) -> u64;
    fn number_of_stripes(&self) -> usize;
    fn stripe(&self, index: usize) -> Result<StripeInformation>;
    /// File-level statistics of one column
    fn column_statistics(&self, column_id: u64) -> Result<ColumnStatistics>;
    fn stripe_statistics(&self, stripe: usize, column_id: u64) -> Result<ColumnStatistics>;
    /// Bloom filters of the requested columns; columns without filters are absent
    fn bloom_filters(
        &self,
        stripe: usize,
        column_ids: &BTreeSet<u64>,
    ) -> Result<BTreeMap<u64, BloomFilterIndex>>;
    fn create_row_reader(self: Rc<Self>, options: RowReaderOptions) -> Result<Box<dyn RowReader>>;
    fn user_metadata(&self) -> &BTreeMap<String, Bytes>;
    fn compression(&self) -> CompressionKind;
    fn compression_block_size(&self) -> u64;
    fn row_index_stride(&self) -> u64;
    fn writer_id(&self) -> WriterId;
    fn writer_version(&self) -> WriterVersion;
}

/// Batch-at-a-time scan over a file or a byte range of it
pub trait RowReader {
    fn selected_type(&self) -> &TypeDescription;
    fn create_row_batch(&self, capacity: usize) -> ColumnVectorBatch;
    /// Refill `batch`; `false` once no rows are left
    fn next(&mut self, batch: &mut ColumnVectorBatch) -> Result<bool>;
    /// Position at a file-relative row; positions past the end clamp to the end
    fn seek_to_row(&mut self, row: u64) -> Result<()>;
    /// First row of the last returned batch, or the position set by the last seek
    fn row_number(&self) -> u64;
}

/// Write access to a new file
pub trait FileWriter {
    fn schema(&self) -> &TypeDescription;
    fn is_closed(&self) -> bool;
    fn create_row_batch(&self, capacity: usize) -> ColumnVectorBatch;
    fn add(&mut self, batch: &ColumnVectorBatch) -> Result<()>;
    fn add_user_metadata(&mut self, key: &str, value: Bytes) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}
