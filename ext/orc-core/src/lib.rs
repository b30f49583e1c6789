//! Core functionality for reading and writing ORC files
//!
//! `orc-core` offers a row-oriented API over columnar files: values are
//! exchanged as [`OrcValue`]s while the file itself is organised in stripes
//! of typed column batches. Apache ORC files are read and written through
//! `orc-rust`; a native container (see [`engine`]) carries the features
//! that path lacks, such as bloom filters and user metadata.
//!
//! # Key Components
//!
//! - **Types**: ORC type trees
//!   - Parsed from and rendered to the `struct<a:int,b:string>` syntax
//!   - Pre-order column ids, lookup by id or dotted field name
//!   - Field selection through [`types::TypeDescription::select_fields`]
//!
//! - **Converters**: translation between batches and values
//!   - One converter per type node, built by [`converter::create_converter`]
//!   - Pluggable date, timestamp and decimal handling via [`converter::ConverterTable`]
//!   - Structs as tuples or records, configurable null sentinel
//!
//! - **Reader**: row-wise iteration over a file
//!   - Apache ORC or native container, detected from the file tail
//!   - Writer id and version of the producing implementation
//!   - Seeking relative to the start, the current row or the end
//!   - Per-stripe and per-column views with statistics
//!   - Row group skipping through compiled predicates
//!
//! - **Writer**: row-wise output to any `std::io::Write`
//!   - Native container by default, Apache ORC via [`engine::FileFormat::Orc`]
//!   - Bloom filters for selected columns
//!   - User metadata and writer timezone recorded in the file
//!
//! - **Predicates**: typed comparisons compiled into search arguments
//!
//! - **Arrow Conversion**: schemas and batches to and from Arrow arrays
//!
//! # Example Usage
//!
//! ```
//! use orc_core::{OrcValue, Reader, Writer};
//!
//! let mut buffer = Vec::new();
//! let mut writer = Writer::new(&mut buffer, "struct<a:int,b:string>".parse()?)?;
//! writer.write(&OrcValue::Tuple(vec![OrcValue::from(1), OrcValue::from("x")]))?;
//! writer.close()?;
//! drop(writer);
//!
//! let mut reader = Reader::open(bytes::Bytes::from(buffer))?;
//! let rows = reader.read(None)?;
//! assert_eq!(rows, vec![OrcValue::Tuple(vec![OrcValue::from(1), OrcValue::from("x")])]);
//! # Ok::<(), orc_core::OrcError>(())
//! ```

pub mod arrow_conversion;
pub mod batch;
pub mod bloom;
pub mod converter;
pub mod decimal;
pub mod engine;
pub mod error;
pub mod predicate;
pub mod reader;
pub mod types;
pub mod value;
pub mod writer;

pub use batch::{ColumnVectorBatch, VectorData};
pub use converter::{ConverterOptions, ConverterTable, StructRepr};
pub use decimal::Decimal;
pub use engine::{FileFormat, WriterId, WriterVersion};
pub use error::{ErrorContext, OrcError, Result};
pub use predicate::{Predicate, PredicateColumn};
pub use reader::{Column, Reader, ReaderBuilder, Stripe, Whence};
pub use types::{TypeDescription, TypeKind};
pub use value::OrcValue;
pub use writer::{Writer, WriterBuilder};
