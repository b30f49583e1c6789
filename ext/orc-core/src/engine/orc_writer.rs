//! Apache ORC writer on top of `orc-rust`
//!
//! Batches are exported to Arrow record batches and handed to `orc-rust`'s
//! Arrow writer. It covers struct schemas of primitive columns and writes no
//! compression, indexes, bloom filters or user metadata, so schemas and
//! options outside that are rejected up front.

use super::native_writer::WriterOptions;
use super::FileWriter;
use crate::arrow_conversion::{batch_to_record_batch, schema_to_arrow};
use crate::batch::ColumnVectorBatch;
use crate::types::{TypeDescription, TypeKind};
use crate::{OrcError, Result};
use bytes::Bytes;
use orc_rust::arrow_writer::{ArrowWriter, ArrowWriterBuilder};
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

/// Field kinds `orc-rust` can encode
const WRITABLE_KINDS: [TypeKind; 9] = [
    TypeKind::Boolean,
    TypeKind::Byte,
    TypeKind::Short,
    TypeKind::Int,
    TypeKind::Long,
    TypeKind::Float,
    TypeKind::Double,
    TypeKind::String,
    TypeKind::Binary,
];

fn codec_error(e: impl std::fmt::Display) -> OrcError {
    OrcError::internal(format!("ORC encode failed: {}", e))
}

pub struct OrcFileWriter<W: Write> {
    schema: TypeDescription,
    /// `None` once closed
    writer: Option<ArrowWriter<W>>,
    rows: u64,
}

impl<W: Write> OrcFileWriter<W> {
    pub fn new(sink: W, schema: TypeDescription, options: &WriterOptions) -> Result<Self> {
        let root = schema.root();
        if root.kind() != TypeKind::Struct {
            return Err(OrcError::unsupported(format!(
                "ORC output needs a struct schema, got {}",
                schema
            )));
        }
        let unwritable = root
            .fields()
            .find(|(_, field)| !WRITABLE_KINDS.contains(&field.kind()));
        if let Some((name, field)) = unwritable {
            return Err(OrcError::unsupported(format!(
                "ORC output cannot encode field '{}' of type {}",
                name, field
            )));
        }
        if !options.bloom_filter_columns.is_empty() {
            return Err(OrcError::unsupported(
                "Bloom filters are only written to native files",
            ));
        }
        debug!(
            compression = %options.compression,
            row_index_stride = options.row_index_stride,
            "ORC output is written uncompressed and without row indexes"
        );

        let arrow_schema = Arc::new(schema_to_arrow(&schema)?);
        let writer = ArrowWriterBuilder::new(sink, arrow_schema)
            .with_stripe_byte_size(options.stripe_size.min(usize::MAX as u64) as usize)
            .try_build()
            .map_err(codec_error)?;
        debug!(schema = %schema, "Opened ORC writer");
        Ok(Self {
            schema,
            writer: Some(writer),
            rows: 0,
        })
    }
}

impl<W: Write> FileWriter for OrcFileWriter<W> {
    fn schema(&self) -> &TypeDescription {
        &self.schema
    }

    fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    fn create_row_batch(&self, capacity: usize) -> ColumnVectorBatch {
        ColumnVectorBatch::new(self.schema.root(), capacity)
    }

    fn add(&mut self, batch: &ColumnVectorBatch) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(OrcError::Closed)?;
        if batch.is_empty() {
            return Ok(());
        }
        let record_batch = batch_to_record_batch(&self.schema, batch)?;
        writer.write(&record_batch).map_err(codec_error)?;
        self.rows += record_batch.num_rows() as u64;
        Ok(())
    }

    fn add_user_metadata(&mut self, _key: &str, _value: Bytes) -> Result<()> {
        if self.writer.is_none() {
            return Err(OrcError::Closed);
        }
        Err(OrcError::unsupported(
            "User metadata is only written to native files",
        ))
    }

    fn close(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        writer.close().map_err(codec_error)?;
        debug!(rows = self.rows, "Closed ORC writer");
        Ok(())
    }
}
