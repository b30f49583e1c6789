//! ORC file tail fields `orc-rust` does not surface
//!
//! The postscript is never compressed and is decoded whole. The footer is
//! only decoded when it is stored raw: either the file is uncompressed or
//! every compression chunk of the footer carries the "original" flag.
//! Otherwise the writer id stays unknown.

use super::chunk::ChunkReader;
use super::{CompressionKind, WriterId, WriterVersion};
use crate::{OrcError, Result};
use prost::Message;
use tracing::debug;

/// Upper bound ORC puts on the postscript length byte
const MAX_POSTSCRIPT_LEN: u64 = 255;

#[derive(Clone, PartialEq, prost::Message)]
struct PostScript {
    #[prost(uint64, optional, tag = "1")]
    footer_length: Option<u64>,
    #[prost(uint32, optional, tag = "2")]
    compression: Option<u32>,
    #[prost(uint64, optional, tag = "3")]
    compression_block_size: Option<u64>,
    #[prost(uint32, repeated, tag = "4")]
    version: Vec<u32>,
    #[prost(uint64, optional, tag = "5")]
    metadata_length: Option<u64>,
    #[prost(uint32, optional, tag = "6")]
    writer_version: Option<u32>,
    #[prost(uint64, optional, tag = "7")]
    stripe_statistics_length: Option<u64>,
    #[prost(string, optional, tag = "8000")]
    magic: Option<String>,
}

/// The two footer fields read here; everything else is skipped
#[derive(Clone, PartialEq, prost::Message)]
struct FooterFields {
    #[prost(uint32, optional, tag = "8")]
    row_index_stride: Option<u32>,
    #[prost(uint32, optional, tag = "9")]
    writer: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FileTail {
    pub compression: CompressionKind,
    pub compression_block_size: u64,
    pub writer_version: WriterVersion,
    pub writer_id: WriterId,
    pub row_index_stride: u64,
    pub file_version: Vec<u32>,
}

pub(crate) fn read_tail<R: ChunkReader + ?Sized>(source: &R) -> Result<FileTail> {
    let len = source.len();
    if len < 1 {
        return Err(OrcError::parse("Empty file"));
    }
    let ps_len = source.get_bytes(len - 1, 1)?[0] as u64;
    if ps_len == 0 || ps_len > MAX_POSTSCRIPT_LEN || ps_len + 1 > len {
        return Err(OrcError::parse(format!("Invalid postscript length {}", ps_len)));
    }
    let ps_start = len - 1 - ps_len;
    let ps_bytes = source.get_bytes(ps_start, ps_len as usize)?;
    let postscript = PostScript::decode(ps_bytes)
        .map_err(|e| OrcError::parse(format!("Corrupt postscript: {}", e)))?;
    if postscript.magic.as_deref().is_some_and(|m| m != "ORC") {
        return Err(OrcError::parse("Not an ORC file: bad postscript magic"));
    }

    let compression = CompressionKind::from_code(postscript.compression.unwrap_or(0))?;
    let compression_block_size = postscript.compression_block_size.unwrap_or(256 * 1024);
    let footer_len = postscript.footer_length.unwrap_or(0);
    let footer_start = ps_start
        .checked_sub(footer_len)
        .ok_or_else(|| OrcError::parse(format!("Invalid footer length {}", footer_len)))?;
    let footer_bytes = source.get_bytes(footer_start, footer_len as usize)?;

    let footer = match compression {
        CompressionKind::None => Some(footer_bytes.to_vec()),
        _ => uncompressed_chunks(&footer_bytes),
    };
    let fields = match footer {
        Some(raw) => Some(
            FooterFields::decode(raw.as_slice())
                .map_err(|e| OrcError::parse(format!("Corrupt footer: {}", e)))?,
        ),
        None => {
            debug!(%compression, "Footer is compressed; writer id not decoded");
            None
        }
    };

    Ok(FileTail {
        compression,
        compression_block_size,
        writer_version: WriterVersion::from_code(postscript.writer_version.unwrap_or(0)),
        // Files predating the writer field come from the Java writer
        writer_id: match &fields {
            Some(fields) => WriterId::from_code(fields.writer.unwrap_or(0)),
            None => WriterId::Unknown(None),
        },
        row_index_stride: fields
            .and_then(|f| f.row_index_stride)
            .map_or(0, u64::from),
        file_version: postscript.version,
    })
}

/// Concatenated payload when every chunk is stored uncompressed
fn uncompressed_chunks(mut data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    while !data.is_empty() {
        if data.len() < 3 {
            return None;
        }
        let header = data[0] as usize | (data[1] as usize) << 8 | (data[2] as usize) << 16;
        let original = header & 1 == 1;
        let chunk_len = header >> 1;
        let chunk = data.get(3..3 + chunk_len)?;
        if !original {
            return None;
        }
        out.extend_from_slice(chunk);
        data = &data[3 + chunk_len..];
    }
    Some(out)
}
