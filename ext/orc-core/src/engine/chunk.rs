//! Random-access byte sources for the file readers

use crate::{OrcError, Result};
use bytes::Bytes;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A source the file reader can fetch arbitrary byte ranges from
pub trait ChunkReader {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exactly `length` bytes starting at `start`
    fn get_bytes(&self, start: u64, length: usize) -> Result<Bytes>;
}

fn out_of_bounds(start: u64, length: usize, len: u64) -> OrcError {
    OrcError::parse(format!(
        "Read of {} bytes at offset {} exceeds file length {}",
        length, start, len
    ))
}

impl ChunkReader for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    fn get_bytes(&self, start: u64, length: usize) -> Result<Bytes> {
        let end = start
            .checked_add(length as u64)
            .filter(|end| *end <= ChunkReader::len(self))
            .ok_or_else(|| out_of_bounds(start, length, ChunkReader::len(self)))?;
        Ok(self.slice(start as usize..end as usize))
    }
}

/// File-based chunk reader that reopens the file for each read
#[derive(Debug, Clone)]
pub struct FileChunkReader {
    path: PathBuf,
    file_len: u64,
}

impl FileChunkReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        Ok(FileChunkReader { path, file_len })
    }
}

impl ChunkReader for FileChunkReader {
    fn len(&self) -> u64 {
        self.file_len
    }

    fn get_bytes(&self, start: u64, length: usize) -> Result<Bytes> {
        if start.saturating_add(length as u64) > self.file_len {
            return Err(out_of_bounds(start, length, self.file_len));
        }
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0; length];
        file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_bytes_ranges() {
        let data = Bytes::from_static(b"ORC-data-ORC");
        assert_eq!(ChunkReader::len(&data), 12);
        assert_eq!(data.get_bytes(4, 4).unwrap(), Bytes::from_static(b"data"));
        assert!(matches!(data.get_bytes(10, 4), Err(OrcError::Parse(_))));
    }

    #[test]
    fn test_file_ranges() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.flush().unwrap();

        let reader = FileChunkReader::new(file.path()).unwrap();
        assert_eq!(reader.len(), 10);
        assert_eq!(reader.get_bytes(7, 3).unwrap(), Bytes::from_static(b"789"));
        assert!(reader.get_bytes(8, 3).is_err());
    }
}
