//! Row group bloom filters of the native container
//!
//! Every value is reduced to a byte key before it reaches the `bloomfilter`
//! crate: integers as their little-endian bytes, doubles as the bytes of a
//! canonical bit pattern and strings as-is. Equal doubles must share a key,
//! so `-0.0` is keyed as `0.0` and every NaN as [`f64::NAN`].

use super::stats::timestamp_millis;
use crate::batch::{ColumnVectorBatch, VectorData};
use crate::decimal::scale_to_string;
use bloomfilter::Bloom;
use num::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

#[derive(Serialize, Deserialize)]
#[serde(from = "StoredBloomFilter", into = "StoredBloomFilter")]
pub struct BloomFilter {
    filter: Bloom<[u8]>,
}

/// Serialized parts of a [`Bloom`]
#[derive(Serialize, Deserialize)]
struct StoredBloomFilter {
    bitmap: Vec<u8>,
    num_bits: u64,
    num_hashes: u32,
    sip_keys: [(u64, u64); 2],
}

impl From<StoredBloomFilter> for BloomFilter {
    fn from(stored: StoredBloomFilter) -> Self {
        Self {
            filter: Bloom::from_existing(
                &stored.bitmap,
                stored.num_bits,
                stored.num_hashes,
                stored.sip_keys,
            ),
        }
    }
}

impl From<BloomFilter> for StoredBloomFilter {
    fn from(filter: BloomFilter) -> Self {
        filter.stored()
    }
}

impl Clone for BloomFilter {
    fn clone(&self) -> Self {
        self.stored().into()
    }
}

impl fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits())
            .field("num_hash_functions", &self.num_hash_functions())
            .finish()
    }
}

/// Key of a double; equal values (including both zeros) get equal keys
fn double_key(value: f64) -> [u8; 8] {
    let canonical = if value == 0.0 {
        0.0
    } else if value.is_nan() {
        f64::NAN
    } else {
        value
    };
    canonical.to_bits().to_le_bytes()
}

impl BloomFilter {
    /// Sized for `expected_entries` values at false positive probability `fpp`
    pub fn new(expected_entries: u64, fpp: f64) -> Self {
        Self {
            filter: Bloom::new_for_fp_rate(expected_entries.max(1) as usize, fpp),
        }
    }

    fn stored(&self) -> StoredBloomFilter {
        StoredBloomFilter {
            bitmap: self.filter.bitmap(),
            num_bits: self.filter.number_of_bits(),
            num_hashes: self.filter.number_of_hash_functions(),
            sip_keys: self.filter.sip_keys(),
        }
    }

    pub fn num_bits(&self) -> u64 {
        self.filter.number_of_bits()
    }

    pub fn num_hash_functions(&self) -> u32 {
        self.filter.number_of_hash_functions()
    }

    pub fn add_long(&mut self, value: i64) {
        self.filter.set(&value.to_le_bytes()[..]);
    }

    pub fn add_double(&mut self, value: f64) {
        self.filter.set(&double_key(value)[..]);
    }

    pub fn add_bytes(&mut self, value: &[u8]) {
        self.filter.set(value);
    }

    pub fn test_long(&self, value: i64) -> bool {
        self.filter.check(&value.to_le_bytes()[..])
    }

    pub fn test_double(&self, value: f64) -> bool {
        self.filter.check(&double_key(value)[..])
    }

    pub fn test_bytes(&self, value: &[u8]) -> bool {
        self.filter.check(value)
    }

    /// Adds the valid `rows` of a primitive column.
    ///
    /// Timestamps go in as milliseconds and 64-bit decimals as their text at
    /// the column scale; kinds without a key (booleans live in `Long`) are
    /// skipped.
    pub fn add_rows(&mut self, batch: &ColumnVectorBatch, rows: Range<usize>) {
        for row in rows.filter(|r| !batch.is_null(*r)) {
            match &batch.data {
                VectorData::Long(v) => self.add_long(v[row]),
                VectorData::Double(v) => self.add_double(v[row]),
                VectorData::Bytes(v) => self.add_bytes(&v[row]),
                VectorData::Timestamp {
                    seconds,
                    nanoseconds,
                } => self.add_long(timestamp_millis(seconds[row], nanoseconds[row])),
                VectorData::Decimal64 { values, scale, .. } => {
                    let text = scale_to_string(&BigInt::from(values[row]), *scale);
                    self.add_bytes(text.as_bytes())
                }
                _ => {}
            }
        }
    }
}

/// Bloom filters of one column in one stripe, one entry per row group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BloomFilterIndex {
    pub entries: Vec<BloomFilter>,
}

impl BloomFilterIndex {
    pub fn test_long(&self, value: i64) -> bool {
        self.entries.iter().any(|e| e.test_long(value))
    }

    pub fn test_double(&self, value: f64) -> bool {
        self.entries.iter().any(|e| e.test_double(value))
    }

    pub fn test_bytes(&self, value: &[u8]) -> bool {
        self.entries.iter().any(|e| e.test_bytes(value))
    }
}
