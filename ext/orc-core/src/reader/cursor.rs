use super::column::select_batch;
use super::Whence;
use crate::batch::ColumnVectorBatch;
use crate::converter::{create_converter, Converter, ConverterOptions};
use crate::engine::RowReader;
use crate::types::{find_type, TypeDescription};
use crate::{OrcError, OrcValue, Result};
use std::sync::Arc;

/// Row-at-a-time view over the batches of a [`RowReader`].
///
/// The cursor serves values out of one batch at a time and refills it when
/// it runs dry. With a column id set it serves the values of that column's
/// batch inside each refilled batch instead of whole rows.
pub struct RowCursor {
    row_reader: Box<dyn RowReader>,
    converter: Box<dyn Converter>,
    batch: ColumnVectorBatch,
    column_id: Option<u64>,
    /// File row that `current_row` 0 maps to
    first_row: u64,
    len: u64,
    current_row: u64,
    /// Next item of the batch; 0 means a refill is due
    batch_item: usize,
    batch_start: u64,
    /// Reader position to continue from when no batch is being served
    resume_row: u64,
}

/// Saved cursor position, see [`RowCursor::restore`]
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    current_row: u64,
    batch_item: usize,
    batch_start: u64,
    resume_row: u64,
}

fn target_batch<'a>(
    selected: &TypeDescription,
    batch: &'a ColumnVectorBatch,
    column_id: Option<u64>,
) -> Result<&'a ColumnVectorBatch> {
    match column_id {
        Some(id) => select_batch(selected.root(), batch, id),
        None => Ok(batch),
    }
}

impl RowCursor {
    pub(crate) fn new(
        row_reader: Box<dyn RowReader>,
        column_id: Option<u64>,
        options: &Arc<ConverterOptions>,
        batch_size: usize,
        first_row: u64,
        len: u64,
    ) -> Result<Self> {
        let selected = row_reader.selected_type();
        let ty = match column_id {
            Some(id) => find_type(selected.root(), id)?,
            None => selected.root(),
        };
        let converter = create_converter(ty, options)?;
        let batch = row_reader.create_row_batch(batch_size);
        let resume_row = row_reader.row_number();
        Ok(Self {
            row_reader,
            converter,
            batch,
            column_id,
            first_row,
            len,
            current_row: resume_row.saturating_sub(first_row),
            batch_item: 0,
            batch_start: resume_row,
            resume_row,
        })
    }

    pub fn selected_type(&self) -> &TypeDescription {
        self.row_reader.selected_type()
    }

    /// Number of rows in scope; the base of [`Whence::End`]
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Position relative to the first row in scope
    pub fn current_row(&self) -> u64 {
        self.current_row
    }

    fn refill(&mut self) -> Result<bool> {
        if !self.row_reader.next(&mut self.batch)? {
            self.batch_item = 0;
            self.resume_row = u64::MAX;
            return Ok(false);
        }
        self.batch_start = self.row_reader.row_number();
        self.resume_row = self.batch_start + self.batch.num_elements as u64;
        let target = target_batch(self.row_reader.selected_type(), &self.batch, self.column_id)?;
        self.converter.reset(target)?;
        Ok(true)
    }

    /// Next value, or `None` at the end. The end is not sticky: a seek
    /// makes values available again.
    pub fn next_value(&mut self) -> Result<Option<OrcValue>> {
        loop {
            if self.batch_item == 0 && !self.refill()? {
                return Ok(None);
            }
            let target = target_batch(self.row_reader.selected_type(), &self.batch, self.column_id)?;
            if self.batch_item < target.num_elements {
                let value = self.converter.decode(target, self.batch_item)?;
                self.batch_item += 1;
                self.current_row += 1;
                if self.batch_item >= target.num_elements {
                    self.batch_item = 0;
                }
                return Ok(Some(value));
            }
            self.batch_item = 0;
        }
    }

    /// Up to `num` values, or every remaining value for `None`
    pub fn read(&mut self, num: Option<usize>) -> Result<Vec<OrcValue>> {
        let mut values = Vec::with_capacity(num.unwrap_or(0));
        while num.map_or(true, |n| values.len() < n) {
            match self.next_value()? {
                Some(value) => values.push(value),
                None => break,
            }
        }
        Ok(values)
    }

    /// Move to `row` relative to `whence` and return the new current row.
    /// Targets past the end land on the end.
    pub fn seek(&mut self, row: i64, whence: Whence) -> Result<u64> {
        let base = match whence {
            Whence::Start => {
                if row < 0 {
                    return Err(OrcError::value(format!(
                        "Invalid row {} for a seek from the start",
                        row
                    )));
                }
                0
            }
            Whence::Current => self.current_row as i64,
            Whence::End => self.len as i64,
        };
        let target = base
            .checked_add(row)
            .filter(|target| *target >= 0)
            .ok_or_else(|| OrcError::value(format!("Invalid seek target {} + {}", base, row)))?;
        self.jump_to(target as u64)
    }

    pub(crate) fn jump_to(&mut self, row: u64) -> Result<u64> {
        self.row_reader
            .seek_to_row(self.first_row.saturating_add(row))?;
        self.batch_item = 0;
        self.resume_row = self.row_reader.row_number();
        self.current_row = self.resume_row.saturating_sub(self.first_row);
        Ok(self.current_row)
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            current_row: self.current_row,
            batch_item: self.batch_item,
            batch_start: self.batch_start,
            resume_row: self.resume_row,
        }
    }

    /// Return to a position saved by [`Self::checkpoint`], reloading the
    /// batch that was being served
    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) -> Result<()> {
        if checkpoint.batch_item > 0 {
            self.row_reader.seek_to_row(checkpoint.batch_start)?;
            if !self.refill()? {
                return Err(OrcError::internal(format!(
                    "Batch at row {} disappeared while restoring the cursor",
                    checkpoint.batch_start
                )));
            }
        } else {
            self.row_reader.seek_to_row(checkpoint.resume_row)?;
        }
        self.current_row = checkpoint.current_row;
        self.batch_item = checkpoint.batch_item;
        self.batch_start = checkpoint.batch_start;
        self.resume_row = checkpoint.resume_row;
        Ok(())
    }
}

impl Iterator for RowCursor {
    type Item = Result<OrcValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_value().transpose()
    }
}
