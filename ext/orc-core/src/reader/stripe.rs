use super::column::Column;
use super::cursor::RowCursor;
use super::{StreamContext, Whence};
use crate::engine::StripeInformation;
use crate::types::TypeDescription;
use crate::{OrcValue, Result};
use std::collections::BTreeSet;
use std::rc::Rc;

/// Rows of one stripe, iterable and seekable on their own.
///
/// Row positions are relative to the first row of the stripe.
pub struct Stripe {
    context: Rc<StreamContext>,
    index: usize,
    info: StripeInformation,
    cursor: RowCursor,
}

impl Stripe {
    pub(crate) fn new(context: Rc<StreamContext>, index: usize) -> Result<Self> {
        let info = context.file.stripe(index)?;
        let cursor = context.cursor(Some(&info), None)?;
        Ok(Self {
            context,
            index,
            info,
            cursor,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of rows in the stripe
    pub fn len(&self) -> u64 {
        self.info.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.info.num_rows == 0
    }

    /// Byte offset of the stripe in the file
    pub fn offset(&self) -> u64 {
        self.info.offset
    }

    /// Byte length of the stripe
    pub fn length(&self) -> u64 {
        self.info.length
    }

    pub fn writer_timezone(&self) -> &str {
        &self.info.writer_timezone
    }

    pub fn information(&self) -> &StripeInformation {
        &self.info
    }

    pub fn selected_schema(&self) -> &TypeDescription {
        self.cursor.selected_type()
    }

    /// Ids of the columns that carry bloom filters in this stripe
    pub fn bloom_filter_columns(&self) -> Result<Vec<u64>> {
        let ids: BTreeSet<u64> = (0..=self.context.file.schema().max_column_id()).collect();
        Ok(self
            .context
            .file
            .bloom_filters(self.index, &ids)?
            .into_keys()
            .collect())
    }

    /// View of one column restricted to this stripe, with the stripe's
    /// statistics and bloom filter
    pub fn column(&self, column_id: u64) -> Result<Column> {
        let cursor = self.context.cursor(Some(&self.info), Some(column_id))?;
        let statistics = self.context.file.stripe_statistics(self.index, column_id)?;
        let bloom_filter = self
            .context
            .file
            .bloom_filters(self.index, &BTreeSet::from([column_id]))?
            .remove(&column_id);
        Column::new(
            column_id,
            cursor,
            statistics,
            bloom_filter,
            self.context.converter_options.clone(),
        )
    }

    pub fn current_row(&self) -> u64 {
        self.cursor.current_row()
    }

    pub fn seek(&mut self, row: i64, whence: Whence) -> Result<u64> {
        self.cursor.seek(row, whence)
    }

    pub fn read(&mut self, num: Option<usize>) -> Result<Vec<OrcValue>> {
        self.cursor.read(num)
    }
}

impl Iterator for Stripe {
    type Item = Result<OrcValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next()
    }
}
