use super::{unknown_batch, BatchView, Converter, ConverterOptions};
use crate::batch::{ColumnVectorBatch, VectorData};
use crate::{OrcValue, Result};
use std::sync::Arc;

/// DATE columns, through the configured [`super::DateConverter`]
pub struct DateColumnConverter {
    view: BatchView,
    options: Arc<ConverterOptions>,
}

impl DateColumnConverter {
    pub fn new(options: Arc<ConverterOptions>) -> Self {
        Self {
            view: BatchView::default(),
            options,
        }
    }
}

impl Converter for DateColumnConverter {
    fn reset(&mut self, batch: &ColumnVectorBatch) -> Result<()> {
        if !matches!(batch.data, VectorData::Long(_)) {
            return Err(unknown_batch());
        }
        self.view.bind(batch);
        Ok(())
    }

    fn decode(&self, batch: &ColumnVectorBatch, row: usize) -> Result<OrcValue> {
        self.view.check(batch, row)?;
        if batch.is_null(row) {
            return Ok(self.options.null_value.clone());
        }
        match &batch.data {
            VectorData::Long(days) => self.options.converters.date.from_orc(days[row]),
            _ => Err(unknown_batch()),
        }
    }

    fn encode(&mut self, batch: &mut ColumnVectorBatch, row: usize, value: &OrcValue) -> Result<()> {
        if self.options.is_null(value) {
            batch.set_null(row);
            return Ok(());
        }
        let days = self.options.converters.date.to_orc(value)?;
        batch.set_valid(row);
        match &mut batch.data {
            VectorData::Long(v) => {
                v[row] = days;
                Ok(())
            }
            _ => Err(unknown_batch()),
        }
    }
}

/// TIMESTAMP and TIMESTAMP_INSTANT columns, through the configured
/// [`super::TimestampConverter`] and the reader's timezone
pub struct TimestampColumnConverter {
    view: BatchView,
    options: Arc<ConverterOptions>,
}

impl TimestampColumnConverter {
    pub fn new(options: Arc<ConverterOptions>) -> Self {
        Self {
            view: BatchView::default(),
            options,
        }
    }
}

impl Converter for TimestampColumnConverter {
    fn reset(&mut self, batch: &ColumnVectorBatch) -> Result<()> {
        if !matches!(batch.data, VectorData::Timestamp { .. }) {
            return Err(unknown_batch());
        }
        self.view.bind(batch);
        Ok(())
    }

    fn decode(&self, batch: &ColumnVectorBatch, row: usize) -> Result<OrcValue> {
        self.view.check(batch, row)?;
        if batch.is_null(row) {
            return Ok(self.options.null_value.clone());
        }
        match &batch.data {
            VectorData::Timestamp {
                seconds,
                nanoseconds,
            } => self.options.converters.timestamp.from_orc(
                seconds[row],
                nanoseconds[row],
                &self.options.timezone,
            ),
            _ => Err(unknown_batch()),
        }
    }

    fn encode(&mut self, batch: &mut ColumnVectorBatch, row: usize, value: &OrcValue) -> Result<()> {
        if self.options.is_null(value) {
            batch.set_null(row);
            return Ok(());
        }
        let (secs, nanos) = self
            .options
            .converters
            .timestamp
            .to_orc(value, &self.options.timezone)?;
        batch.set_valid(row);
        match &mut batch.data {
            VectorData::Timestamp {
                seconds,
                nanoseconds,
            } => {
                seconds[row] = secs;
                nanoseconds[row] = nanos;
                Ok(())
            }
            _ => Err(unknown_batch()),
        }
    }
}
